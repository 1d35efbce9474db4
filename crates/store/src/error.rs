use codec::CodecError;
use config::ConfigError;
use slotfile::SlotFileError;
use std::fmt;
use std::io;
use thiserror::Error;

/// Where in the store an error happened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Location {
    /// Global timestep index, if the error concerns one snapshot.
    pub index: Option<u64>,
    /// Shard number for the distributed backend.
    pub disk: Option<usize>,
}

impl Location {
    /// Not tied to a snapshot (open, close, header validation).
    #[must_use]
    pub fn store() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn index(index: u64) -> Self {
        Self {
            index: Some(index),
            disk: None,
        }
    }

    #[must_use]
    pub fn on_disk(self, disk: usize) -> Self {
        Self {
            disk: Some(disk),
            ..self
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.index, self.disk) {
            (Some(i), Some(d)) => write!(f, "index {} on disk {}", i, d),
            (Some(i), None) => write!(f, "index {}", i),
            (None, Some(d)) => write!(f, "disk {}", d),
            (None, None) => f.write_str("store"),
        }
    }
}

/// Errors raised by backends and checkpoint sessions.
///
/// Every error is fatal to the session that sees it; nothing is retried.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing medium rejected an operation (disk full, permission,
    /// device gone).
    #[error("I/O error at {at}: {source}")]
    Io {
        at: Location,
        #[source]
        source: io::Error,
    },

    /// Persisted descriptor or snapshot does not match the run descriptor.
    #[error("layout mismatch at {at}: {reason}")]
    Layout { at: Location, reason: String },

    /// Second write of an index within one run.
    #[error("{at} was already written in this run")]
    Concurrency { at: Location },

    /// Read of an index that was never written.
    #[error("no snapshot stored for {at}")]
    MissingSnapshot { at: Location },

    /// Encoding or decoding a compressed payload failed.
    #[error("compression error at {at}: {source}")]
    Compression {
        at: Location,
        #[source]
        source: CodecError,
    },

    /// Call issued out of the required sequence or state.
    #[error("{operation} out of order: expected {expected}, got {actual}")]
    Order {
        operation: &'static str,
        expected: String,
        actual: String,
    },

    /// Finalize called before every index was processed.
    #[error("{phase} incomplete: {done} of {nt} snapshots")]
    IncompleteRun {
        phase: &'static str,
        done: u64,
        nt: u64,
    },

    /// A stored slot failed its integrity checks.
    #[error("corrupt snapshot at {at}: {reason}")]
    Corrupt { at: Location, reason: String },

    /// Invalid configuration or run descriptor.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StoreError {
    /// Translates a slot file error raised at `at`.
    pub(crate) fn from_slot(err: SlotFileError, at: Location) -> Self {
        match err {
            SlotFileError::Io(source) => StoreError::Io { at, source },
            SlotFileError::Layout(reason) => StoreError::Layout { at, reason },
            SlotFileError::OutOfRange { index, nt } => StoreError::Layout {
                at,
                reason: format!("slot {} out of range (nt = {})", index, nt),
            },
            SlotFileError::PayloadLength { expected, actual } => StoreError::Layout {
                at,
                reason: format!("payload is {} bytes, slots hold {}", actual, expected),
            },
            SlotFileError::MissingSlot { .. } => StoreError::MissingSnapshot { at },
            SlotFileError::Corrupt { reason, .. } => StoreError::Corrupt { at, reason },
        }
    }

    /// Rewrites the location to a global `index` on shard `disk`.
    pub(crate) fn locate(self, index: u64, disk: usize) -> Self {
        let at = Location::index(index).on_disk(disk);
        match self {
            StoreError::Io { source, .. } => StoreError::Io { at, source },
            StoreError::Layout { reason, .. } => StoreError::Layout { at, reason },
            StoreError::Concurrency { .. } => StoreError::Concurrency { at },
            StoreError::MissingSnapshot { .. } => StoreError::MissingSnapshot { at },
            StoreError::Compression { source, .. } => StoreError::Compression { at, source },
            StoreError::Corrupt { reason, .. } => StoreError::Corrupt { at, reason },
            other => other,
        }
    }

    /// Tags a store-level error with shard `disk`.
    pub(crate) fn on_disk(self, disk: usize) -> Self {
        match self {
            StoreError::Io { at, source } => StoreError::Io {
                at: at.on_disk(disk),
                source,
            },
            StoreError::Layout { at, reason } => StoreError::Layout {
                at: at.on_disk(disk),
                reason,
            },
            StoreError::Corrupt { at, reason } => StoreError::Corrupt {
                at: at.on_disk(disk),
                reason,
            },
            other => other,
        }
    }

    /// Location carried by the error, if any.
    #[must_use]
    pub fn location(&self) -> Option<Location> {
        match self {
            StoreError::Io { at, .. }
            | StoreError::Layout { at, .. }
            | StoreError::Concurrency { at }
            | StoreError::MissingSnapshot { at }
            | StoreError::Compression { at, .. }
            | StoreError::Corrupt { at, .. } => Some(*at),
            _ => None,
        }
    }
}

impl From<ConfigError> for StoreError {
    fn from(err: ConfigError) -> Self {
        StoreError::Config(err.to_string())
    }
}

pub(crate) fn io_at(at: Location) -> impl FnOnce(io::Error) -> StoreError {
    move |source| StoreError::Io { at, source }
}
