use field::Snapshot;
use std::fmt;
use std::ops::AddAssign;
use std::time::Duration;

use crate::descriptor::RunDescriptor;
use crate::error::StoreError;

/// Direction a backend is opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Forward pass: create a fresh store for `nt` slots.
    Write,
    /// Adjoint pass: read back what a write pass produced.
    Read,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Write => f.write_str("write"),
            Mode::Read => f.write_str("read"),
        }
    }
}

/// Time spent and bytes moved by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoStats {
    pub open: Duration,
    pub write: Duration,
    pub read: Duration,
    pub close: Duration,
    /// Encode and decode time of compressed variants.
    pub codec: Duration,
    /// Payload bytes handed to the medium.
    pub bytes_written: u64,
    /// Payload bytes fetched from the medium.
    pub bytes_read: u64,
    pub snapshots_written: u64,
    pub snapshots_read: u64,
}

impl IoStats {
    /// Open + write + read + close.
    #[must_use]
    pub fn io_time(&self) -> Duration {
        self.open + self.write + self.read + self.close
    }
}

impl AddAssign for IoStats {
    fn add_assign(&mut self, other: Self) {
        self.open += other.open;
        self.write += other.write;
        self.read += other.read;
        self.close += other.close;
        self.codec += other.codec;
        self.bytes_written += other.bytes_written;
        self.bytes_read += other.bytes_read;
        self.snapshots_written += other.snapshots_written;
        self.snapshots_read += other.snapshots_read;
    }
}

/// A snapshot store: one variant per backing medium.
///
/// A backend is opened in one [`Mode`] at a time. Writes are only accepted in
/// [`Mode::Write`], reads only in [`Mode::Read`]; a call in the wrong mode is
/// a [`StoreError::Order`]. Backends do not enforce write or read order; that
/// is the session's job.
pub trait Backend: Send {
    /// Opens the store. [`Mode::Write`] discards anything stored before;
    /// [`Mode::Read`] validates what a previous write pass left.
    fn open(&mut self, mode: Mode) -> Result<(), StoreError>;

    /// Stores the snapshot for `index`. Fails with
    /// [`StoreError::Concurrency`] if `index` was already written.
    fn write_snapshot(&mut self, index: u64, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Returns the snapshot stored for `index`.
    fn read_snapshot(&mut self, index: u64) -> Result<Snapshot, StoreError>;

    /// Releases handles. Closing a write pass finalizes the store.
    fn close(&mut self) -> Result<(), StoreError>;

    fn descriptor(&self) -> &RunDescriptor;

    /// Current mode, `None` when closed.
    fn mode(&self) -> Option<Mode>;

    fn stats(&self) -> IoStats;
}

/// Fails unless the backend is open in `wanted`.
pub(crate) fn require_mode(
    operation: &'static str,
    current: Option<Mode>,
    wanted: Mode,
) -> Result<(), StoreError> {
    if current == Some(wanted) {
        return Ok(());
    }
    Err(StoreError::Order {
        operation,
        expected: format!("backend open for {}", wanted),
        actual: describe_mode(current),
    })
}

/// Fails if the backend is already open.
pub(crate) fn require_closed(current: Option<Mode>) -> Result<(), StoreError> {
    match current {
        None => Ok(()),
        Some(_) => Err(StoreError::Order {
            operation: "open",
            expected: "backend closed".to_string(),
            actual: describe_mode(current),
        }),
    }
}

fn describe_mode(mode: Option<Mode>) -> String {
    match mode {
        Some(m) => format!("backend open for {}", m),
        None => "backend closed".to_string(),
    }
}
