use field::Snapshot;
use slotfile::{SlotReader, SlotWriter};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, trace};

use crate::backend::{require_closed, require_mode, Backend, IoStats, Mode};
use crate::descriptor::RunDescriptor;
use crate::error::{io_at, Location, StoreError};

enum Handle {
    Closed,
    Writing {
        writer: SlotWriter,
        /// One flag per slot; a slot is written at most once per run.
        written: Vec<bool>,
    },
    Reading {
        reader: SlotReader,
    },
}

/// One slot file per run.
///
/// Payloads are whatever the descriptor's encoding says: raw element bytes
/// for a plain disk store, codec output when wrapped by
/// [`CompressedDiskBackend`](crate::CompressedDiskBackend). The
/// payload-level [`write_payload`](DiskBackend::write_payload) and
/// [`read_payload`](DiskBackend::read_payload) exist for that composition.
pub struct DiskBackend {
    descriptor: RunDescriptor,
    path: PathBuf,
    /// Open the file with direct I/O.
    bypass: bool,
    handle: Handle,
    stats: IoStats,
}

impl DiskBackend {
    /// A store at `path`; nothing touches the disk until [`Backend::open`].
    #[must_use]
    pub fn new(descriptor: RunDescriptor, path: impl Into<PathBuf>, bypass: bool) -> Self {
        Self {
            descriptor,
            path: path.into(),
            bypass,
            handle: Handle::Closed,
            stats: IoStats::default(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the open file actually bypasses the page cache.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        match &self.handle {
            Handle::Writing { writer, .. } => writer.is_direct(),
            Handle::Reading { reader } => reader.is_direct(),
            Handle::Closed => false,
        }
    }

    /// Writes an already-encoded payload into slot `index`.
    pub fn write_payload(&mut self, index: u64, payload: &[u8]) -> Result<(), StoreError> {
        require_mode("write_payload", self.mode(), Mode::Write)?;
        self.descriptor.check_index(index)?;
        let at = Location::index(index);
        let Handle::Writing { writer, written } = &mut self.handle else {
            return Err(StoreError::Order {
                operation: "write_payload",
                expected: "backend open for write".into(),
                actual: "no writer".into(),
            });
        };
        let slot = index as usize;
        if written[slot] {
            return Err(StoreError::Concurrency { at });
        }

        let start = Instant::now();
        writer
            .write_slot(index, payload)
            .map_err(|e| StoreError::from_slot(e, at))?;
        written[slot] = true;
        self.stats.write += start.elapsed();
        self.stats.bytes_written += payload.len() as u64;
        self.stats.snapshots_written += 1;
        Ok(())
    }

    /// Reads the raw payload of slot `index`.
    pub fn read_payload(&mut self, index: u64) -> Result<Vec<u8>, StoreError> {
        require_mode("read_payload", self.mode(), Mode::Read)?;
        self.descriptor.check_index(index)?;
        let at = Location::index(index);
        let Handle::Reading { reader } = &mut self.handle else {
            return Err(StoreError::Order {
                operation: "read_payload",
                expected: "backend open for read".into(),
                actual: "no reader".into(),
            });
        };

        let start = Instant::now();
        let payload = reader
            .read_slot(index)
            .map_err(|e| StoreError::from_slot(e, at))?;
        self.stats.read += start.elapsed();
        self.stats.bytes_read += payload.len() as u64;
        self.stats.snapshots_read += 1;
        Ok(payload)
    }

    fn open_write(&self) -> Result<Handle, StoreError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(io_at(Location::store()))?;
        }
        let header = self.descriptor.slot_header(self.bypass);
        let writer = SlotWriter::create(&self.path, header, self.bypass)
            .map_err(|e| StoreError::from_slot(e, Location::store()))?;
        Ok(Handle::Writing {
            writer,
            written: vec![false; self.descriptor.nt as usize],
        })
    }

    fn open_read(&self) -> Result<Handle, StoreError> {
        let reader = SlotReader::open(&self.path, self.bypass)
            .map_err(|e| StoreError::from_slot(e, Location::store()))?;
        self.descriptor.check_header(reader.header())?;
        Ok(Handle::Reading { reader })
    }
}

impl Backend for DiskBackend {
    fn open(&mut self, mode: Mode) -> Result<(), StoreError> {
        require_closed(self.mode())?;
        let start = Instant::now();
        self.handle = match mode {
            Mode::Write => self.open_write()?,
            Mode::Read => self.open_read()?,
        };
        self.stats.open += start.elapsed();
        debug!(
            %mode,
            path = %self.path.display(),
            nt = self.descriptor.nt,
            direct = self.is_direct(),
            "opened disk store"
        );
        Ok(())
    }

    fn write_snapshot(&mut self, index: u64, snapshot: &Snapshot) -> Result<(), StoreError> {
        require_mode("write_snapshot", self.mode(), Mode::Write)?;
        self.descriptor.check_snapshot(index, snapshot)?;
        self.write_payload(index, snapshot.as_bytes())?;
        trace!(index, "wrote snapshot to disk");
        Ok(())
    }

    fn read_snapshot(&mut self, index: u64) -> Result<Snapshot, StoreError> {
        let payload = self.read_payload(index)?;
        let snapshot = Snapshot::from_bytes(self.descriptor.shape.clone(), self.descriptor.dtype, payload)
            .map_err(|e| StoreError::Corrupt {
                at: Location::index(index),
                reason: e.to_string(),
            })?;
        trace!(index, "read snapshot from disk");
        Ok(snapshot)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        let start = Instant::now();
        match std::mem::replace(&mut self.handle, Handle::Closed) {
            Handle::Writing { writer, .. } => {
                writer
                    .finish()
                    .map_err(|e| StoreError::from_slot(e, Location::store()))?;
                debug!(path = %self.path.display(), "sealed disk store");
            }
            Handle::Reading { .. } => {
                debug!(path = %self.path.display(), "closed disk store");
            }
            Handle::Closed => return Ok(()),
        }
        self.stats.close += start.elapsed();
        Ok(())
    }

    fn descriptor(&self) -> &RunDescriptor {
        &self.descriptor
    }

    fn mode(&self) -> Option<Mode> {
        match self.handle {
            Handle::Closed => None,
            Handle::Writing { .. } => Some(Mode::Write),
            Handle::Reading { .. } => Some(Mode::Read),
        }
    }

    fn stats(&self) -> IoStats {
        self.stats
    }
}
