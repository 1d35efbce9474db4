use field::Snapshot;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, trace};

use crate::backend::{require_closed, require_mode, Backend, IoStats, Mode};
use crate::descriptor::RunDescriptor;
use crate::error::{Location, StoreError};

/// Snapshots held in process memory, keyed by index.
///
/// Nothing is persisted: a fresh instance opened for reading holds no
/// snapshots. A read moves the buffer out to the caller, so each index can
/// be read once per write pass.
pub struct MemoryBackend {
    descriptor: RunDescriptor,
    slots: BTreeMap<u64, Vec<u8>>,
    mode: Option<Mode>,
    stats: IoStats,
}

impl MemoryBackend {
    #[must_use]
    pub fn new(descriptor: RunDescriptor) -> Self {
        Self {
            descriptor,
            slots: BTreeMap::new(),
            mode: None,
            stats: IoStats::default(),
        }
    }

    /// Number of snapshots currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Bytes currently held.
    #[must_use]
    pub fn resident_bytes(&self) -> u64 {
        self.slots.values().map(|b| b.len() as u64).sum()
    }
}

impl Backend for MemoryBackend {
    fn open(&mut self, mode: Mode) -> Result<(), StoreError> {
        require_closed(self.mode)?;
        if mode == Mode::Write {
            self.slots.clear();
        }
        self.mode = Some(mode);
        debug!(%mode, nt = self.descriptor.nt, held = self.slots.len(), "opened memory store");
        Ok(())
    }

    fn write_snapshot(&mut self, index: u64, snapshot: &Snapshot) -> Result<(), StoreError> {
        require_mode("write_snapshot", self.mode, Mode::Write)?;
        self.descriptor.check_snapshot(index, snapshot)?;
        if self.slots.contains_key(&index) {
            return Err(StoreError::Concurrency {
                at: Location::index(index),
            });
        }

        let start = Instant::now();
        self.slots.insert(index, snapshot.as_bytes().to_vec());
        self.stats.write += start.elapsed();
        self.stats.bytes_written += snapshot.byte_len() as u64;
        self.stats.snapshots_written += 1;
        trace!(index, "stored snapshot in memory");
        Ok(())
    }

    fn read_snapshot(&mut self, index: u64) -> Result<Snapshot, StoreError> {
        require_mode("read_snapshot", self.mode, Mode::Read)?;
        self.descriptor.check_index(index)?;
        let at = Location::index(index);

        let start = Instant::now();
        let bytes = self
            .slots
            .remove(&index)
            .ok_or(StoreError::MissingSnapshot { at })?;
        self.stats.bytes_read += bytes.len() as u64;
        let snapshot = Snapshot::from_bytes(self.descriptor.shape.clone(), self.descriptor.dtype, bytes)
            .map_err(|e| StoreError::Corrupt {
                at,
                reason: e.to_string(),
            })?;
        self.stats.read += start.elapsed();
        self.stats.snapshots_read += 1;
        trace!(index, "handed snapshot back from memory");
        Ok(snapshot)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if let Some(mode) = self.mode.take() {
            debug!(%mode, held = self.slots.len(), "closed memory store");
        }
        Ok(())
    }

    fn descriptor(&self) -> &RunDescriptor {
        &self.descriptor
    }

    fn mode(&self) -> Option<Mode> {
        self.mode
    }

    fn stats(&self) -> IoStats {
        self.stats
    }
}
