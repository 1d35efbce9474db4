use field::Snapshot;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::trace;

use crate::backend::{require_mode, Backend, IoStats, Mode};
use crate::descriptor::RunDescriptor;
use crate::disk::DiskBackend;
use crate::error::{Location, StoreError};

/// A [`DiskBackend`] whose slots hold fixed-rate compressed payloads.
///
/// Slots are sized for `codec::encoded_len(elements, rate)` bytes, which
/// does not depend on the field values, so the slot layout stays fixed.
/// Reconstruction error is bounded by [`codec::error_bound`].
pub struct CompressedDiskBackend {
    inner: DiskBackend,
    rate: u32,
    codec: std::time::Duration,
}

impl CompressedDiskBackend {
    /// Fails with [`StoreError::Config`] if the descriptor carries no rate.
    pub fn new(
        descriptor: RunDescriptor,
        path: impl Into<PathBuf>,
        bypass: bool,
    ) -> Result<Self, StoreError> {
        let rate = descriptor
            .rate
            .ok_or_else(|| StoreError::Config("compressed store needs a codec rate".into()))?;
        Ok(Self {
            inner: DiskBackend::new(descriptor, path, bypass),
            rate,
            codec: std::time::Duration::ZERO,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    #[must_use]
    pub fn rate(&self) -> u32 {
        self.rate
    }
}

impl Backend for CompressedDiskBackend {
    fn open(&mut self, mode: Mode) -> Result<(), StoreError> {
        self.inner.open(mode)
    }

    fn write_snapshot(&mut self, index: u64, snapshot: &Snapshot) -> Result<(), StoreError> {
        require_mode("write_snapshot", self.inner.mode(), Mode::Write)?;
        self.inner.descriptor().check_snapshot(index, snapshot)?;

        let start = Instant::now();
        let payload = codec::encode(snapshot, self.rate).map_err(|source| StoreError::Compression {
            at: Location::index(index),
            source,
        })?;
        self.codec += start.elapsed();

        self.inner.write_payload(index, &payload)?;
        trace!(index, bytes = payload.len(), "wrote compressed snapshot");
        Ok(())
    }

    fn read_snapshot(&mut self, index: u64) -> Result<Snapshot, StoreError> {
        let payload = self.inner.read_payload(index)?;

        let start = Instant::now();
        let d = self.inner.descriptor();
        let snapshot = codec::decode(&payload, &d.shape, d.dtype, self.rate).map_err(|source| {
            StoreError::Compression {
                at: Location::index(index),
                source,
            }
        })?;
        self.codec += start.elapsed();
        trace!(index, "read compressed snapshot");
        Ok(snapshot)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.inner.close()
    }

    fn descriptor(&self) -> &RunDescriptor {
        self.inner.descriptor()
    }

    fn mode(&self) -> Option<Mode> {
        self.inner.mode()
    }

    fn stats(&self) -> IoStats {
        IoStats {
            codec: self.codec,
            ..self.inner.stats()
        }
    }
}
