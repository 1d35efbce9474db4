use config::{BackendKind, StoreConfig};
use field::{DType, Shape, Snapshot};
use slotfile::{Encoding, SlotHeader};

use crate::error::{Location, StoreError};

/// Immutable per-run metadata shared by the forward and adjoint passes.
///
/// Disk variants persist it in every slot file header and check it again
/// when the store is opened for reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDescriptor {
    /// Number of timesteps (slots) in the run.
    pub nt: u64,
    pub shape: Shape,
    pub dtype: DType,
    pub kind: BackendKind,
    /// Codec rate when payloads are compressed.
    pub rate: Option<u32>,
    /// Shard count; 1 for everything but the distributed backend.
    pub disks: usize,
}

impl RunDescriptor {
    /// Descriptor for an uncompressed single-disk run.
    pub fn new(nt: u64, shape: Shape, dtype: DType) -> Result<Self, StoreError> {
        let d = Self {
            nt,
            shape,
            dtype,
            kind: BackendKind::Disk,
            rate: None,
            disks: 1,
        };
        d.validate()?;
        Ok(d)
    }

    /// Descriptor for the backend `config` selects.
    pub fn for_config(
        nt: u64,
        shape: Shape,
        dtype: DType,
        config: &StoreConfig,
    ) -> Result<Self, StoreError> {
        config.validate()?;
        let compressed = match config.backend {
            BackendKind::CompressedDisk => true,
            BackendKind::DistributedDisk => config.compress_shards,
            BackendKind::Memory | BackendKind::Disk => false,
        };
        let disks = match config.backend {
            BackendKind::DistributedDisk => config.disks,
            _ => 1,
        };
        let d = Self {
            nt,
            shape,
            dtype,
            kind: config.backend,
            rate: compressed.then_some(config.rate),
            disks,
        };
        d.validate()?;
        Ok(d)
    }

    fn validate(&self) -> Result<(), StoreError> {
        if self.nt == 0 {
            return Err(StoreError::Config("a run needs at least one timestep".into()));
        }
        if self.disks == 0 {
            return Err(StoreError::Config("disk count must be at least 1".into()));
        }
        if let Some(rate) = self.rate {
            codec::check_rate(rate, self.dtype).map_err(|e| StoreError::Config(e.to_string()))?;
        }
        Ok(())
    }

    /// Payload encoding in slot files.
    #[must_use]
    pub fn encoding(&self) -> Encoding {
        match self.rate {
            Some(rate) => Encoding::Compressed { rate },
            None => Encoding::Raw,
        }
    }

    /// Bytes of one uncompressed snapshot.
    #[must_use]
    pub fn raw_len(&self) -> u64 {
        self.shape.elements() * self.dtype.size() as u64
    }

    /// Bytes stored per slot payload.
    #[must_use]
    pub fn payload_len(&self) -> u64 {
        match self.rate {
            Some(rate) => codec::encoded_len(self.shape.elements(), rate) as u64,
            None => self.raw_len(),
        }
    }

    /// Descriptor of one shard holding `slots` timesteps.
    pub(crate) fn shard(&self, slots: u64) -> Self {
        Self {
            nt: slots,
            kind: if self.rate.is_some() {
                BackendKind::CompressedDisk
            } else {
                BackendKind::Disk
            },
            disks: 1,
            ..self.clone()
        }
    }

    /// Slot file header for this run.
    #[must_use]
    pub fn slot_header(&self, aligned: bool) -> SlotHeader {
        SlotHeader::new(
            self.nt,
            self.shape.clone(),
            self.dtype,
            self.encoding(),
            self.payload_len(),
            aligned,
        )
    }

    /// Rejects a write of `snapshot` at `index` that does not fit the run.
    pub fn check_snapshot(&self, index: u64, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.check_index(index)?;
        let at = Location::index(index);
        if snapshot.shape() != &self.shape {
            return Err(StoreError::Layout {
                at,
                reason: format!("snapshot shape {} differs from run shape {}", snapshot.shape(), self.shape),
            });
        }
        if snapshot.dtype() != self.dtype {
            return Err(StoreError::Layout {
                at,
                reason: format!("snapshot dtype {} differs from run dtype {}", snapshot.dtype(), self.dtype),
            });
        }
        Ok(())
    }

    /// Rejects an index outside `[0, nt)`.
    pub fn check_index(&self, index: u64) -> Result<(), StoreError> {
        if index >= self.nt {
            return Err(StoreError::Layout {
                at: Location::index(index),
                reason: format!("index beyond nt = {}", self.nt),
            });
        }
        Ok(())
    }

    /// Compares a persisted header with this descriptor.
    ///
    /// The stored slot size may differ (aligned or not); everything that
    /// decides the meaning of a payload must match.
    pub fn check_header(&self, header: &SlotHeader) -> Result<(), StoreError> {
        let mismatch = |what: &str, stored: String, expected: String| StoreError::Layout {
            at: Location::store(),
            reason: format!("{} mismatch: file has {}, run expects {}", what, stored, expected),
        };
        if header.nt != self.nt {
            return Err(mismatch("nt", header.nt.to_string(), self.nt.to_string()));
        }
        if header.shape != self.shape {
            return Err(mismatch("shape", header.shape.to_string(), self.shape.to_string()));
        }
        if header.dtype != self.dtype {
            return Err(mismatch("dtype", header.dtype.to_string(), self.dtype.to_string()));
        }
        if header.encoding != self.encoding() {
            return Err(mismatch(
                "encoding",
                format!("{:?}", header.encoding),
                format!("{:?}", self.encoding()),
            ));
        }
        if header.payload_len != self.payload_len() {
            return Err(mismatch(
                "payload length",
                header.payload_len.to_string(),
                self.payload_len().to_string(),
            ));
        }
        Ok(())
    }
}
