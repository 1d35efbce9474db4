use crate::error::StoreError;

/// Maps a global timestep index to a shard and a slot within it.
///
/// Implementations must be pure: a read pass locates data written by an
/// earlier process with nothing but the index and the shard count.
pub trait Placement: Send {
    /// Number of shards.
    fn disks(&self) -> usize;

    /// Shard holding `index`.
    fn disk_for(&self, index: u64) -> usize;

    /// Slot of `index` within its shard.
    fn local_index(&self, index: u64) -> u64;

    /// Number of the `nt` timesteps that land on `disk`.
    fn slots_on(&self, disk: usize, nt: u64) -> u64;
}

/// `disk = index mod N`, `local = index div N`.
///
/// Per-shard slot counts differ by at most one for any `nt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundRobin {
    disks: usize,
}

impl RoundRobin {
    pub fn new(disks: usize) -> Result<Self, StoreError> {
        if disks == 0 {
            return Err(StoreError::Config("placement needs at least one disk".into()));
        }
        Ok(Self { disks })
    }
}

impl Placement for RoundRobin {
    fn disks(&self) -> usize {
        self.disks
    }

    fn disk_for(&self, index: u64) -> usize {
        (index % self.disks as u64) as usize
    }

    fn local_index(&self, index: u64) -> u64 {
        index / self.disks as u64
    }

    fn slots_on(&self, disk: usize, nt: u64) -> u64 {
        let disk = disk as u64;
        if disk >= nt {
            return 0;
        }
        (nt - disk).div_ceil(self.disks as u64)
    }
}
