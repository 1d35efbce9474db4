use config::StoreConfig;
use field::Snapshot;
use std::time::Instant;
use tracing::debug;

use crate::backend::{require_closed, require_mode, Backend, IoStats, Mode};
use crate::compressed::CompressedDiskBackend;
use crate::descriptor::RunDescriptor;
use crate::disk::DiskBackend;
use crate::error::StoreError;
use crate::placement::{Placement, RoundRobin};

/// Spreads timesteps over `N` independent shard backends.
///
/// Every shard stores the whole field for a subset of timesteps, so I/O
/// bandwidth scales with the number of physical disks. Which shard holds an
/// index is recomputed from the [`Placement`] on every call; nothing about
/// the mapping is persisted.
pub struct DistributedBackend<P: Placement = RoundRobin> {
    descriptor: RunDescriptor,
    placement: P,
    shards: Vec<Box<dyn Backend>>,
    mode: Option<Mode>,
}

impl DistributedBackend<RoundRobin> {
    /// Round-robin over `descriptor.disks` shards.
    ///
    /// Shard `i` lives in `config.disk_dir(i)` and holds raw or compressed
    /// payloads depending on `descriptor.rate`.
    pub fn new(descriptor: RunDescriptor, config: &StoreConfig) -> Result<Self, StoreError> {
        let placement = RoundRobin::new(descriptor.disks)?;
        let mut shards: Vec<Box<dyn Backend>> = Vec::with_capacity(descriptor.disks);
        for disk in 0..descriptor.disks {
            let shard = descriptor.shard(placement.slots_on(disk, descriptor.nt));
            let path = config.disk_dir(disk).join(config.file_name());
            if shard.rate.is_some() {
                shards.push(Box::new(CompressedDiskBackend::new(shard, path, config.cache_bypass)?));
            } else {
                shards.push(Box::new(DiskBackend::new(shard, path, config.cache_bypass)));
            }
        }
        Self::with_shards(descriptor, placement, shards)
    }
}

impl<P: Placement> DistributedBackend<P> {
    /// Assembles a store from prepared shard backends.
    ///
    /// Shard `i` must be sized for `placement.slots_on(i, nt)` timesteps.
    pub fn with_shards(
        descriptor: RunDescriptor,
        placement: P,
        shards: Vec<Box<dyn Backend>>,
    ) -> Result<Self, StoreError> {
        if shards.len() != placement.disks() {
            return Err(StoreError::Config(format!(
                "{} shards for a placement over {} disks",
                shards.len(),
                placement.disks()
            )));
        }
        for (disk, shard) in shards.iter().enumerate() {
            let want = placement.slots_on(disk, descriptor.nt);
            if shard.descriptor().nt != want {
                return Err(StoreError::Config(format!(
                    "shard {} sized for {} slots, placement puts {} there",
                    disk,
                    shard.descriptor().nt,
                    want
                )));
            }
        }
        Ok(Self {
            descriptor,
            placement,
            shards,
            mode: None,
        })
    }

    /// The placement policy in use.
    pub fn placement(&self) -> &P {
        &self.placement
    }

    /// Stats of each shard, by disk number.
    #[must_use]
    pub fn shard_stats(&self) -> Vec<IoStats> {
        self.shards.iter().map(|s| s.stats()).collect()
    }

    /// Closes every shard, reporting the first failure.
    fn close_shards(&mut self) -> Result<(), StoreError> {
        let mut first = None;
        for (disk, shard) in self.shards.iter_mut().enumerate() {
            if let Err(e) = shard.close() {
                first.get_or_insert(e.on_disk(disk));
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl<P: Placement> Backend for DistributedBackend<P> {
    fn open(&mut self, mode: Mode) -> Result<(), StoreError> {
        require_closed(self.mode)?;
        let start = Instant::now();
        for disk in 0..self.shards.len() {
            // Shards opened before a failure stay open and unsealed; the
            // store is unusable either way.
            self.shards[disk].open(mode).map_err(|e| e.on_disk(disk))?;
        }
        self.mode = Some(mode);
        debug!(
            %mode,
            disks = self.shards.len(),
            nt = self.descriptor.nt,
            elapsed_us = start.elapsed().as_micros() as u64,
            "opened distributed store"
        );
        Ok(())
    }

    fn write_snapshot(&mut self, index: u64, snapshot: &Snapshot) -> Result<(), StoreError> {
        require_mode("write_snapshot", self.mode, Mode::Write)?;
        self.descriptor.check_snapshot(index, snapshot)?;
        let disk = self.placement.disk_for(index);
        let local = self.placement.local_index(index);
        self.shards[disk]
            .write_snapshot(local, snapshot)
            .map_err(|e| e.locate(index, disk))
    }

    fn read_snapshot(&mut self, index: u64) -> Result<Snapshot, StoreError> {
        require_mode("read_snapshot", self.mode, Mode::Read)?;
        self.descriptor.check_index(index)?;
        let disk = self.placement.disk_for(index);
        let local = self.placement.local_index(index);
        self.shards[disk]
            .read_snapshot(local)
            .map_err(|e| e.locate(index, disk))
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if self.mode.take().is_none() {
            return Ok(());
        }
        self.close_shards()?;
        debug!(disks = self.shards.len(), "closed distributed store");
        Ok(())
    }

    fn descriptor(&self) -> &RunDescriptor {
        &self.descriptor
    }

    fn mode(&self) -> Option<Mode> {
        self.mode
    }

    fn stats(&self) -> IoStats {
        let mut total = IoStats::default();
        for s in &self.shards {
            total += s.stats();
        }
        total
    }
}
