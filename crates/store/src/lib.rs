//! # Store - wavefield checkpoint store
//!
//! Holds one field snapshot per timestep between the forward pass of a
//! time-stepping solver and its adjoint pass, which revisits the snapshots in
//! strict reverse order.
//!
//! ## Architecture
//!
//! ```text
//! solver forward loop             solver adjoint loop
//!   |  write(0), write(1), ...      |  read(nt-1), read(nt-2), ...
//!   v                               v
//! ┌───────────────────────────────────────────────────────┐
//! │                 CHECKPOINT SESSION                    │
//! │  state machine + strict index order (session.rs)      │
//! └──────────────────────────┬────────────────────────────┘
//!                            | Box<dyn Backend>
//!        ┌──────────────┬────┴─────────┬─────────────────────┐
//!        v              v              v                     v
//!    MemoryBackend  DiskBackend  CompressedDiskBackend  DistributedBackend
//!    BTreeMap       slot file    codec + DiskBackend    Placement -> N shards
//!                                                       (Disk or Compressed)
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module          | Purpose                                                 |
//! |-----------------|---------------------------------------------------------|
//! | [`backend`]     | `Backend` trait, `Mode`, `IoStats`                      |
//! | [`descriptor`]  | `RunDescriptor`: run metadata, header validation        |
//! | [`memory`]      | In-memory variant                                       |
//! | [`disk`]        | One slot file per run                                   |
//! | [`compressed`]  | Fixed-rate codec over a disk store                      |
//! | [`placement`]   | `Placement` trait, `RoundRobin`                          |
//! | [`distributed`] | Round-robin over N shard stores                         |
//! | [`session`]     | `CheckpointSession` state machine                       |
//!
//! ## Failure model
//!
//! Every error is fatal to its session. A disk store that failed mid-run
//! keeps the slots written before the failure, readable through a fresh
//! backend opened in [`Mode::Read`] for diagnosis, but its header is never
//! sealed and the session cannot resume.

mod backend;
mod compressed;
mod descriptor;
mod disk;
mod distributed;
mod error;
mod memory;
mod placement;
mod session;

pub use backend::{Backend, IoStats, Mode};
pub use compressed::CompressedDiskBackend;
pub use config::{BackendKind, StoreConfig};
pub use descriptor::RunDescriptor;
pub use disk::DiskBackend;
pub use distributed::DistributedBackend;
pub use error::{Location, StoreError};
pub use memory::MemoryBackend;
pub use placement::{Placement, RoundRobin};
pub use session::{CheckpointSession, SessionState};

/// Constructs the backend variant named by `descriptor.kind`.
///
/// Single-file stores live at `<root>/<stem>.ckpt`; distributed shards at
/// `<disk_dir(i)>/<stem>.ckpt`.
pub fn build_backend(
    config: &StoreConfig,
    descriptor: RunDescriptor,
) -> Result<Box<dyn Backend>, StoreError> {
    config.validate()?;
    let path = config.root.join(config.file_name());
    let backend: Box<dyn Backend> = match descriptor.kind {
        BackendKind::Memory => Box::new(MemoryBackend::new(descriptor)),
        BackendKind::Disk => Box::new(DiskBackend::new(descriptor, path, config.cache_bypass)),
        BackendKind::CompressedDisk => Box::new(CompressedDiskBackend::new(
            descriptor,
            path,
            config.cache_bypass,
        )?),
        BackendKind::DistributedDisk => Box::new(DistributedBackend::new(descriptor, config)?),
    };
    Ok(backend)
}

#[cfg(test)]
mod tests;
