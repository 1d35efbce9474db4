//! # Slotfile - fixed-slot snapshot files
//!
//! On-disk layout for checkpointed wavefields. A slot file is a header
//! holding the run descriptor followed by `nt` fixed-size slots, one per
//! timestep. Slot `i` lives at a computed offset, so both the increasing
//! write sweep and the decreasing read sweep are one seek per snapshot and
//! no separate index is ever persisted.
//!
//! ## File layout
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │ HEADER (HEADER_BYTES = 4096, zero padded)                      │
//! │                                                                │
//! │ magic "WFC1" | version | flags (sealed) | reserved             │
//! │ nt | ndims | shape[ndims] | dtype | slot_size | payload_len    │
//! │ variant (0 raw, 1 compressed) | rate | crc32                   │
//! ├────────────────────────────────────────────────────────────────┤
//! │ SLOT 0  at HEADER_BYTES                                        │
//! │                                                                │
//! │ marker "SLOT" | crc32 | index | payload | zero padding         │
//! ├────────────────────────────────────────────────────────────────┤
//! │ SLOT 1  at HEADER_BYTES + slot_size                            │
//! ├────────────────────────────────────────────────────────────────┤
//! │ ...                                                            │
//! ├────────────────────────────────────────────────────────────────┤
//! │ SLOT nt-1 at HEADER_BYTES + (nt-1) * slot_size                 │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. The file is preallocated to its final
//! size when created, so a slot that was never written reads back as zeros
//! and is reported as [`SlotFileError::MissingSlot`].
//!
//! ## Cache bypass
//!
//! Writers and readers accept a `bypass` flag that opens the file with
//! `O_DIRECT` on Linux. Slot sizes are then rounded up to
//! [`DIRECT_IO_ALIGN`]. When the platform or filesystem refuses direct I/O
//! the file falls back to buffered I/O, logged at `warn`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use field::{DType, Shape};
//! use slotfile::{Encoding, SlotHeader, SlotReader, SlotWriter};
//!
//! let shape = Shape::new(vec![4]).unwrap();
//! let header = SlotHeader::new(2, shape, DType::F32, Encoding::Raw, 16, false);
//!
//! let mut w = SlotWriter::create("u.ckpt", header, false).unwrap();
//! w.write_slot(0, &[0u8; 16]).unwrap();
//! w.write_slot(1, &[1u8; 16]).unwrap();
//! w.finish().unwrap();
//!
//! let mut r = SlotReader::open("u.ckpt", false).unwrap();
//! assert_eq!(r.read_slot(1).unwrap(), vec![1u8; 16]);
//! ```

mod direct;
mod format;
mod reader;
mod writer;

use std::io;
use thiserror::Error;

pub use direct::{Medium, DIRECT_IO_ALIGN};
pub use format::{
    slot_size_for, Encoding, SlotHeader, HEADER_BYTES, SLOTFILE_MAGIC, SLOTFILE_VERSION,
    SLOT_FRAME_BYTES, SLOT_MARKER,
};
pub use reader::SlotReader;
pub use writer::SlotWriter;

/// Errors that can occur while writing or reading a slot file.
#[derive(Debug, Error)]
pub enum SlotFileError {
    /// An underlying I/O error (disk full, permission, device gone).
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The header is not a valid slot file header.
    #[error("invalid layout: {0}")]
    Layout(String),

    /// A slot index at or beyond `nt`.
    #[error("slot {index} out of range (nt = {nt})")]
    OutOfRange { index: u64, nt: u64 },

    /// A payload that does not match the header's `payload_len`.
    #[error("payload length mismatch: expected {expected} bytes, got {actual}")]
    PayloadLength { expected: u64, actual: u64 },

    /// The slot was never written.
    #[error("slot {index} was never written")]
    MissingSlot { index: u64 },

    /// The slot frame failed marker, index or CRC validation.
    #[error("slot {index} is corrupt: {reason}")]
    Corrupt { index: u64, reason: String },
}

#[cfg(test)]
mod tests;
