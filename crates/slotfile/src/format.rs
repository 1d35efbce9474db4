//! Slot file header and slot frame encoding.
//!
//! ## Header (first `HEADER_BYTES` of the file, zero padded)
//!
//! ```text
//! [magic: u32 "WFC1"][version: u16][flags: u8][reserved: u8]
//! [nt: u64][ndims: u32][shape: u64 * ndims][dtype: u8]
//! [slot_size: u64][payload_len: u64][variant: u8][rate: u32]
//! [crc32: u32]   covers every byte from magic up to rate
//! ```
//!
//! ## Slot frame (start of every slot)
//!
//! ```text
//! [marker: u32 "SLOT"][crc32: u32][index: u64][payload ...][zero padding]
//! ```
//!
//! The frame CRC covers `index` and the payload. A slot whose marker reads
//! as zero was never written.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use field::{DType, Shape, MAX_DIMS};

use crate::direct::DIRECT_IO_ALIGN;
use crate::SlotFileError;

/// Magic number identifying a slot file (ASCII "WFC1").
pub const SLOTFILE_MAGIC: u32 = 0x5746_4331;

/// Current header version.
pub const SLOTFILE_VERSION: u16 = 1;

/// Size of the header region; slot 0 starts here.
///
/// A multiple of [`DIRECT_IO_ALIGN`] so slots stay aligned for direct I/O.
pub const HEADER_BYTES: u64 = 4096;

/// Marker opening every written slot (ASCII "SLOT").
pub const SLOT_MARKER: u32 = 0x534C_4F54;

/// Bytes of framing in front of each slot payload: marker + crc + index.
pub const SLOT_FRAME_BYTES: u64 = 4 + 4 + 8;

const FLAG_SEALED: u8 = 0b0000_0001;

/// How slot payloads are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Raw little-endian element bytes.
    Raw,
    /// Fixed-rate compressed payload at `rate` bits per element.
    Compressed { rate: u32 },
}

impl Encoding {
    fn variant_code(self) -> u8 {
        match self {
            Encoding::Raw => 0,
            Encoding::Compressed { .. } => 1,
        }
    }

    /// Bits per element, 0 for raw payloads.
    #[must_use]
    pub fn rate(self) -> u32 {
        match self {
            Encoding::Raw => 0,
            Encoding::Compressed { rate } => rate,
        }
    }
}

/// Persisted run descriptor of one slot file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotHeader {
    /// Number of slots in the file.
    pub nt: u64,
    pub shape: Shape,
    pub dtype: DType,
    pub encoding: Encoding,
    /// Meaningful bytes per slot, excluding framing.
    pub payload_len: u64,
    /// Bytes per slot including framing and padding.
    pub slot_size: u64,
    /// Set once the writer finished cleanly.
    pub sealed: bool,
}

impl SlotHeader {
    /// Builds an unsealed header. With `aligned` the slot size is rounded up
    /// to [`DIRECT_IO_ALIGN`] so every slot can be transferred with direct I/O.
    #[must_use]
    pub fn new(
        nt: u64,
        shape: Shape,
        dtype: DType,
        encoding: Encoding,
        payload_len: u64,
        aligned: bool,
    ) -> Self {
        Self {
            nt,
            shape,
            dtype,
            encoding,
            payload_len,
            slot_size: slot_size_for(payload_len, aligned),
            sealed: false,
        }
    }

    /// Byte offset of slot `index`.
    #[must_use]
    pub fn slot_offset(&self, index: u64) -> u64 {
        HEADER_BYTES + index * self.slot_size
    }

    /// Total file size once all `nt` slots are allocated.
    #[must_use]
    pub fn file_len(&self) -> u64 {
        HEADER_BYTES + self.nt * self.slot_size
    }

    /// Serializes the header into the front of `buf` (which must be
    /// `HEADER_BYTES` long); the remainder is zeroed.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<(), SlotFileError> {
        let mut body: Vec<u8> = Vec::with_capacity(64 + 8 * self.shape.ndims());
        body.write_u32::<LittleEndian>(SLOTFILE_MAGIC)?;
        body.write_u16::<LittleEndian>(SLOTFILE_VERSION)?;
        body.write_u8(if self.sealed { FLAG_SEALED } else { 0 })?;
        body.write_u8(0)?;
        body.write_u64::<LittleEndian>(self.nt)?;
        body.write_u32::<LittleEndian>(self.shape.ndims() as u32)?;
        for &d in self.shape.dims() {
            body.write_u64::<LittleEndian>(d)?;
        }
        body.write_u8(self.dtype.code())?;
        body.write_u64::<LittleEndian>(self.slot_size)?;
        body.write_u64::<LittleEndian>(self.payload_len)?;
        body.write_u8(self.encoding.variant_code())?;
        body.write_u32::<LittleEndian>(self.encoding.rate())?;

        let mut hasher = Crc32::new();
        hasher.update(&body);
        body.write_u32::<LittleEndian>(hasher.finalize())?;

        buf.fill(0);
        buf[..body.len()].copy_from_slice(&body);
        Ok(())
    }

    /// Parses and validates a header region.
    ///
    /// Any mismatch (magic, version, CRC, shape, dtype, variant, sizes) is a
    /// [`SlotFileError::Layout`].
    pub fn decode(buf: &[u8]) -> Result<Self, SlotFileError> {
        let mut r = buf;
        let magic = r.read_u32::<LittleEndian>()?;
        if magic != SLOTFILE_MAGIC {
            return Err(layout(format!("bad magic {:#010x}", magic)));
        }
        let version = r.read_u16::<LittleEndian>()?;
        if version != SLOTFILE_VERSION {
            return Err(layout(format!("unsupported version {}", version)));
        }
        let flags = r.read_u8()?;
        let _reserved = r.read_u8()?;
        let nt = r.read_u64::<LittleEndian>()?;
        let ndims = r.read_u32::<LittleEndian>()? as usize;
        if ndims == 0 || ndims > MAX_DIMS {
            return Err(layout(format!("invalid ndims {}", ndims)));
        }
        let mut dims = Vec::with_capacity(ndims);
        for _ in 0..ndims {
            dims.push(r.read_u64::<LittleEndian>()?);
        }
        let dtype_code = r.read_u8()?;
        let slot_size = r.read_u64::<LittleEndian>()?;
        let payload_len = r.read_u64::<LittleEndian>()?;
        let variant = r.read_u8()?;
        let rate = r.read_u32::<LittleEndian>()?;

        let body_len = buf.len() - r.len();
        let stored_crc = r.read_u32::<LittleEndian>()?;
        let mut hasher = Crc32::new();
        hasher.update(&buf[..body_len]);
        let actual_crc = hasher.finalize();
        if actual_crc != stored_crc {
            return Err(layout(format!(
                "header CRC mismatch: expected {:#010x}, got {:#010x}",
                stored_crc, actual_crc
            )));
        }

        let shape = Shape::new(dims).map_err(|e| layout(e.to_string()))?;
        let dtype = DType::from_code(dtype_code).map_err(|e| layout(e.to_string()))?;
        let encoding = match (variant, rate) {
            (0, 0) => Encoding::Raw,
            (1, r) if r > 0 => Encoding::Compressed { rate: r },
            (v, r) => return Err(layout(format!("invalid variant {} with rate {}", v, r))),
        };
        if slot_size < SLOT_FRAME_BYTES + payload_len {
            return Err(layout(format!(
                "slot size {} cannot hold a {}-byte payload",
                slot_size, payload_len
            )));
        }

        Ok(Self {
            nt,
            shape,
            dtype,
            encoding,
            payload_len,
            slot_size,
            sealed: flags & FLAG_SEALED != 0,
        })
    }
}

/// Slot size for a payload, optionally rounded up for direct I/O.
#[must_use]
pub fn slot_size_for(payload_len: u64, aligned: bool) -> u64 {
    let raw = SLOT_FRAME_BYTES + payload_len;
    if aligned {
        let a = DIRECT_IO_ALIGN as u64;
        raw.div_ceil(a) * a
    } else {
        raw
    }
}

/// Writes a slot frame (marker, CRC, index, payload) into the front of
/// `slot`, zeroing the padding after it.
pub(crate) fn encode_frame(slot: &mut [u8], index: u64, payload: &[u8]) {
    let mut hasher = Crc32::new();
    hasher.update(&index.to_le_bytes());
    hasher.update(payload);
    let crc = hasher.finalize();

    let frame = SLOT_FRAME_BYTES as usize;
    slot[0..4].copy_from_slice(&SLOT_MARKER.to_le_bytes());
    slot[4..8].copy_from_slice(&crc.to_le_bytes());
    slot[8..16].copy_from_slice(&index.to_le_bytes());
    slot[frame..frame + payload.len()].copy_from_slice(payload);
    slot[frame + payload.len()..].fill(0);
}

/// Validates a slot frame and returns its payload.
pub(crate) fn decode_frame(
    slot: &[u8],
    index: u64,
    payload_len: usize,
) -> Result<&[u8], SlotFileError> {
    let mut r = slot;
    let marker = r.read_u32::<LittleEndian>()?;
    if marker == 0 {
        return Err(SlotFileError::MissingSlot { index });
    }
    if marker != SLOT_MARKER {
        return Err(corrupt(index, format!("bad slot marker {:#010x}", marker)));
    }
    let stored_crc = r.read_u32::<LittleEndian>()?;
    let stored_index = r.read_u64::<LittleEndian>()?;
    if stored_index != index {
        return Err(corrupt(
            index,
            format!("slot holds index {} instead", stored_index),
        ));
    }

    let frame = SLOT_FRAME_BYTES as usize;
    let payload = &slot[frame..frame + payload_len];
    let mut hasher = Crc32::new();
    hasher.update(&stored_index.to_le_bytes());
    hasher.update(payload);
    let actual_crc = hasher.finalize();
    if actual_crc != stored_crc {
        return Err(corrupt(
            index,
            format!(
                "CRC32 mismatch: expected {:#010x}, got {:#010x}",
                stored_crc, actual_crc
            ),
        ));
    }
    Ok(payload)
}

fn layout(msg: String) -> SlotFileError {
    SlotFileError::Layout(msg)
}

fn corrupt(index: u64, reason: String) -> SlotFileError {
    SlotFileError::Corrupt { index, reason }
}
