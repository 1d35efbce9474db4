use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, trace, warn};

use crate::direct::{open_file, slot_is_aligned, Access, AlignedBuf, Medium};
use crate::format::{decode_frame, SlotHeader, HEADER_BYTES};
use crate::SlotFileError;

/// Random-access reader over a slot file.
///
/// [`open`](SlotReader::open) parses and validates the header. Each
/// [`read_slot`](SlotReader::read_slot) is a single seek plus one whole-slot
/// read; the frame marker, index and CRC are verified before the payload is
/// returned.
///
/// Unsealed files (the writer never reached `finish`) are readable so that
/// the slots of an aborted run can be inspected.
pub struct SlotReader<M: Medium = File> {
    medium: M,
    header: SlotHeader,
    /// Medium length at open; slots past it read as missing.
    len: u64,
    slot_buf: AlignedBuf,
    direct: bool,
}

impl SlotReader<File> {
    /// Opens an existing slot file, bypassing the page cache if requested.
    pub fn open<P: AsRef<Path>>(path: P, bypass: bool) -> Result<Self, SlotFileError> {
        let path = path.as_ref();
        let (file, direct) = open_file(path, Access::Read, bypass)?;
        let mut r = Self::init(file, direct)?;

        // The header only tells us the slot size after the first read.
        if r.direct && !slot_is_aligned(&r.header, path) {
            let (file, _) = open_file(path, Access::Read, false)?;
            r.medium = file;
            r.direct = false;
        }
        if !r.header.sealed {
            warn!(path = %path.display(), "slot file was not sealed; run may be incomplete");
        }
        debug!(
            path = %path.display(),
            nt = r.header.nt,
            slot_size = r.header.slot_size,
            direct = r.direct,
            "opened slot file"
        );
        Ok(r)
    }
}

impl<M: Medium> SlotReader<M> {
    /// Reads a slot file from an arbitrary medium.
    pub fn from_medium(medium: M) -> Result<Self, SlotFileError> {
        Self::init(medium, false)
    }

    fn init(mut medium: M, direct: bool) -> Result<Self, SlotFileError> {
        let len = medium.seek(SeekFrom::End(0))?;
        if len < HEADER_BYTES {
            return Err(SlotFileError::Layout(format!(
                "file too small for header: {} bytes",
                len
            )));
        }

        let mut buf = AlignedBuf::new(HEADER_BYTES as usize);
        medium.seek(SeekFrom::Start(0))?;
        medium.read_exact(buf.as_mut_slice())?;
        let header = SlotHeader::decode(buf.as_slice())?;

        Ok(Self {
            slot_buf: AlignedBuf::new(header.slot_size as usize),
            medium,
            header,
            len,
            direct,
        })
    }

    /// Returns the payload stored in slot `index`.
    ///
    /// # Errors
    ///
    /// [`SlotFileError::OutOfRange`] for `index >= nt`,
    /// [`SlotFileError::MissingSlot`] if the slot was never written,
    /// [`SlotFileError::Corrupt`] if its frame fails validation,
    /// [`SlotFileError::Io`] on medium failure.
    pub fn read_slot(&mut self, index: u64) -> Result<Vec<u8>, SlotFileError> {
        if index >= self.header.nt {
            return Err(SlotFileError::OutOfRange {
                index,
                nt: self.header.nt,
            });
        }
        let offset = self.header.slot_offset(index);
        if offset + self.header.slot_size > self.len {
            return Err(SlotFileError::MissingSlot { index });
        }

        self.medium.seek(SeekFrom::Start(offset))?;
        self.medium.read_exact(self.slot_buf.as_mut_slice())?;
        let payload = decode_frame(
            self.slot_buf.as_slice(),
            index,
            self.header.payload_len as usize,
        )?;
        trace!(index, offset, "read slot");
        Ok(payload.to_vec())
    }

    /// The validated header.
    #[must_use]
    pub fn header(&self) -> &SlotHeader {
        &self.header
    }

    /// Whether the writer sealed the file.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.header.sealed
    }

    /// Whether transfers bypass the page cache.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.direct
    }
}
