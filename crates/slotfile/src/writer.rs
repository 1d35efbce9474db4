use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::direct::{open_file, slot_is_aligned, Access, AlignedBuf, Medium};
use crate::format::{encode_frame, SlotHeader, HEADER_BYTES};
use crate::SlotFileError;

/// Writes fixed-size slots into a slot file.
///
/// [`create`](SlotWriter::create) writes an unsealed header and preallocates
/// the file to its final size, so unwritten slots read back as zero. Each
/// [`write_slot`](SlotWriter::write_slot) seeks directly to
/// `HEADER_BYTES + index * slot_size` and transfers one whole slot.
/// [`finish`](SlotWriter::finish) seals the header and syncs.
///
/// The writer does not track which slots were written; duplicate detection
/// belongs to the caller.
pub struct SlotWriter<M: Medium = File> {
    medium: M,
    header: SlotHeader,
    /// Reusable aligned scratch buffer, one slot long.
    slot_buf: AlignedBuf,
    direct: bool,
    path: Option<PathBuf>,
}

impl SlotWriter<File> {
    /// Creates (or truncates) the slot file at `path`.
    ///
    /// With `bypass` the file is opened for direct I/O when the platform and
    /// filesystem allow it; `header.slot_size` must then be aligned, which
    /// [`SlotHeader::new`] with `aligned = true` guarantees.
    pub fn create<P: AsRef<Path>>(
        path: P,
        header: SlotHeader,
        bypass: bool,
    ) -> Result<Self, SlotFileError> {
        let path = path.as_ref();
        let bypass = bypass && slot_is_aligned(&header, path);
        let (file, direct) = open_file(path, Access::Create, bypass)?;
        debug!(
            path = %path.display(),
            nt = header.nt,
            slot_size = header.slot_size,
            direct,
            "creating slot file"
        );
        let mut w = Self::init(file, header, direct)?;
        w.path = Some(path.to_path_buf());
        Ok(w)
    }
}

impl<M: Medium> SlotWriter<M> {
    /// Starts a slot file on an arbitrary medium (buffered semantics).
    pub fn from_medium(medium: M, header: SlotHeader) -> Result<Self, SlotFileError> {
        Self::init(medium, header, false)
    }

    fn init(medium: M, mut header: SlotHeader, direct: bool) -> Result<Self, SlotFileError> {
        header.sealed = false;
        let slot_buf = AlignedBuf::new(header.slot_size as usize);
        let mut w = Self {
            medium,
            header,
            slot_buf,
            direct,
            path: None,
        };
        w.write_header()?;
        let len = w.header.file_len();
        w.medium.preallocate(len)?;
        Ok(w)
    }

    /// Writes `payload` into slot `index`.
    ///
    /// # Errors
    ///
    /// [`SlotFileError::OutOfRange`] for `index >= nt`,
    /// [`SlotFileError::PayloadLength`] for a payload of the wrong size,
    /// [`SlotFileError::Io`] when the medium rejects the write. A failed
    /// write never touches other slots.
    pub fn write_slot(&mut self, index: u64, payload: &[u8]) -> Result<(), SlotFileError> {
        if index >= self.header.nt {
            return Err(SlotFileError::OutOfRange {
                index,
                nt: self.header.nt,
            });
        }
        if payload.len() as u64 != self.header.payload_len {
            return Err(SlotFileError::PayloadLength {
                expected: self.header.payload_len,
                actual: payload.len() as u64,
            });
        }

        encode_frame(self.slot_buf.as_mut_slice(), index, payload);
        let offset = self.header.slot_offset(index);
        self.medium.seek(SeekFrom::Start(offset))?;
        self.medium.write_all(self.slot_buf.as_slice())?;
        trace!(index, offset, "wrote slot");
        Ok(())
    }

    /// Seals the header and syncs the medium, returning it.
    pub fn finish(mut self) -> Result<M, SlotFileError> {
        self.header.sealed = true;
        self.write_header()?;
        self.medium.flush()?;
        self.medium.sync()?;
        if let Some(ref p) = self.path {
            debug!(path = %p.display(), "sealed slot file");
        }
        Ok(self.medium)
    }

    /// Abandons the writer without sealing, returning the medium.
    ///
    /// The header stays unsealed, exactly as after a crash.
    #[must_use]
    pub fn into_inner(self) -> M {
        self.medium
    }

    /// The header this writer was created with.
    #[must_use]
    pub fn header(&self) -> &SlotHeader {
        &self.header
    }

    /// Whether transfers bypass the page cache.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.direct
    }

    fn write_header(&mut self) -> Result<(), SlotFileError> {
        let mut buf = AlignedBuf::new(HEADER_BYTES as usize);
        self.header.encode_into(buf.as_mut_slice())?;
        self.medium.seek(SeekFrom::Start(0))?;
        self.medium.write_all(buf.as_slice())?;
        Ok(())
    }
}
