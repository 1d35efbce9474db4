//! Cache-bypass file access.
//!
//! On Linux a cache-bypass file is opened with `O_DIRECT`: transfers skip the
//! page cache, so every buffer, length and file offset must be a multiple of
//! [`DIRECT_IO_ALIGN`]. The slot layout guarantees aligned offsets and
//! lengths, and [`AlignedBuf`] provides aligned memory.
//!
//! Filesystems that refuse `O_DIRECT` (tmpfs, some network mounts) answer the
//! open with `EINVAL`; the file is then reopened with ordinary buffered I/O.
//! Other platforms always use buffered I/O. Either way the bytes on disk are
//! identical.

use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, Write};
use std::path::Path;
use tracing::warn;

use crate::format::SlotHeader;

/// Alignment required for direct I/O buffers, offsets and lengths.
pub const DIRECT_IO_ALIGN: usize = 4096;

/// Backing medium of a slot file.
///
/// Implemented for [`File`] and for `Cursor<Vec<u8>>`; tests implement it for
/// wrappers that inject failures.
pub trait Medium: Read + Write + Seek {
    /// Makes written data durable.
    fn sync(&mut self) -> io::Result<()>;

    /// Extends the medium to at least `len` bytes (new bytes read as zero).
    fn preallocate(&mut self, len: u64) -> io::Result<()>;
}

impl Medium for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }

    fn preallocate(&mut self, len: u64) -> io::Result<()> {
        if self.metadata()?.len() < len {
            self.set_len(len)?;
        }
        Ok(())
    }
}

impl Medium for Cursor<Vec<u8>> {
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn preallocate(&mut self, len: u64) -> io::Result<()> {
        let v = self.get_mut();
        if (v.len() as u64) < len {
            v.resize(len as usize, 0);
        }
        Ok(())
    }
}

/// Heap buffer whose usable region starts on a [`DIRECT_IO_ALIGN`] boundary.
pub(crate) struct AlignedBuf {
    raw: Vec<u8>,
    offset: usize,
    len: usize,
}

impl AlignedBuf {
    pub(crate) fn new(len: usize) -> Self {
        let raw = vec![0u8; len + DIRECT_IO_ALIGN];
        let offset = match raw.as_ptr().align_offset(DIRECT_IO_ALIGN) {
            o if o < DIRECT_IO_ALIGN => o,
            // No aligned offset available; direct transfers will be refused
            // by the kernel and surface as I/O errors.
            _ => 0,
        };
        Self { raw, offset, len }
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.raw[self.offset..self.offset + self.len]
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.raw[self.offset..self.offset + self.len]
    }
}

/// How to open a slot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    /// Create or truncate for writing.
    Create,
    /// Open an existing file read-only.
    Read,
}

/// Opens `path`, requesting cache bypass when `bypass` is set.
///
/// Returns the file and whether direct I/O is actually in effect.
pub(crate) fn open_file(path: &Path, access: Access, bypass: bool) -> io::Result<(File, bool)> {
    if bypass {
        match open_direct(path, access) {
            Ok(Some(file)) => return Ok((file, true)),
            Ok(None) => {
                warn!(
                    path = %path.display(),
                    "direct I/O not supported on this platform, using buffered I/O"
                );
            }
            Err(e) if is_unsupported(&e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "filesystem refused direct I/O, using buffered I/O"
                );
            }
            Err(e) => return Err(e),
        }
    }
    Ok((options(access).open(path)?, false))
}

/// Direct transfers need every slot boundary aligned; refuse bypass otherwise.
pub(crate) fn slot_is_aligned(header: &SlotHeader, path: &Path) -> bool {
    if header.slot_size % DIRECT_IO_ALIGN as u64 == 0 {
        return true;
    }
    warn!(
        path = %path.display(),
        slot_size = header.slot_size,
        "slot size not aligned for direct I/O, using buffered I/O"
    );
    false
}

fn options(access: Access) -> OpenOptions {
    let mut opts = OpenOptions::new();
    match access {
        Access::Create => {
            opts.create(true).write(true).truncate(true);
        }
        Access::Read => {
            opts.read(true);
        }
    }
    opts
}

#[cfg(target_os = "linux")]
fn open_direct(path: &Path, access: Access) -> io::Result<Option<File>> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut opts = options(access);
    opts.custom_flags(libc::O_DIRECT);
    opts.open(path).map(Some)
}

#[cfg(not(target_os = "linux"))]
fn open_direct(_path: &Path, _access: Access) -> io::Result<Option<File>> {
    Ok(None)
}

#[cfg(target_os = "linux")]
fn is_unsupported(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EINVAL)
}

#[cfg(not(target_os = "linux"))]
fn is_unsupported(_e: &io::Error) -> bool {
    false
}
