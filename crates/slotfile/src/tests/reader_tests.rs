use crate::*;
use anyhow::Result;
use field::{DType, Shape};
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::tempdir;

/// Helper: write `nt` slots of 64-byte payloads filled with the slot index.
fn write_file(path: &Path, nt: u64, encoding: Encoding) -> Result<SlotHeader> {
    let shape = Shape::new(vec![4, 4])?;
    let header = SlotHeader::new(nt, shape, DType::F32, encoding, 64, false);
    let mut w = SlotWriter::create(path, header.clone(), false)?;
    for i in 0..nt {
        w.write_slot(i, &[i as u8; 64])?;
    }
    w.finish()?;
    Ok(header)
}

// -------------------- Basic reads --------------------

#[test]
fn reads_back_in_reverse_order() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("u.ckpt");
    write_file(&path, 10, Encoding::Raw)?;

    let mut r = SlotReader::open(&path, false)?;
    assert!(r.is_sealed());
    for i in (0..10u64).rev() {
        assert_eq!(r.read_slot(i)?, vec![i as u8; 64]);
    }
    Ok(())
}

#[test]
fn header_is_restored() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("u.ckpt");
    let mut written = write_file(&path, 3, Encoding::Compressed { rate: 12 })?;
    written.sealed = true;

    let r = SlotReader::open(&path, false)?;
    assert_eq!(r.header(), &written);
    assert_eq!(r.header().encoding.rate(), 12);
    Ok(())
}

#[test]
fn rejects_out_of_range_read() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("u.ckpt");
    write_file(&path, 2, Encoding::Raw)?;

    let mut r = SlotReader::open(&path, false)?;
    assert!(matches!(
        r.read_slot(2),
        Err(SlotFileError::OutOfRange { index: 2, nt: 2 })
    ));
    Ok(())
}

// -------------------- Damaged files --------------------

#[test]
fn missing_file_is_io_error() {
    let dir = tempdir().unwrap();
    let res = SlotReader::open(dir.path().join("nope.ckpt"), false);
    assert!(matches!(res, Err(SlotFileError::Io(_))));
}

#[test]
fn foreign_file_is_layout_error() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("junk.ckpt");
    std::fs::write(&path, vec![0x42u8; HEADER_BYTES as usize + 100])?;
    assert!(matches!(
        SlotReader::open(&path, false),
        Err(SlotFileError::Layout(_))
    ));
    Ok(())
}

#[test]
fn short_file_is_layout_error() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("short.ckpt");
    std::fs::write(&path, b"WFC1")?;
    assert!(matches!(
        SlotReader::open(&path, false),
        Err(SlotFileError::Layout(_))
    ));
    Ok(())
}

#[test]
fn truncated_tail_reads_as_missing() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("u.ckpt");
    let header = write_file(&path, 4, Encoding::Raw)?;

    // Chop off the last slot and a half.
    let f = OpenOptions::new().write(true).open(&path)?;
    f.set_len(header.slot_offset(2) + header.slot_size / 2)?;
    drop(f);

    let mut r = SlotReader::open(&path, false)?;
    assert_eq!(r.read_slot(1)?, vec![1u8; 64]);
    assert!(matches!(
        r.read_slot(2),
        Err(SlotFileError::MissingSlot { index: 2 })
    ));
    assert!(matches!(
        r.read_slot(3),
        Err(SlotFileError::MissingSlot { index: 3 })
    ));
    Ok(())
}

#[test]
fn flipped_payload_byte_is_corrupt() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("u.ckpt");
    let header = write_file(&path, 3, Encoding::Raw)?;

    let mut f = OpenOptions::new().write(true).open(&path)?;
    f.seek(SeekFrom::Start(
        header.slot_offset(1) + SLOT_FRAME_BYTES + 5,
    ))?;
    f.write_all(&[0xff])?;
    drop(f);

    let mut r = SlotReader::open(&path, false)?;
    assert_eq!(r.read_slot(0)?, vec![0u8; 64]);
    let err = r.read_slot(1).unwrap_err();
    assert!(matches!(err, SlotFileError::Corrupt { index: 1, .. }));
    assert!(err.to_string().contains("CRC32 mismatch"));
    Ok(())
}

#[test]
fn unsealed_file_reports_unsealed() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("u.ckpt");
    let shape = Shape::new(vec![16])?;
    let header = SlotHeader::new(2, shape, DType::F32, Encoding::Raw, 64, false);
    let mut w = SlotWriter::create(&path, header, false)?;
    w.write_slot(0, &[3u8; 64])?;
    drop(w);

    let mut r = SlotReader::open(&path, false)?;
    assert!(!r.is_sealed());
    assert_eq!(r.read_slot(0)?, vec![3u8; 64]);
    Ok(())
}
