use super::helpers::*;
use crate::*;
use anyhow::Result;
use field::{DType, Shape};
use slotfile::{DIRECT_IO_ALIGN, HEADER_BYTES, SLOT_FRAME_BYTES};
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use tempfile::tempdir;

// -------------------- Round trip --------------------

#[test]
fn round_trip_in_reverse_order() -> Result<()> {
    let dir = tempdir()?;
    let shape = small_shape();
    let path = dir.path().join("wavefield.ckpt");

    let mut b = DiskBackend::new(raw_descriptor(9, shape.clone()), &path, false);
    fill(&mut b, &shape)?;

    // A fresh backend, as the adjoint process would build it.
    let mut r = DiskBackend::new(raw_descriptor(9, shape.clone()), &path, false);
    r.open(Mode::Read)?;
    for i in (0..9).rev() {
        assert_eq!(r.read_snapshot(i)?.as_bytes(), snapshot(&shape, i).as_bytes());
    }
    r.close()?;
    Ok(())
}

#[test]
fn creates_missing_directories() -> Result<()> {
    let dir = tempdir()?;
    let shape = small_shape();
    let path = dir.path().join("a/b/c/wavefield.ckpt");
    let mut b = DiskBackend::new(raw_descriptor(1, shape.clone()), &path, false);
    fill(&mut b, &shape)?;
    assert!(path.exists());
    Ok(())
}

// -------------------- Layout sizing --------------------

#[test]
fn file_size_is_header_plus_three_slots() -> Result<()> {
    let dir = tempdir()?;
    let shape = shape_252();
    let path = dir.path().join("wavefield.ckpt");
    let mut b = DiskBackend::new(raw_descriptor(3, shape.clone()), &path, false);
    fill(&mut b, &shape)?;

    assert_eq!(SLOT_FRAME_BYTES + 252 * 4, 1024);
    assert_eq!(fs::metadata(&path)?.len(), HEADER_BYTES + 3 * 1024);
    Ok(())
}

#[test]
fn bypass_rounds_slots_to_alignment() -> Result<()> {
    let dir = tempdir()?;
    let shape = shape_252();
    let path = dir.path().join("direct.ckpt");
    let mut b = DiskBackend::new(raw_descriptor(3, shape.clone()), &path, true);
    fill(&mut b, &shape)?;
    assert_eq!(
        fs::metadata(&path)?.len(),
        HEADER_BYTES + 3 * DIRECT_IO_ALIGN as u64
    );

    // Written with bypass, read back buffered.
    let mut r = DiskBackend::new(raw_descriptor(3, shape.clone()), &path, false);
    r.open(Mode::Read)?;
    assert_eq!(r.read_snapshot(2)?, snapshot(&shape, 2));
    Ok(())
}

// -------------------- Ordering and duplicates --------------------

#[test]
fn duplicate_write_is_concurrency_error() -> Result<()> {
    let dir = tempdir()?;
    let shape = small_shape();
    let mut b = DiskBackend::new(raw_descriptor(3, shape.clone()), dir.path().join("u.ckpt"), false);
    b.open(Mode::Write)?;
    b.write_snapshot(1, &snapshot(&shape, 1))?;
    let err = b.write_snapshot(1, &snapshot(&shape, 1)).unwrap_err();
    assert!(matches!(err, StoreError::Concurrency { at } if at.index == Some(1)));
    Ok(())
}

#[test]
fn reopening_for_write_starts_over() -> Result<()> {
    let dir = tempdir()?;
    let shape = small_shape();
    let path = dir.path().join("u.ckpt");
    let mut b = DiskBackend::new(raw_descriptor(2, shape.clone()), &path, false);
    fill(&mut b, &shape)?;
    b.open(Mode::Write)?;
    b.write_snapshot(0, &snapshot(&shape, 0))?;
    b.close()?;

    b.open(Mode::Read)?;
    assert!(matches!(
        b.read_snapshot(1),
        Err(StoreError::MissingSnapshot { .. })
    ));
    Ok(())
}

// -------------------- Read-time validation --------------------

#[test]
fn descriptor_mismatch_is_layout_error() -> Result<()> {
    let dir = tempdir()?;
    let shape = small_shape();
    let path = dir.path().join("u.ckpt");
    let mut b = DiskBackend::new(raw_descriptor(4, shape.clone()), &path, false);
    fill(&mut b, &shape)?;

    let wrong = [
        raw_descriptor(5, shape.clone()),
        raw_descriptor(4, Shape::new(vec![5, 3, 4])?),
        RunDescriptor::new(4, Shape::new(vec![4, 3, 5])?, DType::F64)?,
    ];
    for d in wrong {
        let mut r = DiskBackend::new(d, &path, false);
        let err = r.open(Mode::Read).unwrap_err();
        assert!(matches!(err, StoreError::Layout { .. }), "got {}", err);
        assert_eq!(r.mode(), None);
    }
    Ok(())
}

#[test]
fn compressed_file_is_not_a_raw_store() -> Result<()> {
    let dir = tempdir()?;
    let shape = small_shape();
    let path = dir.path().join("u.ckpt");
    let cfg = StoreConfig {
        rate: 8,
        ..config(BackendKind::CompressedDisk, dir.path())
    };
    let desc = RunDescriptor::for_config(2, shape.clone(), DType::F32, &cfg)?;
    let mut c = CompressedDiskBackend::new(desc, &path, false)?;
    fill(&mut c, &shape)?;

    let mut r = DiskBackend::new(raw_descriptor(2, shape), &path, false);
    let err = r.open(Mode::Read).unwrap_err();
    assert!(err.to_string().contains("encoding"), "got {}", err);
    Ok(())
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempdir().unwrap();
    let mut r = DiskBackend::new(raw_descriptor(2, small_shape()), dir.path().join("none.ckpt"), false);
    assert!(matches!(r.open(Mode::Read), Err(StoreError::Io { .. })));
}

#[test]
fn flipped_byte_is_corrupt() -> Result<()> {
    let dir = tempdir()?;
    let shape = shape_252();
    let path = dir.path().join("u.ckpt");
    let mut b = DiskBackend::new(raw_descriptor(3, shape.clone()), &path, false);
    fill(&mut b, &shape)?;

    let mut f = OpenOptions::new().write(true).open(&path)?;
    f.seek(SeekFrom::Start(HEADER_BYTES + 1024 + SLOT_FRAME_BYTES + 100))?;
    f.write_all(&[0x5a, 0xa5])?;
    drop(f);

    let mut r = DiskBackend::new(raw_descriptor(3, shape.clone()), &path, false);
    r.open(Mode::Read)?;
    assert_eq!(r.read_snapshot(2)?, snapshot(&shape, 2));
    assert!(matches!(
        r.read_snapshot(1),
        Err(StoreError::Corrupt { at, .. }) if at.index == Some(1)
    ));
    Ok(())
}

// -------------------- Aborted runs --------------------

#[test]
fn aborted_run_is_missing_later_slots() -> Result<()> {
    let dir = tempdir()?;
    let shape = small_shape();
    let path = dir.path().join("u.ckpt");
    {
        let mut b = DiskBackend::new(raw_descriptor(6, shape.clone()), &path, false);
        b.open(Mode::Write)?;
        for i in 0..3 {
            b.write_snapshot(i, &snapshot(&shape, i))?;
        }
        // dropped without close: the process died
    }

    let mut r = DiskBackend::new(raw_descriptor(6, shape.clone()), &path, false);
    r.open(Mode::Read)?;
    assert_eq!(r.read_snapshot(2)?, snapshot(&shape, 2));
    assert!(matches!(
        r.read_snapshot(3),
        Err(StoreError::MissingSnapshot { at }) if at.index == Some(3)
    ));
    Ok(())
}

#[test]
fn io_failure_leaves_earlier_snapshots_readable() -> Result<()> {
    let dir = tempdir()?;
    let shape = small_shape();
    let path = dir.path().join("u.ckpt");
    let k = 4;
    {
        let disk = DiskBackend::new(raw_descriptor(8, shape.clone()), &path, false);
        let mut b = Faulty::failing_write(disk, k);
        b.open(Mode::Write)?;
        for i in 0..k {
            b.write_snapshot(i, &snapshot(&shape, i))?;
        }
        assert!(matches!(
            b.write_snapshot(k, &snapshot(&shape, k)),
            Err(StoreError::Io { .. })
        ));
    }

    let mut r = DiskBackend::new(raw_descriptor(8, shape.clone()), &path, false);
    r.open(Mode::Read)?;
    for i in (0..k).rev() {
        assert_eq!(r.read_snapshot(i)?, snapshot(&shape, i));
    }
    assert!(matches!(
        r.read_snapshot(k),
        Err(StoreError::MissingSnapshot { .. })
    ));
    Ok(())
}

// -------------------- Stats --------------------

#[test]
fn stats_track_payload_bytes() -> Result<()> {
    let dir = tempdir()?;
    let shape = shape_252();
    let path = dir.path().join("u.ckpt");
    let mut b = DiskBackend::new(raw_descriptor(3, shape.clone()), &path, false);
    fill(&mut b, &shape)?;
    b.open(Mode::Read)?;
    b.read_snapshot(2)?;
    b.read_snapshot(1)?;

    let s = b.stats();
    assert_eq!(s.snapshots_written, 3);
    assert_eq!(s.bytes_written, 3 * 1008);
    assert_eq!(s.snapshots_read, 2);
    assert_eq!(s.bytes_read, 2 * 1008);
    Ok(())
}
