use crate::format::{decode_frame, encode_frame};
use crate::*;
use anyhow::Result;
use field::{DType, Shape};

fn header(nt: u64, encoding: Encoding, payload_len: u64, aligned: bool) -> SlotHeader {
    let shape = Shape::new(vec![8, 4, 2]).unwrap();
    SlotHeader::new(nt, shape, DType::F32, encoding, payload_len, aligned)
}

// -------------------- Header --------------------

#[test]
fn header_round_trips() -> Result<()> {
    let mut h = header(12, Encoding::Compressed { rate: 9 }, 72, false);
    h.sealed = true;
    let mut buf = vec![0u8; HEADER_BYTES as usize];
    h.encode_into(&mut buf)?;
    assert_eq!(SlotHeader::decode(&buf)?, h);
    Ok(())
}

#[test]
fn header_starts_with_magic() -> Result<()> {
    let h = header(1, Encoding::Raw, 256, false);
    let mut buf = vec![0xffu8; HEADER_BYTES as usize];
    h.encode_into(&mut buf)?;
    assert_eq!(&buf[0..4], &SLOTFILE_MAGIC.to_le_bytes());
    // Tail of the region is zero padded.
    assert!(buf[200..].iter().all(|&b| b == 0));
    Ok(())
}

#[test]
fn header_rejects_bad_magic() -> Result<()> {
    let mut buf = vec![0u8; HEADER_BYTES as usize];
    header(1, Encoding::Raw, 256, false).encode_into(&mut buf)?;
    buf[0] ^= 0xff;
    assert!(matches!(
        SlotHeader::decode(&buf),
        Err(SlotFileError::Layout(_))
    ));
    Ok(())
}

#[test]
fn header_detects_bit_flip() -> Result<()> {
    let mut buf = vec![0u8; HEADER_BYTES as usize];
    header(5, Encoding::Raw, 256, false).encode_into(&mut buf)?;
    // Flip a bit inside `nt`.
    buf[8] ^= 0x01;
    let err = SlotHeader::decode(&buf).unwrap_err();
    assert!(err.to_string().contains("CRC"), "got: {}", err);
    Ok(())
}

#[test]
fn zeroed_header_is_not_a_slot_file() {
    let buf = vec![0u8; HEADER_BYTES as usize];
    assert!(SlotHeader::decode(&buf).is_err());
}

// -------------------- Sizing --------------------

#[test]
fn slot_size_includes_frame() {
    assert_eq!(slot_size_for(1008, false), 1024);
    assert_eq!(slot_size_for(0, false), SLOT_FRAME_BYTES);
}

#[test]
fn aligned_slot_size_rounds_up() {
    assert_eq!(slot_size_for(1, true), DIRECT_IO_ALIGN as u64);
    assert_eq!(slot_size_for(4080, true), 4096);
    assert_eq!(slot_size_for(4081, true), 8192);
}

#[test]
fn slot_offsets_are_linear() {
    let h = header(3, Encoding::Raw, 1008, false);
    assert_eq!(h.slot_size, 1024);
    assert_eq!(h.slot_offset(0), HEADER_BYTES);
    assert_eq!(h.slot_offset(2), HEADER_BYTES + 2048);
    assert_eq!(h.file_len(), HEADER_BYTES + 3 * 1024);
}

// -------------------- Slot frames --------------------

#[test]
fn frame_round_trips() -> Result<()> {
    let payload = [7u8; 20];
    let mut slot = vec![0xaau8; 48];
    encode_frame(&mut slot, 3, &payload);
    assert_eq!(decode_frame(&slot, 3, 20)?, &payload);
    // Padding after the payload is zeroed.
    assert!(slot[36..].iter().all(|&b| b == 0));
    Ok(())
}

#[test]
fn zero_frame_is_missing() {
    let slot = vec![0u8; 32];
    assert!(matches!(
        decode_frame(&slot, 4, 16),
        Err(SlotFileError::MissingSlot { index: 4 })
    ));
}

#[test]
fn frame_checks_index_and_crc() {
    let mut slot = vec![0u8; 32];
    encode_frame(&mut slot, 1, &[1u8; 16]);
    assert!(matches!(
        decode_frame(&slot, 2, 16),
        Err(SlotFileError::Corrupt { index: 2, .. })
    ));

    slot[20] ^= 0x10;
    assert!(matches!(
        decode_frame(&slot, 1, 16),
        Err(SlotFileError::Corrupt { index: 1, .. })
    ));
}
