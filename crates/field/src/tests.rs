use super::*;
use anyhow::Result;

// -------------------- Shape --------------------

#[test]
fn shape_counts_elements() -> Result<()> {
    let shape = Shape::new(vec![4, 5, 6])?;
    assert_eq!(shape.ndims(), 3);
    assert_eq!(shape.elements(), 120);
    assert_eq!(shape.to_string(), "[4x5x6]");
    Ok(())
}

#[test]
fn shape_rejects_empty_and_zero() {
    assert!(matches!(
        Shape::new(vec![]),
        Err(FieldError::InvalidShape { .. })
    ));
    assert!(matches!(
        Shape::new(vec![3, 0, 2]),
        Err(FieldError::InvalidShape { .. })
    ));
}

#[test]
fn shape_rejects_too_many_dims() {
    let dims = vec![1u64; MAX_DIMS + 1];
    assert!(Shape::new(dims).is_err());
}

#[test]
fn shape_rejects_overflowing_element_count() {
    assert!(Shape::new(vec![u64::MAX, 2]).is_err());
}

// -------------------- DType --------------------

#[test]
fn dtype_codes_are_stable() -> Result<()> {
    assert_eq!(DType::F32.code(), 1);
    assert_eq!(DType::F64.code(), 2);
    assert_eq!(DType::from_code(1)?, DType::F32);
    assert_eq!(DType::from_code(2)?, DType::F64);
    assert_eq!(DType::from_code(9), Err(FieldError::UnknownDType(9)));
    assert_eq!(DType::F32.bits(), 32);
    assert_eq!(DType::F64.bits(), 64);
    Ok(())
}

// -------------------- Snapshot --------------------

#[test]
fn f32_snapshot_preserves_values() -> Result<()> {
    let shape = Shape::new(vec![2, 2])?;
    let values = [1.5f32, -2.25, 0.0, 1e-30];
    let snap = Snapshot::from_f32(shape, &values)?;
    assert_eq!(snap.dtype(), DType::F32);
    assert_eq!(snap.byte_len(), 16);
    assert_eq!(snap.to_f32()?, values.to_vec());
    Ok(())
}

#[test]
fn payload_is_little_endian() -> Result<()> {
    let shape = Shape::new(vec![1])?;
    let snap = Snapshot::from_f32(shape, &[1.0])?;
    assert_eq!(snap.as_bytes(), &1.0f32.to_le_bytes());
    Ok(())
}

#[test]
fn element_count_mismatch_is_rejected() -> Result<()> {
    let shape = Shape::new(vec![3])?;
    let err = Snapshot::from_f64(shape, &[1.0, 2.0]).unwrap_err();
    assert!(matches!(
        err,
        FieldError::ElementCount {
            expected: 3,
            actual: 2,
            ..
        }
    ));
    Ok(())
}

#[test]
fn from_bytes_checks_length() -> Result<()> {
    let shape = Shape::new(vec![2])?;
    assert!(Snapshot::from_bytes(shape.clone(), DType::F64, vec![0u8; 16]).is_ok());
    assert!(matches!(
        Snapshot::from_bytes(shape, DType::F64, vec![0u8; 15]),
        Err(FieldError::PayloadLength {
            expected: 16,
            actual: 15
        })
    ));
    Ok(())
}

#[test]
fn typed_view_checks_dtype() -> Result<()> {
    let shape = Shape::new(vec![2])?;
    let snap = Snapshot::from_f64(shape, &[1.0, 2.0])?;
    assert!(snap.to_f32().is_err());
    assert_eq!(snap.to_f64_lossless(), vec![1.0, 2.0]);
    Ok(())
}
