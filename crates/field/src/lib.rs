//! # Field - snapshot data types
//!
//! The values that flow through the checkpoint store: a [`Shape`], an element
//! [`DType`], and the [`Snapshot`] that couples them with a raw payload.
//!
//! Payload bytes are always little-endian, independent of the host, so a
//! snapshot written on one machine decodes identically on another.
//!
//! ## Example
//!
//! ```rust
//! use field::{Shape, Snapshot};
//!
//! let shape = Shape::new(vec![2, 3]).unwrap();
//! let snap = Snapshot::from_f32(shape, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
//! assert_eq!(snap.byte_len(), 24);
//! assert_eq!(snap.to_f32().unwrap()[4], 4.0);
//! ```

use byteorder::{ByteOrder, LittleEndian};
use std::fmt;
use thiserror::Error;

/// Maximum number of dimensions a field may have.
pub const MAX_DIMS: usize = 16;

/// Errors raised while building or converting snapshots.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    /// A shape with no dimensions, a zero-sized dimension, or too many dimensions.
    #[error("invalid shape {dims:?}: {reason}")]
    InvalidShape { dims: Vec<u64>, reason: &'static str },

    /// The number of elements supplied does not match the shape.
    #[error("element count mismatch: shape {shape} holds {expected} elements, got {actual}")]
    ElementCount {
        shape: Shape,
        expected: u64,
        actual: u64,
    },

    /// A payload whose byte length is not `elements * dtype.size()`.
    #[error("payload length mismatch: expected {expected} bytes, got {actual}")]
    PayloadLength { expected: u64, actual: u64 },

    /// The requested typed view does not match the snapshot's dtype.
    #[error("dtype mismatch: snapshot is {actual}, requested {requested}")]
    DTypeMismatch { actual: DType, requested: DType },

    /// An unknown on-disk dtype code.
    #[error("unknown dtype code {0}")]
    UnknownDType(u8),
}

/// Scalar element type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// IEEE-754 binary32.
    F32,
    /// IEEE-754 binary64.
    F64,
}

impl DType {
    /// Size of one element in bytes.
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F64 => 8,
        }
    }

    /// Size of one element in bits.
    #[must_use]
    pub fn bits(self) -> u32 {
        (self.size() * 8) as u32
    }

    /// Stable on-disk code.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            DType::F32 => 1,
            DType::F64 => 2,
        }
    }

    /// Inverse of [`DType::code`].
    pub fn from_code(code: u8) -> Result<Self, FieldError> {
        match code {
            1 => Ok(DType::F32),
            2 => Ok(DType::F64),
            other => Err(FieldError::UnknownDType(other)),
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => f.write_str("f32"),
            DType::F64 => f.write_str("f64"),
        }
    }
}

/// Ordered dimension sizes of a field, fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<u64>,
}

impl Shape {
    /// Builds a shape, rejecting empty, zero-sized or over-long dimension lists.
    pub fn new(dims: Vec<u64>) -> Result<Self, FieldError> {
        if dims.is_empty() {
            return Err(FieldError::InvalidShape {
                dims,
                reason: "no dimensions",
            });
        }
        if dims.len() > MAX_DIMS {
            return Err(FieldError::InvalidShape {
                dims,
                reason: "too many dimensions",
            });
        }
        if dims.iter().any(|&d| d == 0) {
            return Err(FieldError::InvalidShape {
                dims,
                reason: "zero-sized dimension",
            });
        }
        if dims.iter().try_fold(1u64, |acc, &d| acc.checked_mul(d)).is_none() {
            return Err(FieldError::InvalidShape {
                dims,
                reason: "element count overflows u64",
            });
        }
        Ok(Self { dims })
    }

    /// The dimension sizes, outermost first.
    #[must_use]
    pub fn dims(&self) -> &[u64] {
        &self.dims
    }

    /// Number of dimensions.
    #[must_use]
    pub fn ndims(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements.
    #[must_use]
    pub fn elements(&self) -> u64 {
        // Overflow was ruled out in `new`.
        self.dims.iter().product()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.dims.iter().map(|d| d.to_string()).collect();
        write!(f, "[{}]", parts.join("x"))
    }
}

/// Full-domain field values for one timestep.
///
/// The payload holds `shape.elements() * dtype.size()` little-endian bytes.
/// The timestep index is not part of the snapshot; it travels alongside it on
/// every store call.
#[derive(Clone, PartialEq)]
pub struct Snapshot {
    shape: Shape,
    dtype: DType,
    bytes: Vec<u8>,
}

impl Snapshot {
    /// Wraps an existing little-endian payload, checking its length.
    pub fn from_bytes(shape: Shape, dtype: DType, bytes: Vec<u8>) -> Result<Self, FieldError> {
        let expected = shape.elements() * dtype.size() as u64;
        if bytes.len() as u64 != expected {
            return Err(FieldError::PayloadLength {
                expected,
                actual: bytes.len() as u64,
            });
        }
        Ok(Self {
            shape,
            dtype,
            bytes,
        })
    }

    /// Builds an `f32` snapshot from a slice of values.
    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self, FieldError> {
        check_count(&shape, values.len())?;
        let mut bytes = vec![0u8; values.len() * 4];
        LittleEndian::write_f32_into(values, &mut bytes);
        Ok(Self {
            shape,
            dtype: DType::F32,
            bytes,
        })
    }

    /// Builds an `f64` snapshot from a slice of values.
    pub fn from_f64(shape: Shape, values: &[f64]) -> Result<Self, FieldError> {
        check_count(&shape, values.len())?;
        let mut bytes = vec![0u8; values.len() * 8];
        LittleEndian::write_f64_into(values, &mut bytes);
        Ok(Self {
            shape,
            dtype: DType::F64,
            bytes,
        })
    }

    /// Decodes the payload as `f32` values.
    pub fn to_f32(&self) -> Result<Vec<f32>, FieldError> {
        if self.dtype != DType::F32 {
            return Err(FieldError::DTypeMismatch {
                actual: self.dtype,
                requested: DType::F32,
            });
        }
        let mut out = vec![0f32; self.bytes.len() / 4];
        LittleEndian::read_f32_into(&self.bytes, &mut out);
        Ok(out)
    }

    /// Decodes the payload as `f64` values.
    pub fn to_f64(&self) -> Result<Vec<f64>, FieldError> {
        if self.dtype != DType::F64 {
            return Err(FieldError::DTypeMismatch {
                actual: self.dtype,
                requested: DType::F64,
            });
        }
        let mut out = vec![0f64; self.bytes.len() / 8];
        LittleEndian::read_f64_into(&self.bytes, &mut out);
        Ok(out)
    }

    /// Widens every element to `f64`, whatever the dtype.
    #[must_use]
    pub fn to_f64_lossless(&self) -> Vec<f64> {
        match self.dtype {
            DType::F32 => {
                let mut tmp = vec![0f32; self.bytes.len() / 4];
                LittleEndian::read_f32_into(&self.bytes, &mut tmp);
                tmp.into_iter().map(f64::from).collect()
            }
            DType::F64 => {
                let mut out = vec![0f64; self.bytes.len() / 8];
                LittleEndian::read_f64_into(&self.bytes, &mut out);
                out
            }
        }
    }

    #[must_use]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Raw little-endian payload.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Number of scalar elements.
    #[must_use]
    pub fn elements(&self) -> u64 {
        self.shape.elements()
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("shape", &self.shape)
            .field("dtype", &self.dtype)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

fn check_count(shape: &Shape, actual: usize) -> Result<(), FieldError> {
    if shape.elements() != actual as u64 {
        return Err(FieldError::ElementCount {
            shape: shape.clone(),
            expected: shape.elements(),
            actual: actual as u64,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests;
