//! # Codec - fixed-rate lossy snapshot compression
//!
//! Encodes a [`Snapshot`] under a fixed bit budget per element so that the
//! compressed size depends only on the element count and the rate, never on
//! the values. This is what lets compressed snapshots live in fixed-size
//! disk slots.
//!
//! ## Block floating point
//!
//! Elements are grouped into blocks of [`BLOCK_LEN`] values (the final block
//! is zero padded). Each block is written as:
//!
//! ```text
//! [e: i16][q_0: p bits][q_1: p bits] ... [q_15: p bits]      p = rate - 1
//! ```
//!
//! `e` is the block exponent, the smallest integer with `|x| < 2^e` for every
//! value in the block (`i16::MIN` marks an all-zero block). Each value is
//! stored as the signed integer `q = round(x / step)` with
//! `step = 2^(e - p + 1)`, clamped to the full two's complement range
//! `[-2^(p-1), 2^(p-1) - 1]` and packed MSB first. A block costs exactly
//! `16 + 16 * p = 16 * rate` bits, i.e. `2 * rate` bytes.
//!
//! The reconstruction grid at rate `r + 1` contains the grid at rate `r`, so
//! before the final rounding to the dtype no element gets worse when a bit
//! is added.
//!
//! ## Error bound
//!
//! For every element of a block with exponent `e`:
//!
//! ```text
//! |x - decode(encode(x))| <= 2^(e - rate + 2) <= max_abs(block) * 2^(3 - rate)
//! ```
//!
//! That is one quantization step. Values clamped at the top of the range
//! lose less than a step; all others lose half a step to rounding, at most
//! doubled by the final rounding back to the field's dtype. The bound halves
//! with each extra bit of rate. Reconstruction is exact only when every value
//! in a block is a multiple of its step, which in practice means all-zero
//! blocks or a rate covering the block's full dynamic range. [`error_bound`]
//! evaluates the bound for a block.
//!
//! ## Example
//!
//! ```rust
//! use field::{Shape, Snapshot};
//!
//! let shape = Shape::new(vec![32]).unwrap();
//! let values: Vec<f32> = (0..32).map(|i| (i as f32 * 0.1).sin()).collect();
//! let snap = Snapshot::from_f32(shape.clone(), &values).unwrap();
//!
//! let packed = codec::encode(&snap, 12).unwrap();
//! assert_eq!(packed.len(), codec::encoded_len(32, 12));
//!
//! let back = codec::decode(&packed, &shape, snap.dtype(), 12).unwrap();
//! assert_eq!(back.shape(), &shape);
//! ```

use field::{DType, FieldError, Shape, Snapshot};
use thiserror::Error;

/// Number of elements sharing one exponent.
pub const BLOCK_LEN: usize = 16;

/// Exponent value reserved for an all-zero block.
const ZERO_BLOCK: i16 = i16::MIN;

/// Errors raised by [`encode`] and [`decode`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Rate outside `1..=dtype.bits()`.
    #[error("rate {rate} out of range for {dtype} (must be 1..={max})")]
    RateOutOfRange { rate: u32, dtype: DType, max: u32 },

    /// The snapshot payload does not hold `shape.elements()` values.
    #[error("malformed snapshot: {0}")]
    Field(#[from] FieldError),

    /// The compressed buffer has the wrong length for the declared shape and rate.
    #[error("compressed length mismatch: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    /// NaN or infinite input value; fixed-rate blocks cannot represent it.
    #[error("non-finite value at element {index}")]
    NonFinite { index: usize },
}

/// Exact compressed size in bytes of `elements` values at `rate` bits each.
#[must_use]
pub fn encoded_len(elements: u64, rate: u32) -> usize {
    let blocks = (elements as usize).div_ceil(BLOCK_LEN);
    blocks * 2 * rate as usize
}

/// Upper bound on the per-element reconstruction error for a block whose
/// largest magnitude is `block_max_abs`.
#[must_use]
pub fn error_bound(block_max_abs: f64, rate: u32) -> f64 {
    if block_max_abs == 0.0 {
        return 0.0;
    }
    ldexp(1.0, block_exponent(block_max_abs) - rate as i32 + 2)
}

/// Compresses `snapshot` at `rate` bits per element.
///
/// # Errors
///
/// [`CodecError::RateOutOfRange`] for a rate outside `1..=dtype.bits()`,
/// [`CodecError::NonFinite`] if the field holds NaN or infinity.
pub fn encode(snapshot: &Snapshot, rate: u32) -> Result<Vec<u8>, CodecError> {
    check_rate(rate, snapshot.dtype())?;
    let values = snapshot.to_f64_lossless();
    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(CodecError::NonFinite { index });
    }

    let p = rate - 1;
    let (qmin, qmax) = quant_range(p);
    let mut w = BitWriter::with_capacity(encoded_len(snapshot.elements(), rate));

    for block in values.chunks(BLOCK_LEN) {
        let max_abs = block.iter().fold(0f64, |m, v| m.max(v.abs()));
        if max_abs == 0.0 {
            w.push(ZERO_BLOCK as u16 as u64, 16);
            for _ in 0..BLOCK_LEN {
                w.push(0, p);
            }
            continue;
        }

        let e = block_exponent(max_abs);
        w.push(e as i16 as u16 as u64, 16);

        let shift = p as i32 - 1 - e;
        for i in 0..BLOCK_LEN {
            let x = block.get(i).copied().unwrap_or(0.0);
            let q = (ldexp(x, shift).round() as i64).clamp(qmin, qmax);
            w.push(q as u64, p);
        }
    }

    Ok(w.finish())
}

/// Reconstructs a snapshot of `shape`/`dtype` from `bytes` produced by
/// [`encode`] at the same `rate`.
///
/// # Errors
///
/// [`CodecError::RateOutOfRange`] or [`CodecError::Length`] when `bytes`
/// cannot have come from a snapshot of this shape at this rate.
pub fn decode(bytes: &[u8], shape: &Shape, dtype: DType, rate: u32) -> Result<Snapshot, CodecError> {
    check_rate(rate, dtype)?;
    let expected = encoded_len(shape.elements(), rate);
    if bytes.len() != expected {
        return Err(CodecError::Length {
            expected,
            actual: bytes.len(),
        });
    }

    let n = shape.elements() as usize;
    let p = rate - 1;
    let mut r = BitReader::new(bytes);
    let mut values = Vec::with_capacity(n);

    while values.len() < n {
        let e = r.pull(16) as u16 as i16;
        let shift = e as i32 - (p as i32 - 1);
        for _ in 0..BLOCK_LEN {
            let q = sign_extend(r.pull(p), p);
            if values.len() < n {
                values.push(if e == ZERO_BLOCK { 0.0 } else { ldexp(q as f64, shift) });
            }
        }
    }

    let snap = match dtype {
        DType::F32 => {
            let narrow: Vec<f32> = values.iter().map(|&v| v as f32).collect();
            Snapshot::from_f32(shape.clone(), &narrow)?
        }
        DType::F64 => Snapshot::from_f64(shape.clone(), &values)?,
    };
    Ok(snap)
}

/// Checks that `rate` is usable for `dtype` without encoding anything.
pub fn check_rate(rate: u32, dtype: DType) -> Result<(), CodecError> {
    if rate == 0 || rate > dtype.bits() {
        return Err(CodecError::RateOutOfRange {
            rate,
            dtype,
            max: dtype.bits(),
        });
    }
    Ok(())
}

/// Smallest and largest value of a `p`-bit two's complement slot.
fn quant_range(p: u32) -> (i64, i64) {
    if p == 0 {
        (0, 0)
    } else {
        let half = 1i64 << (p - 1);
        (-half, half - 1)
    }
}

/// Smallest `e` with `x < 2^e`, for finite `x > 0`.
fn block_exponent(x: f64) -> i32 {
    let mut e = x.log2().floor() as i32 + 1;
    // log2 can be off by one ulp near powers of two.
    while ldexp(1.0, e) <= x {
        e += 1;
    }
    while ldexp(1.0, e - 1) > x {
        e -= 1;
    }
    e
}

/// `x * 2^n`, split in two steps so neither factor overflows or underflows.
fn ldexp(x: f64, n: i32) -> f64 {
    let half = n / 2;
    x * 2f64.powi(half) * 2f64.powi(n - half)
}

fn sign_extend(raw: u64, width: u32) -> i64 {
    if width == 0 {
        return 0;
    }
    let raw = raw as i128;
    if raw & (1i128 << (width - 1)) != 0 {
        (raw - (1i128 << width)) as i64
    } else {
        raw as i64
    }
}

// ---- Bit packing ----

/// MSB-first bit packer.
struct BitWriter {
    out: Vec<u8>,
    acc: u128,
    nbits: u32,
}

impl BitWriter {
    fn with_capacity(bytes: usize) -> Self {
        Self {
            out: Vec::with_capacity(bytes),
            acc: 0,
            nbits: 0,
        }
    }

    /// Appends the low `width` bits of `value` (`width <= 64`).
    fn push(&mut self, value: u64, width: u32) {
        if width == 0 {
            return;
        }
        let mask = if width == 64 { u64::MAX } else { (1u64 << width) - 1 };
        self.acc = (self.acc << width) | u128::from(value & mask);
        self.nbits += width;
        while self.nbits >= 8 {
            self.nbits -= 8;
            self.out.push((self.acc >> self.nbits) as u8);
        }
        self.acc &= (1u128 << self.nbits) - 1;
    }

    fn finish(mut self) -> Vec<u8> {
        if self.nbits > 0 {
            self.out.push((self.acc << (8 - self.nbits)) as u8);
        }
        self.out
    }
}

struct BitReader<'a> {
    src: &'a [u8],
    pos: usize,
    acc: u128,
    nbits: u32,
}

impl<'a> BitReader<'a> {
    fn new(src: &'a [u8]) -> Self {
        Self {
            src,
            pos: 0,
            acc: 0,
            nbits: 0,
        }
    }

    /// Reads `width` bits; past the end of input yields zero bits.
    fn pull(&mut self, width: u32) -> u64 {
        if width == 0 {
            return 0;
        }
        while self.nbits < width {
            let byte = self.src.get(self.pos).copied().unwrap_or(0);
            self.pos += 1;
            self.acc = (self.acc << 8) | u128::from(byte);
            self.nbits += 8;
        }
        self.nbits -= width;
        let v = (self.acc >> self.nbits) as u64;
        self.acc &= (1u128 << self.nbits) - 1;
        let mask = if width == 64 { u64::MAX } else { (1u64 << width) - 1 };
        v & mask
    }
}
