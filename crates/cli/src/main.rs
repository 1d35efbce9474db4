//! # wavecheck - checkpoint store driver
//!
//! Runs a synthetic forward pass that writes one snapshot per timestep
//! through a [`store::CheckpointSession`], then an adjoint pass that reads
//! them back in reverse and correlates them with an analytic adjoint field.
//! Prints compute time, per-phase I/O time, codec time and the largest
//! reconstruction error; optionally appends the same numbers to a CSV file.
//!
//! ## Configuration
//!
//! Store settings come from the environment (see the `config` crate):
//!
//! ```text
//! WAVECKPT_BACKEND         memory | disk | compressed-disk | distributed-disk (default: disk)
//! WAVECKPT_ROOT            store directory                  (default: "data/ckpt")
//! WAVECKPT_DISK_PATHS      comma-separated shard directories
//! WAVECKPT_RATE            codec bits per value             (default: 16)
//! WAVECKPT_DISKS           shard count                      (default: 8)
//! WAVECKPT_COMPRESS_SHARDS compress distributed shards      (default: false)
//! WAVECKPT_CACHE           go through the page cache        (default: false)
//! WAVECKPT_RANK            rank for per-process file names
//! ```
//!
//! Run shape:
//!
//! ```text
//! WAVECKPT_NT              timesteps                        (default: 64)
//! WAVECKPT_SHAPE           grid, e.g. "32x32x32"            (default: "32x32x32")
//! WAVECKPT_DTYPE           f32 | f64                        (default: f32)
//! WAVECKPT_CSV             append a result row to this file
//! ```
//!
//! Logs go to stderr, filtered by `RUST_LOG` (default `info`).
//!
//! ## Example
//!
//! ```text
//! $ WAVECKPT_BACKEND=compressed WAVECKPT_RATE=12 cargo run -p cli --release
//! ```

mod report;
mod wave;

use anyhow::{anyhow, bail, Context, Result};
use field::{DType, Shape, Snapshot};
use report::RunReport;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use store::{CheckpointSession, RunDescriptor, StoreConfig};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use wave::DampedWave;

const ENV_NT: &str = "WAVECKPT_NT";
const ENV_SHAPE: &str = "WAVECKPT_SHAPE";
const ENV_DTYPE: &str = "WAVECKPT_DTYPE";
const ENV_CSV: &str = "WAVECKPT_CSV";

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parses `"32x32x32"` (or a single `"1024"`) into a [`Shape`].
fn parse_shape(s: &str) -> Result<Shape> {
    let dims = s
        .split(['x', 'X'])
        .map(|d| {
            d.trim()
                .parse::<u64>()
                .with_context(|| format!("bad dimension {:?} in shape {:?}", d, s))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Shape::new(dims)?)
}

fn parse_dtype(s: &str) -> Result<DType> {
    match s.trim().to_ascii_lowercase().as_str() {
        "f32" | "float32" => Ok(DType::F32),
        "f64" | "float64" => Ok(DType::F64),
        other => Err(anyhow!("unknown dtype {:?} (expected f32 or f64)", other)),
    }
}

/// Builds a snapshot of `dtype` from analytic values.
fn to_snapshot(shape: &Shape, dtype: DType, values: &[f64]) -> Result<Snapshot> {
    let snap = match dtype {
        DType::F32 => {
            let v: Vec<f32> = values.iter().map(|&x| x as f32).collect();
            Snapshot::from_f32(shape.clone(), &v)?
        }
        DType::F64 => Snapshot::from_f64(shape.clone(), values)?,
    };
    Ok(snap)
}

/// Largest elementwise difference between what the store returned and the
/// exact field, after rounding the exact field to the stored dtype.
fn max_abs_error(got: &[f64], exact: &[f64], dtype: DType) -> f64 {
    got.iter()
        .zip(exact)
        .map(|(&g, &e)| {
            let e = match dtype {
                DType::F32 => e as f32 as f64,
                DType::F64 => e,
            };
            (g - e).abs()
        })
        .fold(0.0, f64::max)
}

struct RunSpec {
    nt: u64,
    shape: Shape,
    dtype: DType,
}

fn run(config: &StoreConfig, spec: &RunSpec) -> Result<RunReport> {
    let descriptor = RunDescriptor::for_config(spec.nt, spec.shape.clone(), spec.dtype, config)
        .context("building run descriptor")?;
    let rate = descriptor.rate.unwrap_or(0);
    let disks = descriptor.disks;
    let mut session =
        CheckpointSession::new(config, descriptor).context("creating checkpoint session")?;
    let wave = DampedWave::new(&spec.shape, spec.nt);

    // Forward pass.
    let mut forward_compute = Duration::ZERO;
    session.open_for_write().context("opening store for write")?;
    for t in 0..spec.nt {
        let start = Instant::now();
        let u = wave.forward(t);
        let snap = to_snapshot(&spec.shape, spec.dtype, &u)?;
        forward_compute += start.elapsed();

        session
            .write(t, &snap)
            .with_context(|| format!("writing timestep {}", t))?;
    }
    session.finalize_forward().context("finishing forward pass")?;
    debug!(?forward_compute, "forward pass done");

    // Adjoint pass.
    let mut adjoint_compute = Duration::ZERO;
    let mut max_error = 0.0f64;
    let mut gradient = vec![0.0f64; spec.shape.elements() as usize];
    session.open_for_read().context("opening store for read")?;
    for t in (0..spec.nt).rev() {
        let snap = session
            .read(t)
            .with_context(|| format!("reading timestep {}", t))?;

        let start = Instant::now();
        let u = snap.to_f64_lossless();
        let v = wave.adjoint(t);
        for ((g, a), b) in gradient.iter_mut().zip(&u).zip(&v) {
            *g += a * b * wave.dt();
        }
        max_error = max_error.max(max_abs_error(&u, &wave.forward(t), spec.dtype));
        adjoint_compute += start.elapsed();
    }
    session.finalize_read().context("finishing adjoint pass")?;

    let gradient_norm = gradient.iter().map(|g| g * g).sum::<f64>().sqrt();
    Ok(RunReport {
        backend: config.backend,
        nt: spec.nt,
        shape: spec.shape.dims().iter().map(u64::to_string).collect::<Vec<_>>().join("x"),
        dtype: spec.dtype.to_string(),
        rate,
        disks,
        cache_bypass: config.cache_bypass,
        forward_compute,
        adjoint_compute,
        io: session.stats(),
        max_error,
        gradient_norm,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = StoreConfig::from_env().context("reading store configuration")?;
    let nt: u64 = env_or(ENV_NT, "64")
        .trim()
        .parse()
        .with_context(|| format!("{} must be a positive integer", ENV_NT))?;
    if nt == 0 {
        bail!("{} must be at least 1", ENV_NT);
    }
    let spec = RunSpec {
        nt,
        shape: parse_shape(&env_or(ENV_SHAPE, "32x32x32"))?,
        dtype: parse_dtype(&env_or(ENV_DTYPE, "f32"))?,
    };
    let csv = std::env::var_os(ENV_CSV).map(PathBuf::from);

    info!(
        backend = %config.backend,
        root = %config.root.display(),
        nt = spec.nt,
        shape = %spec.shape,
        dtype = %spec.dtype,
        "wavecheck starting"
    );

    let report = run(&config, &spec)?;
    println!("{}", report);

    if let Some(path) = csv {
        report.append_csv(&path)?;
        info!(path = %path.display(), "result row appended");
    }
    Ok(())
}
