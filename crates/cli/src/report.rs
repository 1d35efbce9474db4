use anyhow::{Context, Result};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use store::{BackendKind, IoStats};

/// Timing and accuracy of one forward + adjoint run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub backend: BackendKind,
    pub nt: u64,
    pub shape: String,
    pub dtype: String,
    /// Codec rate, 0 when uncompressed.
    pub rate: u32,
    pub disks: usize,
    pub cache_bypass: bool,
    pub forward_compute: Duration,
    pub adjoint_compute: Duration,
    pub io: IoStats,
    /// Largest `|u_read - u_exact|` over all timesteps.
    pub max_error: f64,
    /// L2 norm of the accumulated correlation.
    pub gradient_norm: f64,
}

const CSV_HEADER: &str = "backend,nt,shape,dtype,rate,disks,cache_bypass,\
forward_compute_s,adjoint_compute_s,open_s,write_s,read_s,close_s,codec_s,\
bytes_written,bytes_read,max_error,gradient_norm";

impl RunReport {
    pub fn csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{},{},{:e},{:e}",
            self.backend,
            self.nt,
            self.shape,
            self.dtype,
            self.rate,
            self.disks,
            self.cache_bypass,
            self.forward_compute.as_secs_f64(),
            self.adjoint_compute.as_secs_f64(),
            self.io.open.as_secs_f64(),
            self.io.write.as_secs_f64(),
            self.io.read.as_secs_f64(),
            self.io.close.as_secs_f64(),
            self.io.codec.as_secs_f64(),
            self.io.bytes_written,
            self.io.bytes_read,
            self.max_error,
            self.gradient_norm,
        )
    }

    /// Appends a row to `path`, writing the header first if the file is new
    /// or empty.
    pub fn append_csv(&self, path: &Path) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening {}", path.display()))?;
        let empty = f.metadata()?.len() == 0;
        if empty {
            writeln!(f, "{}", CSV_HEADER)?;
        }
        writeln!(f, "{}", self.csv_row())
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

fn mib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

fn secs(d: Duration) -> f64 {
    d.as_secs_f64()
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "backend={} nt={} shape={} dtype={} rate={} disks={} cache_bypass={}",
            self.backend, self.nt, self.shape, self.dtype, self.rate, self.disks, self.cache_bypass
        )?;
        writeln!(f, "forward compute   {:>10.4} s", secs(self.forward_compute))?;
        writeln!(f, "adjoint compute   {:>10.4} s", secs(self.adjoint_compute))?;
        writeln!(f, "open              {:>10.4} s", secs(self.io.open))?;
        writeln!(
            f,
            "write             {:>10.4} s  ({:.2} MiB)",
            secs(self.io.write),
            mib(self.io.bytes_written)
        )?;
        writeln!(
            f,
            "read              {:>10.4} s  ({:.2} MiB)",
            secs(self.io.read),
            mib(self.io.bytes_read)
        )?;
        writeln!(f, "close             {:>10.4} s", secs(self.io.close))?;
        writeln!(f, "codec             {:>10.4} s", secs(self.io.codec))?;
        writeln!(f, "max error         {:>10.3e}", self.max_error)?;
        write!(f, "gradient norm     {:>10.4e}", self.gradient_norm)
    }
}
