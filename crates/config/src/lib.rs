//! # Config - checkpoint store configuration
//!
//! [`StoreConfig`] selects which backend a checkpoint session builds and
//! carries its parameters. Values come from `WAVECKPT_*` environment
//! variables with defaults for everything:
//!
//! ```text
//! WAVECKPT_BACKEND          memory | disk | compressed-disk | distributed-disk (default: disk)
//! WAVECKPT_ROOT             root directory for disk files           (default: data/ckpt)
//! WAVECKPT_DISK_PATHS       comma separated shard directories       (default: <root>/disk-<i>)
//! WAVECKPT_RATE             codec bits per element, >= 1            (default: 16)
//! WAVECKPT_DISKS            shard count, >= 1                       (default: 8)
//! WAVECKPT_COMPRESS_SHARDS  compress distributed shards             (default: false)
//! WAVECKPT_CACHE            keep the page cache, no direct I/O      (default: false)
//! WAVECKPT_RANK             solver rank, used in file names         (default: unset)
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

pub const ENV_BACKEND: &str = "WAVECKPT_BACKEND";
pub const ENV_ROOT: &str = "WAVECKPT_ROOT";
pub const ENV_DISK_PATHS: &str = "WAVECKPT_DISK_PATHS";
pub const ENV_RATE: &str = "WAVECKPT_RATE";
pub const ENV_DISKS: &str = "WAVECKPT_DISKS";
pub const ENV_COMPRESS_SHARDS: &str = "WAVECKPT_COMPRESS_SHARDS";
pub const ENV_CACHE: &str = "WAVECKPT_CACHE";
pub const ENV_RANK: &str = "WAVECKPT_RANK";

/// Default root directory for disk-backed stores.
pub const DEFAULT_ROOT: &str = "data/ckpt";
/// Default codec rate in bits per element.
pub const DEFAULT_RATE: u32 = 16;
/// Default shard count for the distributed backend.
pub const DEFAULT_DISKS: usize = 8;

/// Extension of every slot file.
pub const FILE_EXTENSION: &str = "ckpt";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown backend {0:?} (expected memory, disk, compressed-disk or distributed-disk)")]
    UnknownBackend(String),

    #[error("compression rate must be at least 1 bit per element")]
    ZeroRate,

    #[error("disk count must be at least 1")]
    ZeroDisks,

    #[error("{key}: cannot parse {value:?}: {reason}")]
    Parse {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{paths} disk paths given for {disks} disks")]
    TooManyDiskPaths { paths: usize, disks: usize },
}

/// Which backend variant a session constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Snapshots held in process memory; nothing survives the process.
    Memory,
    /// One raw slot file per run.
    #[default]
    Disk,
    /// One slot file per run holding fixed-rate compressed payloads.
    CompressedDisk,
    /// Round-robin over several disk (or compressed disk) shards.
    DistributedDisk,
}

impl BackendKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Disk => "disk",
            BackendKind::CompressedDisk => "compressed-disk",
            BackendKind::DistributedDisk => "distributed-disk",
        }
    }

    /// Whether payloads are stored compressed.
    #[must_use]
    pub fn is_compressed(self) -> bool {
        matches!(self, BackendKind::CompressedDisk)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(BackendKind::Memory),
            "disk" => Ok(BackendKind::Disk),
            "compressed-disk" | "compressed" => Ok(BackendKind::CompressedDisk),
            "distributed-disk" | "distributed" => Ok(BackendKind::DistributedDisk),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// Backend selection and parameters for one checkpoint store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub backend: BackendKind,
    /// Directory holding disk files (and default shard directories).
    pub root: PathBuf,
    /// Explicit shard directories; shard `i` falls back to `<root>/disk-<i>`.
    pub disk_paths: Vec<PathBuf>,
    /// Codec bits per element for compressed payloads.
    pub rate: u32,
    /// Shard count for [`BackendKind::DistributedDisk`].
    pub disks: usize,
    /// Whether distributed shards store compressed payloads.
    pub compress_shards: bool,
    /// Open slot files with direct I/O, skipping the page cache.
    pub cache_bypass: bool,
    /// Solver rank; several ranks may share one root.
    pub rank: Option<u32>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Disk,
            root: PathBuf::from(DEFAULT_ROOT),
            disk_paths: Vec::new(),
            rate: DEFAULT_RATE,
            disks: DEFAULT_DISKS,
            compress_shards: false,
            cache_bypass: true,
            rank: None,
        }
    }
}

impl StoreConfig {
    /// A validated config for `backend` rooted at `root`, other fields default.
    #[must_use]
    pub fn new(backend: BackendKind, root: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            root: root.into(),
            ..Self::default()
        }
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of
    /// a variable if set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        if let Some(v) = get(ENV_BACKEND) {
            cfg.backend = v.parse()?;
        }
        if let Some(v) = get(ENV_ROOT) {
            cfg.root = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_DISK_PATHS) {
            cfg.disk_paths = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect();
        }
        if let Some(v) = get(ENV_RATE) {
            cfg.rate = parse(ENV_RATE, &v)?;
        }
        if let Some(v) = get(ENV_DISKS) {
            cfg.disks = parse(ENV_DISKS, &v)?;
        }
        if let Some(v) = get(ENV_COMPRESS_SHARDS) {
            cfg.compress_shards = parse_bool(ENV_COMPRESS_SHARDS, &v)?;
        }
        if let Some(v) = get(ENV_CACHE) {
            cfg.cache_bypass = !parse_bool(ENV_CACHE, &v)?;
        }
        if let Some(v) = get(ENV_RANK) {
            cfg.rank = Some(parse(ENV_RANK, &v)?);
        }

        cfg.validate()?;
        debug!(
            backend = %cfg.backend,
            root = %cfg.root.display(),
            rate = cfg.rate,
            disks = cfg.disks,
            cache_bypass = cfg.cache_bypass,
            "loaded store config"
        );
        Ok(cfg)
    }

    /// Checks parameter ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate == 0 {
            return Err(ConfigError::ZeroRate);
        }
        if self.disks == 0 {
            return Err(ConfigError::ZeroDisks);
        }
        if self.disk_paths.len() > self.disks {
            return Err(ConfigError::TooManyDiskPaths {
                paths: self.disk_paths.len(),
                disks: self.disks,
            });
        }
        Ok(())
    }

    /// Directory of shard `disk`.
    #[must_use]
    pub fn disk_dir(&self, disk: usize) -> PathBuf {
        self.disk_paths
            .get(disk)
            .cloned()
            .unwrap_or_else(|| self.root.join(format!("disk-{}", disk)))
    }

    /// File stem shared by every slot file of this solver instance.
    #[must_use]
    pub fn file_stem(&self) -> String {
        match self.rank {
            Some(r) => format!("rank-{}", r),
            None => "wavefield".to_string(),
        }
    }

    /// `<stem>.ckpt`
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.file_stem(), FILE_EXTENSION)
    }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Parse {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Parse {
            key,
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests;
