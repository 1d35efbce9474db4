use super::*;
use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

// -------------------- Backend names --------------------

#[test]
fn backend_names_round_trip() -> Result<()> {
    for kind in [
        BackendKind::Memory,
        BackendKind::Disk,
        BackendKind::CompressedDisk,
        BackendKind::DistributedDisk,
    ] {
        assert_eq!(kind.to_string().parse::<BackendKind>()?, kind);
    }
    assert_eq!(" Distributed ".parse::<BackendKind>()?, BackendKind::DistributedDisk);
    Ok(())
}

#[test]
fn unknown_backend_is_rejected() {
    assert_eq!(
        "tape".parse::<BackendKind>(),
        Err(ConfigError::UnknownBackend("tape".into()))
    );
}

// -------------------- Environment --------------------

#[test]
fn empty_environment_gives_defaults() -> Result<()> {
    let cfg = StoreConfig::from_lookup(lookup_from(&[]))?;
    assert_eq!(cfg, StoreConfig::default());
    assert_eq!(cfg.backend, BackendKind::Disk);
    assert_eq!(cfg.rate, 16);
    assert_eq!(cfg.disks, 8);
    assert!(cfg.cache_bypass);
    Ok(())
}

#[test]
fn reads_every_variable() -> Result<()> {
    let cfg = StoreConfig::from_lookup(lookup_from(&[
        (ENV_BACKEND, "distributed-disk"),
        (ENV_ROOT, "/scratch/run1"),
        (ENV_DISK_PATHS, "/mnt/a, /mnt/b"),
        (ENV_RATE, "12"),
        (ENV_DISKS, "4"),
        (ENV_COMPRESS_SHARDS, "yes"),
        (ENV_CACHE, "true"),
        (ENV_RANK, "3"),
    ]))?;

    assert_eq!(cfg.backend, BackendKind::DistributedDisk);
    assert_eq!(cfg.root, Path::new("/scratch/run1"));
    assert_eq!(cfg.disk_paths, vec![PathBuf::from("/mnt/a"), PathBuf::from("/mnt/b")]);
    assert_eq!(cfg.rate, 12);
    assert_eq!(cfg.disks, 4);
    assert!(cfg.compress_shards);
    assert!(!cfg.cache_bypass);
    assert_eq!(cfg.rank, Some(3));
    Ok(())
}

#[test]
fn blank_values_are_ignored() -> Result<()> {
    let cfg = StoreConfig::from_lookup(lookup_from(&[(ENV_RATE, "  "), (ENV_BACKEND, "")]))?;
    assert_eq!(cfg.rate, DEFAULT_RATE);
    assert_eq!(cfg.backend, BackendKind::Disk);
    Ok(())
}

#[test]
fn bad_number_names_the_variable() {
    let err = StoreConfig::from_lookup(lookup_from(&[(ENV_DISKS, "four")])).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { key: ENV_DISKS, .. }));
    assert!(err.to_string().contains("WAVECKPT_DISKS"));
}

#[test]
fn bad_bool_is_rejected() {
    let err = StoreConfig::from_lookup(lookup_from(&[(ENV_CACHE, "maybe")])).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { key: ENV_CACHE, .. }));
}

// -------------------- Validation --------------------

#[test]
fn zero_rate_and_disks_are_rejected() {
    assert_eq!(
        StoreConfig::from_lookup(lookup_from(&[(ENV_RATE, "0")])),
        Err(ConfigError::ZeroRate)
    );
    assert_eq!(
        StoreConfig::from_lookup(lookup_from(&[(ENV_DISKS, "0")])),
        Err(ConfigError::ZeroDisks)
    );
}

#[test]
fn more_paths_than_disks_is_rejected() {
    let res = StoreConfig::from_lookup(lookup_from(&[
        (ENV_DISKS, "2"),
        (ENV_DISK_PATHS, "/a,/b,/c"),
    ]));
    assert_eq!(
        res,
        Err(ConfigError::TooManyDiskPaths { paths: 3, disks: 2 })
    );
}

// -------------------- Naming --------------------

#[test]
fn disk_dirs_fall_back_to_root() {
    let cfg = StoreConfig {
        disks: 3,
        disk_paths: vec![PathBuf::from("/fast")],
        ..StoreConfig::new(BackendKind::DistributedDisk, "/data")
    };
    assert_eq!(cfg.disk_dir(0), Path::new("/fast"));
    assert_eq!(cfg.disk_dir(1), Path::new("/data/disk-1"));
    assert_eq!(cfg.disk_dir(2), Path::new("/data/disk-2"));
}

#[test]
fn file_name_includes_rank() {
    let mut cfg = StoreConfig::new(BackendKind::Disk, "/data");
    assert_eq!(cfg.file_name(), "wavefield.ckpt");
    cfg.rank = Some(7);
    assert_eq!(cfg.file_name(), "rank-7.ckpt");
}
