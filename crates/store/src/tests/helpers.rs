use crate::*;
use field::{DType, Shape, Snapshot};
use std::io;
use std::path::Path;

/// 252 f32 elements: 1008 payload bytes, 1024-byte buffered slots.
pub fn shape_252() -> Shape {
    Shape::new(vec![252]).unwrap()
}

pub fn small_shape() -> Shape {
    Shape::new(vec![4, 3, 5]).unwrap()
}

/// Deterministic, index-dependent field values.
pub fn field_values(shape: &Shape, index: u64) -> Vec<f32> {
    (0..shape.elements())
        .map(|i| ((i as f32) * 0.37 + index as f32 * 1.3).sin() * (1.0 + index as f32))
        .collect()
}

pub fn snapshot(shape: &Shape, index: u64) -> Snapshot {
    Snapshot::from_f32(shape.clone(), &field_values(shape, index)).unwrap()
}

pub fn raw_descriptor(nt: u64, shape: Shape) -> RunDescriptor {
    RunDescriptor::new(nt, shape, DType::F32).unwrap()
}

/// Buffered-I/O config of `kind` rooted at `root`.
pub fn config(kind: BackendKind, root: &Path) -> StoreConfig {
    StoreConfig {
        cache_bypass: false,
        ..StoreConfig::new(kind, root)
    }
}

/// Writes `0..nt` through `backend` and closes it.
pub fn fill(backend: &mut dyn Backend, shape: &Shape) -> Result<(), StoreError> {
    backend.open(Mode::Write)?;
    for i in 0..backend.descriptor().nt {
        backend.write_snapshot(i, &snapshot(shape, i))?;
    }
    backend.close()
}

/// Wraps a backend and fails the write (or read) of one index with an I/O
/// error, as a full or vanished disk would.
pub struct Faulty<B: Backend> {
    pub inner: B,
    pub fail_write: Option<u64>,
    pub fail_read: Option<u64>,
}

impl<B: Backend> Faulty<B> {
    pub fn failing_write(inner: B, index: u64) -> Self {
        Self {
            inner,
            fail_write: Some(index),
            fail_read: None,
        }
    }

    pub fn failing_read(inner: B, index: u64) -> Self {
        Self {
            inner,
            fail_write: None,
            fail_read: Some(index),
        }
    }
}

fn disk_full(index: u64) -> StoreError {
    StoreError::Io {
        at: Location::index(index),
        source: io::Error::new(io::ErrorKind::Other, "no space left on device"),
    }
}

impl<B: Backend> Backend for Faulty<B> {
    fn open(&mut self, mode: Mode) -> Result<(), StoreError> {
        self.inner.open(mode)
    }

    fn write_snapshot(&mut self, index: u64, snapshot: &Snapshot) -> Result<(), StoreError> {
        if self.fail_write == Some(index) {
            return Err(disk_full(index));
        }
        self.inner.write_snapshot(index, snapshot)
    }

    fn read_snapshot(&mut self, index: u64) -> Result<Snapshot, StoreError> {
        if self.fail_read == Some(index) {
            return Err(disk_full(index));
        }
        self.inner.read_snapshot(index)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.inner.close()
    }

    fn descriptor(&self) -> &RunDescriptor {
        self.inner.descriptor()
    }

    fn mode(&self) -> Option<Mode> {
        self.inner.mode()
    }

    fn stats(&self) -> IoStats {
        self.inner.stats()
    }
}
