//! Free-space queries for the recordings volume.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Reports free bytes on the storage backing the recordings directory.
pub trait SpaceProbe: Send {
    fn free_bytes(&self) -> Result<u64>;
}

/// Treats the recordings directory as a volume of `capacity_bytes`; free
/// space is whatever the files in it don't use.
pub struct QuotaProbe {
    dir: PathBuf,
    capacity_bytes: u64,
}

impl QuotaProbe {
    pub fn new(dir: impl Into<PathBuf>, capacity_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            capacity_bytes,
        }
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    pub fn used_bytes(&self) -> Result<u64> {
        dir_size(&self.dir)
    }
}

impl SpaceProbe for QuotaProbe {
    fn free_bytes(&self) -> Result<u64> {
        Ok(self.capacity_bytes.saturating_sub(self.used_bytes()?))
    }
}

/// Fixed answer, handy for tests and for volumes without a quota.
pub struct FixedProbe(pub u64);

impl SpaceProbe for FixedProbe {
    fn free_bytes(&self) -> Result<u64> {
        Ok(self.0)
    }
}

fn dir_size(dir: &Path) -> Result<u64> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut total = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_file() {
            total += meta.len();
        }
    }
    Ok(total)
}
