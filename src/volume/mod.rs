//! Volume placement.
//!
//! A [`VolumeSource`] supplies the live candidate list (usage figures are
//! refreshed outside the store) and a [`VolumeSelector`] picks the volume a
//! new container is written to.

mod selector;

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

pub use selector::{SelectionStrategy, VolumeSelector};

/// A physical storage location candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub path: PathBuf,
    pub node: String,
    pub bytes_used: u64,
    pub bytes_total: u64,
}

impl Volume {
    pub fn new(path: impl Into<PathBuf>, node: impl Into<String>, bytes_used: u64, bytes_total: u64) -> Self {
        Self {
            path: path.into(),
            node: node.into(),
            bytes_used,
            bytes_total,
        }
    }

    pub fn free_bytes(&self) -> u64 {
        self.bytes_total.saturating_sub(self.bytes_used)
    }

    /// Free space as a fraction of capacity; 0 when capacity is unknown.
    pub fn free_fraction(&self) -> f64 {
        if self.bytes_total == 0 {
            0.0
        } else {
            self.free_bytes() as f64 / self.bytes_total as f64
        }
    }
}

/// Supplies the current candidate volumes.
pub trait VolumeSource: Send + Sync {
    fn volumes(&self) -> Result<Vec<Volume>>;
}

/// A candidate list replaced wholesale by whoever tracks usage.
#[derive(Debug, Default)]
pub struct StaticVolumes {
    volumes: RwLock<Vec<Volume>>,
}

impl StaticVolumes {
    pub fn new(volumes: Vec<Volume>) -> Self {
        Self {
            volumes: RwLock::new(volumes),
        }
    }

    pub fn replace(&self, volumes: Vec<Volume>) {
        let mut guard = self
            .volumes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = volumes;
    }
}

impl VolumeSource for StaticVolumes {
    fn volumes(&self) -> Result<Vec<Volume>> {
        Ok(self
            .volumes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }
}

/// Local directories whose usage is read from the filesystem on every call.
#[derive(Debug, Clone)]
pub struct DirectoryVolumes {
    node: String,
    paths: Vec<PathBuf>,
}

impl DirectoryVolumes {
    pub fn new(node: impl Into<String>, paths: Vec<PathBuf>) -> Self {
        Self {
            node: node.into(),
            paths,
        }
    }
}

impl VolumeSource for DirectoryVolumes {
    fn volumes(&self) -> Result<Vec<Volume>> {
        let mut volumes = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            std::fs::create_dir_all(path).map_err(Error::at(path))?;
            let (used, total) = disk_usage(path)?;
            volumes.push(Volume::new(path.clone(), self.node.clone(), used, total));
        }
        Ok(volumes)
    }
}

#[cfg(unix)]
fn disk_usage(path: &Path) -> Result<(u64, u64)> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::Corrupt(format!("volume path {} contains null byte", path.display())))?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(Error::at(path)(std::io::Error::last_os_error()));
    }
    let fragment = stat.f_frsize as u64;
    let total = stat.f_blocks as u64 * fragment;
    let available = stat.f_bavail as u64 * fragment;
    Ok((total.saturating_sub(available), total))
}

#[cfg(not(unix))]
fn disk_usage(_path: &Path) -> Result<(u64, u64)> {
    Ok((0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn free_space_figures() {
        let volume = Volume::new("/v", "n", 25, 100);
        assert_eq!(volume.free_bytes(), 75);
        assert!((volume.free_fraction() - 0.75).abs() < f64::EPSILON);
        assert_eq!(Volume::new("/v", "n", 200, 100).free_bytes(), 0);
        assert_eq!(Volume::new("/v", "n", 0, 0).free_fraction(), 0.0);
    }

    #[test]
    fn static_volumes_can_be_refreshed() {
        let source = StaticVolumes::new(vec![Volume::new("/a", "n", 0, 10)]);
        assert_eq!(source.volumes().expect("volumes").len(), 1);
        source.replace(vec![]);
        assert!(source.volumes().expect("volumes").is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn directory_volumes_report_capacity() {
        let dir = tempdir().expect("tempdir");
        let source = DirectoryVolumes::new("local", vec![dir.path().join("v1")]);
        let volumes = source.volumes().expect("volumes");
        assert_eq!(volumes.len(), 1);
        assert!(volumes[0].bytes_total > 0);
        assert!(volumes[0].path.exists());
    }
}
