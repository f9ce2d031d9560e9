//! Small filesystem helpers shared by the catalog, container and archive
//! writers: temp paths, atomic publish and directory fsync.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::{Error, Result};

pub fn tmp_path_for(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::InvalidArgument(format!("missing filename for {}", path.display())))?
        .to_string_lossy();
    Ok(path.with_file_name(format!("{name}.tmp")))
}

pub fn fsync_dir(path: &Path) -> Result<()> {
    let dir = File::open(path).map_err(Error::at(path))?;
    dir.sync_all().map_err(Error::at(path))?;
    Ok(())
}

/// Serializes `value` as pretty JSON into `path` via a synced temp file and
/// a rename, so readers only ever observe a complete document.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = tmp_path_for(path)?;
    let data = serde_json::to_vec_pretty(value)?;
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp)
        .map_err(Error::at(&tmp))?;
    file.write_all(&data).map_err(Error::at(&tmp))?;
    file.sync_all().map_err(Error::at(&tmp))?;
    drop(file);
    std::fs::rename(&tmp, path).map_err(Error::at(path))?;
    if let Some(parent) = path.parent() {
        fsync_dir(parent)?;
    }
    Ok(())
}

/// Renames `temp` to `final_path`, failing if `final_path` already exists.
pub fn publish_no_replace(temp: &Path, final_path: &Path) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;
        let temp_c = CString::new(temp.as_os_str().as_bytes())
            .map_err(|_| Error::Corrupt("temp path contains null byte".to_string()))?;
        let final_c = CString::new(final_path.as_os_str().as_bytes())
            .map_err(|_| Error::Corrupt("path contains null byte".to_string()))?;
        let rc = unsafe {
            libc::renameat2(
                libc::AT_FDCWD,
                temp_c.as_ptr(),
                libc::AT_FDCWD,
                final_c.as_ptr(),
                libc::RENAME_NOREPLACE,
            )
        };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ENOSYS) && err.raw_os_error() != Some(libc::EINVAL) {
            return Err(Error::StorageIo {
                path: final_path.to_path_buf(),
                source: err,
            });
        }
    }

    if final_path.exists() {
        return Err(Error::StorageIo {
            path: final_path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::AlreadyExists, "already exists"),
        });
    }
    std::fs::rename(temp, final_path).map_err(Error::at(final_path))?;
    Ok(())
}
