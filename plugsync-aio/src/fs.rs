/*
File: plugsync-aio/src/fs.rs
Purpose: Primitive synchronous filesystem operations used by the installer.
*/
use std::{
    fs::{self},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use plugsync_common::error::{PlugsyncError, Result};
use tempfile::NamedTempFile;
use tracing::{debug, error, warn};

/// Creates a directory and all its parent components if they are missing.
pub fn create_dir_all(path: &Path) -> Result<()> {
    debug!("Creating directory recursively: {}", path.display());
    fs::create_dir_all(path).map_err(|e| {
        error!("Failed create dir {}: {}", path.display(), e);
        PlugsyncError::from(e)
    })
}

/// Removes a file.
pub fn remove_file(path: &Path) -> Result<()> {
    debug!("Removing file: {}", path.display());
    fs::remove_file(path).map_err(|e| {
        if e.kind() != io::ErrorKind::NotFound {
            error!("Failed remove file {}: {}", path.display(), e);
        }
        PlugsyncError::from(e)
    })
}

/// Removes a file, treating "not found" as success. Returns whether a file
/// was actually removed.
pub fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed file: {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => {
            error!("Failed remove file {}: {}", path.display(), e);
            Err(PlugsyncError::from(e))
        }
    }
}

/// Copies a file, creating the destination's parent directory. Returns the
/// number of bytes copied.
pub fn copy_file(from: &Path, to: &Path) -> Result<u64> {
    debug!("Copying {} -> {}", from.display(), to.display());
    if let Some(parent) = to.parent() {
        create_dir_all(parent)?;
    }
    fs::copy(from, to).map_err(|e| {
        error!("Failed copy {} -> {}: {}", from.display(), to.display(), e);
        PlugsyncError::from(e)
    })
}

/// Moves a file. Tries a rename first and falls back to copying into a
/// temporary file beside `to` that is then renamed over it, so a failed
/// fallback never touches an existing destination.
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    debug!("Moving {} -> {}", from.display(), to.display());
    let dir = to
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    create_dir_all(dir)?;
    let rename_err = match fs::rename(from, to) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    debug!(
        "Rename {} -> {} failed ({}), falling back to copy",
        from.display(),
        to.display(),
        rename_err
    );
    let temp_file = NamedTempFile::new_in(dir)?;
    if let Err(copy_err) = fs::copy(from, temp_file.path()) {
        error!(
            "Failed move {} -> {}: {}",
            from.display(),
            to.display(),
            copy_err
        );
        return Err(PlugsyncError::from(copy_err));
    }
    temp_file
        .persist(to)
        .map_err(|e| PlugsyncError::from(e.error))?;
    if let Err(e) = fs::remove_file(from) {
        warn!(
            "Moved {} by copy but could not remove the source: {}",
            from.display(),
            e
        );
    }
    Ok(())
}

/// Atomically writes data to a file using a temporary file in the same
/// directory, synced to disk before the rename.
pub fn atomic_write_file(original_path: &Path, content: &[u8]) -> Result<()> {
    let dir = original_path.parent().ok_or_else(|| {
        PlugsyncError::IoError(format!(
            "Cannot get parent directory for {}",
            original_path.display()
        ))
    })?;

    create_dir_all(dir)?;

    let mut temp_file = NamedTempFile::new_in(dir)?;
    let temp_path = temp_file.path().to_path_buf();

    debug!(
        "Atomically writing {} bytes to {} via temp file {}",
        content.len(),
        original_path.display(),
        temp_path.display()
    );

    temp_file.write_all(content)?;
    temp_file.flush()?;
    temp_file.as_file().sync_all()?;

    temp_file.persist(original_path).map_err(|e| {
        error!(
            "Failed to persist/rename temporary file {} over {}: {}",
            temp_path.display(),
            original_path.display(),
            e.error
        );
        PlugsyncError::Io(Arc::new(e.error))
    })?;

    Ok(())
}

/// Regular files directly inside `dir_path` with their modification times.
/// Skips entries that cause errors during reading. A missing directory yields
/// an empty list.
pub fn list_files(dir_path: &Path) -> Result<Vec<(String, PathBuf, SystemTime)>> {
    debug!("Listing files in: {}", dir_path.display());
    let read_dir = match fs::read_dir(dir_path) {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            error!("Failed to read directory {}: {}", dir_path.display(), e);
            return Err(PlugsyncError::from(e));
        }
    };

    let mut files = Vec::new();
    for entry_res in read_dir {
        let entry = match entry_res {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Error reading entry in {}: {}", dir_path.display(), e);
                continue;
            }
        };
        let path = entry.path();
        match entry.metadata() {
            Ok(meta) if meta.is_file() => {
                let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                files.push((entry.file_name().to_string_lossy().to_string(), path, modified));
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to stat {}: {}", path.display(), e),
        }
    }
    Ok(files)
}

/// Subdirectories directly inside `dir_path`.
pub fn list_subdirs(dir_path: &Path) -> Result<Vec<(String, PathBuf)>> {
    let read_dir = match fs::read_dir(dir_path) {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(PlugsyncError::from(e)),
    };
    let mut dirs = Vec::new();
    for entry in read_dir.flatten() {
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            dirs.push((entry.file_name().to_string_lossy().to_string(), entry.path()));
        }
    }
    Ok(dirs)
}
