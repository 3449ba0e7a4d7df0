//! Filesystem helpers for working copies and tool homes

use crate::core::error::ScmError;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Create a directory (and parents) with the given mode.
pub async fn mkdir(path: &Path, mode: u32) -> Result<(), ScmError> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| ScmError::io(path, e))?;
    set_mode(path, mode).await
}

/// Remove a directory tree. A missing directory is not an error.
pub async fn rmdir(path: &Path) -> Result<(), ScmError> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ScmError::io(path, e)),
    }
}

pub async fn exists(path: &Path) -> Result<bool, ScmError> {
    fs::try_exists(path).await.map_err(|e| ScmError::io(path, e))
}

/// Write a file, replacing any content, and restrict it to `mode`.
///
/// A new file is created with `mode` already set; an existing file keeps
/// its inode and has its permissions replaced.
pub async fn write(path: &Path, content: &[u8], mode: u32) -> Result<(), ScmError> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(mode);

    let mut file = options.open(path).await.map_err(|e| ScmError::io(path, e))?;
    set_mode(path, mode).await?;
    file.write_all(content)
        .await
        .map_err(|e| ScmError::io(path, e))?;
    file.flush().await.map_err(|e| ScmError::io(path, e))
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<(), ScmError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| ScmError::io(path, e))
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> Result<(), ScmError> {
    Ok(())
}
