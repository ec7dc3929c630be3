//! Filesystem helpers shared by the store

use std::path::Path;

use osforge_errors::{Error, StoreError};
use tokio::fs;
use tokio::process::Command;

/// Copy the contents of `src` into `dest`, preserving ownership, modes,
/// links and special files. Shares extents where the filesystem allows.
///
/// # Errors
/// Returns `StoreError::CopyFailed` if `cp` cannot be run or fails.
pub async fn copy_tree(src: &Path, dest: &Path) -> Result<(), Error> {
    fs::create_dir_all(dest)
        .await
        .map_err(|e| StoreError::from_io_with_path(&e, dest))?;

    let output = Command::new("cp")
        .arg("-a")
        .arg("--reflink=auto")
        .arg("--")
        .arg(src.join("."))
        .arg(dest)
        .output()
        .await
        .map_err(|e| StoreError::CopyFailed {
            message: format!("cannot run cp: {e}"),
        })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(StoreError::CopyFailed {
            message: format!(
                "{} -> {}: {}",
                src.display(),
                dest.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        }
        .into())
    }
}

/// Remove a directory tree; a missing path is not an error.
///
/// # Errors
/// Returns an error if removal fails for any other reason.
pub async fn remove_tree(path: &Path) -> Result<(), Error> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::from_io_with_path(&e, path).into()),
    }
}

/// Empty `dir`, keeping the directory itself.
///
/// # Errors
/// Returns an error if an entry cannot be removed.
pub async fn clear_dir(dir: &Path) -> Result<(), Error> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| StoreError::from_io_with_path(&e, dir))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StoreError::from_io_with_path(&e, dir))?
    {
        let path = entry.path();
        let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
        if is_dir {
            remove_tree(&path).await?;
        } else {
            fs::remove_file(&path)
                .await
                .map_err(|e| StoreError::from_io_with_path(&e, &path))?;
        }
    }
    Ok(())
}
