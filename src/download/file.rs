//! File descriptors handed to downloaders.

use std::path::{Component, Path, PathBuf};

use tokio::fs::File;

use crate::error::{Result, TollgateError};

/// An opened file under the served root.
///
/// The file is opened during resolution, so a descriptor stays readable even
/// if the path is removed or replaced afterwards.
#[derive(Debug)]
pub struct FileInfo {
    /// Canonical path on disk
    pub path: PathBuf,
    /// Size in bytes of the opened file
    pub size: u64,
    file: File,
}

impl FileInfo {
    /// Resolve and open `relative` under `root`.
    ///
    /// Only plain path segments are accepted; absolute paths, `.` and `..`
    /// are rejected. Symlinks are followed, but the final target must still
    /// lie inside `root`.
    pub async fn resolve(root: &Path, relative: &str) -> Result<Self> {
        let relative = Path::new(relative);
        if relative.as_os_str().is_empty()
            || !relative.components().all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(invalid(relative));
        }

        let root = tokio::fs::canonicalize(root).await?;
        let path = tokio::fs::canonicalize(root.join(relative))
            .await
            .map_err(|e| not_found_or(e, relative))?;
        if !path.starts_with(&root) {
            return Err(invalid(relative));
        }

        let file = File::open(&path)
            .await
            .map_err(|e| not_found_or(e, relative))?;
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(TollgateError::NotFound(relative.display().to_string()));
        }

        Ok(Self {
            path,
            size: metadata.len(),
            file,
        })
    }

    /// Final path segment, used as the download name.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    /// Mutable access to the open file for reading.
    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    /// Give up the descriptor, keeping only the open file.
    pub fn into_file(self) -> File {
        self.file
    }
}

fn invalid(relative: &Path) -> TollgateError {
    TollgateError::InvalidPath(relative.display().to_string())
}

fn not_found_or(err: std::io::Error, relative: &Path) -> TollgateError {
    if err.kind() == std::io::ErrorKind::NotFound {
        TollgateError::NotFound(relative.display().to_string())
    } else {
        err.into()
    }
}
