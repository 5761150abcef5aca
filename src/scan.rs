use crate::error::{Result, SyncError};
use std::path::PathBuf;
use std::time::SystemTime;
use walkdir::WalkDir;

/// One file in a local snapshot. Directories are not carried; the remote
/// side has no real directories and empty ones are not reconciled.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub path: PathBuf,
    pub relative: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

pub struct Scanner {
    root: PathBuf,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn scan(&self) -> Result<Vec<LocalFile>> {
        if !self.root.exists() {
            return Err(SyncError::LocalPathMissing {
                path: self.root.clone(),
            });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| SyncError::WalkError {
                path: self.root.clone(),
                source: std::io::Error::other(e.to_string()),
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path().to_path_buf();
            let relative = path
                .strip_prefix(&self.root)
                .map_err(|_| SyncError::InvalidPath { path: path.clone() })?
                .to_path_buf();

            let metadata = entry.metadata().map_err(|e| SyncError::WalkError {
                path: path.clone(),
                source: std::io::Error::other(e.to_string()),
            })?;

            files.push(LocalFile {
                size: metadata.len(),
                modified: metadata.modified()?,
                path,
                relative,
            });
        }

        Ok(files)
    }
}
