// Per-pass human-readable text reports, one file per completed pass.

use crate::engine::SyncStatus;
use crate::error::{Result, SyncError};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub fn render(status: &SyncStatus) -> String {
    let mut out = String::new();
    out.push_str("Sync Report\n");
    out.push_str("===========\n\n");

    let _ = writeln!(out, "Time: {}", status.last_sync.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out, "Mode: {}", status.mode.as_str());
    let _ = writeln!(out, "Files uploaded: {}", status.files_uploaded);
    let _ = writeln!(out, "Files downloaded: {}", status.files_downloaded);
    let _ = writeln!(out, "Conflicts: {}", status.conflict_count);

    if !status.errors.is_empty() {
        out.push_str("\nErrors:\n");
        for (i, err) in status.errors.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, err);
        }
    }

    out
}

pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn save(&self, status: &SyncStatus) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let name = format!(
            "sync_report_{}.txt",
            status.last_sync.format("%Y%m%d_%H%M%S")
        );
        let path = self.dir.join(name);
        std::fs::write(&path, render(status))?;
        Ok(path)
    }

    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut reports = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if entry.file_type()?.is_file()
                && name.starts_with("sync_report_")
                && name.ends_with(".txt")
            {
                reports.push(entry.path());
            }
        }
        reports.sort();
        Ok(reports)
    }

    pub fn read(&self, path: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }

    pub fn delete(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(SyncError::Config(format!(
                "report file does not exist: {}",
                path.display()
            )));
        }
        std::fs::remove_file(path)?;
        Ok(())
    }
}
