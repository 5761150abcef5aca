// Divergence detection and resolution.
//
// A conflict is a path modified on both sides since the baseline whose
// content hashes differ. Detection runs only during full-mode passes and
// costs O(changed files) hash computations. Resolution applies one of four
// policies; `both` keeps both copies and never deletes the remote object.

use crate::error::{Result, SyncError};
use crate::hash;
use crate::rules::{RuleStore, SyncRule};
use crate::scan::Scanner;
use crate::store::{join_key, relative_key, with_deadline, ObjectMetadata, ObjectStore};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, SystemTime};

/// Lifecycle of a conflict entry: starts pending, transitions to exactly
/// one terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Pending,
    Local,
    Remote,
    Both,
    Skip,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Pending => "pending",
            Resolution::Local => "local",
            Resolution::Remote => "remote",
            Resolution::Both => "both",
            Resolution::Skip => "skip",
        }
    }
}

/// A resolution the caller can apply. Parsed from configuration; unknown
/// strings are rejected there rather than mid-pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionPolicy {
    Local,
    Remote,
    Both,
    Skip,
}

impl ResolutionPolicy {
    fn as_resolution(&self) -> Resolution {
        match self {
            ResolutionPolicy::Local => Resolution::Local,
            ResolutionPolicy::Remote => Resolution::Remote,
            ResolutionPolicy::Both => Resolution::Both,
            ResolutionPolicy::Skip => Resolution::Skip,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.as_resolution().as_str()
    }
}

impl FromStr for ResolutionPolicy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(ResolutionPolicy::Local),
            "remote" => Ok(ResolutionPolicy::Remote),
            "both" => Ok(ResolutionPolicy::Both),
            "skip" => Ok(ResolutionPolicy::Skip),
            other => Err(SyncError::InvalidResolution(other.to_string())),
        }
    }
}

/// Store-wide default applied by the engine right after detection.
/// `Ask` defers every conflict to an external decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultResolution {
    Local,
    Remote,
    Both,
    Skip,
    Ask,
}

impl DefaultResolution {
    pub fn policy(&self) -> Option<ResolutionPolicy> {
        match self {
            DefaultResolution::Local => Some(ResolutionPolicy::Local),
            DefaultResolution::Remote => Some(ResolutionPolicy::Remote),
            DefaultResolution::Both => Some(ResolutionPolicy::Both),
            DefaultResolution::Skip => Some(ResolutionPolicy::Skip),
            DefaultResolution::Ask => None,
        }
    }
}

impl FromStr for DefaultResolution {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(DefaultResolution::Local),
            "remote" => Ok(DefaultResolution::Remote),
            "both" => Ok(DefaultResolution::Both),
            "skip" => Ok(DefaultResolution::Skip),
            "ask" => Ok(DefaultResolution::Ask),
            other => Err(SyncError::InvalidResolution(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictEntry {
    /// Absolute local path of the diverged file.
    pub path: PathBuf,
    pub local_mtime: SystemTime,
    pub remote_mtime: SystemTime,
    pub resolution: Resolution,
}

/// Flags files changed on both sides since the last baseline.
pub struct ConflictDetector<'a> {
    store: &'a dyn ObjectStore,
    baseline: SystemTime,
    deadline: Duration,
}

impl<'a> ConflictDetector<'a> {
    pub fn new(store: &'a dyn ObjectStore, baseline: SystemTime, deadline: Duration) -> Self {
        Self {
            store,
            baseline,
            deadline,
        }
    }

    pub async fn detect(&self, rule: &SyncRule) -> Result<Vec<ConflictEntry>> {
        let local_files = Scanner::new(&rule.local_path).scan()?;

        let listing = with_deadline(
            self.deadline,
            "list",
            self.store.list(&rule.remote_path, true),
        )
        .await?;

        let mut remote: HashMap<String, ObjectMetadata> = HashMap::new();
        for meta in listing {
            if meta.is_dir {
                continue;
            }
            if let Some(rel) = relative_key(&rule.remote_path, &meta.key) {
                remote.insert(rel.to_string(), meta);
            }
        }

        let mut conflicts = Vec::new();
        for local in &local_files {
            let rel = local.relative.to_string_lossy().replace('\\', "/");
            let Some(remote_meta) = remote.get(&rel) else {
                continue;
            };

            // Only files touched on both sides since the baseline can
            // conflict; everything else the transfer decision handles.
            if local.modified <= self.baseline || remote_meta.modified <= self.baseline {
                continue;
            }

            let local_hash = hash::hash_file(&local.path).await?;
            let remote_data = with_deadline(
                self.deadline,
                "get",
                self.store.get(&remote_meta.key),
            )
            .await?;

            // Equal hashes mean both sides converged on the same content.
            if local_hash == hash::hash_bytes(&remote_data) {
                continue;
            }

            tracing::debug!(path = %local.path.display(), "conflict detected");
            conflicts.push(ConflictEntry {
                path: local.path.clone(),
                local_mtime: local.modified,
                remote_mtime: remote_meta.modified,
                resolution: Resolution::Pending,
            });
        }

        Ok(conflicts)
    }
}

/// Applies a resolution policy to pending conflict entries.
pub struct ConflictResolver<'a> {
    store: &'a dyn ObjectStore,
    rules: &'a [SyncRule],
    deadline: Duration,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(store: &'a dyn ObjectStore, rules: &'a [SyncRule], deadline: Duration) -> Self {
        Self {
            store,
            rules,
            deadline,
        }
    }

    pub async fn resolve_one(
        &self,
        entry: &mut ConflictEntry,
        policy: ResolutionPolicy,
    ) -> Result<()> {
        match entry.resolution {
            Resolution::Pending => {}
            // Re-applying the same terminal policy is permitted but must
            // not move data again: a second `both` would rename the
            // canonical file onto the preserved copy and destroy it.
            r if r == policy.as_resolution() => return Ok(()),
            other => {
                return Err(SyncError::ConflictAlreadyResolved {
                    path: entry.path.clone(),
                    resolution: other.as_str().to_string(),
                })
            }
        }

        let key = self.remote_key_for(&entry.path);
        match policy {
            ResolutionPolicy::Local => {
                let data = tokio::fs::read(&entry.path).await?;
                with_deadline(
                    self.deadline,
                    "put",
                    self.store.put(&key, data, "application/octet-stream"),
                )
                .await?;
            }
            ResolutionPolicy::Remote => {
                let data = with_deadline(self.deadline, "get", self.store.get(&key)).await?;
                tokio::fs::write(&entry.path, data).await?;
            }
            ResolutionPolicy::Both => {
                let renamed = conflict_rename(&entry.path, Local::now());
                tokio::fs::rename(&entry.path, &renamed).await?;
                let data = with_deadline(self.deadline, "get", self.store.get(&key)).await?;
                tokio::fs::write(&entry.path, data).await?;
            }
            ResolutionPolicy::Skip => {}
        }

        entry.resolution = policy.as_resolution();
        tracing::info!(path = %entry.path.display(), policy = policy.as_str(), "conflict resolved");
        Ok(())
    }

    /// Apply one policy to every entry still pending. Per-entry failures
    /// are collected; the rest of the set is still processed.
    pub async fn resolve_all(
        &self,
        entries: &mut [ConflictEntry],
        policy: ResolutionPolicy,
    ) -> Vec<String> {
        let mut errors = Vec::new();
        for entry in entries.iter_mut() {
            if entry.resolution != Resolution::Pending {
                continue;
            }
            if let Err(e) = self.resolve_one(entry, policy).await {
                errors.push(format!(
                    "failed to resolve conflict for {}: {}",
                    entry.path.display(),
                    e
                ));
            }
        }
        errors
    }

    /// Map a local file to its remote key via the owning rule; files outside
    /// every rule root fall back to their bare file name.
    fn remote_key_for(&self, local: &Path) -> String {
        if let Some(rule) = RuleStore::rule_for_local_path(self.rules, local) {
            if let Ok(rel) = local.strip_prefix(&rule.local_path) {
                return join_key(&rule.remote_path, rel);
            }
        }
        local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Timestamp-suffixed sibling name used by the `both` policy:
/// `report.txt` becomes `report_local_20240131_120000.txt`.
pub fn conflict_rename(path: &Path, when: DateTime<Local>) -> PathBuf {
    let stamp = when.format("%Y%m%d_%H%M%S");
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_local_{}.{}", stem, stamp, ext.to_string_lossy()),
        None => format!("{}_local_{}", stem, stamp),
    };
    path.with_file_name(name)
}
