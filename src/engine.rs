// The reconciliation engine: one pass per enabled rule under the selected
// mode. Two independently-mutating stores, no shared lock, only timestamps
// and content hashes as evidence; every decision lives here.
//
// Failure semantics: a per-file transfer failure is appended to the pass's
// error list and processing continues; a rule whose local path is missing
// is reported as a rule-level error and skipped; nothing aborts the pass.

use crate::conflict::{
    ConflictDetector, ConflictEntry, ConflictResolver, DefaultResolution, Resolution,
    ResolutionPolicy,
};
use crate::error::{Result, SyncError};
use crate::filter::FilterSet;
use crate::hash;
use crate::rules::SyncRule;
use crate::scan::{LocalFile, Scanner};
use crate::store::{join_key, relative_key, with_deadline, ObjectMetadata, ObjectStore};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const CONTENT_TYPE: &str = "application/octet-stream";

/// Default per-store-call deadline. A hung network call fails the file,
/// not the scheduler loop.
pub const DEFAULT_STORE_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Full,
    Selective,
    Backup,
    Incremental,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Full => "full",
            SyncMode::Selective => "selective",
            SyncMode::Backup => "backup",
            SyncMode::Incremental => "incremental",
        }
    }
}

impl FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(SyncMode::Full),
            "selective" => Ok(SyncMode::Selective),
            "backup" => Ok(SyncMode::Backup),
            "incremental" => Ok(SyncMode::Incremental),
            other => Err(SyncError::InvalidMode(other.to_string())),
        }
    }
}

/// Ephemeral per-pass result; finalized at pass end and then converted
/// into a history entry.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub running: bool,
    pub last_sync: DateTime<Utc>,
    pub files_uploaded: usize,
    pub files_downloaded: usize,
    pub conflict_count: usize,
    pub errors: Vec<String>,
    pub mode: SyncMode,
}

impl SyncStatus {
    pub fn begin(mode: SyncMode) -> Self {
        Self {
            running: true,
            last_sync: Utc::now(),
            files_uploaded: 0,
            files_downloaded: 0,
            conflict_count: 0,
            errors: Vec::new(),
            mode,
        }
    }
}

pub struct ReconciliationEngine {
    store: Arc<dyn ObjectStore>,
    deadline: Duration,
    /// Low-water mark for "changed since last pass"; monotonically
    /// non-decreasing, advanced at the end of full and incremental passes.
    baseline: SystemTime,
    pending: Vec<ConflictEntry>,
    default_resolution: DefaultResolution,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            deadline: DEFAULT_STORE_DEADLINE,
            baseline: UNIX_EPOCH,
            pending: Vec::new(),
            default_resolution: DefaultResolution::Ask,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn baseline(&self) -> SystemTime {
        self.baseline
    }

    pub fn set_default_resolution(&mut self, resolution: DefaultResolution) {
        self.default_resolution = resolution;
    }

    pub fn default_resolution(&self) -> DefaultResolution {
        self.default_resolution
    }

    pub fn pending_conflicts(&self) -> &[ConflictEntry] {
        &self.pending
    }

    pub fn has_pending_conflicts(&self) -> bool {
        self.pending
            .iter()
            .any(|e| e.resolution == Resolution::Pending)
    }

    /// Run one reconciliation pass over the given rules. Never fails as a
    /// whole; per-file and per-rule errors are accumulated in the status.
    pub async fn run_pass(&mut self, rules: &[SyncRule], mode: SyncMode) -> SyncStatus {
        let mut status = SyncStatus::begin(mode);
        tracing::info!(mode = mode.as_str(), rules = rules.len(), "starting pass");

        match mode {
            SyncMode::Full => self.full_pass(rules, &mut status).await,
            SyncMode::Incremental => self.incremental_pass(rules, &mut status).await,
            SyncMode::Selective => self.selective_pass(rules, &mut status).await,
            SyncMode::Backup => self.backup_pass(rules, &mut status).await,
        }

        status.running = false;
        tracing::info!(
            uploaded = status.files_uploaded,
            downloaded = status.files_downloaded,
            conflicts = status.conflict_count,
            errors = status.errors.len(),
            "pass complete"
        );
        status
    }

    pub async fn resolve_conflict(
        &mut self,
        rules: &[SyncRule],
        path: &Path,
        policy: ResolutionPolicy,
    ) -> Result<()> {
        let resolver = ConflictResolver::new(self.store.as_ref(), rules, self.deadline);
        let entry = self
            .pending
            .iter_mut()
            .find(|e| e.path == path)
            .ok_or_else(|| SyncError::ConflictNotFound {
                path: path.to_path_buf(),
            })?;
        resolver.resolve_one(entry, policy).await
    }

    pub async fn resolve_all_conflicts(
        &mut self,
        rules: &[SyncRule],
        policy: ResolutionPolicy,
    ) -> Vec<String> {
        let resolver = ConflictResolver::new(self.store.as_ref(), rules, self.deadline);
        resolver.resolve_all(&mut self.pending, policy).await
    }

    // --- mode algorithms ---

    /// Full: conflict detection (and automatic resolution when configured),
    /// then the plain transfer decision over both trees. The upload and
    /// download sub-passes run sequentially, not interleaved; a remote
    /// write landing between them can be overwritten by the later
    /// sub-pass. Known race; the store offers no snapshot isolation.
    async fn full_pass(&mut self, rules: &[SyncRule], status: &mut SyncStatus) {
        for rule in rules.iter().filter(|r| r.enabled) {
            self.detect_and_resolve(rules, rule, status).await;

            if rule.direction.uploads() {
                if let Err(e) = self.sync_up(rule, None, None, status).await {
                    status
                        .errors
                        .push(format!("sync rule '{}' upload failed: {}", rule.name, e));
                }
            }
            if rule.direction.downloads() {
                if let Err(e) = self.sync_down(rule, None, None, status).await {
                    status
                        .errors
                        .push(format!("sync rule '{}' download failed: {}", rule.name, e));
                }
            }
        }
        self.baseline = SystemTime::now();
    }

    /// Incremental: same transfer logic, but only files/objects modified
    /// after the baseline are considered. Rule filters apply to both
    /// directions.
    async fn incremental_pass(&mut self, rules: &[SyncRule], status: &mut SyncStatus) {
        let since = self.baseline;
        for rule in rules.iter().filter(|r| r.enabled) {
            let filters = match rule.filter_set() {
                Ok(f) => f,
                Err(e) => {
                    status
                        .errors
                        .push(format!("sync rule '{}' has invalid filters: {}", rule.name, e));
                    continue;
                }
            };

            if rule.direction.uploads() {
                if let Err(e) = self.sync_up(rule, Some(since), Some(&filters), status).await {
                    status
                        .errors
                        .push(format!("sync rule '{}' upload failed: {}", rule.name, e));
                }
            }
            if rule.direction.downloads() {
                if let Err(e) = self
                    .sync_down(rule, Some(since), Some(&filters), status)
                    .await
                {
                    status
                        .errors
                        .push(format!("sync rule '{}' download failed: {}", rule.name, e));
                }
            }
        }
        self.baseline = SystemTime::now();
    }

    /// Selective: rule filters narrow both directions; timestamps and the
    /// baseline are otherwise honored as in a full pass. Does not advance
    /// the baseline.
    async fn selective_pass(&mut self, rules: &[SyncRule], status: &mut SyncStatus) {
        for rule in rules.iter().filter(|r| r.enabled) {
            let filters = match rule.filter_set() {
                Ok(f) => f,
                Err(e) => {
                    status
                        .errors
                        .push(format!("sync rule '{}' has invalid filters: {}", rule.name, e));
                    continue;
                }
            };

            if rule.direction.uploads() {
                if let Err(e) = self.sync_up(rule, None, Some(&filters), status).await {
                    status
                        .errors
                        .push(format!("sync rule '{}' upload failed: {}", rule.name, e));
                }
            }
            if rule.direction.downloads() {
                if let Err(e) = self.sync_down(rule, None, Some(&filters), status).await {
                    status
                        .errors
                        .push(format!("sync rule '{}' download failed: {}", rule.name, e));
                }
            }
        }
    }

    /// Backup: ignores timestamps and the baseline entirely. Each pass
    /// uploads the whole local tree into a fresh timestamped remote folder
    /// as an immutable snapshot. Append-only, never conflicts.
    async fn backup_pass(&mut self, rules: &[SyncRule], status: &mut SyncStatus) {
        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();

        for rule in rules.iter().filter(|r| r.enabled) {
            let backup_prefix = format!(
                "{}/backup_{}",
                rule.remote_path.trim_end_matches('/'),
                stamp
            );

            if let Err(e) = with_deadline(
                self.deadline,
                "create_folder",
                self.store.create_folder(&backup_prefix),
            )
            .await
            {
                status.errors.push(format!(
                    "failed to create backup folder for rule '{}': {}",
                    rule.name, e
                ));
                continue;
            }

            let local_files = match Scanner::new(&rule.local_path).scan() {
                Ok(files) => files,
                Err(e) => {
                    status
                        .errors
                        .push(format!("sync rule '{}' backup failed: {}", rule.name, e));
                    continue;
                }
            };

            for file in &local_files {
                let key = join_key(&backup_prefix, &file.relative);
                if let Err(e) = self.upload_file(file, &key).await {
                    status
                        .errors
                        .push(format!("failed to upload {}: {}", file.path.display(), e));
                } else {
                    status.files_uploaded += 1;
                }
            }
        }
    }

    // --- conflict handling (full mode only) ---

    async fn detect_and_resolve(
        &mut self,
        all_rules: &[SyncRule],
        rule: &SyncRule,
        status: &mut SyncStatus,
    ) {
        let detector = ConflictDetector::new(self.store.as_ref(), self.baseline, self.deadline);
        let detected = match detector.detect(rule).await {
            Ok(detected) => detected,
            Err(e) => {
                status.errors.push(format!(
                    "conflict detection failed for rule '{}': {}",
                    rule.name, e
                ));
                return;
            }
        };
        if detected.is_empty() {
            return;
        }

        status.conflict_count += detected.len();
        let paths: Vec<_> = detected.iter().map(|e| e.path.clone()).collect();

        // A re-detected path replaces its prior pending entry instead of
        // duplicating it; resolved entries stay as a record of the outcome.
        for entry in detected {
            let existing = self
                .pending
                .iter()
                .position(|p| p.path == entry.path && p.resolution == Resolution::Pending);
            match existing {
                Some(idx) => self.pending[idx] = entry,
                None => self.pending.push(entry),
            }
        }

        if let Some(policy) = self.default_resolution.policy() {
            let resolver = ConflictResolver::new(self.store.as_ref(), all_rules, self.deadline);
            for path in &paths {
                let entry = self
                    .pending
                    .iter_mut()
                    .find(|p| &p.path == path && p.resolution == Resolution::Pending);
                if let Some(entry) = entry {
                    if let Err(e) = resolver.resolve_one(entry, policy).await {
                        status.errors.push(format!(
                            "failed to resolve conflict for {}: {}",
                            path.display(),
                            e
                        ));
                    }
                }
            }
        }
    }

    // --- one-directional primitives ---

    async fn sync_up(
        &self,
        rule: &SyncRule,
        changed_since: Option<SystemTime>,
        filters: Option<&FilterSet>,
        status: &mut SyncStatus,
    ) -> Result<()> {
        let local_files = Scanner::new(&rule.local_path).scan()?;
        let remote = self.remote_snapshot(&rule.remote_path, true).await?;

        for file in &local_files {
            if filters.is_some_and(|f| f.excludes(&file.relative)) {
                continue;
            }
            if changed_since.is_some_and(|since| file.modified <= since) {
                continue;
            }

            let rel = rel_string(&file.relative);
            let key = join_key(&rule.remote_path, &file.relative);

            match self.should_upload(file, remote.get(&rel), &key).await {
                Ok(false) => {}
                Ok(true) => {
                    if let Err(e) = self.upload_file(file, &key).await {
                        status
                            .errors
                            .push(format!("failed to upload {}: {}", file.path.display(), e));
                    } else {
                        tracing::debug!(path = %file.path.display(), key, "uploaded");
                        status.files_uploaded += 1;
                    }
                }
                Err(e) => {
                    status
                        .errors
                        .push(format!("failed to compare {}: {}", file.path.display(), e));
                }
            }
        }

        Ok(())
    }

    async fn sync_down(
        &self,
        rule: &SyncRule,
        changed_since: Option<SystemTime>,
        filters: Option<&FilterSet>,
        status: &mut SyncStatus,
    ) -> Result<()> {
        tokio::fs::create_dir_all(&rule.local_path).await?;

        let listing = with_deadline(
            self.deadline,
            "list",
            self.store.list(&rule.remote_path, true),
        )
        .await?;

        let mut local: HashMap<String, LocalFile> = HashMap::new();
        for file in Scanner::new(&rule.local_path).scan()? {
            local.insert(rel_string(&file.relative), file);
        }

        for meta in &listing {
            if meta.is_dir {
                continue;
            }
            let Some(rel) = relative_key(&rule.remote_path, &meta.key) else {
                continue;
            };
            if filters.is_some_and(|f| f.excludes(Path::new(rel))) {
                continue;
            }
            if changed_since.is_some_and(|since| meta.modified <= since) {
                continue;
            }

            match self.should_download(meta, local.get(rel)).await {
                Ok(false) => {}
                Ok(true) => {
                    let dest = rule.local_path.join(rel);
                    if let Err(e) = self.download_object(meta, &dest).await {
                        status
                            .errors
                            .push(format!("failed to download {}: {}", meta.key, e));
                    } else {
                        tracing::debug!(key = %meta.key, path = %dest.display(), "downloaded");
                        status.files_downloaded += 1;
                    }
                }
                Err(e) => {
                    status
                        .errors
                        .push(format!("failed to compare {}: {}", meta.key, e));
                }
            }
        }

        Ok(())
    }

    /// Transfer decision, upload direction: transfer when the remote side
    /// lacks the entry or the local mtime is strictly newer. On an exact
    /// mtime tie the content hashes break it, so coinciding clocks cannot
    /// mask genuine divergence.
    async fn should_upload(
        &self,
        local: &LocalFile,
        remote: Option<&ObjectMetadata>,
        key: &str,
    ) -> Result<bool> {
        let Some(remote) = remote else {
            return Ok(true);
        };
        if local.modified > remote.modified {
            return Ok(true);
        }
        if local.modified < remote.modified {
            return Ok(false);
        }
        let local_hash = hash::hash_file(&local.path).await?;
        let data = with_deadline(self.deadline, "get", self.store.get(key)).await?;
        Ok(local_hash != hash::hash_bytes(&data))
    }

    /// Transfer decision, download direction; mirror of `should_upload`.
    async fn should_download(
        &self,
        remote: &ObjectMetadata,
        local: Option<&LocalFile>,
    ) -> Result<bool> {
        let Some(local) = local else {
            return Ok(true);
        };
        if remote.modified > local.modified {
            return Ok(true);
        }
        if remote.modified < local.modified {
            return Ok(false);
        }
        let local_hash = hash::hash_file(&local.path).await?;
        let data = with_deadline(self.deadline, "get", self.store.get(&remote.key)).await?;
        Ok(local_hash != hash::hash_bytes(&data))
    }

    async fn upload_file(&self, file: &LocalFile, key: &str) -> Result<()> {
        let data = tokio::fs::read(&file.path).await?;
        with_deadline(
            self.deadline,
            "put",
            self.store.put(key, data, CONTENT_TYPE),
        )
        .await
    }

    async fn download_object(&self, meta: &ObjectMetadata, dest: &Path) -> Result<()> {
        let data = with_deadline(self.deadline, "get", self.store.get(&meta.key)).await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, data).await?;
        // Stamp the remote mtime so the next pass sees the file as in sync.
        let _ = filetime::set_file_mtime(dest, filetime::FileTime::from_system_time(meta.modified));
        Ok(())
    }

    /// Remote listing mapped to relative paths. Only a not-found listing
    /// with `create_if_missing` provisions the prefix and yields an empty
    /// snapshot (first upload against a fresh bucket); any other listing
    /// failure propagates, since treating it as "nothing remote" would
    /// upload over copies that may be newer.
    async fn remote_snapshot(
        &self,
        prefix: &str,
        create_if_missing: bool,
    ) -> Result<HashMap<String, ObjectMetadata>> {
        let listing = match with_deadline(self.deadline, "list", self.store.list(prefix, true)).await
        {
            Ok(listing) => listing,
            Err(SyncError::StoreNotFound(_)) if create_if_missing => {
                with_deadline(
                    self.deadline,
                    "create_folder",
                    self.store.create_folder(prefix),
                )
                .await?;
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let mut map = HashMap::new();
        for meta in listing {
            if meta.is_dir {
                continue;
            }
            if let Some(rel) = relative_key(prefix, &meta.key) {
                map.insert(rel.to_string(), meta);
            }
        }
        Ok(map)
    }
}

fn rel_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
