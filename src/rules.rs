// Named sync rules and their JSON-backed store.
//
// Rules are kept as an ordered sequence with linear lookup; rule counts are
// small (a handful per installation) and order is part of the persisted
// document.

use crate::error::{Result, SyncError};
use crate::filter::FilterSet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Which way data may flow for a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
    Bidirectional,
}

impl Direction {
    pub fn uploads(&self) -> bool {
        matches!(self, Direction::Upload | Direction::Bidirectional)
    }

    pub fn downloads(&self) -> bool {
        matches!(self, Direction::Download | Direction::Bidirectional)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Upload => "upload",
            Direction::Download => "download",
            Direction::Bidirectional => "bidirectional",
        }
    }
}

impl FromStr for Direction {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "upload" => Ok(Direction::Upload),
            "download" => Ok(Direction::Download),
            "bidirectional" => Ok(Direction::Bidirectional),
            other => Err(SyncError::InvalidDirection(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRule {
    pub id: String,
    pub name: String,
    pub local_path: PathBuf,
    pub remote_path: String,
    pub direction: Direction,
    #[serde(default)]
    pub filters: Vec<String>,
    pub enabled: bool,
}

impl SyncRule {
    pub fn new(
        name: impl Into<String>,
        local_path: impl Into<PathBuf>,
        remote_path: impl Into<String>,
        direction: Direction,
    ) -> Self {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self {
            id: format!("rule_{}", stamp),
            name: name.into(),
            local_path: local_path.into(),
            remote_path: remote_path.into(),
            direction,
            filters: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_filters(mut self, filters: Vec<String>) -> Self {
        self.filters = filters;
        self
    }

    pub fn filter_set(&self) -> Result<FilterSet> {
        FilterSet::new(&self.filters)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SyncError::InvalidRule("rule name must not be empty".into()));
        }
        if self.local_path.as_os_str().is_empty() {
            return Err(SyncError::InvalidRule(
                "rule local path must not be empty".into(),
            ));
        }
        if self.remote_path.trim().is_empty() {
            return Err(SyncError::InvalidRule(
                "rule remote path must not be empty".into(),
            ));
        }
        // Surface bad filter patterns at edit time, not mid-pass.
        self.filter_set()?;
        Ok(())
    }
}

/// JSON-persisted rule collection.
pub struct RuleStore {
    path: PathBuf,
    rules: Vec<SyncRule>,
}

impl RuleStore {
    /// Open the store at `path`, loading existing rules if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let rules = if path.exists() {
            let data = std::fs::read(&path)?;
            serde_json::from_slice(&data)?
        } else {
            Vec::new()
        };
        Ok(Self { path, rules })
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(&self.rules)?;
        std::fs::write(&self.path, data)?;
        Ok(())
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.rules.iter().position(|r| r.id == id)
    }

    pub fn add(&mut self, rule: SyncRule) -> Result<()> {
        rule.validate()?;
        if self.index_of(&rule.id).is_some() {
            return Err(SyncError::DuplicateRuleId(rule.id));
        }
        self.rules.push(rule);
        self.save()
    }

    pub fn update(&mut self, rule: SyncRule) -> Result<()> {
        rule.validate()?;
        let idx = self
            .index_of(&rule.id)
            .ok_or_else(|| SyncError::RuleNotFound(rule.id.clone()))?;
        self.rules[idx] = rule;
        self.save()
    }

    pub fn remove(&mut self, id: &str) -> Result<()> {
        let idx = self
            .index_of(id)
            .ok_or_else(|| SyncError::RuleNotFound(id.to_string()))?;
        self.rules.remove(idx);
        self.save()
    }

    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<()> {
        let idx = self
            .index_of(id)
            .ok_or_else(|| SyncError::RuleNotFound(id.to_string()))?;
        self.rules[idx].enabled = enabled;
        self.save()
    }

    pub fn get(&self, id: &str) -> Option<&SyncRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&SyncRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn all(&self) -> &[SyncRule] {
        &self.rules
    }

    pub fn enabled(&self) -> Vec<SyncRule> {
        self.rules.iter().filter(|r| r.enabled).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn replace_all(&mut self, rules: Vec<SyncRule>) -> Result<()> {
        for rule in &rules {
            rule.validate()?;
        }
        self.rules = rules;
        self.save()
    }

    /// Find the rule whose local path is a prefix of `path`. Longest match
    /// wins so nested rule roots resolve to the most specific rule.
    pub fn rule_for_local_path<'a>(rules: &'a [SyncRule], path: &Path) -> Option<&'a SyncRule> {
        rules
            .iter()
            .filter(|r| path.starts_with(&r.local_path))
            .max_by_key(|r| r.local_path.as_os_str().len())
    }
}
