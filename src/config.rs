// Persisted configuration: sync settings, store connection settings, and
// the default file locations for rules/history/reports. One JSON document.

use crate::conflict::DefaultResolution;
use crate::engine::SyncMode;
use crate::error::{Result, SyncError};
use crate::rules::SyncRule;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Floor on the timer interval; anything below is rejected outright.
pub const MIN_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    pub interval_secs: u64,
    pub mode: SyncMode,
    pub default_resolution: DefaultResolution,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            mode: SyncMode::Full,
            default_resolution: DefaultResolution::Ask,
        }
    }
}

impl SyncSettings {
    pub fn set_interval_secs(&mut self, secs: u64) -> Result<()> {
        if secs < MIN_INTERVAL_SECS {
            return Err(SyncError::IntervalTooShort {
                requested: secs,
                minimum: MIN_INTERVAL_SECS,
            });
        }
        self.interval_secs = secs;
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Settings can arrive from hand-edited JSON; re-check the invariants
    /// the setters enforce.
    pub fn validate(&self) -> Result<()> {
        if self.interval_secs < MIN_INTERVAL_SECS {
            return Err(SyncError::IntervalTooShort {
                requested: self.interval_secs,
                minimum: MIN_INTERVAL_SECS,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    pub bucket: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub store: StoreSettings,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read(path)?;
        let config: Config = serde_json::from_slice(&data)?;
        config.sync.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    pub fn default_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|d| d.join("tether"))
            .ok_or_else(|| SyncError::Config("cannot determine config directory".to_string()))
    }

    pub fn config_path(dir: &Path) -> PathBuf {
        dir.join("config.json")
    }

    pub fn rules_path(dir: &Path) -> PathBuf {
        dir.join("sync_rules.json")
    }

    pub fn history_path(dir: &Path) -> PathBuf {
        dir.join("sync_history.json")
    }

    pub fn reports_dir(dir: &Path) -> PathBuf {
        dir.join("sync_reports")
    }
}

/// Export/import unit: the sync settings plus the full rule list, so a
/// configuration can be moved between machines as one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigExport {
    pub sync: SyncSettings,
    pub rules: Vec<SyncRule>,
}

impl ConfigExport {
    pub fn write(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let export: ConfigExport = serde_json::from_slice(&data)?;
        export.sync.validate()?;
        for rule in &export.rules {
            rule.validate()?;
        }
        Ok(export)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Direction;
    use tempfile::TempDir;

    #[test]
    fn interval_floor_is_enforced() {
        let mut settings = SyncSettings::default();
        assert!(matches!(
            settings.set_interval_secs(9),
            Err(SyncError::IntervalTooShort { .. })
        ));
        assert_eq!(settings.interval_secs, 60);

        settings.set_interval_secs(10).unwrap();
        assert_eq!(settings.interval(), Duration::from_secs(10));
    }

    #[test]
    fn load_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = Config::load(&temp.path().join("config.json")).unwrap();
        assert_eq!(config.sync.mode, SyncMode::Full);
        assert_eq!(config.sync.default_resolution, DefaultResolution::Ask);
        assert!(!config.store.enabled);
    }

    #[test]
    fn save_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");

        let mut config = Config::default();
        config.sync.mode = SyncMode::Incremental;
        config.sync.set_interval_secs(30).unwrap();
        config.store.bucket = "my-bucket".into();
        config.store.endpoint = Some("http://localhost:9000".into());
        config.store.enabled = true;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn load_rejects_bad_interval() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"sync":{"interval_secs":3,"mode":"full","default_resolution":"ask"}}"#,
        )
        .unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn export_import_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("export.json");

        let export = ConfigExport {
            sync: SyncSettings::default(),
            rules: vec![SyncRule::new(
                "docs",
                "/data/docs",
                "docs",
                Direction::Upload,
            )],
        };
        export.write(&path).unwrap();

        let imported = ConfigExport::read(&path).unwrap();
        assert_eq!(imported, export);
    }
}
