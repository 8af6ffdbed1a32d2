//! Launcher Configuration Module
//! Handles loading and persisting launcher-config.json

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::engine::updater::component::ComponentId;
use crate::engine::updater::manifest::ManifestTransport;

pub const CONFIG_FILE: &str = "launcher-config.json";

const GITHUB_API: &str = "https://api.github.com";
const RELEASES_REPO: &str = "nash87/cv-manager-releases";
const RELEASES_BRANCH: &str = "main";
const DATA_SUBDIRS: [&str; 4] = ["database", "exports", "backups", "logs"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[source] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Failed to write config: {0}")]
    WriteError(#[source] std::io::Error),
}

/// Distribution endpoints and timeouts for the update pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateSettings {
    pub launcher_manifest_url: String,
    pub app_manifest_url: String,
    pub manifest_transport: ManifestTransport,
    pub check_timeout_secs: u64,
    pub download_timeout_secs: u64,
    /// Period of the background update check
    pub check_interval_secs: u64,
    pub user_agent: String,
    /// Base URL of the GitHub REST API
    pub github_api_url: String,
    /// `owner/name` of the releases repository
    pub repository: String,
    pub branch: String,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            launcher_manifest_url: format!(
                "{}/repos/{}/contents/launcher-version.json?ref={}",
                GITHUB_API, RELEASES_REPO, RELEASES_BRANCH
            ),
            app_manifest_url: format!(
                "{}/repos/{}/contents/version.json?ref={}",
                GITHUB_API, RELEASES_REPO, RELEASES_BRANCH
            ),
            manifest_transport: ManifestTransport::ContentApi,
            check_timeout_secs: 5,
            download_timeout_secs: 600,
            check_interval_secs: 6 * 60 * 60,
            user_agent: format!("CVManager-Updater/{}", env!("CARGO_PKG_VERSION")),
            github_api_url: GITHUB_API.to_string(),
            repository: RELEASES_REPO.to_string(),
            branch: RELEASES_BRANCH.to_string(),
        }
    }
}

impl UpdateSettings {
    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(60))
    }

    /// `<api>/repos/<owner>/<name>`
    pub fn repository_api_url(&self) -> String {
        format!(
            "{}/repos/{}",
            self.github_api_url.trim_end_matches('/'),
            self.repository
        )
    }

    /// Human-facing releases page
    pub fn releases_page_url(&self) -> String {
        format!("https://github.com/{}/releases", self.repository)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Where user data is stored
    pub data_location: Option<PathBuf>,
    pub auto_update: bool,
    pub last_update_check: Option<DateTime<Utc>>,
    pub launcher_version: String,
    pub app_version: Option<String>,
    pub onboarding_completed: bool,
    /// Version of each artifact currently waiting in `updates/`
    pub staged_versions: BTreeMap<ComponentId, String>,
    pub updates: UpdateSettings,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            data_location: None,
            auto_update: true,
            last_update_check: None,
            launcher_version: env!("CARGO_PKG_VERSION").to_string(),
            app_version: None,
            onboarding_completed: false,
            staged_versions: BTreeMap::new(),
            updates: UpdateSettings::default(),
        }
    }
}

impl LauncherConfig {
    /// Load config from disk, or defaults if the file does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file found, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: LauncherConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save config to disk atomically
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::WriteError)?;
        }
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content).map_err(ConfigError::WriteError)?;
        fs::rename(&temp_path, path).map_err(ConfigError::WriteError)?;

        Ok(())
    }
}

/// Shared handle on the persisted launcher configuration.
///
/// Every mutation goes through [`ConfigStore::update`], which writes the
/// file before returning.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    config: Mutex<LauncherConfig>,
}

impl ConfigStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = LauncherConfig::load(&path)?;
        Ok(Self::new(path, config))
    }

    pub fn new(path: impl Into<PathBuf>, config: LauncherConfig) -> Self {
        Self {
            path: path.into(),
            config: Mutex::new(config),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, LauncherConfig> {
        self.config.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> LauncherConfig {
        self.lock().clone()
    }

    pub fn settings(&self) -> UpdateSettings {
        self.lock().updates.clone()
    }

    /// Mutate the config and persist it
    pub fn update<R>(&self, f: impl FnOnce(&mut LauncherConfig) -> R) -> Result<R, ConfigError> {
        let mut config = self.lock();
        let result = f(&mut config);
        config.save(&self.path)?;
        Ok(result)
    }

    pub fn record_update_check(&self) -> Result<(), ConfigError> {
        self.update(|c| c.last_update_check = Some(Utc::now()))
    }

    pub fn mark_onboarding_completed(&self) -> Result<(), ConfigError> {
        self.update(|c| c.onboarding_completed = true)
    }

    /// Restore defaults, keeping the configured update endpoints
    pub fn reset(&self) -> Result<(), ConfigError> {
        info!(path = %self.path.display(), "Resetting configuration");
        self.update(|c| {
            let updates = std::mem::take(&mut c.updates);
            *c = LauncherConfig {
                updates,
                ..LauncherConfig::default()
            };
        })
    }

    /// Create the data directory tree and remember it
    pub fn set_data_location(&self, path: &str) -> Result<PathBuf, ConfigError> {
        let path = expand_home(path);

        fs::create_dir_all(&path).map_err(ConfigError::WriteError)?;
        for dir in DATA_SUBDIRS {
            fs::create_dir_all(path.join(dir)).map_err(ConfigError::WriteError)?;
        }

        self.update(|c| c.data_location = Some(path.clone()))?;
        info!(path = %path.display(), "Data location configured");
        Ok(path)
    }

    /// Use `<install dir>/cv-data`
    pub fn use_default_data_location(&self, install_dir: &Path) -> Result<PathBuf, ConfigError> {
        let default = install_dir.join("cv-data");
        self.set_data_location(&default.to_string_lossy())
    }
}

fn expand_home(path: &str) -> PathBuf {
    let rest = path
        .strip_prefix("~/")
        .or_else(|| path.strip_prefix("~\\"));
    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = LauncherConfig::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert!(config.auto_update);
        assert_eq!(config.launcher_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(config.updates.check_timeout_secs, 5);
        assert_eq!(
            config.updates.app_manifest_url,
            "https://api.github.com/repos/nash87/cv-manager-releases/contents/version.json?ref=main"
        );
    }

    #[test]
    fn test_repository_urls() {
        let settings = UpdateSettings {
            github_api_url: "http://127.0.0.1:8080/".to_string(),
            ..UpdateSettings::default()
        };
        assert_eq!(
            settings.repository_api_url(),
            "http://127.0.0.1:8080/repos/nash87/cv-manager-releases"
        );
        assert_eq!(
            settings.releases_page_url(),
            "https://github.com/nash87/cv-manager-releases/releases"
        );
    }

    #[test]
    fn test_config_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let store = ConfigStore::open(&path).unwrap();
        store.update(|c| c.app_version = Some("1.2.0".to_string())).unwrap();
        store.record_update_check().unwrap();

        let loaded = LauncherConfig::load(&path).unwrap();
        assert_eq!(loaded.app_version.as_deref(), Some("1.2.0"));
        assert!(loaded.last_update_check.is_some());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"{"auto_update": false, "updates": {"check_timeout_secs": 2}}"#,
        )
        .unwrap();

        let config = LauncherConfig::load(&path).unwrap();
        assert!(!config.auto_update);
        assert_eq!(config.updates.check_timeout_secs, 2);
        assert_eq!(config.updates.download_timeout_secs, 600);
    }

    #[test]
    fn test_invalid_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "{ nope").unwrap();
        assert!(matches!(LauncherConfig::load(&path), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_set_data_location_creates_tree() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(dir.path().join(CONFIG_FILE)).unwrap();

        let data = store.use_default_data_location(dir.path()).unwrap();
        assert_eq!(data, dir.path().join("cv-data"));
        for sub in DATA_SUBDIRS {
            assert!(data.join(sub).is_dir());
        }
        assert_eq!(store.snapshot().data_location, Some(data));
    }

    #[test]
    fn test_reset_keeps_endpoints() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::open(dir.path().join(CONFIG_FILE)).unwrap();
        store
            .update(|c| {
                c.onboarding_completed = true;
                c.updates.app_manifest_url = "http://localhost/version.json".to_string();
            })
            .unwrap();

        store.reset().unwrap();
        let config = store.snapshot();
        assert!(!config.onboarding_completed);
        assert_eq!(config.updates.app_manifest_url, "http://localhost/version.json");
    }
}
