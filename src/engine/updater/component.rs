//! Updatable components

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::error::UpdateError;
use super::manifest::ManifestTransport;
use crate::engine::config::UpdateSettings;
use crate::engine::layout::{backup_path, InstallLayout};

/// Sentinel reported when the component binary is absent
pub const NOT_INSTALLED: &str = "not-installed";
/// Reported when the binary exists but no version was ever recorded
pub const UNKNOWN_VERSION: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentId {
    Launcher,
    App,
}

impl ComponentId {
    pub const ALL: [ComponentId; 2] = [ComponentId::Launcher, ComponentId::App];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Launcher => "launcher",
            Self::App => "app",
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentId {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "launcher" => Ok(Self::Launcher),
            "app" => Ok(Self::App),
            other => Err(UpdateError::UnknownComponent(other.to_string())),
        }
    }
}

/// Where the current version of a component comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrentVersion {
    /// A version known up front, e.g. the running build
    Fixed(String),
    /// Resolved from the install path and the persisted config
    Installed,
}

/// Everything the pipeline needs to know about one updatable binary
#[derive(Debug, Clone)]
pub struct Component {
    pub id: ComponentId,
    pub manifest_url: String,
    pub transport: ManifestTransport,
    pub install_path: PathBuf,
    pub staged_path: PathBuf,
    pub current_version: CurrentVersion,
}

impl Component {
    pub fn launcher(layout: &InstallLayout, settings: &UpdateSettings) -> Self {
        Self {
            id: ComponentId::Launcher,
            manifest_url: settings.launcher_manifest_url.clone(),
            transport: settings.manifest_transport,
            install_path: layout.launcher_path(),
            staged_path: layout.staged_path(ComponentId::Launcher.as_str()),
            current_version: CurrentVersion::Installed,
        }
    }

    pub fn app(layout: &InstallLayout, settings: &UpdateSettings) -> Self {
        Self {
            id: ComponentId::App,
            manifest_url: settings.app_manifest_url.clone(),
            transport: settings.manifest_transport,
            install_path: layout.app_path(),
            staged_path: layout.staged_path(ComponentId::App.as_str()),
            current_version: CurrentVersion::Installed,
        }
    }

    pub fn for_id(id: ComponentId, layout: &InstallLayout, settings: &UpdateSettings) -> Self {
        match id {
            ComponentId::Launcher => Self::launcher(layout, settings),
            ComponentId::App => Self::app(layout, settings),
        }
    }

    pub fn with_current_version(mut self, version: impl Into<String>) -> Self {
        self.current_version = CurrentVersion::Fixed(version.into());
        self
    }

    pub fn backup_path(&self) -> PathBuf {
        backup_path(&self.install_path)
    }

    /// Partially downloaded artifact; renamed to `staged_path` once complete
    pub fn partial_path(&self) -> PathBuf {
        self.staged_path.with_extension("partial")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_id_round_trip_names() {
        for id in ComponentId::ALL {
            assert_eq!(id.as_str().parse::<ComponentId>().unwrap(), id);
        }
        assert!(matches!(
            "editor".parse::<ComponentId>(),
            Err(UpdateError::UnknownComponent(_))
        ));
    }

    #[test]
    fn test_components_use_disjoint_files() {
        let layout = InstallLayout::with_base_dir("/opt/cv");
        let settings = UpdateSettings::default();
        let launcher = Component::launcher(&layout, &settings);
        let app = Component::app(&layout, &settings);

        assert_ne!(launcher.install_path, app.install_path);
        assert_ne!(launcher.staged_path, app.staged_path);
        assert_ne!(launcher.partial_path(), app.partial_path());
        assert_eq!(app.manifest_url, settings.app_manifest_url);
    }
}
