//! Update State Machine
//!
//! Each component moves through its own phases independently:
//!
//! ```text
//! Idle -> Checking -> UpToDate | UpdateAvailable | CheckFailed
//! UpdateAvailable -> Downloading -> Verifying -> Staged -> Installing -> Complete
//!                    Downloading -> DownloadFailed
//!                    Verifying   -> VerifyFailed
//!                    Installing  -> InstallFailed
//! CheckFailed | DownloadFailed | VerifyFailed | InstallFailed | Complete -> Idle
//! ```
//!
//! `Staged` is where a verified download waits until the caller decides to
//! apply it, immediately or at the next launch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::component::ComponentId;
use super::error::UpdateError;
use super::manifest::UpdateManifest;
use super::version;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum UpdatePhase {
    #[default]
    Idle,
    Checking,
    UpToDate,
    UpdateAvailable {
        latest_version: String,
    },
    CheckFailed {
        reason: String,
    },
    Downloading,
    Verifying,
    /// Downloaded and verified, waiting to be applied
    Staged,
    Installing,
    Complete {
        version: Option<String>,
    },
    DownloadFailed {
        reason: String,
    },
    VerifyFailed {
        reason: String,
    },
    InstallFailed {
        reason: String,
    },
}

impl UpdatePhase {
    /// Terminal phases that settle back to `Idle`
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::CheckFailed { .. }
                | Self::DownloadFailed { .. }
                | Self::VerifyFailed { .. }
                | Self::InstallFailed { .. }
                | Self::Complete { .. }
        )
    }

    pub fn can_transition_to(&self, next: &UpdatePhase) -> bool {
        use UpdatePhase::*;

        match (self, next) {
            (Idle | UpToDate | UpdateAvailable { .. } | Staged, Checking) => true,
            (Idle | UpToDate | UpdateAvailable { .. } | Staged, Downloading) => true,
            (Idle | UpToDate | UpdateAvailable { .. } | Staged, Installing) => true,
            (Checking, UpToDate | UpdateAvailable { .. } | CheckFailed { .. }) => true,
            (Downloading, Verifying | DownloadFailed { .. }) => true,
            (Verifying, Staged | VerifyFailed { .. }) => true,
            (Installing, Complete { .. } | InstallFailed { .. }) => true,
            (current, Idle) => current.is_terminal(),
            _ => false,
        }
    }
}

/// Result of one update check. Built fresh on every check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateStatus {
    pub component: ComponentId,
    pub current_version: String,
    pub latest_version: String,
    pub update_available: bool,
    pub is_required: bool,
    pub release_notes: String,
    /// Bullet points extracted from `release_notes`
    pub changes: Vec<String>,
    pub release_date: String,
    pub commit_hash: Option<String>,
    pub download_url: String,
    pub sha256: String,
    pub size_mb: u64,
    pub checked_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl UpdateStatus {
    pub fn from_manifest(
        component: ComponentId,
        current_version: String,
        manifest: &UpdateManifest,
    ) -> Self {
        Self {
            component,
            update_available: version::is_newer(&manifest.latest_version, &current_version),
            is_required: manifest.is_required_for(&current_version),
            current_version,
            latest_version: manifest.latest_version.clone(),
            release_notes: manifest.release_notes.clone(),
            changes: manifest.changes(),
            release_date: manifest.release_date.clone(),
            commit_hash: manifest.commit_hash.clone(),
            download_url: manifest.download_url.clone(),
            sha256: manifest.sha256.clone(),
            size_mb: manifest.size_mb,
            checked_at: Utc::now(),
            error: None,
        }
    }

    pub fn failed(component: ComponentId, current_version: String, error: &UpdateError) -> Self {
        Self {
            component,
            current_version,
            latest_version: String::new(),
            update_available: false,
            is_required: false,
            release_notes: String::new(),
            changes: Vec::new(),
            release_date: String::new(),
            commit_hash: None,
            download_url: String::new(),
            sha256: String::new(),
            size_mb: 0,
            checked_at: Utc::now(),
            error: Some(error.to_string()),
        }
    }

    /// Same content, ignoring when the check happened
    pub fn same_result(&self, other: &UpdateStatus) -> bool {
        Self {
            checked_at: other.checked_at,
            ..self.clone()
        } == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(latest: &str) -> UpdateManifest {
        UpdateManifest::from_json(format!(r#"{{"latest_version":"{}"}}"#, latest).as_bytes())
            .unwrap()
    }

    #[test]
    fn test_status_update_available() {
        let status =
            UpdateStatus::from_manifest(ComponentId::App, "1.0.0".to_string(), &manifest("1.2.0"));
        assert!(status.update_available);
        assert_eq!(status.latest_version, "1.2.0");
        assert!(status.error.is_none());
    }

    #[test]
    fn test_status_up_to_date() {
        let status =
            UpdateStatus::from_manifest(ComponentId::App, "1.0.0".to_string(), &manifest("1.0.0"));
        assert!(!status.update_available);
    }

    #[test]
    fn test_status_carries_commit_and_changes() {
        let manifest = UpdateManifest::from_json(
            br#"{"latest_version":"1.2.0","commit_hash":"abc1234","release_notes":"- One\n- Two"}"#,
        )
        .unwrap();
        let status = UpdateStatus::from_manifest(ComponentId::App, "1.0.0".to_string(), &manifest);
        assert_eq!(status.commit_hash.as_deref(), Some("abc1234"));
        assert_eq!(status.changes, vec!["One", "Two"]);
        assert!(!status.is_required);
    }

    #[test]
    fn test_status_older_remote_is_not_an_update() {
        let status =
            UpdateStatus::from_manifest(ComponentId::App, "1.3.0".to_string(), &manifest("1.2.9"));
        assert!(!status.update_available);
    }

    #[test]
    fn test_failed_status() {
        let error = UpdateError::HttpStatus { status: 404 };
        let status = UpdateStatus::failed(ComponentId::Launcher, "1.3.1".to_string(), &error);
        assert!(!status.update_available);
        assert_eq!(status.error.as_deref(), Some("Server returned HTTP status 404"));
    }

    #[test]
    fn test_same_result_ignores_timestamp() {
        let a =
            UpdateStatus::from_manifest(ComponentId::App, "1.0.0".to_string(), &manifest("1.2.0"));
        let mut b = a.clone();
        b.checked_at = a.checked_at + chrono::Duration::seconds(30);
        assert!(a.same_result(&b));

        b.latest_version = "1.3.0".to_string();
        assert!(!a.same_result(&b));
    }

    #[test]
    fn test_state_transitions() {
        use UpdatePhase::*;

        let happy_path = [
            Idle,
            Checking,
            UpdateAvailable {
                latest_version: "1.2.0".to_string(),
            },
            Downloading,
            Verifying,
            Staged,
            Installing,
            Complete {
                version: Some("1.2.0".to_string()),
            },
            Idle,
        ];
        for pair in happy_path.windows(2) {
            assert!(pair[0].can_transition_to(&pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_failures_return_to_idle() {
        use UpdatePhase::*;

        let reason = "boom".to_string();
        assert!(Checking.can_transition_to(&CheckFailed { reason: reason.clone() }));
        assert!(Downloading.can_transition_to(&DownloadFailed { reason: reason.clone() }));
        assert!(Verifying.can_transition_to(&VerifyFailed { reason: reason.clone() }));
        assert!(CheckFailed { reason }.can_transition_to(&Idle));
    }

    #[test]
    fn test_busy_phases_reject_new_operations() {
        use UpdatePhase::*;

        for busy in [Checking, Downloading, Verifying, Installing] {
            assert!(!busy.can_transition_to(&Checking));
            assert!(!busy.can_transition_to(&Idle));
        }
        assert!(!Idle.can_transition_to(&Verifying));
        assert!(!UpToDate.can_transition_to(&Complete { version: None }));
    }
}
