//! Update Orchestrator
//!
//! One [`Updater`] per component drives check, download, verify and install,
//! and publishes its phase and download progress through `watch` channels
//! for the GUI to render. Operations on one updater are serialized: a
//! second operation started while one is in flight fails with
//! [`UpdateError::Busy`]. Different components share nothing but the config
//! file and can be updated concurrently.
//!
//! Every method is async and meant to run off the UI thread, typically via
//! `tokio::spawn` on an `Arc<Updater>`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, MutexGuard};
use tracing::{debug, error, info, warn};

use super::component::{Component, ComponentId, CurrentVersion, NOT_INSTALLED, UNKNOWN_VERSION};
use super::download::{DownloadProgress, DownloadStatus, Downloader};
use super::error::UpdateError;
use super::installer::{InstallReport, Installer};
use super::manifest::ManifestFetcher;
use super::state::{UpdatePhase, UpdateStatus};
use super::verify::{verify_digest, VerifyOutcome};
use super::version;
use crate::engine::config::ConfigStore;
use crate::engine::layout::InstallLayout;

pub struct Updater {
    component: Component,
    config: Arc<ConfigStore>,
    fetcher: ManifestFetcher,
    downloader: Downloader,
    phase: watch::Sender<UpdatePhase>,
    progress: watch::Sender<Option<DownloadProgress>>,
    last_status: Mutex<Option<UpdateStatus>>,
    op_lock: tokio::sync::Mutex<()>,
}

impl Updater {
    /// Build an updater with HTTP clients configured from the stored settings
    pub fn new(component: Component, config: Arc<ConfigStore>) -> Self {
        let settings = config.settings();
        let fetcher = ManifestFetcher::new(&settings);
        let downloader = Downloader::new(&settings);
        Self::with_clients(component, config, fetcher, downloader)
    }

    pub fn with_clients(
        component: Component,
        config: Arc<ConfigStore>,
        fetcher: ManifestFetcher,
        downloader: Downloader,
    ) -> Self {
        Self {
            component,
            config,
            fetcher,
            downloader,
            phase: watch::Sender::new(UpdatePhase::Idle),
            progress: watch::Sender::new(None),
            last_status: Mutex::new(None),
            op_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn id(&self) -> ComponentId {
        self.component.id
    }

    pub fn component(&self) -> &Component {
        &self.component
    }

    pub fn phase(&self) -> UpdatePhase {
        self.phase.borrow().clone()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<UpdatePhase> {
        self.phase.subscribe()
    }

    /// Progress of the current or most recent download
    pub fn progress(&self) -> Option<DownloadProgress> {
        self.progress.borrow().clone()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<Option<DownloadProgress>> {
        self.progress.subscribe()
    }

    pub fn last_status(&self) -> Option<UpdateStatus> {
        self.last_status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Whether a verified artifact is waiting to be applied
    pub fn has_staged_update(&self) -> bool {
        self.component.staged_path.exists()
    }

    /// Release version of the staged artifact, when it came from a manifest
    pub fn staged_version(&self) -> Option<String> {
        if !self.has_staged_update() {
            return None;
        }
        self.config
            .snapshot()
            .staged_versions
            .get(&self.component.id)
            .cloned()
    }

    /// Version of the installed binary.
    ///
    /// `"not-installed"` when the binary is missing, the persisted version
    /// when known, `"unknown"` otherwise. The launcher reports the running
    /// build unless a newer one was installed since.
    pub fn installed_version(&self) -> String {
        match &self.component.current_version {
            CurrentVersion::Fixed(v) => v.clone(),
            CurrentVersion::Installed => {
                if !self.component.install_path.exists() {
                    return NOT_INSTALLED.to_string();
                }
                let config = self.config.snapshot();
                match self.component.id {
                    ComponentId::App => config
                        .app_version
                        .unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
                    ComponentId::Launcher => {
                        let build = env!("CARGO_PKG_VERSION");
                        if version::is_newer(&config.launcher_version, build) {
                            config.launcher_version
                        } else {
                            build.to_string()
                        }
                    }
                }
            }
        }
    }

    fn begin(&self) -> Result<MutexGuard<'_, ()>, UpdateError> {
        self.op_lock
            .try_lock()
            .map_err(|_| UpdateError::Busy(self.component.id.to_string()))
    }

    fn transition(&self, next: UpdatePhase) {
        let current = self.phase();
        if !current.can_transition_to(&next) {
            warn!(
                component = %self.component.id,
                from = ?current,
                to = ?next,
                "Unexpected phase transition"
            );
        }
        debug!(component = %self.component.id, phase = ?next, "Phase changed");
        self.phase.send_replace(next);
    }

    /// Record a terminal phase, then settle back to `Idle`
    fn finish(&self, terminal: UpdatePhase) {
        self.transition(terminal);
        self.transition(UpdatePhase::Idle);
    }

    fn remember(&self, status: &UpdateStatus) {
        *self.last_status.lock().unwrap_or_else(|e| e.into_inner()) = Some(status.clone());
    }

    /// Check for an update, returning failures as errors
    pub async fn try_check(&self) -> Result<UpdateStatus, UpdateError> {
        let _guard = self.begin()?;
        self.transition(UpdatePhase::Checking);

        let id = self.component.id;
        let current = self.installed_version();
        info!(component = %id, current_version = %current, "Checking for updates");

        match self
            .fetcher
            .fetch(&self.component.manifest_url, self.component.transport)
            .await
        {
            Ok(manifest) => {
                let status = UpdateStatus::from_manifest(id, current, &manifest);
                if status.update_available {
                    info!(
                        component = %id,
                        from = %status.current_version,
                        to = %status.latest_version,
                        required = status.is_required,
                        "Update available"
                    );
                    self.transition(UpdatePhase::UpdateAvailable {
                        latest_version: status.latest_version.clone(),
                    });
                } else {
                    info!(component = %id, version = %status.current_version, "Up to date");
                    self.transition(UpdatePhase::UpToDate);
                }
                self.remember(&status);
                Ok(status)
            }
            Err(e) => {
                warn!(component = %id, error = %e, "Update check failed");
                self.remember(&UpdateStatus::failed(id, current, &e));
                self.finish(UpdatePhase::CheckFailed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Check for an update. Failures are reported in `UpdateStatus::error`.
    pub async fn check(&self) -> UpdateStatus {
        match self.try_check().await {
            Ok(status) => status,
            Err(e) => UpdateStatus::failed(self.component.id, self.installed_version(), &e),
        }
    }

    /// Download `url` into the staging directory and verify it against
    /// `expected_sha256` (empty skips verification).
    ///
    /// On failure the staged artifact is removed and the final progress
    /// snapshot, with status `error`, stays available from [`Updater::progress`].
    pub async fn download(
        &self,
        url: &str,
        expected_sha256: &str,
    ) -> Result<DownloadProgress, UpdateError> {
        let _guard = self.begin()?;
        let id = self.component.id;
        let staged = &self.component.staged_path;

        self.transition(UpdatePhase::Downloading);
        self.progress.send_replace(Some(DownloadProgress::new(id)));
        self.set_staged_version(None);
        info!(component = %id, url, "Downloading update");

        let downloaded = self
            .downloader
            .download(url, staged, |done, total, elapsed| {
                self.progress.send_modify(|p| {
                    if let Some(p) = p {
                        p.record(done, total, elapsed);
                    }
                });
            })
            .await;

        let report = match downloaded {
            Ok(report) => report,
            Err(e) => {
                self.discard_staged().await;
                self.fail_progress(&e);
                self.finish(UpdatePhase::DownloadFailed {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        self.transition(UpdatePhase::Verifying);
        self.progress.send_modify(|p| {
            if let Some(p) = p {
                p.record(report.bytes_downloaded, report.total_bytes, report.elapsed);
                p.status = DownloadStatus::Verifying;
            }
        });

        match verify_digest(expected_sha256, &report.digest) {
            Ok(outcome) => {
                if outcome == VerifyOutcome::Skipped {
                    warn!(component = %id, "Staged update was not integrity checked");
                }
                self.progress.send_modify(|p| {
                    if let Some(p) = p {
                        p.percent_complete = 100;
                        p.eta_seconds = 0;
                        p.status = DownloadStatus::Complete;
                    }
                });
                self.transition(UpdatePhase::Staged);
                info!(
                    component = %id,
                    sha256 = %report.digest_hex(),
                    path = %staged.display(),
                    "Update staged"
                );
                Ok(self.progress().unwrap_or_else(|| DownloadProgress::new(id)))
            }
            Err(e) => {
                warn!(component = %id, error = %e, "Discarding staged update");
                self.discard_staged().await;
                self.fail_progress(&e);
                self.finish(UpdatePhase::VerifyFailed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Download and verify the release described by `status`, remembering
    /// its version so a later [`Updater::apply`] can record it.
    pub async fn stage_release(
        &self,
        status: &UpdateStatus,
    ) -> Result<DownloadProgress, UpdateError> {
        if status.download_url.is_empty() {
            return Err(UpdateError::Decode(format!(
                "manifest for {} has no download_url",
                self.component.id
            )));
        }
        let progress = self.download(&status.download_url, &status.sha256).await?;
        self.set_staged_version(Some(&status.latest_version));
        Ok(progress)
    }

    /// Install the staged artifact, recording `new_version` in the config.
    ///
    /// Without an explicit version the one remembered by
    /// [`Updater::stage_release`] is used, if any.
    pub async fn apply(&self, new_version: Option<&str>) -> Result<InstallReport, UpdateError> {
        let _guard = self.begin()?;
        let id = self.component.id;

        let new_version = new_version
            .map(str::to_string)
            .or_else(|| self.staged_version());
        let new_version = new_version.as_deref();

        self.transition(UpdatePhase::Installing);
        self.set_progress_status(DownloadStatus::Installing);
        info!(component = %id, version = ?new_version, "Applying update");

        let component = self.component.clone();
        let task = tokio::task::spawn_blocking(move || Installer::apply(&component));
        let installed = match task.await {
            Ok(result) => result,
            Err(e) => Err(UpdateError::Install(format!("install task failed: {}", e))),
        };

        match installed {
            Ok(report) => {
                if let Some(version) = new_version {
                    self.persist_version(version);
                }
                self.set_staged_version(None);
                self.set_progress_status(DownloadStatus::Complete);
                self.finish(UpdatePhase::Complete {
                    version: new_version.map(str::to_string),
                });
                Ok(report)
            }
            Err(e) => {
                warn!(component = %id, error = %e, "Install failed");
                self.fail_progress(&e);
                self.finish(UpdatePhase::InstallFailed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Check, download, verify and install in one go.
    ///
    /// Returns `None` when already up to date.
    pub async fn update_now(&self) -> Result<Option<InstallReport>, UpdateError> {
        let status = self.try_check().await?;
        if !status.update_available {
            return Ok(None);
        }
        self.stage_release(&status).await?;
        self.apply(Some(&status.latest_version)).await.map(Some)
    }

    // The binary is already in place at this point, so a config write
    // failure only loses the version label.
    fn persist_version(&self, version: &str) {
        let id = self.component.id;
        let result = self.config.update(|c| match id {
            ComponentId::App => c.app_version = Some(version.to_string()),
            ComponentId::Launcher => c.launcher_version = version.to_string(),
        });
        if let Err(e) = result {
            error!(component = %id, error = %e, "Could not record installed version");
        }
    }

    fn set_staged_version(&self, version: Option<&str>) {
        let id = self.component.id;
        let result = self.config.update(|c| match version {
            Some(v) => c.staged_versions.insert(id, v.to_string()),
            None => c.staged_versions.remove(&id),
        });
        if let Err(e) = result {
            warn!(component = %id, error = %e, "Could not record staged version");
        }
    }

    async fn discard_staged(&self) {
        self.set_staged_version(None);
        let staged = &self.component.staged_path;
        match tokio::fs::remove_file(staged).await {
            Ok(()) => debug!(path = %staged.display(), "Removed staged artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %staged.display(), error = %e, "Could not remove staged artifact")
            }
        }
    }

    fn fail_progress(&self, error: &UpdateError) {
        self.progress.send_modify(|p| {
            p.get_or_insert_with(|| DownloadProgress::new(self.component.id))
                .fail(error)
        });
    }

    fn set_progress_status(&self, status: DownloadStatus) {
        self.progress.send_modify(|p| {
            if let Some(p) = p {
                p.status = status;
            }
        });
    }
}

/// The updaters of every known component, sharing one config
pub struct UpdateManager {
    config: Arc<ConfigStore>,
    updaters: BTreeMap<ComponentId, Arc<Updater>>,
}

impl UpdateManager {
    pub fn new(layout: &InstallLayout, config: Arc<ConfigStore>) -> Self {
        let settings = config.settings();
        let updaters = ComponentId::ALL
            .into_iter()
            .map(|id| {
                let component = Component::for_id(id, layout, &settings);
                (id, Arc::new(Updater::new(component, config.clone())))
            })
            .collect();
        Self { config, updaters }
    }

    pub fn from_updaters(config: Arc<ConfigStore>, updaters: Vec<Updater>) -> Self {
        let updaters = updaters
            .into_iter()
            .map(|u| (u.id(), Arc::new(u)))
            .collect();
        Self { config, updaters }
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn get(&self, id: ComponentId) -> Result<&Arc<Updater>, UpdateError> {
        self.updaters
            .get(&id)
            .ok_or_else(|| UpdateError::UnknownComponent(id.to_string()))
    }

    pub fn updaters(&self) -> impl Iterator<Item = &Arc<Updater>> {
        self.updaters.values()
    }

    /// Check every component concurrently and record the check time
    pub async fn check_all(&self) -> BTreeMap<ComponentId, UpdateStatus> {
        let checks = self.updaters.values().map(|u| {
            let updater = u.clone();
            async move { (updater.id(), updater.check().await) }
        });
        let results: BTreeMap<_, _> = futures_util::future::join_all(checks)
            .await
            .into_iter()
            .collect();

        if let Err(e) = self.config.record_update_check() {
            warn!(error = %e, "Could not record update check time");
        }
        results
    }
}
