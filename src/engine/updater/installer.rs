//! Installer
//!
//! Swaps a staged, verified artifact into a component's install path:
//!
//! 1. move the current binary (if any) to `<target>.backup`
//! 2. copy the staged bytes to `<target>`
//! 3. on copy failure, put the backup back; on success, delete the staged file
//!
//! The backup is kept after a successful install as a manual recovery point.
//! A failed install never leaves the target missing or truncated.
//!
//! Renaming is used rather than overwriting because a running executable can
//! be renamed on every supported platform, but not always overwritten. The
//! app component should still only be applied while the app is not running.

use std::fs::{self, File, Permissions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use super::component::Component;
use super::error::UpdateError;

#[derive(Debug, Clone)]
pub struct InstallReport {
    pub target: PathBuf,
    /// Previous binary, if one existed
    pub backup: Option<PathBuf>,
    pub bytes_written: u64,
}

struct Backup {
    path: PathBuf,
    permissions: Option<Permissions>,
}

pub struct Installer;

impl Installer {
    pub fn apply(component: &Component) -> Result<InstallReport, UpdateError> {
        let staged = &component.staged_path;
        let target = &component.install_path;

        if !staged.exists() {
            return Err(UpdateError::ArtifactNotFound(staged.display().to_string()));
        }

        let backup = Self::backup_current(target, &component.backup_path())?;
        let permissions = backup.as_ref().and_then(|b| b.permissions.clone());

        match copy_artifact(staged, target, permissions) {
            Ok(bytes_written) => {
                if let Err(e) = fs::remove_file(staged) {
                    warn!(path = %staged.display(), error = %e, "Could not remove staged artifact");
                }
                info!(
                    component = %component.id,
                    target = %target.display(),
                    bytes = bytes_written,
                    "Update applied"
                );
                Ok(InstallReport {
                    target: target.clone(),
                    backup: backup.map(|b| b.path),
                    bytes_written,
                })
            }
            Err(e) => {
                warn!(component = %component.id, error = %e, "Copy failed, rolling back");
                let backup_path = backup.as_ref().map(|b| b.path.as_path());
                if let Err(rollback) = Self::rollback(target, backup_path) {
                    error!(
                        component = %component.id,
                        error = %rollback,
                        "Rollback failed, previous binary left at backup path"
                    );
                    return Err(UpdateError::Install(format!(
                        "{} (rollback failed: {})",
                        e, rollback
                    )));
                }
                Err(UpdateError::Install(e.to_string()))
            }
        }
    }

    /// Move the current binary aside. `None` when there was nothing to back up.
    fn backup_current(target: &Path, backup: &Path) -> Result<Option<Backup>, UpdateError> {
        if !target.exists() {
            return Ok(None);
        }

        let permissions = fs::metadata(target).ok().map(|m| m.permissions());

        // Only one prior version is kept.
        if backup.exists() {
            fs::remove_file(backup).map_err(|e| {
                UpdateError::Install(format!("failed to remove previous backup: {}", e))
            })?;
        }
        fs::rename(target, backup).map_err(|e| {
            UpdateError::Install(format!("failed to backup current version: {}", e))
        })?;

        Ok(Some(Backup {
            path: backup.to_path_buf(),
            permissions,
        }))
    }

    /// Restore the target to its pre-update state
    fn rollback(target: &Path, backup: Option<&Path>) -> io::Result<()> {
        if target.exists() {
            fs::remove_file(target)?;
        }
        if let Some(backup) = backup {
            fs::rename(backup, target)?;
            info!(target = %target.display(), "Previous version restored");
        }
        Ok(())
    }
}

fn copy_artifact(src: &Path, dst: &Path, permissions: Option<Permissions>) -> io::Result<u64> {
    let mut source = File::open(src)?;
    let mut dest = File::create(dst)?;
    let bytes = io::copy(&mut source, &mut dest)?;
    dest.sync_all()?;
    drop(dest);

    match permissions {
        Some(permissions) => fs::set_permissions(dst, permissions)?,
        None => set_executable(dst)?,
    }
    Ok(bytes)
}

#[cfg(unix)]
fn set_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::UpdateSettings;
    use crate::engine::layout::InstallLayout;
    use tempfile::tempdir;

    fn app_component(base: &Path) -> Component {
        let layout = InstallLayout::with_base_dir(base);
        layout.init().unwrap();
        Component::app(&layout, &UpdateSettings::default())
    }

    #[test]
    fn test_apply_replaces_and_keeps_backup() {
        let dir = tempdir().unwrap();
        let component = app_component(dir.path());
        fs::write(&component.install_path, b"old-bytes").unwrap();
        fs::write(&component.staged_path, b"new-bytes").unwrap();

        let report = Installer::apply(&component).unwrap();

        assert_eq!(fs::read(&component.install_path).unwrap(), b"new-bytes");
        assert_eq!(fs::read(component.backup_path()).unwrap(), b"old-bytes");
        assert_eq!(report.backup, Some(component.backup_path()));
        assert_eq!(report.bytes_written, 9);
        assert!(!component.staged_path.exists());
    }

    #[test]
    fn test_apply_without_previous_binary() {
        let dir = tempdir().unwrap();
        let component = app_component(dir.path());
        fs::write(&component.staged_path, b"first-install").unwrap();

        let report = Installer::apply(&component).unwrap();

        assert_eq!(fs::read(&component.install_path).unwrap(), b"first-install");
        assert!(report.backup.is_none());
        assert!(!component.backup_path().exists());
    }

    #[test]
    fn test_apply_replaces_stale_backup() {
        let dir = tempdir().unwrap();
        let component = app_component(dir.path());
        fs::write(component.backup_path(), b"ancient").unwrap();
        fs::write(&component.install_path, b"v2").unwrap();
        fs::write(&component.staged_path, b"v3").unwrap();

        Installer::apply(&component).unwrap();

        assert_eq!(fs::read(component.backup_path()).unwrap(), b"v2");
        assert_eq!(fs::read(&component.install_path).unwrap(), b"v3");
    }

    #[test]
    fn test_apply_without_staged_artifact() {
        let dir = tempdir().unwrap();
        let component = app_component(dir.path());
        fs::write(&component.install_path, b"old-bytes").unwrap();

        let result = Installer::apply(&component);

        assert!(matches!(result, Err(UpdateError::ArtifactNotFound(_))));
        assert_eq!(fs::read(&component.install_path).unwrap(), b"old-bytes");
        assert!(!component.backup_path().exists());
    }

    // A directory opens fine but fails on read, so the copy step breaks
    // after the backup has already been taken.
    #[cfg(unix)]
    #[test]
    fn test_copy_failure_restores_backup() {
        let dir = tempdir().unwrap();
        let component = app_component(dir.path());
        fs::write(&component.install_path, b"old-bytes").unwrap();
        fs::create_dir(&component.staged_path).unwrap();

        let result = Installer::apply(&component);

        assert!(matches!(result, Err(UpdateError::Install(_))));
        assert_eq!(fs::read(&component.install_path).unwrap(), b"old-bytes");
        assert!(!component.backup_path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_failure_without_previous_binary_leaves_nothing() {
        let dir = tempdir().unwrap();
        let component = app_component(dir.path());
        fs::create_dir(&component.staged_path).unwrap();

        let result = Installer::apply(&component);

        assert!(matches!(result, Err(UpdateError::Install(_))));
        assert!(!component.install_path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_new_binary_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let component = app_component(dir.path());
        fs::write(&component.staged_path, b"#!/bin/sh\n").unwrap();

        Installer::apply(&component).unwrap();

        let mode = fs::metadata(&component.install_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }
}
