//! Launching the main application
//!
//! The launcher starts the app from its install directory and hands over
//! the user's data location through `CV_MANAGER_DATA_PATH`.

use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use thiserror::Error;
use tracing::info;

pub const DATA_PATH_ENV: &str = "CV_MANAGER_DATA_PATH";

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Main application not found: {0}")]
    NotInstalled(PathBuf),
    #[error("Failed to start main application: {0}")]
    SpawnFailed(#[from] std::io::Error),
}

/// Start `app_path` with the data location in its environment
pub fn launch_main_app(
    app_path: &Path,
    data_location: Option<&Path>,
) -> Result<Child, LaunchError> {
    if !app_path.exists() {
        return Err(LaunchError::NotInstalled(app_path.to_path_buf()));
    }

    let mut command = Command::new(app_path);
    if let Some(dir) = app_path.parent() {
        command.current_dir(dir);
    }
    if let Some(data) = data_location {
        command.env(DATA_PATH_ENV, data);
    }

    let child = command.spawn()?;
    info!(path = %app_path.display(), pid = child.id(), "Main application started");
    Ok(child)
}

/// Data location handed over by the launcher, if any
pub fn data_path_from_env() -> Option<PathBuf> {
    std::env::var_os(DATA_PATH_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_launch_missing_app() {
        let dir = tempdir().unwrap();
        let result = launch_main_app(&dir.path().join("cv-manager"), None);
        assert!(matches!(result, Err(LaunchError::NotInstalled(_))));
    }

    #[test]
    fn test_data_path_from_env() {
        std::env::set_var(DATA_PATH_ENV, "/srv/cv-data");
        assert_eq!(data_path_from_env(), Some(PathBuf::from("/srv/cv-data")));

        std::env::set_var(DATA_PATH_ENV, "");
        assert_eq!(data_path_from_env(), None);

        std::env::remove_var(DATA_PATH_ENV);
        assert_eq!(data_path_from_env(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_launch_passes_data_path() {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let app = dir.path().join("cv-manager");
        let out = dir.path().join("seen.txt");
        fs::write(
            &app,
            format!("#!/bin/sh\nprintf '%s' \"${}\" > '{}'\n", DATA_PATH_ENV, out.display()),
        )
        .unwrap();
        fs::set_permissions(&app, fs::Permissions::from_mode(0o755)).unwrap();

        let data = dir.path().join("cv-data");
        let mut child = launch_main_app(&app, Some(&data)).unwrap();
        assert!(child.wait().unwrap().success());

        assert_eq!(fs::read_to_string(&out).unwrap(), data.to_string_lossy());
    }
}
