//! Install Layout
//!
//! The launcher, the main app, their backups, the `updates/` staging
//! directory and the launcher config all live side by side in the
//! install directory:
//!
//! ```text
//! <install dir>/
//!   cv-manager-launcher[.exe]
//!   cv-manager-launcher[.exe].backup
//!   cv-manager[.exe]
//!   cv-manager[.exe].backup
//!   launcher-config.json
//!   updates/
//!     launcher-update.<ext>
//!     app-update.<ext>
//! ```

use std::env::consts::EXE_SUFFIX;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::engine::config::CONFIG_FILE;

pub const LAUNCHER_EXECUTABLE: &str = "cv-manager-launcher";
pub const APP_EXECUTABLE: &str = "cv-manager";
pub const UPDATES_DIR: &str = "updates";

/// Extension used for staged artifacts
#[cfg(target_os = "windows")]
pub const ARTIFACT_EXTENSION: &str = "exe";
#[cfg(not(target_os = "windows"))]
pub const ARTIFACT_EXTENSION: &str = "bin";

#[derive(Debug, Clone)]
pub struct InstallLayout {
    base_dir: PathBuf,
}

impl InstallLayout {
    /// Layout rooted at the directory of the running executable
    pub fn from_current_exe() -> io::Result<Self> {
        let exe = std::env::current_exe()?;
        let base_dir = exe.parent().map(Path::to_path_buf).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "executable has no parent directory")
        })?;
        Ok(Self { base_dir })
    }

    /// Create with custom base directory (for testing)
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Create the staging directory
    pub fn init(&self) -> io::Result<()> {
        fs::create_dir_all(self.updates_dir())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn updates_dir(&self) -> PathBuf {
        self.base_dir.join(UPDATES_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILE)
    }

    pub fn launcher_path(&self) -> PathBuf {
        self.base_dir.join(format!("{}{}", LAUNCHER_EXECUTABLE, EXE_SUFFIX))
    }

    pub fn app_path(&self) -> PathBuf {
        self.base_dir.join(format!("{}{}", APP_EXECUTABLE, EXE_SUFFIX))
    }

    /// `updates/<name>-update.<ext>`
    pub fn staged_path(&self, name: &str) -> PathBuf {
        self.updates_dir()
            .join(format!("{}-update.{}", name, ARTIFACT_EXTENSION))
    }

    /// Remove leftovers of interrupted downloads
    pub fn cleanup_partial_downloads(&self) -> io::Result<usize> {
        let dir = self.updates_dir();
        if !dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "partial") {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// `<target>.backup`, beside the target
pub fn backup_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(".backup");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_layout_init() {
        let dir = tempdir().unwrap();
        let layout = InstallLayout::with_base_dir(dir.path());
        layout.init().unwrap();

        assert!(layout.updates_dir().is_dir());
        assert_eq!(layout.config_path(), dir.path().join("launcher-config.json"));
    }

    #[test]
    fn test_staged_path() {
        let layout = InstallLayout::with_base_dir("/opt/cv");
        let staged = layout.staged_path("app");
        assert_eq!(staged.parent().unwrap(), Path::new("/opt/cv/updates"));
        assert_eq!(
            staged.file_name().unwrap().to_string_lossy(),
            format!("app-update.{}", ARTIFACT_EXTENSION)
        );
    }

    #[test]
    fn test_backup_path_keeps_extension() {
        assert_eq!(
            backup_path(Path::new("/opt/cv/cv-manager.exe")),
            PathBuf::from("/opt/cv/cv-manager.exe.backup")
        );
    }

    #[test]
    fn test_cleanup_partial_downloads() {
        let dir = tempdir().unwrap();
        let layout = InstallLayout::with_base_dir(dir.path());
        layout.init().unwrap();

        fs::write(layout.updates_dir().join("app-update.partial"), b"half").unwrap();
        fs::write(layout.staged_path("launcher"), b"whole").unwrap();

        assert_eq!(layout.cleanup_partial_downloads().unwrap(), 1);
        assert!(layout.staged_path("launcher").exists());
    }
}
