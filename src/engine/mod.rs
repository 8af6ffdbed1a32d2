// CV Manager launcher engine - core module structure
pub mod cli;
pub mod config;
pub mod launch;
pub mod layout;
pub mod updater;

pub use config::{ConfigStore, LauncherConfig};
pub use layout::InstallLayout;
