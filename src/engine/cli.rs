//! Launcher CLI Module
//! Command-line interface for update and launch operations

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::engine::layout::InstallLayout;
use crate::engine::updater::ComponentId;

#[derive(Parser, Debug)]
#[command(name = "cv-manager-launcher")]
#[command(author = "CV Manager Team")]
#[command(version)]
#[command(about = "Launcher and self-updater for CV Manager Pro", long_about = None)]
pub struct Cli {
    /// Install directory (defaults to the directory of this executable)
    #[arg(long, global = true)]
    pub install_dir: Option<PathBuf>,

    /// Output format (json for scripting)
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ComponentArg {
    Launcher,
    App,
}

impl From<ComponentArg> for ComponentId {
    fn from(arg: ComponentArg) -> Self {
        match arg {
            ComponentArg::Launcher => ComponentId::Launcher,
            ComponentArg::App => ComponentId::App,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check for available updates
    Check {
        /// Only check this component
        component: Option<ComponentArg>,
    },

    /// Download and verify the latest release of a component
    Download {
        component: ComponentArg,

        /// Download from this URL instead of the manifest's
        #[arg(long)]
        url: Option<String>,

        /// Expected SHA256 (with --url)
        #[arg(long, requires = "url")]
        sha256: Option<String>,
    },

    /// Install a downloaded update
    Apply {
        component: ComponentArg,

        /// Version to record for the installed binary
        #[arg(short, long)]
        version: Option<String>,
    },

    /// Check, download and install in one step
    Update {
        component: ComponentArg,
    },

    /// Show the installed version of a component
    Version {
        component: ComponentArg,
    },

    /// Show the latest published release and recent commits
    Release {
        /// Number of recent commits to list
        #[arg(long, default_value_t = 5)]
        commits: usize,
    },

    /// Check whether the releases repository is reachable
    Status,

    /// Start the main application
    Launch,

    /// Keep checking for updates in the background until interrupted
    Watch {
        /// Seconds between checks (defaults to the configured interval)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Launcher configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the current configuration
    Show,

    /// Set where user data is stored
    SetDataLocation {
        /// Directory (a leading ~ is expanded); defaults to <install dir>/cv-data
        path: Option<String>,
    },

    /// Enable or disable background downloads
    AutoUpdate {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },

    /// Reset configuration to defaults
    Reset,
}

impl Cli {
    pub fn layout(&self) -> std::io::Result<InstallLayout> {
        match &self.install_dir {
            Some(dir) => Ok(InstallLayout::with_base_dir(dir.clone())),
            None => InstallLayout::from_current_exe(),
        }
    }
}
