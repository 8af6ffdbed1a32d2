//! Self-Update System
//!
//! Shared by the launcher and the main app to keep both binaries current.
//!
//! Components:
//! - `manifest` - Fetching and decoding remote manifests
//! - `version` - Version comparison
//! - `download` - Streaming download with digest and progress
//! - `verify` - SHA256 verification
//! - `installer` - Backup, swap and rollback
//! - `state` - Update state machine
//! - `orchestrator` - Per-component updater
//! - `scheduler` - Background update checks
//! - `release` - Release notes and commits from the releases repository

pub mod component;
pub mod download;
pub mod error;
pub mod installer;
pub mod manifest;
pub mod orchestrator;
pub mod release;
pub mod scheduler;
pub mod state;
pub mod verify;
pub mod version;

pub use component::{Component, ComponentId, CurrentVersion};
pub use download::{DownloadProgress, DownloadStatus};
pub use error::UpdateError;
pub use manifest::{ManifestTransport, UpdateManifest};
pub use orchestrator::{UpdateManager, Updater};
pub use release::{CommitInfo, ReleaseClient, ReleaseInfo, RepositoryStatus};
pub use scheduler::UpdateScheduler;
pub use state::{UpdatePhase, UpdateStatus};
