//! CV Manager Pro - launcher and self-update library
//!
//! Shared by the launcher and the main application to check for, download,
//! verify and install new versions of either binary.

pub mod engine;

pub use engine::updater::{ComponentId, UpdateError, Updater};
