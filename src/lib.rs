//! Homebrew-compatible package installer engine.
//!
//! The library exposes the full pipeline: formula resolution, recursive
//! dependency installs, bottle download/verify/extract, from-source
//! builds, checksum verification, linking, and install receipts. The
//! `keg` binary is a thin CLI over [`installer::Installer`].

pub mod bottle;
pub mod build;
pub mod cellar;
pub mod config;
pub mod download;
pub mod error;
pub mod extract;
pub mod formula;
pub mod installer;
pub mod platform;
pub mod receipt;
pub mod resolver;
pub mod runner;
pub mod symlink;
pub mod verify;

pub use config::Config;
pub use error::{KegError, Result};
pub use formula::Formula;
pub use installer::{ArtifactSource, InstallResult, Installer, Options};
pub use receipt::InstallReceipt;
