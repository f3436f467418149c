//! Resolved path configuration: prefix, Cellar, download cache, taps.
//!
//! The engine never computes paths on the fly; everything is resolved
//! once here and passed in. `KEG_PREFIX` and `KEG_CACHE` override the
//! architecture defaults, mirroring how Homebrew honors
//! `HOMEBREW_PREFIX`.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Config {
    /// Shared install prefix (symlink targets live under here).
    pub prefix: PathBuf,
    /// Root of versioned keg directories: `{cellar}/{name}/{version}`.
    pub cellar: PathBuf,
    /// Download cache for bottles, sources, and patches.
    pub cache: PathBuf,
    /// Local tap repositories root.
    pub taps_dir: PathBuf,
}

impl Config {
    /// Detect paths from the environment, falling back to the
    /// conventional per-architecture prefix.
    pub fn detect() -> Self {
        let prefix = std::env::var("KEG_PREFIX")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_prefix());
        let cache = std::env::var("KEG_CACHE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_cache());
        Self::with_paths(prefix, cache)
    }

    /// Build a config rooted at an explicit prefix. Used by tests and by
    /// callers that already resolved their layout.
    pub fn with_paths(prefix: PathBuf, cache: PathBuf) -> Self {
        let cellar = prefix.join("Cellar");
        let taps_dir = prefix.join("Library/Taps");
        Self {
            prefix,
            cellar,
            cache,
            taps_dir,
        }
    }

    /// Versioned keg directory for a formula.
    pub fn keg_path(&self, name: &str, version: &str) -> PathBuf {
        self.cellar.join(name).join(version)
    }

    /// All version directories installed for a formula.
    pub fn formula_dir(&self, name: &str) -> PathBuf {
        self.cellar.join(name)
    }
}

fn default_prefix() -> PathBuf {
    #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
    {
        PathBuf::from("/opt/homebrew")
    }
    #[cfg(all(target_os = "macos", target_arch = "x86_64"))]
    {
        PathBuf::from("/usr/local")
    }
    #[cfg(not(target_os = "macos"))]
    {
        PathBuf::from("/home/linuxbrew/.linuxbrew")
    }
}

fn default_cache() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".cache/keg/downloads")
}
