//! Cellar inspection: which kegs are installed, at what versions.
//!
//! Also home of the per-keg advisory install lock. Two concurrent
//! invocations targeting the same `{formula, version}` would otherwise
//! race on the versioned directory; the lock makes the second fail fast.

use crate::config::Config;
use crate::error::{KegError, Result};
use crate::receipt::InstallReceipt;
use std::cmp::Ordering;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// One installed version of a formula.
#[derive(Debug, Clone)]
pub struct InstalledKeg {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    pub receipt: Option<InstallReceipt>,
}

/// Whether any version of the formula is present in the cellar.
pub fn is_installed(config: &Config, name: &str) -> bool {
    installed_version(config, name).is_some()
}

/// Newest installed version of the formula, if any.
pub fn installed_version(config: &Config, name: &str) -> Option<String> {
    installed_versions(config, name)
        .ok()
        .and_then(|kegs| kegs.into_iter().next().map(|keg| keg.version))
}

/// All installed versions of a formula, newest first.
pub fn installed_versions(config: &Config, name: &str) -> Result<Vec<InstalledKeg>> {
    let formula_dir = config.formula_dir(name);
    if !formula_dir.exists() {
        return Ok(Vec::new());
    }

    let mut kegs = Vec::new();
    for entry in fs::read_dir(&formula_dir)? {
        let entry = entry?;
        let version = entry.file_name().to_string_lossy().to_string();
        if version.starts_with('.') || !entry.path().is_dir() {
            continue;
        }
        let path = entry.path();
        let receipt = InstallReceipt::read(&path).ok();
        kegs.push(InstalledKeg {
            name: name.to_string(),
            version,
            path,
            receipt,
        });
    }

    kegs.sort_by(|a, b| compare_versions(&b.version, &a.version));
    Ok(kegs)
}

/// Every installed keg in the cellar (all formulae, all versions).
pub fn list_installed(config: &Config) -> Result<Vec<InstalledKeg>> {
    if !config.cellar.exists() {
        return Ok(Vec::new());
    }

    let mut kegs = Vec::new();
    for entry in fs::read_dir(&config.cellar)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || !entry.path().is_dir() {
            continue;
        }
        kegs.extend(installed_versions(config, &name)?);
    }

    kegs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(kegs)
}

/// Remove a keg's versioned directory, and the formula directory when it
/// was the last version.
pub fn remove_keg(config: &Config, name: &str, version: &str) -> Result<()> {
    let keg_path = config.keg_path(name, version);
    if !keg_path.exists() {
        return Err(KegError::Configuration(format!(
            "{name} {version} is not installed"
        )));
    }
    fs::remove_dir_all(&keg_path)?;

    let formula_dir = config.formula_dir(name);
    if fs::read_dir(&formula_dir)?.next().is_none() {
        fs::remove_dir(&formula_dir)?;
    }
    Ok(())
}

/// Compare dotted version strings numerically, component by component,
/// falling back to lexicographic order for ties.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a_parts: Vec<u32> = a.split('.').filter_map(|s| s.parse().ok()).collect();
    let b_parts: Vec<u32> = b.split('.').filter_map(|s| s.parse().ok()).collect();

    for i in 0..a_parts.len().max(b_parts.len()) {
        let a_part = a_parts.get(i).unwrap_or(&0);
        let b_part = b_parts.get(i).unwrap_or(&0);
        match a_part.cmp(b_part) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.cmp(b)
}

/// Advisory lock on one `{formula, version}`. Held for the duration of
/// the write phase; released (file removed) on drop.
#[derive(Debug)]
pub struct InstallLock {
    path: PathBuf,
}

impl InstallLock {
    pub fn acquire(config: &Config, name: &str, version: &str) -> Result<Self> {
        let formula_dir = config.formula_dir(name);
        fs::create_dir_all(&formula_dir)?;
        let path = formula_dir.join(format!(".keg-lock-{version}"));

        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                use std::io::Write;
                let _ = write!(file, "{}", std::process::id());
                debug!("acquired install lock {}", path.display());
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(KegError::Installation {
                    formula: name.to_string(),
                    source: Box::new(KegError::Configuration(format!(
                        "another install of {name} {version} is in progress (lock: {})",
                        path.display()
                    ))),
                })
            }
            Err(e) => Err(KegError::Io(e)),
        }
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
