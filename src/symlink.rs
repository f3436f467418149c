//! Post-install linking into the shared prefix.
//!
//! Every regular file under a keg's `bin` is symlinked into
//! `{prefix}/bin`, replacing an existing symlink of the same name.
//! Regular files already occupying a name are left alone (with a
//! warning) rather than clobbered. Keg-only formulae skip this stage
//! entirely; the engine enforces that.

use crate::config::Config;
use crate::error::Result;
use std::fs;
use std::os::unix::fs as unix_fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Link the keg's `bin` files into the prefix. Returns the created link
/// paths.
pub fn link_keg(config: &Config, name: &str, version: &str) -> Result<Vec<PathBuf>> {
    let source_bin = config.keg_path(name, version).join("bin");
    if !source_bin.is_dir() {
        return Ok(Vec::new());
    }

    let target_bin = config.prefix.join("bin");
    fs::create_dir_all(&target_bin)?;

    let mut linked = Vec::new();
    for entry in WalkDir::new(&source_bin).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let target = target_bin.join(entry.file_name());
        if replace_link(entry.path(), &target)? {
            linked.push(target);
        }
    }

    debug!("linked {} files for {name} {version}", linked.len());
    Ok(linked)
}

/// Create `target` → `source`, replacing an existing symlink of the same
/// name. Returns false when a non-symlink already occupies the name.
fn replace_link(source: &Path, target: &Path) -> Result<bool> {
    if let Ok(meta) = target.symlink_metadata() {
        if meta.file_type().is_symlink() {
            fs::remove_file(target)?;
        } else {
            warn!(
                "not linking {}: a regular file already exists at {}",
                source.display(),
                target.display()
            );
            return Ok(false);
        }
    }
    unix_fs::symlink(source, target)?;
    Ok(true)
}

/// Remove prefix `bin` symlinks that point into the given keg. Used by
/// uninstall.
pub fn unlink_keg(config: &Config, name: &str, version: &str) -> Result<Vec<PathBuf>> {
    let keg_path = config.keg_path(name, version);
    let target_bin = config.prefix.join("bin");
    if !target_bin.is_dir() {
        return Ok(Vec::new());
    }

    let mut removed = Vec::new();
    for entry in fs::read_dir(&target_bin)? {
        let entry = entry?;
        let path = entry.path();
        let Ok(meta) = path.symlink_metadata() else {
            continue;
        };
        if !meta.file_type().is_symlink() {
            continue;
        }
        if let Ok(link_target) = fs::read_link(&path) {
            let resolved = if link_target.is_relative() {
                target_bin.join(&link_target)
            } else {
                link_target
            };
            if resolved.starts_with(&keg_path) {
                fs::remove_file(&path)?;
                removed.push(path);
            }
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_paths(dir.path().to_path_buf(), dir.path().join("cache"));
        (dir, config)
    }

    fn install_fake_keg(config: &Config, name: &str, version: &str, bins: &[&str]) {
        let bin_dir = config.keg_path(name, version).join("bin");
        fs::create_dir_all(&bin_dir).unwrap();
        for bin in bins {
            fs::write(bin_dir.join(bin), "#!/bin/sh\n").unwrap();
        }
    }

    #[test]
    fn links_regular_files_into_prefix_bin() {
        let (_dir, config) = sandbox();
        install_fake_keg(&config, "wget", "1.21.3", &["wget"]);

        let linked = link_keg(&config, "wget", "1.21.3").unwrap();
        assert_eq!(linked.len(), 1);
        let link = config.prefix.join("bin/wget");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(
            fs::read_link(&link).unwrap(),
            config.keg_path("wget", "1.21.3").join("bin/wget")
        );
    }

    #[test]
    fn relinking_replaces_stale_symlinks() {
        let (_dir, config) = sandbox();
        install_fake_keg(&config, "wget", "1.20.0", &["wget"]);
        install_fake_keg(&config, "wget", "1.21.3", &["wget"]);

        link_keg(&config, "wget", "1.20.0").unwrap();
        link_keg(&config, "wget", "1.21.3").unwrap();

        let resolved = fs::read_link(config.prefix.join("bin/wget")).unwrap();
        assert!(resolved.starts_with(config.keg_path("wget", "1.21.3")));
    }

    #[test]
    fn regular_files_are_not_clobbered() {
        let (_dir, config) = sandbox();
        install_fake_keg(&config, "wget", "1.21.3", &["wget"]);
        fs::create_dir_all(config.prefix.join("bin")).unwrap();
        fs::write(config.prefix.join("bin/wget"), "user-owned").unwrap();

        let linked = link_keg(&config, "wget", "1.21.3").unwrap();
        assert!(linked.is_empty());
        assert_eq!(
            fs::read_to_string(config.prefix.join("bin/wget")).unwrap(),
            "user-owned"
        );
    }

    #[test]
    fn unlink_removes_only_this_kegs_links() {
        let (_dir, config) = sandbox();
        install_fake_keg(&config, "wget", "1.21.3", &["wget"]);
        install_fake_keg(&config, "curl", "8.6.0", &["curl"]);
        link_keg(&config, "wget", "1.21.3").unwrap();
        link_keg(&config, "curl", "8.6.0").unwrap();

        let removed = unlink_keg(&config, "wget", "1.21.3").unwrap();
        assert_eq!(removed.len(), 1);
        assert!(!config.prefix.join("bin/wget").symlink_metadata().is_ok());
        assert!(config.prefix.join("bin/curl").symlink_metadata().is_ok());
    }
}
