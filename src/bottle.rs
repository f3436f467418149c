//! Bottle acquisition and installation.
//!
//! A bottle is installed in three phases: download into the cache
//! (skipped when a previous download already matches the expected
//! checksum), verify, then extract into the versioned keg directory.
//! Unverified content is never extracted; a corrupt download is deleted
//! so the next attempt starts clean.

use crate::config::Config;
use crate::download::{Downloader, ProgressObserver};
use crate::error::{KegError, Result};
use crate::extract;
use crate::formula::Formula;
use crate::verify::{hash_file, ChecksumAlgorithm, FileInfo, Verifier};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

pub struct BottleInstaller<'a> {
    config: &'a Config,
    downloader: &'a dyn Downloader,
    keep_archive: bool,
    strict: bool,
}

impl<'a> BottleInstaller<'a> {
    pub fn new(
        config: &'a Config,
        downloader: &'a dyn Downloader,
        keep_archive: bool,
        strict: bool,
    ) -> Self {
        Self {
            config,
            downloader,
            keep_archive,
            strict,
        }
    }

    /// Cache location for a bottle archive.
    pub fn cache_path(&self, formula: &Formula, tag: &str) -> PathBuf {
        self.config.cache.join(format!(
            "{}-{}.{}.bottle.tar.gz",
            formula.name, formula.version, tag
        ))
    }

    /// Download, verify, and unpack the bottle for `tag`. Returns the
    /// populated keg path.
    pub fn install(
        &self,
        formula: &Formula,
        tag: &str,
        observer: &dyn ProgressObserver,
    ) -> Result<PathBuf> {
        let bottle = formula
            .bottle_file(tag)
            .ok_or_else(|| KegError::BottleUnavailable {
                formula: formula.name.clone(),
                platform: tag.to_string(),
            })?;

        let archive = self.cache_path(formula, tag);
        if archive.exists() {
            if matches_checksum(&archive, &bottle.sha256)? {
                debug!("bottle cache hit: {}", archive.display());
            } else {
                // Stale or truncated; start over
                fs::remove_file(&archive)?;
            }
        }

        if !archive.exists() {
            self.downloader.fetch(&bottle.url, &archive, observer)?;
        }

        let verification = Verifier::new(self.strict).verify_file(
            &FileInfo::new(&archive).with_checksum(ChecksumAlgorithm::Sha256, &bottle.sha256),
        );
        if !verification.is_successful() {
            fs::remove_file(&archive)?;
            let actual = verification
                .checksums
                .first()
                .map(|outcome| outcome.actual.clone())
                .unwrap_or_default();
            return Err(KegError::Checksum {
                path: archive.display().to_string(),
                algorithm: ChecksumAlgorithm::Sha256.to_string(),
                expected: bottle.sha256.clone(),
                actual,
                formula: Some(formula.name.clone()),
                version: Some(formula.version.clone()),
            });
        }

        let keg_path = self.config.keg_path(&formula.name, &formula.version);
        extract::extract_tar_gz(&archive, &keg_path)?;

        if !self.keep_archive {
            let _ = fs::remove_file(&archive);
        }

        Ok(keg_path)
    }
}

fn matches_checksum(path: &std::path::Path, expected: &str) -> Result<bool> {
    Ok(hash_file(path, ChecksumAlgorithm::Sha256)?.eq_ignore_ascii_case(expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::NullObserver;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs::File;
    use std::io::Write;
    use std::path::Path;

    /// Serves a fixed local file for any URL.
    struct FixtureDownloader {
        fixture: PathBuf,
    }

    impl Downloader for FixtureDownloader {
        fn fetch(&self, _url: &str, dest: &Path, _observer: &dyn ProgressObserver) -> Result<()> {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&self.fixture, dest)?;
            Ok(())
        }
    }

    fn sandbox() -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_paths(dir.path().to_path_buf(), dir.path().join("cache"));
        (dir, config)
    }

    fn write_bottle_archive(dir: &Path) -> PathBuf {
        let archive_path = dir.join("fixture.bottle.tar.gz");
        let file = File::create(&archive_path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let contents = b"#!/bin/sh\necho wget\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, "bin/wget", &contents[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap().flush().unwrap();
        archive_path
    }

    fn wget_formula(bottle_sha: &str) -> Formula {
        serde_json::from_str(&format!(
            r#"{{
                "name": "wget",
                "version": "1.21.3",
                "bottle": {{
                    "x86_64_sequoia": {{
                        "url": "https://ghcr.io/v2/homebrew/core/wget/blobs/sha256:{bottle_sha}",
                        "sha256": "{bottle_sha}"
                    }}
                }}
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn installs_verified_bottle_into_keg() {
        let (dir, config) = sandbox();
        let fixture = write_bottle_archive(dir.path());
        let sha = hash_file(&fixture, ChecksumAlgorithm::Sha256).unwrap();
        let downloader = FixtureDownloader { fixture };

        let formula = wget_formula(&sha);
        let installer = BottleInstaller::new(&config, &downloader, false, false);
        let keg = installer
            .install(&formula, "x86_64_sequoia", &NullObserver)
            .unwrap();

        assert_eq!(keg, config.keg_path("wget", "1.21.3"));
        assert!(keg.join("bin/wget").is_file());
        // Archive cleaned up after successful extraction
        assert!(!installer.cache_path(&formula, "x86_64_sequoia").exists());
    }

    #[test]
    fn corrupt_download_is_deleted_and_fails_before_extraction() {
        let (dir, config) = sandbox();
        let fixture = write_bottle_archive(dir.path());
        let downloader = FixtureDownloader { fixture };

        let formula = wget_formula(&"0".repeat(64));
        let installer = BottleInstaller::new(&config, &downloader, false, false);
        let err = installer
            .install(&formula, "x86_64_sequoia", &NullObserver)
            .unwrap_err();

        match err {
            KegError::Checksum {
                expected,
                actual,
                formula: name,
                version,
                ..
            } => {
                assert_eq!(expected, "0".repeat(64));
                assert_ne!(actual, expected);
                assert!(!actual.is_empty());
                assert_eq!(name.as_deref(), Some("wget"));
                assert_eq!(version.as_deref(), Some("1.21.3"));
            }
            other => panic!("expected ChecksumError, got {other:?}"),
        }
        assert!(!installer.cache_path(&formula, "x86_64_sequoia").exists());
        assert!(!config.keg_path("wget", "1.21.3").exists());
    }

    #[test]
    fn missing_platform_is_a_typed_unavailable_error() {
        let (dir, config) = sandbox();
        let fixture = write_bottle_archive(dir.path());
        let downloader = FixtureDownloader { fixture };

        let formula = wget_formula(&"0".repeat(64));
        let installer = BottleInstaller::new(&config, &downloader, false, false);
        let err = installer
            .install(&formula, "arm64_sequoia", &NullObserver)
            .unwrap_err();
        assert!(err.is_missing_bottle());
    }

    #[test]
    fn cache_hit_skips_download() {
        struct FailingDownloader;
        impl Downloader for FailingDownloader {
            fn fetch(&self, url: &str, _dest: &Path, _o: &dyn ProgressObserver) -> Result<()> {
                Err(KegError::Download {
                    url: url.to_string(),
                    status: Some(500),
                    reason: "should not be called".to_string(),
                })
            }
        }

        let (dir, config) = sandbox();
        let fixture = write_bottle_archive(dir.path());
        let sha = hash_file(&fixture, ChecksumAlgorithm::Sha256).unwrap();
        let formula = wget_formula(&sha);

        // Pre-seed the cache with a valid archive
        let installer = BottleInstaller::new(&config, &FailingDownloader, true, false);
        let cached = installer.cache_path(&formula, "x86_64_sequoia");
        fs::create_dir_all(cached.parent().unwrap()).unwrap();
        fs::copy(&fixture, &cached).unwrap();

        let keg = installer
            .install(&formula, "x86_64_sequoia", &NullObserver)
            .unwrap();
        assert!(keg.join("bin/wget").is_file());
        // keep_archive retains the cached bottle
        assert!(cached.exists());
    }
}
