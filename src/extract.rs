//! Archive extraction.
//!
//! Bottles and most source tarballs are gzip-compressed tar archives.
//! Entries are unpacked relative to the destination, preserving file
//! mode bits. Only directory and regular-file entries are handled;
//! anything else (device nodes, hard links) is skipped with a debug log.
//! Entry paths are validated so an archive cannot escape its
//! destination.

use crate::error::{KegError, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use tracing::debug;

/// Unpack a tar+gzip archive into `dest`, creating it if needed.
pub fn extract_tar_gz(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    extract_tar(GzDecoder::new(file), dest)
}

/// Unpack an uncompressed tar archive into `dest`.
pub fn extract_plain_tar(archive_path: &Path, dest: &Path) -> Result<()> {
    extract_tar(File::open(archive_path)?, dest)
}

fn extract_tar(reader: impl Read, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();
        let target = safe_join(dest, &entry_path)?;

        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&target)?;
            }
            EntryType::Regular => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                entry.unpack(&target)?;
            }
            other => {
                debug!("skipping {:?} entry {}", other, entry_path.display());
            }
        }
    }
    Ok(())
}

/// Join an archive-relative path onto `dest`, rejecting absolute paths
/// and parent-directory traversal.
fn safe_join(dest: &Path, entry_path: &Path) -> Result<PathBuf> {
    let mut target = dest.to_path_buf();
    for component in entry_path.components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            _ => {
                return Err(KegError::Configuration(format!(
                    "archive entry escapes destination: {}",
                    entry_path.display()
                )));
            }
        }
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn build_archive(entries: &[(&str, &str, u32)]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("fixture.tar.gz");
        let file = File::create(&archive_path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for (path, contents, mode) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(*mode);
            // `Header::set_path` (and thus `append_data`) refuses `..`
            // components, so write the name bytes directly to allow
            // building malicious fixtures for the traversal test.
            header.as_gnu_mut().unwrap().name[..path.len()]
                .copy_from_slice(path.as_bytes());
            header.set_cksum();
            builder.append(&header, contents.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap().flush().unwrap();
        (dir, archive_path)
    }

    #[test]
    fn extracts_files_preserving_modes() {
        use std::os::unix::fs::PermissionsExt;

        let (dir, archive) = build_archive(&[
            ("bin/wget", "#!/bin/sh\n", 0o755),
            ("share/doc/README", "docs\n", 0o644),
        ]);
        let dest = dir.path().join("keg");
        extract_tar_gz(&archive, &dest).unwrap();

        let bin = dest.join("bin/wget");
        assert!(bin.is_file());
        let mode = fs::metadata(&bin).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
        assert!(dest.join("share/doc/README").is_file());
    }

    #[test]
    fn rejects_traversal_entries() {
        let (dir, archive) = build_archive(&[("../escape", "nope", 0o644)]);
        let dest = dir.path().join("keg");
        assert!(extract_tar_gz(&archive, &dest).is_err());
        assert!(!dir.path().join("escape").exists());
    }
}
