//! Checksum verification for downloaded artifacts.
//!
//! [`Verifier::verify_file`] is a pure function of the file's bytes: it
//! checks existence, optionally the size, and any number of digests
//! (SHA-256, SHA-512, SHA-1, MD5). In strict mode a size mismatch is a
//! hard error; otherwise it is only recorded as a warning. Hex digests
//! compare case-insensitively.

use crate::error::{KegError, Result};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Sha256,
    Sha512,
    Sha1,
    Md5,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Sha1 => "sha1",
            Self::Md5 => "md5",
        };
        f.write_str(name)
    }
}

/// One expected digest for a file.
#[derive(Debug, Clone)]
pub struct Checksum {
    pub algorithm: ChecksumAlgorithm,
    pub expected: String,
}

/// A path plus everything we expect to be true of its contents.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: PathBuf,
    pub expected_size: Option<u64>,
    pub checksums: Vec<Checksum>,
}

impl FileInfo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            expected_size: None,
            checksums: Vec::new(),
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.expected_size = Some(size);
        self
    }

    pub fn with_checksum(mut self, algorithm: ChecksumAlgorithm, expected: &str) -> Self {
        self.checksums.push(Checksum {
            algorithm,
            expected: expected.to_string(),
        });
        self
    }
}

/// Outcome of a single digest comparison.
#[derive(Debug, Clone)]
pub struct ChecksumOutcome {
    pub algorithm: ChecksumAlgorithm,
    pub passed: bool,
    pub actual: String,
}

#[derive(Debug, Default)]
pub struct VerificationResult {
    pub file_exists: bool,
    /// None when no expected size was supplied.
    pub size_matches: Option<bool>,
    pub checksums: Vec<ChecksumOutcome>,
    pub warnings: Vec<String>,
    pub errors: Vec<KegError>,
}

impl VerificationResult {
    /// True iff the file exists, every requested checksum passed, and no
    /// errors were recorded. A non-strict size mismatch alone does not
    /// fail verification.
    pub fn is_successful(&self) -> bool {
        self.file_exists && self.errors.is_empty() && self.checksums.iter().all(|c| c.passed)
    }
}

/// Stateless beyond the strict flag fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct Verifier {
    strict: bool,
}

impl Verifier {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    pub fn verify_file(&self, info: &FileInfo) -> VerificationResult {
        let mut result = VerificationResult::default();

        if !info.path.exists() {
            result.file_exists = false;
            return result;
        }
        result.file_exists = true;

        if let Some(expected_size) = info.expected_size {
            match std::fs::metadata(&info.path) {
                Ok(meta) => {
                    let matches = meta.len() == expected_size;
                    result.size_matches = Some(matches);
                    if !matches {
                        let message = format!(
                            "size mismatch for {}: expected {} bytes, found {}",
                            info.path.display(),
                            expected_size,
                            meta.len()
                        );
                        if self.strict {
                            result.errors.push(KegError::Configuration(message));
                        } else {
                            result.warnings.push(message);
                        }
                    }
                }
                Err(e) => result.errors.push(KegError::Io(e)),
            }
        }

        for checksum in &info.checksums {
            match hash_file(&info.path, checksum.algorithm) {
                Ok(actual) => {
                    let passed = actual.eq_ignore_ascii_case(&checksum.expected);
                    if !passed {
                        let (formula, version) = infer_formula_version(&info.path);
                        result.errors.push(KegError::Checksum {
                            path: info.path.display().to_string(),
                            algorithm: checksum.algorithm.to_string(),
                            expected: checksum.expected.clone(),
                            actual: actual.clone(),
                            formula,
                            version,
                        });
                    }
                    result.checksums.push(ChecksumOutcome {
                        algorithm: checksum.algorithm,
                        passed,
                        actual,
                    });
                }
                Err(e) => {
                    result.errors.push(e);
                    result.checksums.push(ChecksumOutcome {
                        algorithm: checksum.algorithm,
                        passed: false,
                        actual: String::new(),
                    });
                }
            }
        }

        result
    }
}

/// Streamed digest of a file, lowercase hex.
pub fn hash_file(path: &Path, algorithm: ChecksumAlgorithm) -> Result<String> {
    let mut file = File::open(path)?;
    match algorithm {
        ChecksumAlgorithm::Sha256 => digest_reader::<Sha256>(&mut file),
        ChecksumAlgorithm::Sha512 => digest_reader::<Sha512>(&mut file),
        ChecksumAlgorithm::Sha1 => digest_reader::<Sha1>(&mut file),
        ChecksumAlgorithm::Md5 => digest_reader::<Md5>(&mut file),
    }
}

fn digest_reader<D: Digest>(reader: &mut impl Read) -> Result<String> {
    let mut hasher = D::new();
    let mut buffer = vec![0u8; 8192];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Best-effort `{name}-{version}` recovery from cache filenames like
/// `wget-1.21.3.x86_64_sequoia.bottle.tar.gz` or `wget-1.21.3.tar.gz`.
fn infer_formula_version(path: &Path) -> (Option<String>, Option<String>) {
    let file_name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return (None, None),
    };

    let mut stem = file_name;
    for suffix in [".bottle.tar.gz", ".tar.gz", ".tgz", ".tar.xz", ".tar.bz2", ".zip"] {
        if let Some(stripped) = stem.strip_suffix(suffix) {
            stem = stripped;
            break;
        }
    }
    // Drop a trailing platform tag segment if present (wget-1.21.3.x86_64_sequoia)
    if let Some((head, tail)) = stem.rsplit_once('.') {
        if tail.contains('_') && !tail.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            stem = head;
        }
    }

    match stem.rsplit_once('-') {
        Some((name, version))
            if version.chars().next().is_some_and(|c| c.is_ascii_digit()) =>
        {
            (Some(name.to_string()), Some(version.to_string()))
        }
        _ => (None, None),
    }
}
