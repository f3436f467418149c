//! Error types for the install engine.
//!
//! Every failure kind carries enough context to name the formula and the
//! failing operation, plus remediation suggestions surfaced by the CLI.
//! Recoverability is explicit per kind: a caller may retry network,
//! download, checksum, dependency, permission, and configuration
//! failures; build failures and unknown formulae are terminal for that
//! install.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KegError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("formula not found: {name}")]
    FormulaNotFound {
        name: String,
        /// Closest known formula names, best match first.
        candidates: Vec<String>,
    },

    #[error("network error while {operation}: {reason}")]
    Network { operation: String, reason: String },

    #[error("download failed for {url}{}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Download {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("{algorithm} checksum mismatch for {path}: expected {expected}, got {actual}")]
    Checksum {
        path: String,
        algorithm: String,
        expected: String,
        actual: String,
        formula: Option<String>,
        version: Option<String>,
    },

    #[error("dependency {dependency} of {formula} failed to install: {source}")]
    Dependency {
        formula: String,
        dependency: String,
        #[source]
        source: Box<KegError>,
    },

    #[error("build failed{}: {reason}", system.as_ref().map(|s| format!(" ({s})")).unwrap_or_default())]
    Build {
        /// Build system in play, when detection got that far.
        system: Option<String>,
        reason: String,
        /// Captured child stdout/stderr, surfaced when not streaming.
        output: Option<String>,
    },

    #[error("no bottle available for {formula} on platform {platform}")]
    BottleUnavailable { formula: String, platform: String },

    #[error("dependency cycle detected at {formula}")]
    Cycle { formula: String },

    #[error("permission denied for {path}: {reason}")]
    Permission { path: String, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("installation of {formula} failed: {source}")]
    Installation {
        formula: String,
        #[source]
        source: Box<KegError>,
    },
}

impl KegError {
    /// Whether the caller may sensibly retry or work around this failure.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network { .. }
            | Self::Download { .. }
            | Self::Checksum { .. }
            | Self::Dependency { .. }
            | Self::Permission { .. }
            | Self::Configuration(_)
            | Self::BottleUnavailable { .. }
            | Self::Http(_)
            | Self::Io(_) => true,
            Self::Build { .. }
            | Self::FormulaNotFound { .. }
            | Self::Cycle { .. }
            | Self::Json(_) => false,
            Self::Installation { source, .. } => source.is_recoverable(),
        }
    }

    /// True when a bottle attempt failed because the artifact genuinely
    /// does not exist (as opposed to a corrupt download). The acquisition
    /// fallback stays silent for these.
    pub fn is_missing_bottle(&self) -> bool {
        match self {
            Self::BottleUnavailable { .. } => true,
            Self::Download { status, .. } => {
                matches!(status, Some(401) | Some(403) | Some(404))
            }
            Self::Installation { source, .. } => source.is_missing_bottle(),
            _ => false,
        }
    }

    /// Remediation hints tailored to the failure, printed after the error.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Network { .. } | Self::Http(_) => vec![
                "Check your internet connection".to_string(),
                "Retry in a few moments".to_string(),
            ],
            Self::Download { url, .. } => {
                let mut hints = vec!["Retry the download".to_string()];
                if url.contains("github.com") || url.contains("githubusercontent.com") {
                    hints.push("Check https://www.githubstatus.com for outages".to_string());
                }
                hints
            }
            Self::Checksum { .. } => vec![
                "Delete the cached file and retry; the download may be corrupted".to_string(),
                "If the mismatch persists, the upstream archive may have changed".to_string(),
            ],
            Self::Dependency { dependency, .. } => vec![
                format!("Try installing {dependency} on its own to see the full error"),
                "Pass --ignore-dependencies to skip dependency installation".to_string(),
            ],
            Self::Build { system, .. } => build_system_hints(system.as_deref()),
            Self::FormulaNotFound { candidates, .. } => {
                if candidates.is_empty() {
                    vec!["Check the spelling, or add the tap that provides it".to_string()]
                } else {
                    vec![format!("Did you mean: {}?", candidates.join(", "))]
                }
            }
            Self::BottleUnavailable { .. } => {
                vec!["Build from source with --build-from-source".to_string()]
            }
            Self::Permission { path, .. } => {
                vec![format!("Check ownership and write permission on {path}")]
            }
            Self::Installation { source, .. } => source.suggestions(),
            _ => Vec::new(),
        }
    }
}

fn build_system_hints(system: Option<&str>) -> Vec<String> {
    match system {
        Some("cmake") => vec![
            "Ensure cmake is installed and on PATH".to_string(),
            "Inspect CMakeFiles/CMakeError.log in the build directory".to_string(),
        ],
        Some("autotools") | Some("autoreconf") => vec![
            "Ensure autoconf, automake, and libtool are installed".to_string(),
            "Inspect config.log in the build directory".to_string(),
        ],
        Some("meson") => vec!["Ensure meson and ninja are installed".to_string()],
        Some("cargo") => vec!["Ensure a Rust toolchain is installed (rustup.rs)".to_string()],
        Some("go") => vec!["Ensure a Go toolchain is installed".to_string()],
        Some("npm") => vec!["Ensure node and npm are installed".to_string()],
        Some("python") | Some("pip") => {
            vec!["Ensure python3 and pip are installed".to_string()]
        }
        Some("ninja") => vec!["Ensure ninja is installed".to_string()],
        Some("bazel") => vec!["Ensure bazel is installed".to_string()],
        _ => vec!["Check that the required build tools are installed".to_string()],
    }
}

pub type Result<T> = std::result::Result<T, KegError>;
