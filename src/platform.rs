//! Platform detection for bottle selection.
//!
//! Bottles are keyed by `<arch>_<os>` tags like `arm64_sequoia` or
//! `x86_64_linux`. `KEG_BOTTLE_TAG` overrides detection, which keeps the
//! engine testable and lets users pin a compatible tag.

use crate::error::Result;

/// Platform tag for the running system.
pub fn bottle_tag() -> Result<String> {
    if let Ok(tag) = std::env::var("KEG_BOTTLE_TAG") {
        if !tag.is_empty() {
            return Ok(tag);
        }
    }
    detect_tag()
}

fn detect_tag() -> Result<String> {
    #[cfg(target_os = "macos")]
    {
        // Homebrew spells aarch64 as arm64
        let arch = match std::env::consts::ARCH {
            "aarch64" => "arm64",
            other => other,
        };
        Ok(format!("{}_{}", arch, macos_codename(&macos_version()?)))
    }

    #[cfg(target_os = "linux")]
    {
        let arch = match std::env::consts::ARCH {
            "aarch64" => "arm64",
            other => other,
        };
        Ok(format!("{arch}_linux"))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Err(crate::error::KegError::Configuration(
            "unsupported platform for bottles".to_string(),
        ))
    }
}

#[cfg(target_os = "macos")]
fn macos_version() -> Result<String> {
    use crate::error::KegError;
    let output = std::process::Command::new("sw_vers")
        .arg("-productVersion")
        .output()
        .map_err(|e| KegError::Configuration(format!("failed to run sw_vers: {e}")))?;
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok(version)
}

#[cfg(target_os = "macos")]
fn macos_codename(version: &str) -> &'static str {
    let major: u32 = version
        .split('.')
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    match major {
        26 | 16 => "tahoe",
        15 => "sequoia",
        14 => "sonoma",
        13 => "ventura",
        12 => "monterey",
        11 => "big_sur",
        _ => "sonoma",
    }
}
