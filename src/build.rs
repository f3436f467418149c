//! From-source builds.
//!
//! The pipeline downloads and verifies the source archive, unpacks it
//! into an isolated build directory, applies patches, detects the
//! build system from marker files, and drives the resolved command
//! sequence through a [`CommandRunner`]. Each step aborts the whole
//! build on failure.

use crate::config::Config;
use crate::download::{Downloader, ProgressObserver};
use crate::error::{KegError, Result};
use crate::extract;
use crate::formula::Formula;
use crate::installer::Options;
use crate::runner::{CommandRunner, CommandSpec};
use crate::verify::{ChecksumAlgorithm, FileInfo, Verifier};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildSystem {
    Autotools,
    /// `configure.ac`/`configure.in` present but no generated `configure`.
    Autoreconf,
    Cmake,
    Meson,
    PythonSetuptools,
    Pip,
    Cargo,
    Go,
    Npm,
    Ninja,
    Bazel,
    Make,
}

impl BuildSystem {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Autotools => "autotools",
            Self::Autoreconf => "autoreconf",
            Self::Cmake => "cmake",
            Self::Meson => "meson",
            Self::PythonSetuptools => "python",
            Self::Pip => "pip",
            Self::Cargo => "cargo",
            Self::Go => "go",
            Self::Npm => "npm",
            Self::Ninja => "ninja",
            Self::Bazel => "bazel",
            Self::Make => "make",
        }
    }
}

/// Ordered marker-file probe; the first match wins.
pub fn detect_build_system(dir: &Path) -> Result<BuildSystem> {
    let has = |name: &str| dir.join(name).exists();

    if has("configure") {
        return Ok(BuildSystem::Autotools);
    }
    if has("configure.ac") || has("configure.in") {
        return Ok(BuildSystem::Autoreconf);
    }
    if has("CMakeLists.txt") {
        return Ok(BuildSystem::Cmake);
    }
    if has("meson.build") {
        return Ok(BuildSystem::Meson);
    }
    if has("setup.py") {
        return Ok(BuildSystem::PythonSetuptools);
    }
    if has("pyproject.toml") {
        return Ok(BuildSystem::Pip);
    }
    if has("Cargo.toml") {
        return Ok(BuildSystem::Cargo);
    }
    if has("go.mod") {
        return Ok(BuildSystem::Go);
    }
    if has("package.json") {
        return Ok(BuildSystem::Npm);
    }
    if has("build.ninja") {
        return Ok(BuildSystem::Ninja);
    }
    if has("BUILD") || has("BUILD.bazel") || has("WORKSPACE") {
        return Ok(BuildSystem::Bazel);
    }
    if has("Makefile") {
        return Ok(BuildSystem::Make);
    }

    // Distinguish "unsupported build system" from "no build files at all"
    // by naming what was actually there.
    let mut found: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    found.sort();
    found.truncate(8);
    let reason = if found.is_empty() {
        "no build files present (data-only package?)".to_string()
    } else {
        format!("no supported build system among: {}", found.join(", "))
    };
    Err(KegError::Build {
        system: None,
        reason,
        output: None,
    })
}

/// Command sequence for a detected build system, with the versioned
/// cellar path injected as the install prefix.
pub fn build_plan(
    system: BuildSystem,
    source_root: &Path,
    keg: &Path,
    formula_name: &str,
) -> Vec<CommandSpec> {
    let keg_str = keg.to_string_lossy().to_string();
    let in_root = |program: &str| CommandSpec::new(program, source_root);

    match system {
        BuildSystem::Autotools | BuildSystem::Autoreconf => vec![
            in_root("./configure").arg(format!("--prefix={keg_str}")),
            in_root("make"),
            in_root("make").arg("install"),
        ],
        BuildSystem::Cmake => vec![
            in_root("cmake")
                .args(["-S", ".", "-B", "build"])
                .arg(format!("-DCMAKE_INSTALL_PREFIX={keg_str}"))
                .arg("-DCMAKE_BUILD_TYPE=Release"),
            in_root("cmake").args(["--build", "build"]),
            in_root("cmake").args(["--install", "build"]),
        ],
        BuildSystem::Meson => vec![
            in_root("meson")
                .args(["setup", "build"])
                .arg(format!("--prefix={keg_str}")),
            in_root("meson").args(["compile", "-C", "build"]),
            in_root("meson").args(["install", "-C", "build"]),
        ],
        BuildSystem::PythonSetuptools => vec![in_root("python3")
            .args(["setup.py", "install"])
            .arg(format!("--prefix={keg_str}"))],
        BuildSystem::Pip => vec![in_root("python3")
            .args(["-m", "pip", "install", "--prefix"])
            .arg(keg_str)
            .arg(".")],
        BuildSystem::Cargo => vec![
            in_root("cargo").args(["build", "--release"]),
            in_root("cargo")
                .args(["install", "--path", ".", "--root"])
                .arg(keg_str),
        ],
        BuildSystem::Go => vec![in_root("go")
            .args(["build", "-o"])
            .arg(format!("{keg_str}/bin/{formula_name}"))
            .arg(".")],
        BuildSystem::Npm => vec![
            in_root("npm").arg("install"),
            in_root("npm")
                .args(["install", "-g", "--prefix"])
                .arg(keg_str)
                .arg("."),
        ],
        BuildSystem::Ninja => vec![in_root("ninja"), in_root("ninja").arg("install")],
        BuildSystem::Bazel => vec![in_root("bazel").args(["build", "//..."])],
        BuildSystem::Make => vec![
            in_root("make").arg(format!("PREFIX={keg_str}")),
            in_root("make").arg("install").arg(format!("PREFIX={keg_str}")),
        ],
    }
}

pub struct SourceBuilder<'a> {
    config: &'a Config,
    downloader: &'a dyn Downloader,
    runner: &'a dyn CommandRunner,
}

impl<'a> SourceBuilder<'a> {
    pub fn new(
        config: &'a Config,
        downloader: &'a dyn Downloader,
        runner: &'a dyn CommandRunner,
    ) -> Self {
        Self {
            config,
            downloader,
            runner,
        }
    }

    /// Download, verify, unpack, patch, detect, and build. Returns the
    /// populated keg path on success.
    pub fn install(
        &self,
        formula: &Formula,
        options: &Options,
        observer: &dyn ProgressObserver,
    ) -> Result<PathBuf> {
        let url = formula
            .source_url(options.head_only)
            .ok_or_else(|| KegError::Build {
                system: None,
                reason: format!("{} has no source URL", formula.name),
                output: None,
            })?
            .to_string();

        let build_dir = tempfile::Builder::new()
            .prefix(&format!("keg-build-{}-{}-", formula.name, formula.version))
            .tempdir()?;
        // Drop tears the directory down; into_path() keeps it around.
        let build_path = if options.keep_tmp {
            let path = build_dir.into_path();
            info!("keeping build directory at {}", path.display());
            path
        } else {
            build_dir.path().to_path_buf()
        };

        let archive = build_path.join(archive_file_name(&url, formula));
        info!("downloading source for {} from {url}", formula.name);
        self.downloader.fetch(&url, &archive, observer)?;

        // HEAD builds have no pinned checksum to hold them to.
        if !options.head_only {
            if let Some(expected) = &formula.sha256 {
                let verification = Verifier::new(options.strict_verification).verify_file(
                    &FileInfo::new(&archive).with_checksum(ChecksumAlgorithm::Sha256, expected),
                );
                if !verification.is_successful() {
                    let actual = verification
                        .checksums
                        .first()
                        .map(|outcome| outcome.actual.clone())
                        .unwrap_or_default();
                    return Err(KegError::Checksum {
                        path: archive.display().to_string(),
                        algorithm: ChecksumAlgorithm::Sha256.to_string(),
                        expected: expected.clone(),
                        actual,
                        formula: Some(formula.name.clone()),
                        version: Some(formula.version.clone()),
                    });
                }
            }
        }

        let unpack_dir = build_path.join("src");
        std::fs::create_dir_all(&unpack_dir)?;
        if archive.extension().and_then(|e| e.to_str()) == Some("tar") {
            extract::extract_plain_tar(&archive, &unpack_dir)?;
        } else {
            extract::extract_tar_gz(&archive, &unpack_dir)?;
        }

        let source_root = determine_source_root(&unpack_dir)?;
        debug!("source root for {}: {}", formula.name, source_root.display());

        self.apply_patches(formula, &build_path, &source_root, observer)?;

        let system = detect_build_system(&source_root)?;
        info!("building {} with {}", formula.name, system.name());
        if system == BuildSystem::Autoreconf {
            self.ensure_autotools()?;
            self.run_step(system, &CommandSpec::new("autoreconf", &source_root).arg("-fiv"))?;
        }

        let keg = self.config.keg_path(&formula.name, &formula.version);
        std::fs::create_dir_all(&keg)?;

        for step in build_plan(system, &source_root, &keg, &formula.name) {
            let step = self.with_build_env(step, &keg, options);
            self.run_step(system, &step)?;
        }

        Ok(keg)
    }

    fn with_build_env(&self, spec: CommandSpec, keg: &Path, options: &Options) -> CommandSpec {
        let mut spec = spec
            .env("PREFIX", keg.to_string_lossy())
            .env("KEG_PREFIX", self.config.prefix.to_string_lossy());
        if let Some(compiler) = &options.compiler {
            spec = spec.env("CC", compiler).env("CXX", compiler);
        }
        if options.debug_symbols {
            spec = spec.env("CFLAGS", "-g").env("CXXFLAGS", "-g");
        }
        spec
    }

    fn run_step(&self, system: BuildSystem, spec: &CommandSpec) -> Result<()> {
        debug!("running: {}", spec.display());
        let output = self.runner.run(spec)?;
        if !output.success {
            return Err(KegError::Build {
                system: Some(system.name().to_string()),
                reason: format!(
                    "`{}` exited with status {}",
                    spec.display(),
                    output
                        .status_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "unknown".to_string())
                ),
                output: Some(output.combined()),
            });
        }
        Ok(())
    }

    /// Patches apply in formula order; one failure sinks the build.
    fn apply_patches(
        &self,
        formula: &Formula,
        build_path: &Path,
        source_root: &Path,
        observer: &dyn ProgressObserver,
    ) -> Result<()> {
        for (index, patch) in formula.patches.iter().enumerate() {
            let patch_file = build_path.join(format!("patch-{index}.diff"));
            if let Some(url) = &patch.url {
                self.downloader.fetch(url, &patch_file, observer)?;
            } else if let Some(data) = &patch.data {
                std::fs::write(&patch_file, data)?;
            } else {
                warn!("patch {index} for {} has neither url nor data", formula.name);
                continue;
            }

            let spec = CommandSpec::new("patch", source_root)
                .arg(format!("-p{}", patch.strip))
                .arg("-i")
                .arg(patch_file.to_string_lossy());
            let output = self.runner.run(&spec)?;
            if !output.success {
                return Err(KegError::Build {
                    system: None,
                    reason: format!("patch {index} failed to apply for {}", formula.name),
                    output: Some(output.combined()),
                });
            }
        }
        Ok(())
    }

    /// Make sure the autotools toolchain exists before autoreconf runs,
    /// with a best-effort package-manager bootstrap when it does not.
    fn ensure_autotools(&self) -> Result<()> {
        const TOOLS: [&str; 4] = ["autoreconf", "autoconf", "automake", "aclocal"];
        let missing: Vec<&str> = TOOLS
            .iter()
            .copied()
            .filter(|tool| which::which(tool).is_err())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        warn!("autotools missing ({}), attempting install", missing.join(", "));
        if let Some(spec) = autotools_install_command() {
            if let Err(e) = self.runner.run(&spec) {
                debug!("autotools bootstrap failed: {e}");
            }
        }

        if TOOLS.iter().any(|tool| which::which(tool).is_err()) {
            return Err(KegError::Build {
                system: Some("autoreconf".to_string()),
                reason: format!("required tools not found: {}", missing.join(", ")),
                output: None,
            });
        }
        Ok(())
    }
}

fn autotools_install_command() -> Option<CommandSpec> {
    let cwd = std::env::temp_dir();
    if which::which("brew").is_ok() {
        Some(CommandSpec::new("brew", cwd).args(["install", "autoconf", "automake", "libtool"]))
    } else if which::which("apt-get").is_ok() {
        Some(CommandSpec::new("apt-get", cwd).args([
            "install",
            "-y",
            "autoconf",
            "automake",
            "libtool",
        ]))
    } else if which::which("dnf").is_ok() {
        Some(CommandSpec::new("dnf", cwd).args(["install", "-y", "autoconf", "automake", "libtool"]))
    } else if which::which("pacman").is_ok() {
        Some(CommandSpec::new("pacman", cwd).args([
            "-S",
            "--noconfirm",
            "autoconf",
            "automake",
            "libtool",
        ]))
    } else {
        None
    }
}

/// Archives usually unpack into `{name}-{version}/`; descend when the
/// top level is a single directory, otherwise probe for a `configure`
/// script, then a `Makefile`, before settling on the root itself.
pub fn determine_source_root(unpack_dir: &Path) -> Result<PathBuf> {
    let entries: Vec<PathBuf> = std::fs::read_dir(unpack_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();

    if entries.len() == 1 && entries[0].is_dir() {
        return Ok(entries[0].clone());
    }

    for marker in ["configure", "Makefile"] {
        if unpack_dir.join(marker).exists() {
            return Ok(unpack_dir.to_path_buf());
        }
        for entry in walkdir::WalkDir::new(unpack_dir)
            .min_depth(1)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_dir() && entry.path().join(marker).exists() {
                return Ok(entry.path().to_path_buf());
            }
        }
    }

    Ok(unpack_dir.to_path_buf())
}

fn archive_file_name(url: &str, formula: &Formula) -> String {
    url.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(|name| name.split('?').next().unwrap_or(name).to_string())
        .unwrap_or_else(|| format!("{}-{}.tar.gz", formula.name, formula.version))
}
