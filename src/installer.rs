//! The install engine.
//!
//! `install` drives the whole pipeline for one formula: resolve,
//! install the dependency closure (recursively, each name at most once
//! per top-level call), decide bottle vs. source, acquire, link, and
//! write the receipt. The engine is synchronous; one formula installs
//! at a time.

use crate::bottle::BottleInstaller;
use crate::build::SourceBuilder;
use crate::cellar::{self, InstallLock};
use crate::config::Config;
use crate::download::{Downloader, NullObserver, ProgressObserver};
use crate::error::{KegError, Result};
use crate::formula::Formula;
use crate::platform;
use crate::receipt::InstallReceipt;
use crate::resolver::FormulaResolver;
use crate::runner::CommandRunner;
use crate::symlink;
use std::cell::RefCell;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Install-time policy, fixed for the lifetime of one engine.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub build_from_source: bool,
    pub force_bottle: bool,
    pub ignore_dependencies: bool,
    pub only_dependencies: bool,
    pub include_test: bool,
    pub head_only: bool,
    pub keep_tmp: bool,
    pub debug_symbols: bool,
    pub force: bool,
    pub dry_run: bool,
    pub verbose: bool,
    pub strict_verification: bool,
    pub compiler: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactSource {
    Bottle,
    Source,
}

impl ArtifactSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bottle => "bottle",
            Self::Source => "source",
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstallResult {
    pub name: String,
    pub version: String,
    pub elapsed: Duration,
    pub source: ArtifactSource,
    pub success: bool,
}

pub struct Installer<'a> {
    config: &'a Config,
    options: Options,
    resolver: Box<dyn FormulaResolver + 'a>,
    downloader: Box<dyn Downloader + 'a>,
    runner: Box<dyn CommandRunner + 'a>,
    observer: Box<dyn ProgressObserver + 'a>,
    /// Names currently being installed in this top-level call; a
    /// reappearance means a dependency cycle.
    in_progress: RefCell<HashSet<String>>,
}

impl<'a> Installer<'a> {
    pub fn new(
        config: &'a Config,
        options: Options,
        resolver: Box<dyn FormulaResolver + 'a>,
        downloader: Box<dyn Downloader + 'a>,
        runner: Box<dyn CommandRunner + 'a>,
    ) -> Self {
        Self {
            config,
            options,
            resolver,
            downloader,
            runner,
            observer: Box::new(NullObserver),
            in_progress: RefCell::new(HashSet::new()),
        }
    }

    pub fn with_observer(mut self, observer: Box<dyn ProgressObserver + 'a>) -> Self {
        self.observer = observer;
        self
    }

    /// Install `name` and everything it needs. The top-level entry point.
    pub fn install(&self, name: &str) -> Result<InstallResult> {
        self.install_inner(name, true)
    }

    fn install_inner(&self, name: &str, is_root: bool) -> Result<InstallResult> {
        let started = Instant::now();
        let formula = self.resolver.resolve(name)?;

        if self.in_progress.borrow().contains(&formula.name) {
            return Err(KegError::Cycle {
                formula: formula.name.clone(),
            });
        }
        self.in_progress.borrow_mut().insert(formula.name.clone());
        let result = self.install_resolved(&formula, is_root, started);
        self.in_progress.borrow_mut().remove(&formula.name);
        result
    }

    fn install_resolved(
        &self,
        formula: &Formula,
        is_root: bool,
        started: Instant,
    ) -> Result<InstallResult> {
        let use_bottle = self.should_use_bottle(formula)?;
        let planned = if use_bottle {
            ArtifactSource::Bottle
        } else {
            ArtifactSource::Source
        };

        // `--force` reinstalls the root; dependencies already in the
        // cellar are always left alone.
        if cellar::is_installed(self.config, &formula.name) && !(is_root && self.options.force) {
            debug!("{} {} already installed", formula.name, formula.version);
            return Ok(self.finished(formula, planned, started));
        }

        if self.options.dry_run {
            info!(
                "would install {} {} from {} (dependencies: {})",
                formula.name,
                formula.version,
                planned.as_str(),
                formula.dependencies.join(", ")
            );
            return Ok(self.finished(formula, planned, started));
        }

        if !self.options.ignore_dependencies {
            self.install_dependencies(formula, use_bottle)?;
        }

        if self.options.only_dependencies && is_root {
            return Ok(self.finished(formula, planned, started));
        }

        let _lock = InstallLock::acquire(self.config, &formula.name, &formula.version)?;

        // A forced install replaces only the resolved version; other
        // installed versions (an upgrade's predecessors) stay put.
        if is_root
            && self.options.force
            && self.config.keg_path(&formula.name, &formula.version).exists()
        {
            cellar::remove_keg(self.config, &formula.name, &formula.version)?;
        }

        let (keg, source) = self.acquire(formula, use_bottle)?;

        if !formula.keg_only {
            symlink::link_keg(self.config, &formula.name, &formula.version)?;
        } else {
            info!("{} is keg-only, not linking into {}", formula.name, self.config.prefix.display());
        }

        // A receipt is a convenience, not a correctness requirement.
        let receipt = InstallReceipt::new(
            formula,
            source.as_str(),
            self.options.compiler.clone(),
            &platform::bottle_tag()?,
        );
        if let Err(e) = receipt.write(&keg) {
            warn!("failed to write receipt for {}: {e}", formula.name);
        }

        info!(
            "installed {} {} from {}",
            formula.name,
            formula.version,
            source.as_str()
        );
        Ok(self.finished(formula, source, started))
    }

    /// Runtime dependencies always; build dependencies when a source
    /// build is on the table; test dependencies on request. Any failure
    /// aborts the parent, naming both sides.
    fn install_dependencies(&self, formula: &Formula, use_bottle: bool) -> Result<()> {
        let mut wanted: Vec<&String> = formula.dependencies.iter().collect();
        if !use_bottle {
            wanted.extend(formula.build_dependencies.iter());
        }
        if self.options.include_test {
            wanted.extend(formula.test_dependencies.iter());
        }

        for dep in wanted {
            if cellar::is_installed(self.config, dep) {
                debug!("dependency {dep} already installed");
                continue;
            }
            info!("installing dependency {dep} for {}", formula.name);
            self.install_inner(dep, false).map_err(|e| KegError::Dependency {
                formula: formula.name.clone(),
                dependency: dep.clone(),
                source: Box::new(e),
            })?;
        }
        Ok(())
    }

    /// Bottle vs. source, evaluated once per formula.
    fn should_use_bottle(&self, formula: &Formula) -> Result<bool> {
        if self.options.head_only {
            return Ok(false);
        }
        if self.options.build_from_source && !self.options.force_bottle {
            return Ok(false);
        }
        Ok(formula.has_bottle(&platform::bottle_tag()?))
    }

    /// Acquire the artifact, falling back from bottle to source. A
    /// genuinely missing bottle falls back silently; anything else gets
    /// a warning first. Either way, no partial keg survives the switch.
    fn acquire(&self, formula: &Formula, use_bottle: bool) -> Result<(PathBuf, ArtifactSource)> {
        if use_bottle {
            let bottles = BottleInstaller::new(
                self.config,
                self.downloader.as_ref(),
                self.options.keep_tmp,
                self.options.strict_verification,
            );
            match bottles.install(formula, &platform::bottle_tag()?, self.observer.as_ref()) {
                Ok(keg) => return Ok((keg, ArtifactSource::Bottle)),
                Err(e) if e.is_missing_bottle() => {
                    debug!("no bottle for {}, building from source: {e}", formula.name);
                }
                Err(e) => {
                    warn!("bottle install failed for {}, building from source: {e}", formula.name);
                }
            }
            self.discard_partial_keg(formula);
        }

        let builder = SourceBuilder::new(self.config, self.downloader.as_ref(), self.runner.as_ref());
        let keg = builder.install(formula, &self.options, self.observer.as_ref())?;
        Ok((keg, ArtifactSource::Source))
    }

    fn discard_partial_keg(&self, formula: &Formula) {
        let keg = self.config.keg_path(&formula.name, &formula.version);
        if keg.exists() {
            if let Err(e) = std::fs::remove_dir_all(&keg) {
                warn!("failed to clear partial keg {}: {e}", keg.display());
            }
        }
    }

    fn finished(
        &self,
        formula: &Formula,
        source: ArtifactSource,
        started: Instant,
    ) -> InstallResult {
        InstallResult {
            name: formula.name.clone(),
            version: formula.version.clone(),
            elapsed: started.elapsed(),
            source,
            success: true,
        }
    }
}
