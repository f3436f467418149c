//! Formula resolution.
//!
//! The engine asks a [`FormulaResolver`] for a [`Formula`] and nothing
//! else; where the definition comes from is this module's business.
//! [`ChainResolver`] is the production wiring: a remote JSON index
//! first, then local tap repositories (the core tap ahead of the rest,
//! in registration order). A tap-qualified name (`owner/repo/formula`)
//! bypasses the index entirely.

use crate::config::Config;
use crate::error::{KegError, Result};
use crate::formula::Formula;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const DEFAULT_API_BASE: &str = "https://formulae.brew.sh/api";
const CORE_TAP: &str = "homebrew/core";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const FORMULA_CACHE_SIZE: u64 = 1000;

pub trait FormulaResolver {
    fn resolve(&self, name: &str) -> Result<Formula>;

    /// Names this resolver knows about, for "did you mean" suggestions.
    /// Expensive resolvers may return nothing.
    fn known_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Remote JSON index lookup with an in-memory cache.
pub struct ApiResolver {
    client: reqwest::blocking::Client,
    base_url: String,
    cache: moka::sync::Cache<String, Formula>,
}

impl ApiResolver {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_API_BASE)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(format!("keg/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache: moka::sync::Cache::new(FORMULA_CACHE_SIZE),
        })
    }
}

impl FormulaResolver for ApiResolver {
    fn resolve(&self, name: &str) -> Result<Formula> {
        if let Some(cached) = self.cache.get(name) {
            return Ok(cached);
        }

        let url = format!("{}/formula/{}.json", self.base_url, name);
        let response = self.client.get(&url).send().map_err(|e| KegError::Network {
            operation: format!("fetching formula index for {name}"),
            reason: e.to_string(),
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(KegError::FormulaNotFound {
                name: name.to_string(),
                candidates: Vec::new(),
            });
        }
        if !response.status().is_success() {
            return Err(KegError::Download {
                url,
                status: Some(response.status().as_u16()),
                reason: "index request failed".to_string(),
            });
        }

        let formula: Formula = response.json()?;
        self.cache.insert(name.to_string(), formula.clone());
        Ok(formula)
    }
}

/// Local tap repositories: `{taps_dir}/{owner}/{repo}/Formula/{name}.json`.
pub struct TapResolver {
    taps_dir: PathBuf,
}

impl TapResolver {
    pub fn new(config: &Config) -> Self {
        Self {
            taps_dir: config.taps_dir.clone(),
        }
    }

    fn tap_dir(&self, tap: &str) -> Option<PathBuf> {
        let (owner, repo) = tap.split_once('/')?;
        Some(self.taps_dir.join(owner).join(repo))
    }

    fn formula_path(&self, tap: &str, name: &str) -> Option<PathBuf> {
        let path = self.tap_dir(tap)?.join("Formula").join(format!("{name}.json"));
        path.exists().then_some(path)
    }

    /// Registered taps, the core tap first, the rest in directory order.
    fn registered_taps(&self) -> Vec<String> {
        let mut taps = Vec::new();
        let Ok(owners) = std::fs::read_dir(&self.taps_dir) else {
            return taps;
        };
        for owner in owners.filter_map(|e| e.ok()) {
            let owner_name = owner.file_name().to_string_lossy().to_string();
            let Ok(repos) = std::fs::read_dir(owner.path()) else {
                continue;
            };
            for repo in repos.filter_map(|e| e.ok()) {
                if repo.path().is_dir() {
                    taps.push(format!("{owner_name}/{}", repo.file_name().to_string_lossy()));
                }
            }
        }
        taps.sort_by_key(|tap| (tap != CORE_TAP, tap.clone()));
        taps
    }

    fn load(&self, path: &PathBuf) -> Result<Formula> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Resolve against one specific tap.
    pub fn resolve_in(&self, tap: &str, name: &str) -> Result<Formula> {
        match self.formula_path(tap, name) {
            Some(path) => self.load(&path),
            None => Err(KegError::FormulaNotFound {
                name: format!("{tap}/{name}"),
                candidates: Vec::new(),
            }),
        }
    }
}

impl FormulaResolver for TapResolver {
    fn resolve(&self, name: &str) -> Result<Formula> {
        for tap in self.registered_taps() {
            if let Some(path) = self.formula_path(&tap, name) {
                debug!("resolved {name} from tap {tap}");
                return self.load(&path);
            }
        }
        Err(KegError::FormulaNotFound {
            name: name.to_string(),
            candidates: Vec::new(),
        })
    }

    fn known_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for tap in self.registered_taps() {
            let Some(dir) = self.tap_dir(&tap) else { continue };
            let Ok(entries) = std::fs::read_dir(dir.join("Formula")) else {
                continue;
            };
            for entry in entries.filter_map(|e| e.ok()) {
                let file_name = entry.file_name().to_string_lossy().to_string();
                if let Some(name) = file_name.strip_suffix(".json") {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        names.dedup();
        names
    }
}

/// Remote index first, local taps as fallback; tap-qualified names go
/// straight to their tap.
pub struct ChainResolver {
    api: Option<ApiResolver>,
    taps: TapResolver,
}

impl ChainResolver {
    pub fn new(api: Option<ApiResolver>, taps: TapResolver) -> Self {
        Self { api, taps }
    }

    /// `owner/repo/formula` → (`owner/repo`, `formula`).
    fn split_qualified(name: &str) -> Option<(String, String)> {
        let parts: Vec<&str> = name.split('/').collect();
        if parts.len() == 3 && parts.iter().all(|p| !p.is_empty()) {
            Some((format!("{}/{}", parts[0], parts[1]), parts[2].to_string()))
        } else {
            None
        }
    }

    fn suggestions_for(&self, name: &str) -> Vec<String> {
        let mut scored: Vec<(f64, String)> = self
            .taps
            .known_names()
            .into_iter()
            .map(|candidate| (strsim::jaro_winkler(name, &candidate), candidate))
            .filter(|(score, _)| *score > 0.85)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(3).map(|(_, name)| name).collect()
    }
}

impl FormulaResolver for ChainResolver {
    fn resolve(&self, name: &str) -> Result<Formula> {
        if let Some((tap, formula)) = Self::split_qualified(name) {
            return self.taps.resolve_in(&tap, &formula);
        }

        if let Some(api) = &self.api {
            match api.resolve(name) {
                Ok(formula) => return Ok(formula),
                Err(e) => debug!("index lookup for {name} failed, trying taps: {e}"),
            }
        }

        match self.taps.resolve(name) {
            Ok(formula) => Ok(formula),
            Err(KegError::FormulaNotFound { .. }) => Err(KegError::FormulaNotFound {
                name: name.to_string(),
                candidates: self.suggestions_for(name),
            }),
            Err(e) => Err(e),
        }
    }

    fn known_names(&self) -> Vec<String> {
        self.taps.known_names()
    }
}
