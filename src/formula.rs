//! Formula data model.
//!
//! A [`Formula`] is the fully-typed, immutable description of a package:
//! where its source lives, what it depends on, which prebuilt bottles
//! exist, and how to patch it. Resolvers produce these from API payloads
//! or local tap files; the engine only ever reads them. All "maybe
//! missing" JSON decoding stays at the resolver boundary via
//! `#[serde(default)]`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A prebuilt binary artifact for one platform tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BottleFile {
    pub url: String,
    pub sha256: String,
}

/// A patch applied before building from source. Either `url` or `data`
/// is set; `strip` is the `-p` level handed to patch(1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patch {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default = "default_strip")]
    pub strip: u32,
}

fn default_strip() -> u32 {
    1
}

/// Package description, read-only once resolved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Formula {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    /// Stable source archive URL.
    #[serde(default)]
    pub url: Option<String>,
    /// SHA-256 of the stable source archive.
    #[serde(default)]
    pub sha256: Option<String>,
    /// HEAD (development) source URL, used with `--head`.
    #[serde(default)]
    pub head: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub build_dependencies: Vec<String>,
    #[serde(default)]
    pub test_dependencies: Vec<String>,
    /// Platform tag → bottle artifact.
    #[serde(default)]
    pub bottle: BTreeMap<String, BottleFile>,
    #[serde(default)]
    pub patches: Vec<Patch>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub keg_only: bool,
}

impl Formula {
    /// Whether a bottle exists for the given platform tag.
    pub fn has_bottle(&self, tag: &str) -> bool {
        self.bottle.contains_key(tag)
    }

    /// Bottle artifact for the given platform tag, if any.
    pub fn bottle_file(&self, tag: &str) -> Option<&BottleFile> {
        self.bottle.get(tag)
    }

    /// Source URL for a build: HEAD when requested and available,
    /// otherwise the stable URL.
    pub fn source_url(&self, head_only: bool) -> Option<&str> {
        if head_only {
            self.head.as_deref().or(self.url.as_deref())
        } else {
            self.url.as_deref()
        }
    }
}
