//! Install receipts.
//!
//! Every successful install leaves an `INSTALL_RECEIPT.json` in the keg
//! recording what was installed, when, from which artifact kind, and on
//! which platform. Receipts are written once and never mutated; a
//! reinstall writes a fresh one. They are a convenience record: failing
//! to write one is logged but never fails the install.

use crate::error::Result;
use crate::formula::Formula;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const RECEIPT_FILE: &str = "INSTALL_RECEIPT.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub name: String,
    pub version: String,
    pub installed_on: DateTime<Utc>,
    /// Installer identity, e.g. `keg/0.3.1`.
    pub installed_by: String,
    /// `"bottle"` or `"source"`.
    pub source: String,
    pub dependencies: Vec<String>,
    pub build_dependencies: Vec<String>,
    #[serde(default)]
    pub compiler: Option<String>,
    /// Bottle platform tag this install targeted.
    pub platform: String,
}

impl InstallReceipt {
    pub fn new(
        formula: &Formula,
        source: &str,
        compiler: Option<String>,
        platform: &str,
    ) -> Self {
        Self {
            name: formula.name.clone(),
            version: formula.version.clone(),
            installed_on: Utc::now(),
            installed_by: format!("keg/{}", env!("CARGO_PKG_VERSION")),
            source: source.to_string(),
            dependencies: formula.dependencies.clone(),
            build_dependencies: formula.build_dependencies.clone(),
            compiler,
            platform: platform.to_string(),
        }
    }

    /// Persist into the keg directory as pretty-printed JSON.
    pub fn write(&self, keg_path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(keg_path.join(RECEIPT_FILE), json)?;
        Ok(())
    }

    pub fn read(keg_path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(keg_path.join(RECEIPT_FILE))?;
        Ok(serde_json::from_str(&contents)?)
    }
}
