//! File configuration: a YAML document with `mirror` and `log` sections.
//!
//! ```yaml
//! mirror:
//!   id: elections
//!   database_url: sqlite:./mirror.db?mode=rwc
//!   # a value ending in ':' must be quoted, e.g. 'sqlite::memory:'
//! log:
//!   level: info
//!   components:
//!     ledgermirror-core: debug
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use ledgermirror_core::MirrorConfig;

use crate::logging::LogConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mirror: MirrorConfig,
    pub log: LogConfig,
}

impl Settings {
    /// Load settings from `path`, or defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let settings: Self = serde_yaml::from_str(yaml)?;
        settings.mirror.validate()?;
        Ok(settings)
    }

    /// Apply command-line overrides on top of file values.
    pub fn with_overrides(mut self, db: Option<String>, verbose: bool) -> Self {
        if let Some(db) = db {
            self.mirror.database_url = db;
        }
        if verbose {
            self.log.level = "debug".into();
        }
        self
    }
}
