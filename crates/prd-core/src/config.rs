//! Project configuration loaded from `prd_config.yaml`.
//!
//! ```yaml
//! directories:
//!   dev-org:
//!     org_id: 12345
//!     api_base: https://example.com/api/v1
//!     token_env: PRD_TOKEN_DEV
//!     subdirectories:
//!       invoices:
//!         regex: "(?i)invoice"
//!       archive:
//!         include: false
//! ```
//!
//! Tokens never live in the file; `token_env` names the environment variable
//! that holds them.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::defaults;
use crate::error::{Error, Result};
use crate::subdir::Subdirectory;

/// Top-level project configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Organization directories keyed by their directory name.
    #[serde(default)]
    pub directories: BTreeMap<String, OrgDirConfig>,
}

/// One organization directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgDirConfig {
    pub org_id: i64,
    pub api_base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
    /// Whether this organization is a deploy source (mapping is regenerated on pull).
    #[serde(default = "default_true")]
    pub source: bool,
    #[serde(default)]
    pub subdirectories: BTreeMap<String, SubdirConfig>,
}

/// Subdirectory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubdirConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default = "default_true")]
    pub include: bool,
}

fn default_true() -> bool {
    true
}

impl ProjectConfig {
    /// Load `prd_config.yaml` from a project root.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(defaults::CONFIG_FILE);
        let text = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: ProjectConfig = serde_yaml::from_str(text)?;
        for (name, dir) in &config.directories {
            if dir.api_base.trim().is_empty() {
                return Err(Error::Config(format!("{}: api_base is empty", name)));
            }
        }
        Ok(config)
    }

    /// Look up one organization directory.
    pub fn directory(&self, name: &str) -> Result<&OrgDirConfig> {
        self.directories
            .get(name)
            .ok_or_else(|| Error::Config(format!("unknown organization directory: {}", name)))
    }
}

impl OrgDirConfig {
    /// Read the API token from the configured environment variable.
    pub fn token(&self) -> Result<String> {
        let var = self
            .token_env
            .as_deref()
            .ok_or_else(|| Error::Config(format!("no token_env for org {}", self.org_id)))?;
        std::env::var(var).map_err(|_| Error::Config(format!("{} is not set", var)))
    }

    /// Build subdirectories with compiled patterns. With none configured, a
    /// single implicit `default` subdirectory takes every object.
    pub fn subdirectories(&self) -> Result<Vec<Subdirectory>> {
        if self.subdirectories.is_empty() {
            return Ok(vec![Subdirectory::new(defaults::DEFAULT_SUBDIR)]);
        }
        self.subdirectories
            .iter()
            .map(|(name, cfg)| -> Result<Subdirectory> {
                let mut subdir = Subdirectory::new(name.clone()).with_include(cfg.include);
                if let Some(pattern) = &cfg.regex {
                    subdir = subdir.with_regex(Regex::new(pattern)?);
                }
                Ok(subdir)
            })
            .collect()
    }
}
