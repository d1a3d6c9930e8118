//! Remote client configuration.

use prd_core::{defaults, OrgDirConfig, Result};

/// Configuration for the remote platform client.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the API, e.g. `https://example.com/api/v1`.
    pub base_url: String,
    /// Bearer token (optional for local fakes).
    pub token: Option<String>,
    /// Transient-failure retry budget.
    pub n_retries: u32,
    /// Remote requests allowed in flight during bulk operations.
    pub max_in_flight: usize,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: None,
            n_retries: defaults::N_RETRIES,
            max_in_flight: defaults::MAX_IN_FLIGHT,
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECS,
        }
    }
}

impl RemoteConfig {
    /// Create a config for an API base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Set the bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Build from an organization directory entry, reading its token and
    /// applying environment overrides.
    pub fn for_org(dir: &OrgDirConfig) -> Result<Self> {
        Ok(Self::new(dir.api_base.clone())
            .with_token(dir.token()?)
            .with_env_overrides())
    }

    /// Apply environment overrides (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `PRD_N_RETRIES` | `3` | Retries for 408/5xx/network failures |
    /// | `PRD_MAX_IN_FLIGHT` | `5` | Concurrent remote requests |
    /// | `PRD_REQUEST_TIMEOUT` | `60` | Request timeout (seconds) |
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(n) = std::env::var("PRD_N_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            self.n_retries = n;
        }
        if let Some(n) = std::env::var("PRD_MAX_IN_FLIGHT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            self.max_in_flight = n.max(1);
        }
        if let Some(n) = std::env::var("PRD_REQUEST_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.timeout_seconds = n;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RemoteConfig::new("https://example.com/api/v1");
        assert_eq!(config.n_retries, 3);
        assert_eq!(config.max_in_flight, 5);
        assert!(config.token.is_none());
    }

    #[test]
    fn test_with_token() {
        let config = RemoteConfig::new("https://e").with_token("abc");
        assert_eq!(config.token.as_deref(), Some("abc"));
    }
}
