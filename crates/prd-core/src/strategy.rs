//! Pull strategies.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// How a diverged remote object is reconciled with the local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PullStrategy {
    /// Leave the local file untouched.
    Skip,
    /// Replace the local file with the remote version.
    Overwrite,
    /// Three-way merge through the VCS stash.
    Merge,
    /// Consult the prompter for every conflict.
    #[default]
    Ask,
}

impl PullStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PullStrategy::Skip => "skip",
            PullStrategy::Overwrite => "overwrite",
            PullStrategy::Merge => "merge",
            PullStrategy::Ask => "ask",
        }
    }
}

impl fmt::Display for PullStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PullStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "skip" | "s" => Ok(PullStrategy::Skip),
            "overwrite" | "o" => Ok(PullStrategy::Overwrite),
            "merge" | "m" => Ok(PullStrategy::Merge),
            "ask" => Ok(PullStrategy::Ask),
            other => Err(Error::InvalidInput(format!("unknown pull strategy: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strategy() {
        assert_eq!("merge".parse::<PullStrategy>().unwrap(), PullStrategy::Merge);
        assert_eq!(" O ".parse::<PullStrategy>().unwrap(), PullStrategy::Overwrite);
        assert!("rebase".parse::<PullStrategy>().is_err());
    }

    #[test]
    fn test_default_is_ask() {
        assert_eq!(PullStrategy::default(), PullStrategy::Ask);
    }
}
