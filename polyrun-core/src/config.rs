//! TOML configuration read from `polyrun.toml` at the repository root.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::orchestrator::{default_concurrency, ExecutionMode};
use crate::registry::DEFAULT_REGISTRY_URL;

pub const CONFIG_FILE: &str = "polyrun.toml";

/// Defaults for `run` and `exec`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Maximum callbacks running at once; host parallelism when unset.
    pub concurrency: Option<usize>,
    pub mode: ExecutionMode,
    /// Reject cyclic selections in sequential mode.
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    pub url: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REGISTRY_URL.to_string(),
        }
    }
}

/// Repository-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub run: RunConfig,
    pub registry: RegistryConfig,
}

impl Config {
    /// Loads `polyrun.toml` from `root`, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed or
    /// validated.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let path = root.as_ref().join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content).map_err(|error| Error::Toml {
            error,
            context: path.display().to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error for a zero concurrency or an empty registry URL.
    pub fn validate(&self) -> Result<()> {
        if self.run.concurrency == Some(0) {
            return Err(Error::Config(
                "run.concurrency must be at least 1".to_string(),
            ));
        }
        if self.registry.url.trim().is_empty() {
            return Err(Error::Config("registry.url cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Effective concurrency, taking `overridden` from the command line first.
    pub fn concurrency(&self, overridden: Option<usize>) -> usize {
        overridden
            .or(self.run.concurrency)
            .unwrap_or_else(default_concurrency)
            .max(1)
    }
}
