//! Alias management
//!
//! An alias names an S3-compatible endpoint together with its credentials
//! and the retry policy used for every paginated call against it.

use serde::{Deserialize, Serialize};

use crate::config::ConfigManager;
use crate::error::{Error, Result};

/// Retry policy for transient-unavailability responses
///
/// Backoff is drawn uniformly from `[min_backoff_ms, max_backoff_ms]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_min_backoff_ms")]
    pub min_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            min_backoff_ms: default_min_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    10
}

fn default_min_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

/// A named storage endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub name: String,
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,

    #[serde(default = "default_region")]
    pub region: String,

    /// Bucket lookup style: auto, path, or dns
    #[serde(default = "default_bucket_lookup")]
    pub bucket_lookup: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_bucket_lookup() -> String {
    "auto".to_string()
}

impl Alias {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: default_region(),
            bucket_lookup: default_bucket_lookup(),
            retry: None,
        }
    }

    /// Effective retry policy for this alias
    pub fn retry_config(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_default()
    }
}

/// CRUD over the aliases stored in the configuration file
#[derive(Debug, Clone)]
pub struct AliasManager {
    config: ConfigManager,
}

impl AliasManager {
    pub fn new() -> Result<Self> {
        Ok(Self {
            config: ConfigManager::new()?,
        })
    }

    pub fn with_config(config: ConfigManager) -> Self {
        Self { config }
    }

    /// Look up an alias by name
    pub fn get(&self, name: &str) -> Result<Alias> {
        self.config
            .load()?
            .aliases
            .into_iter()
            .find(|a| a.name == name)
            .ok_or_else(|| Error::AliasNotFound(name.to_string()))
    }

    /// Add an alias or replace the one with the same name
    pub fn set(&self, alias: Alias) -> Result<()> {
        let mut config = self.config.load()?;
        match config.aliases.iter_mut().find(|a| a.name == alias.name) {
            Some(existing) => *existing = alias,
            None => config.aliases.push(alias),
        }
        self.config.save(&config)
    }

    /// All aliases sorted by name
    pub fn list(&self) -> Result<Vec<Alias>> {
        let mut aliases = self.config.load()?.aliases;
        aliases.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(aliases)
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        let mut config = self.config.load()?;
        let before = config.aliases.len();
        config.aliases.retain(|a| a.name != name);
        if config.aliases.len() == before {
            return Err(Error::AliasNotFound(name.to_string()));
        }
        self.config.save(&config)
    }
}
