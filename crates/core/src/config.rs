//! Configuration file management
//!
//! The configuration lives in a single TOML file. Its directory can be
//! overridden with `BW_CONFIG_DIR`, which the tests and golden tests rely on.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::alias::Alias;
use crate::error::{Error, Result};

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "BW_CONFIG_DIR";

const CONFIG_FILE_NAME: &str = "config.toml";
const SCHEMA_VERSION: u32 = 1;

/// Root configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub aliases: Vec<Alias>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            defaults: Defaults::default(),
            aliases: Vec::new(),
        }
    }
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Defaults applied to every command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    /// Output mode: "human" or "json"
    #[serde(default = "default_output")]
    pub output: String,

    /// Rows buffered before a tree listing renders a table chunk
    #[serde(default = "default_render_batch")]
    pub render_batch: usize,

    /// Maximum restore requests in flight
    #[serde(default = "default_restore_parallel")]
    pub restore_parallel: usize,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            render_batch: default_render_batch(),
            restore_parallel: default_restore_parallel(),
        }
    }
}

impl Defaults {
    /// Whether JSON output is the configured mode
    pub fn prefers_json(&self) -> bool {
        self.output.eq_ignore_ascii_case("json")
    }
}

fn default_output() -> String {
    "human".to_string()
}

fn default_render_batch() -> usize {
    100
}

fn default_restore_parallel() -> usize {
    4
}

/// Loads and saves the configuration file
#[derive(Debug, Clone)]
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    /// Create a manager for the default configuration location
    pub fn new() -> Result<Self> {
        Ok(Self {
            path: config_dir()?.join(CONFIG_FILE_NAME),
        })
    }

    /// Create a manager for an explicit configuration file
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the configuration, returning defaults when the file does not exist
    pub fn load(&self) -> Result<Config> {
        if !self.path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.path)?;
        let config: Config = toml::from_str(&content)?;

        if config.schema_version > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "Unsupported config schema version {} (expected <= {SCHEMA_VERSION})",
                config.schema_version
            )));
        }

        Ok(config)
    }

    /// Persist the configuration, creating the parent directory if needed
    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(config)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Ok(PathBuf::from(dir));
    }

    dirs::config_dir()
        .map(|d| d.join("bucketwalk"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}
