//! Runner configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via SCM_CONFIG or --config)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Runner configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Machine runtime configuration.
    pub runtime: RuntimeConfig,
    /// Logging configuration.
    pub log: LogConfig,
    /// Interactive shell configuration.
    pub repl: ReplConfig,
}

impl Config {
    /// Loads configuration from `path` (or SCM_CONFIG when `path` is None),
    /// then applies environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let from_env = std::env::var_os("SCM_CONFIG").map(PathBuf::from);
        if let Some(path) = path.map(Path::to_path_buf).or(from_env) {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.runtime.apply_env_overrides();
        self.log.apply_env_overrides();
        self.repl.apply_env_overrides();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let tick = self.runtime.tick_seconds;
        if !tick.is_finite() || tick <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "runtime.tick_seconds must be positive, got {}",
                tick
            )));
        }
        Ok(())
    }
}

/// Machine runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Seconds passed to `advance` per tick.
    pub tick_seconds: f64,
    /// Seed for random-target transitions. Unset means entropy.
    pub seed: Option<u64>,
    /// Log every bound action as it runs.
    pub trace_hooks: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 0.1,
            seed: None,
            trace_hooks: false,
        }
    }
}

impl RuntimeConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(tick) = std::env::var("SCM_TICK_SECONDS") {
            if let Ok(secs) = tick.parse() {
                self.tick_seconds = secs;
            }
        }

        if let Ok(seed) = std::env::var("SCM_SEED") {
            if let Ok(n) = seed.parse() {
                self.seed = Some(n);
            }
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default `EnvFilter` directive when RUST_LOG is unset.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}

impl LogConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(filter) = std::env::var("SCM_LOG") {
            if !filter.is_empty() {
                self.filter = filter;
            }
        }
    }
}

/// Interactive shell configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplConfig {
    /// Line history file. Defaults to ~/.scm_history.
    pub history_file: Option<PathBuf>,
}

impl ReplConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("SCM_HISTORY_FILE") {
            self.history_file = Some(PathBuf::from(path));
        }
    }

    pub fn history_path(&self) -> PathBuf {
        self.history_file.clone().unwrap_or_else(|| {
            std::env::var("HOME")
                .map(|h| PathBuf::from(h).join(".scm_history"))
                .unwrap_or_else(|_| ".scm_history".into())
        })
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
