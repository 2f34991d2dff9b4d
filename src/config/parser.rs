//! Configuration parser for loading deployment files.
//!
//! This module handles loading configuration from YAML files, `.env` files
//! and environment variable overrides, with proper precedence and error
//! handling.

use crate::error::{ConfigError, OutpostError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::DeployConfig;

/// Environment variable overriding `state.path`.
pub const STATE_PATH_ENV: &str = "OUTPOST_STATE_PATH";

/// Configuration parser for loading deployment configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving `.env`.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(OutpostError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<DeployConfig> {
        debug!("Parsing YAML configuration");

        let config: DeployConfig = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
            message: format!("YAML parse error: {e}"),
            location: source.map(|p| p.display().to_string()),
        })?;

        debug!("Parsed configuration with {} actions", config.actions.len());
        Ok(config)
    }

    /// Loads configuration, applies environment overrides and resolves
    /// relative local paths against the base path, or the file's directory
    /// when no base path is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let path = path.as_ref();
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config);

        let base_dir = self
            .base_path
            .clone()
            .or_else(|| path.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        config.resolve_paths(&base_dir);
        Ok(config)
    }

    fn apply_env_overrides(config: &mut DeployConfig) {
        if let Ok(path) = std::env::var(STATE_PATH_ENV) {
            debug!("Overriding state.path from environment");
            config.state.path = Some(path);
        }
    }

    /// Loads the `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the `.env` file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| ConfigError::ParseError {
                message: format!("Failed to load .env file: {e}"),
                location: Some(env_path.display().to_string()),
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Configuration file names searched for, in order.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["outpost.yaml", "outpost.yml"];

/// Finds the configuration file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(OutpostError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}
