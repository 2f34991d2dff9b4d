//! Configuration module for the deployment file.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `outpost.yaml`
//! - `.env` loading and environment overrides
//! - Validation of configuration values

mod parser;
mod spec;
mod validator;

pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, STATE_PATH_ENV, find_config_file};
pub use spec::{ActionConfig, DeployConfig, ExecConfig, RetryConfig, ServiceConfig, StateConfig};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
