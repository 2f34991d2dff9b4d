//! Configuration validation for deployment files.
//!
//! This module checks a parsed configuration for consistency before anything
//! is planned, collecting every problem with the field it belongs to.

use crate::error::{ConfigError, OutpostError, Result};
use crate::fingerprint::StringMap;
use crate::transport::{EmbeddedTransport, shell};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{ActionConfig, DeployConfig, ExecConfig, RetryConfig, ServiceConfig};

/// Validator for deployment configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ValidationResult {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a deployment configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any were found. Use
    /// [`ConfigValidator::check`] to get all of them.
    pub fn validate(&self, config: &DeployConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(OutpostError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Collects every validation error and warning.
    #[must_use]
    pub fn check(&self, config: &DeployConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_retry(&config.retry, &mut result);
        let defaults = match EmbeddedTransport::from_wire(&config.transport) {
            Ok(defaults) => Some(defaults),
            Err(e) => {
                result.error("transport", e.to_string());
                None
            }
        };
        Self::validate_actions(&config.actions, defaults.as_ref(), &mut result);

        result
    }

    fn validate_retry(retry: &RetryConfig, result: &mut ValidationResult) {
        if retry.max_attempts == 0 {
            result.error("retry.max_attempts", "must be at least 1");
        }
        if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
            result.error("retry.multiplier", "must be a number of at least 1.0");
        }
        if retry.max_delay_ms < retry.base_delay_ms {
            result.error("retry.max_delay_ms", "must not be smaller than retry.base_delay_ms");
        }
    }

    fn validate_actions(
        actions: &[ActionConfig],
        defaults: Option<&EmbeddedTransport>,
        result: &mut ValidationResult,
    ) {
        if actions.is_empty() {
            result.warnings.push(String::from("No actions defined in configuration"));
            return;
        }

        let mut seen_names = HashSet::new();

        for (i, action) in actions.iter().enumerate() {
            let prefix = format!("actions[{i}]");
            let name = action.name();

            if name.is_empty() {
                result.error(format!("{prefix}.name"), "Action name cannot be empty");
            } else if !is_valid_name(name) {
                result.error(
                    format!("{prefix}.name"),
                    format!(
                        "Action name '{name}' is invalid. Must start with a letter and contain only lowercase letters, digits, '-' or '_'."
                    ),
                );
            }
            if !seen_names.insert(name) {
                result.error(format!("{prefix}.name"), format!("Duplicate action name: {name}"));
            }

            Self::validate_transport(action, defaults, &prefix, result);

            match action {
                ActionConfig::Exec(exec) => Self::validate_exec(exec, &prefix, result),
                ActionConfig::Service(service) => Self::validate_service(service, &prefix, result),
            }
        }
    }

    fn validate_transport(
        action: &ActionConfig,
        defaults: Option<&EmbeddedTransport>,
        prefix: &str,
        result: &mut ValidationResult,
    ) {
        let field = format!("{prefix}.transport");
        let overrides = match EmbeddedTransport::from_wire(action.transport()) {
            Ok(overrides) => overrides,
            Err(e) => {
                result.error(field, e.to_string());
                return;
            }
        };

        // A broken provider block is already reported.
        let Some(defaults) = defaults else {
            return;
        };
        match EmbeddedTransport::merge(defaults, &overrides) {
            Ok(merged) if merged.kind().is_none() => {
                result.error(field, "no transport is configured for this action or the provider");
            }
            Ok(_) => {}
            Err(e) => result.error(field, e.to_string()),
        }
    }

    fn validate_exec(exec: &ExecConfig, prefix: &str, result: &mut ValidationResult) {
        if exec.content.is_null() && exec.inline.is_null() && exec.scripts.is_null() {
            result.warnings.push(format!(
                "{prefix}: exec action '{}' has no content, inline commands or scripts",
                exec.name
            ));
        }
        if exec.timeout_secs == Some(0) {
            result.error(format!("{prefix}.timeout_secs"), "must be at least 1 second");
        }
        Self::validate_environment(&exec.environment, prefix, result);
    }

    fn validate_environment(environment: &StringMap, prefix: &str, result: &mut ValidationResult) {
        let Some(vars) = environment.get() else {
            return;
        };
        for key in vars.keys().filter(|k| !shell::is_variable_name(k)) {
            result.error(
                format!("{prefix}.environment.{key}"),
                "Environment variable names must match [A-Za-z_][A-Za-z0-9_]*",
            );
        }
    }

    fn validate_service(service: &ServiceConfig, prefix: &str, result: &mut ValidationResult) {
        if service.product.is_empty() {
            result.error(format!("{prefix}.product"), "Service actions must name a product");
        } else if !is_valid_name(&service.product) {
            result.error(
                format!("{prefix}.product"),
                format!("Product name '{}' is not a valid unit name", service.product),
            );
        }

        if service.config.has_value() && service.config_file.is_some() {
            result.error(
                format!("{prefix}.config_file"),
                "config and config_file are mutually exclusive",
            );
        }
        if service.license.has_value() && service.license_file.is_some() {
            result.error(
                format!("{prefix}.license_file"),
                "license and license_file are mutually exclusive",
            );
        }

        for path in service.files.keys() {
            if !path.starts_with('/') {
                result.error(
                    format!("{prefix}.files"),
                    format!("Remote file path must be absolute: {path}"),
                );
            }
        }

        Self::validate_environment(&service.environment, prefix, result);

        if service.desired_states.is_empty() {
            result.error(format!("{prefix}.desired_states"), "at least one state is required");
        }
        if service.wait_timeout_secs == 0 {
            result.error(format!("{prefix}.wait_timeout_secs"), "must be at least 1 second");
        }
        if service.timeout_secs == Some(0) {
            result.error(format!("{prefix}.timeout_secs"), "must be at least 1 second");
        }
        if service.config.is_null() && service.config_file.is_none() {
            result.warnings.push(format!(
                "{prefix}: service '{}' has no configuration file",
                service.name
            ));
        }
    }
}

/// Names start with a lowercase letter and contain lowercase letters,
/// digits, `-` and `_`.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn parse(yaml: &str) -> DeployConfig {
        ConfigParser::new().parse_yaml(yaml, None).expect("parse")
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("vault"));
        assert!(is_valid_name("consul-server_1"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Vault"));
        assert!(!is_valid_name("1vault"));
        assert!(!is_valid_name("vault.service"));
    }

    #[test]
    fn test_valid_config() {
        let config = parse(
            r"
transport:
  ssh:
    user: ubuntu
    private_key: key
actions:
  - type: exec
    name: bootstrap
    transport:
      ssh:
        host: 10.0.0.4
    inline: [echo hi]
",
        );

        let result = ConfigValidator::new().validate(&config).expect("valid");
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 0);
    }

    #[test]
    fn test_duplicate_names_and_conflicting_kinds() {
        let config = parse(
            r"
transport:
  ssh:
    user: ubuntu
actions:
  - type: exec
    name: bootstrap
    inline: [echo one]
  - type: exec
    name: bootstrap
    transport:
      k8s:
        pod: web-0
    inline: [echo two]
",
        );

        let result = ConfigValidator::new().check(&config);
        assert_eq!(result.error_count(), 2);
        assert!(result.errors.iter().any(|e| e.field == "actions[1].name"));
        assert!(result.errors.iter().any(|e| e.field == "actions[1].transport"));
    }

    #[test]
    fn test_missing_transport_everywhere() {
        let config = parse("actions:\n  - type: exec\n    name: bootstrap\n    inline: [echo hi]\n");

        let err = ConfigValidator::new().validate(&config).expect_err("no transport");
        assert!(matches!(
            err,
            OutpostError::Config(ConfigError::ValidationError { field: Some(ref f), .. }) if f == "actions[0].transport"
        ));
    }

    #[test]
    fn test_service_checks() {
        let config = parse(
            r"
transport:
  nomad:
    host: http://nomad:4646
actions:
  - type: service
    name: vault
    product: ''
    config: x
    config_file: ./vault.hcl
    files:
      relative/path: y
    desired_states: []
",
        );

        let result = ConfigValidator::new().check(&config);
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"actions[0].product"));
        assert!(fields.contains(&"actions[0].config_file"));
        assert!(fields.contains(&"actions[0].files"));
        assert!(fields.contains(&"actions[0].desired_states"));
    }

    #[test]
    fn test_retry_checks() {
        let config = parse("retry:\n  max_attempts: 0\n  base_delay_ms: 5000\n  max_delay_ms: 10\n");

        let result = ConfigValidator::new().check(&config);
        assert_eq!(result.error_count(), 2);
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn test_environment_keys_must_be_shell_names() {
        let config = parse(
            r"
transport:
  ssh:
    host: 10.0.0.4
    user: ubuntu
    private_key: key
actions:
  - type: exec
    name: bootstrap
    inline: [echo hi]
    environment:
      GOOD_NAME: ok
      'X=1; touch /tmp/owned; Y': v
  - type: service
    name: vault
    product: vault
    config: 'ui = true'
    environment:
      MY-VAR: v
",
        );

        let result = ConfigValidator::new().check(&config);
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();

        assert_eq!(result.error_count(), 2);
        assert!(fields.contains(&"actions[0].environment.X=1; touch /tmp/owned; Y"));
        assert!(fields.contains(&"actions[1].environment.MY-VAR"));
    }
}
