//! Configuration specification types for the deployment file.
//!
//! This module defines the structs that map to `outpost.yaml`. Transport
//! blocks are kept as raw JSON values so the embedded transport container
//! can record exactly which attributes were supplied.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::fingerprint::{StringList, StringMap};
use crate::remote::RetryPolicy;
use crate::value::TriState;

/// The root of a deployment file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeployConfig {
    /// Provider-level transport defaults merged under every action.
    #[serde(default)]
    pub transport: serde_json::Value,
    /// Where fingerprints are persisted.
    #[serde(default)]
    pub state: StateConfig,
    /// Retry policy for channel failures.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Actions, applied in order.
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

impl DeployConfig {
    /// Rewrites relative local paths (exec `scripts`, service `config_file`
    /// and `license_file`) so they point below `base_dir`. Absolute paths
    /// and paths starting with `~` are left alone.
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        for action in &mut self.actions {
            match action {
                ActionConfig::Exec(exec) => {
                    if let TriState::Known(scripts) = &mut exec.scripts {
                        for script in scripts.iter_mut() {
                            if let TriState::Known(path) = script {
                                *path = resolve_local(base_dir, path);
                            }
                        }
                    }
                }
                ActionConfig::Service(service) => {
                    for file in [&mut service.config_file, &mut service.license_file] {
                        if let Some(path) = file {
                            *path = resolve_local(base_dir, path);
                        }
                    }
                }
            }
        }
    }
}

fn resolve_local(base_dir: &Path, path: &str) -> String {
    if path.starts_with('~') || Path::new(path).is_absolute() {
        return path.to_string();
    }
    base_dir.join(path).to_string_lossy().into_owned()
}

/// State file location.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// Path of the state file. Defaults to `.outpost/state.json`.
    #[serde(default)]
    pub path: Option<String>,
}

/// Retry settings, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay after the first failure.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff growth factor.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Cap on a single delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Converts into the policy used by the orchestrator.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: self.multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// One action in the deployment file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionConfig {
    /// Run content, inline commands and scripts.
    Exec(ExecConfig),
    /// Install and start a systemd service.
    Service(ServiceConfig),
}

impl ActionConfig {
    /// Action name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Exec(exec) => &exec.name,
            Self::Service(service) => &service.name,
        }
    }

    /// The action's raw transport override block.
    #[must_use]
    pub const fn transport(&self) -> &serde_json::Value {
        match self {
            Self::Exec(exec) => &exec.transport,
            Self::Service(service) => &service.transport,
        }
    }
}

/// A remote exec action.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecConfig {
    /// Unique action name.
    pub name: String,
    /// Transport overrides for this action.
    #[serde(default)]
    pub transport: serde_json::Value,
    /// Script body uploaded and run first.
    #[serde(default)]
    pub content: TriState<String>,
    /// Commands run in order.
    #[serde(default)]
    pub inline: StringList,
    /// Local script files uploaded and run in order.
    #[serde(default)]
    pub scripts: StringList,
    /// Environment exported for every command.
    #[serde(default)]
    pub environment: StringMap,
    /// Per-command timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// A service start action.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Unique action name.
    pub name: String,
    /// Transport overrides for this action.
    #[serde(default)]
    pub transport: serde_json::Value,
    /// Product name; drives the on-host layout and unit name.
    pub product: String,
    /// System user; defaults to the product name.
    #[serde(default)]
    pub user: Option<String>,
    /// Binary path; defaults to `/usr/bin/<product>`.
    #[serde(default)]
    pub binary: Option<String>,
    /// Arguments passed to the binary.
    #[serde(default)]
    pub args: Option<String>,
    /// Main configuration file body.
    #[serde(default)]
    pub config: TriState<String>,
    /// Local file holding the configuration, used when `config` is unset.
    #[serde(default)]
    pub config_file: Option<String>,
    /// License body.
    #[serde(default)]
    pub license: TriState<String>,
    /// Local license file, used when `license` is unset.
    #[serde(default)]
    pub license_file: Option<String>,
    /// Variables written to the environment file.
    #[serde(default)]
    pub environment: StringMap,
    /// Extra files keyed by remote path.
    #[serde(default)]
    pub files: BTreeMap<String, TriState<String>>,
    /// Unit overrides: section, then key, then value.
    #[serde(default)]
    pub unit: BTreeMap<String, BTreeMap<String, String>>,
    /// Whether to enable the unit at boot.
    #[serde(default = "default_true")]
    pub enable: bool,
    /// States accepted as success.
    #[serde(default = "default_desired_states")]
    pub desired_states: Vec<String>,
    /// How long to wait for a desired state, in seconds.
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
    /// Per-command timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_base_delay_ms() -> u64 {
    1_000
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_max_delay_ms() -> u64 {
    30_000
}

const fn default_true() -> bool {
    true
}

fn default_desired_states() -> Vec<String> {
    vec![String::from("active")]
}

const fn default_wait_timeout_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::UNKNOWN_SENTINEL;

    #[test]
    fn test_retry_config_defaults_match_policy_defaults() {
        assert_eq!(RetryConfig::default().policy(), RetryPolicy::default());
    }

    #[test]
    fn test_exec_action_from_yaml() {
        let yaml = r#"
type: exec
name: bootstrap
inline: ["echo hi"]
environment:
  FOO: bar
"#;
        let action: ActionConfig = serde_yaml::from_str(yaml).expect("parse");
        let ActionConfig::Exec(exec) = action else {
            panic!("expected exec action");
        };

        assert_eq!(exec.name, "bootstrap");
        assert!(exec.content.is_null());
        assert!(exec.transport.is_null());
        assert!(exec.inline.fully_known());
        assert!(exec.environment.has_value());
    }

    #[test]
    fn test_unknown_sentinel_survives_yaml() {
        let yaml = format!("type: exec\nname: late\ninline: [\"{UNKNOWN_SENTINEL}\"]\n");
        let action: ActionConfig = serde_yaml::from_str(&yaml).expect("parse");
        let ActionConfig::Exec(exec) = action else {
            panic!("expected exec action");
        };

        assert!(exec.inline.is_known());
        assert!(!exec.inline.fully_known());
    }

    #[test]
    fn test_relative_paths_resolve_against_base_dir() {
        let yaml = r#"
actions:
  - type: exec
    name: bootstrap
    scripts: ["scripts/setup.sh", "/opt/setup.sh", "~/setup.sh"]
  - type: service
    name: vault
    product: vault
    config_file: vault.hcl
    license_file: /etc/licenses/vault.hclic
"#;
        let mut config: DeployConfig = serde_yaml::from_str(yaml).expect("parse");
        config.resolve_paths(Path::new("/srv/deploy"));

        let ActionConfig::Exec(exec) = &config.actions[0] else {
            panic!("expected exec action");
        };
        let scripts: Vec<_> = exec
            .scripts
            .get()
            .expect("scripts")
            .iter()
            .filter_map(|s| s.get().cloned())
            .collect();
        assert_eq!(scripts, vec!["/srv/deploy/scripts/setup.sh", "/opt/setup.sh", "~/setup.sh"]);

        let ActionConfig::Service(service) = &config.actions[1] else {
            panic!("expected service action");
        };
        assert_eq!(service.config_file.as_deref(), Some("/srv/deploy/vault.hcl"));
        assert_eq!(service.license_file.as_deref(), Some("/etc/licenses/vault.hclic"));
    }

    #[test]
    fn test_service_defaults() {
        let yaml = "type: service\nname: vault\nproduct: vault\n";
        let action: ActionConfig = serde_yaml::from_str(yaml).expect("parse");
        let ActionConfig::Service(service) = action else {
            panic!("expected service action");
        };

        assert!(service.enable);
        assert_eq!(service.desired_states, vec![String::from("active")]);
        assert_eq!(service.wait_timeout_secs, 60);
    }
}
