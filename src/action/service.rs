//! Service start action: install a product as a systemd unit and start it.
//!
//! The steps run strictly in order: user, directories, files, unit,
//! daemon-reload, enable, restart, status wait.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::config::ServiceConfig;
use crate::error::{ConfigError, Result};
use crate::fingerprint::{Fingerprint, FingerprintEngine, StringMap};
use crate::remote::{
    DEFAULT_POLL_INTERVAL, RemoteOperationRequest, RemoteOrchestrator, ServiceLayout,
    ServiceUnitDescriptor, render_env_file,
};
use crate::state::{ActionKind, ActionState};
use crate::transport::{EmbeddedTransport, expand_home, shell};
use crate::value::TriState;

/// Mode of configuration, license and environment files.
const FILE_MODE: u32 = 0o640;

/// Mode of the configuration and data directories.
const DIR_MODE: u32 = 0o750;

/// Mode of the unit file.
const UNIT_MODE: u32 = 0o644;

/// Login shell of the service user.
const NO_LOGIN_SHELL: &str = "/bin/false";

/// A file placed on the target before the unit starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// Remote path.
    pub path: String,
    /// File body.
    pub content: String,
}

/// Installs, starts and waits for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAction {
    /// Unique action name.
    pub name: String,
    /// Transport overrides.
    pub transport: EmbeddedTransport,
    /// On-host paths, user and command line.
    pub layout: ServiceLayout,
    /// Main configuration file body.
    pub config: TriState<String>,
    /// License body.
    pub license: TriState<String>,
    /// Variables written to the environment file.
    pub environment: StringMap,
    /// Extra files keyed by remote path.
    pub files: BTreeMap<String, TriState<String>>,
    /// Unit overrides: section, then key, then value.
    pub unit_overrides: BTreeMap<String, BTreeMap<String, String>>,
    /// Whether to enable the unit at boot.
    pub enable: bool,
    /// States accepted as success.
    pub desired_states: Vec<String>,
    /// Bound on the status wait.
    pub wait_timeout: Duration,
    /// Interval between status polls.
    pub poll_interval: Duration,
    /// Per-command timeout.
    pub timeout: Option<Duration>,
}

impl ServiceAction {
    /// Creates an action for a product with the conventional layout.
    #[must_use]
    pub fn new(name: impl Into<String>, product: &str, transport: EmbeddedTransport) -> Self {
        Self {
            name: name.into(),
            transport,
            layout: ServiceLayout::for_product(product),
            config: TriState::Null,
            license: TriState::Null,
            environment: TriState::Null,
            files: BTreeMap::new(),
            unit_overrides: BTreeMap::new(),
            enable: true,
            desired_states: vec![String::from("active")],
            wait_timeout: Duration::from_secs(60),
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }

    /// Sets the configuration file body.
    #[must_use]
    pub fn with_config(mut self, config: impl Into<String>) -> Self {
        self.config = TriState::Known(config.into());
        self
    }

    /// Sets the environment.
    #[must_use]
    pub fn with_environment(mut self, environment: StringMap) -> Self {
        self.environment = environment;
        self
    }

    /// Sets the status poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Builds the action from its configuration block, reading any local
    /// files it names.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the transport block is malformed or a
    /// named file cannot be read.
    pub fn from_config(config: &ServiceConfig) -> std::result::Result<Self, ConfigError> {
        let mut action = Self::new(
            config.name.as_str(),
            &config.product,
            EmbeddedTransport::from_wire(&config.transport)?,
        );

        if let Some(user) = &config.user {
            action.layout.user.clone_from(user);
        }
        if let Some(binary) = &config.binary {
            action.layout.binary.clone_from(binary);
        }
        if let Some(args) = &config.args {
            action.layout.args.clone_from(args);
        }

        action.config = content_or_file(&config.config, config.config_file.as_deref(), &config.name, "config_file")?;
        action.license = content_or_file(&config.license, config.license_file.as_deref(), &config.name, "license_file")?;
        action.environment = config.environment.clone();
        action.files = config.files.clone();
        action.unit_overrides = config.unit.clone();
        action.enable = config.enable;
        action.desired_states = config.desired_states.clone();
        action.wait_timeout = Duration::from_secs(config.wait_timeout_secs);
        action.timeout = config.timeout_secs.map(Duration::from_secs);
        Ok(action)
    }

    /// Unit name without the `.service` suffix.
    #[must_use]
    pub fn unit_name(&self) -> &str {
        self.layout.unit_name()
    }

    /// The product's default unit with overrides applied.
    #[must_use]
    pub fn unit(&self) -> ServiceUnitDescriptor {
        let mut unit = ServiceUnitDescriptor::for_product(&self.layout);
        for (section, entries) in &self.unit_overrides {
            for (key, value) in entries {
                unit = unit.set(section, key, value.as_str());
            }
        }
        unit
    }

    fn fully_known(&self) -> bool {
        self.config.is_known()
            && self.license.is_known()
            && self.environment.fully_known()
            && self.files.values().all(TriState::is_known)
    }

    /// Files to stage, in order: configuration, license, environment file,
    /// then extra files by path. Null entries are skipped.
    #[must_use]
    pub fn staged_files(&self) -> Vec<StagedFile> {
        let mut staged = Vec::new();
        if let Some(config) = self.config.get() {
            staged.push(StagedFile {
                path: self.layout.config_path.clone(),
                content: config.clone(),
            });
        }
        if let Some(license) = self.license.get() {
            staged.push(StagedFile {
                path: self.layout.license_path.clone(),
                content: license.clone(),
            });
        }
        if let Some(environment) = self.environment.get() {
            let vars: BTreeMap<&String, &String> = environment
                .iter()
                .filter_map(|(k, v)| v.get().map(|v| (k, v)))
                .collect();
            if !vars.is_empty() {
                staged.push(StagedFile {
                    path: self.layout.env_path.clone(),
                    content: render_env_file(vars),
                });
            }
        }
        for (path, content) in &self.files {
            if let Some(content) = content.get() {
                staged.push(StagedFile {
                    path: path.clone(),
                    content: content.clone(),
                });
            }
        }
        staged
    }

    /// Fingerprint over the rendered unit and every staged file.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        if !self.fully_known() {
            return Fingerprint::Unknown;
        }

        let mut components = vec![FingerprintEngine::digest(self.unit().render().as_bytes())];
        for file in self.staged_files() {
            components.push(FingerprintEngine::digest(
                format!("{}\n{}", file.path, file.content).as_bytes(),
            ));
        }
        Fingerprint::Known(FingerprintEngine::combine(components))
    }

    /// Provisions and starts the service, then waits for a desired state.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an environment name the unit could
    /// not load, the first failing step's error, or a timeout error carrying
    /// the last observed state.
    pub async fn run(&self, orchestrator: &RemoteOrchestrator<'_>, fingerprint: &str) -> Result<ActionState> {
        if let Some(key) = self
            .environment
            .get()
            .and_then(|env| env.keys().find(|k| !shell::is_variable_name(k)))
        {
            return Err(ConfigError::invalid(
                format!("actions.{}.environment.{key}", self.name),
                "not a valid shell variable name",
            )
            .into());
        }

        let layout = &self.layout;
        let home = Path::new(&layout.data_dir)
            .parent()
            .map(|p| p.display().to_string());

        orchestrator
            .ensure_user(&layout.user, home.as_deref(), Some(NO_LOGIN_SHELL))
            .await?;

        for dir in [&layout.config_dir, &layout.data_dir] {
            orchestrator
                .create_directory(dir, Some(&layout.user), Some(DIR_MODE))
                .await?;
        }

        for file in self.staged_files() {
            let request = RemoteOperationRequest::new(file.path, file.content)
                .with_mode(FILE_MODE)
                .with_owner(layout.user.as_str())
                .with_retry(orchestrator.retry_policy())
                .with_timeout(orchestrator.step_timeout());
            orchestrator.copy_file(&request).await?;
        }

        orchestrator
            .write_service_unit(&self.unit(), &layout.unit_path, UNIT_MODE, None)
            .await?;
        orchestrator.daemon_reload().await?;

        let unit = self.unit_name();
        if self.enable {
            orchestrator.enable_service(unit).await?;
        }
        orchestrator.restart_service(unit).await?;

        let desired: Vec<&str> = self.desired_states.iter().map(String::as_str).collect();
        let status = orchestrator
            .wait_for_status(unit, &desired, self.wait_timeout, self.poll_interval)
            .await?;

        info!(action = %self.name, "Service {} is {}", unit, status);
        Ok(ActionState::new(&self.name, ActionKind::Service, fingerprint)
            .with_status(status.state, status.code))
    }
}

/// The inline value wins; otherwise the named local file is read.
fn content_or_file(
    value: &TriState<String>,
    path: Option<&str>,
    action: &str,
    field: &str,
) -> std::result::Result<TriState<String>, ConfigError> {
    match (value, path) {
        (TriState::Null, Some(path)) => std::fs::read_to_string(expand_home(path))
            .map(TriState::Known)
            .map_err(|e| ConfigError::invalid(format!("actions.{action}.{field}"), format!("{path}: {e}"))),
        _ => Ok(value.clone()),
    }
}
