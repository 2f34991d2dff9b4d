//! Fingerprint-gated remote actions.
//!
//! This module provides:
//! - The exec and service actions
//! - Plans comparing fresh fingerprints with recorded ones
//! - The runner that applies a plan and records the outcome

mod exec;
mod plan;
mod runner;
mod service;

pub use exec::ExecAction;
pub use plan::{ActionPlan, ChangeKind, PlannedChange};
pub use runner::{ActionOutcome, ActionRunner, ApplyReport, ChannelConnector, Connector};
pub use service::{ServiceAction, StagedFile};

use std::time::Duration;

use crate::config::{ActionConfig, DeployConfig};
use crate::error::{ConfigError, Result};
use crate::fingerprint::Fingerprint;
use crate::remote::{DEFAULT_STEP_TIMEOUT, RemoteOrchestrator};
use crate::state::{ActionKind, ActionState};
use crate::transport::EmbeddedTransport;

/// Any action the runner can apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Commands and scripts.
    Exec(ExecAction),
    /// A systemd service.
    Service(ServiceAction),
}

impl Action {
    /// Builds an action from its configuration block.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a malformed transport block or an
    /// unreadable local file.
    pub fn from_config(config: &ActionConfig) -> std::result::Result<Self, ConfigError> {
        match config {
            ActionConfig::Exec(exec) => ExecAction::from_config(exec).map(Self::Exec),
            ActionConfig::Service(service) => ServiceAction::from_config(service).map(Self::Service),
        }
    }

    /// Builds every action in a deployment file.
    ///
    /// # Errors
    ///
    /// Returns the first action that cannot be built.
    pub fn all_from_config(config: &DeployConfig) -> std::result::Result<Vec<Self>, ConfigError> {
        config.actions.iter().map(Self::from_config).collect()
    }

    /// Action name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Exec(exec) => &exec.name,
            Self::Service(service) => &service.name,
        }
    }

    /// Action kind.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Exec(_) => ActionKind::Exec,
            Self::Service(_) => ActionKind::Service,
        }
    }

    /// Transport overrides.
    #[must_use]
    pub const fn transport(&self) -> &EmbeddedTransport {
        match self {
            Self::Exec(exec) => &exec.transport,
            Self::Service(service) => &service.transport,
        }
    }

    /// Per-command timeout.
    #[must_use]
    pub fn step_timeout(&self) -> Duration {
        let timeout = match self {
            Self::Exec(exec) => exec.timeout,
            Self::Service(service) => service.timeout,
        };
        timeout.unwrap_or(DEFAULT_STEP_TIMEOUT)
    }

    /// Fingerprint of everything the outcome depends on.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a local input cannot be read.
    pub fn fingerprint(&self) -> std::result::Result<Fingerprint, ConfigError> {
        match self {
            Self::Exec(exec) => exec.fingerprint(),
            Self::Service(service) => Ok(service.fingerprint()),
        }
    }

    /// Runs the action and returns the record to persist.
    ///
    /// # Errors
    ///
    /// Returns whatever the failing step returns.
    pub async fn run(&self, orchestrator: &RemoteOrchestrator<'_>, fingerprint: &str) -> Result<ActionState> {
        match self {
            Self::Exec(exec) => exec.run(orchestrator, fingerprint).await,
            Self::Service(service) => service.run(orchestrator, fingerprint).await,
        }
    }
}
