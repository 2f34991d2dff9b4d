//! Plan and apply actions against the recorded state.
//!
//! Each action runs to completion before the next one starts. The state is
//! saved after every action so a failure part-way through keeps what already
//! succeeded.

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{ConfigError, OutpostError, Result};
use crate::remote::{RemoteOrchestrator, RetryPolicy, retry};
use crate::state::{ActionState, DeploymentState, Operation, StateStore};
use crate::transport::{EmbeddedTransport, ProviderDefaults, Transport};

use super::Action;
use super::plan::{ActionPlan, ChangeKind, PlannedChange};

/// Opens a channel for a validated transport.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Builds a client for `transport`.
    async fn connect(&self, transport: &EmbeddedTransport, cancel: &CancellationToken) -> Result<Box<dyn Transport>>;
}

/// Connects through the platform clients (`ssh`, `kubectl`, `nomad`).
#[derive(Debug, Default, Clone, Copy)]
pub struct ChannelConnector;

#[async_trait]
impl Connector for ChannelConnector {
    async fn connect(&self, transport: &EmbeddedTransport, cancel: &CancellationToken) -> Result<Box<dyn Transport>> {
        transport.client(cancel).await
    }
}

/// Result of applying a single action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    /// Action name.
    pub name: String,
    /// What was done.
    pub operation: Operation,
    /// Whether the action succeeded.
    pub success: bool,
    /// Record written on success.
    pub state: Option<ActionState>,
    /// Error message on failure.
    pub error: Option<String>,
}

/// Result of applying a plan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    /// Outcomes of the actions that ran, in order.
    pub outcomes: Vec<ActionOutcome>,
    /// Actions skipped because they were up to date.
    pub unchanged: usize,
    /// Actions not attempted after an earlier failure.
    pub not_attempted: usize,
}

impl ApplyReport {
    /// Number of successful actions.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    /// Number of failed actions.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.success).count()
    }

    /// True when nothing failed.
    #[must_use]
    pub fn success(&self) -> bool {
        self.failed() == 0
    }
}

impl std::fmt::Display for ApplyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Applied {} actions: {} successful, {} failed, {} unchanged, {} not attempted",
            self.outcomes.len(),
            self.succeeded(),
            self.failed(),
            self.unchanged,
            self.not_attempted
        )
    }
}

/// Plans and applies actions.
pub struct ActionRunner<'a> {
    defaults: &'a ProviderDefaults,
    store: &'a dyn StateStore,
    connector: &'a dyn Connector,
    cancel: CancellationToken,
    retry: RetryPolicy,
    continue_on_error: bool,
}

impl<'a> ActionRunner<'a> {
    /// Creates a runner with the default retry policy.
    #[must_use]
    pub fn new(
        defaults: &'a ProviderDefaults,
        store: &'a dyn StateStore,
        connector: &'a dyn Connector,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            defaults,
            store,
            connector,
            cancel,
            retry: RetryPolicy::default(),
            continue_on_error: false,
        }
    }

    /// Sets the retry policy for channel failures.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets whether later actions still run after one fails.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Plans every action against the recorded state.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a transport kind conflict or an
    /// unreadable input, or a state error if the state cannot be loaded.
    pub async fn plan(&self, actions: &[Action]) -> Result<ActionPlan> {
        let state = self.store.load_or_default().await?;
        let base = self.defaults.snapshot()?;

        let mut changes = Vec::with_capacity(actions.len());
        for action in actions {
            let merged = EmbeddedTransport::merge(&base, action.transport())?;
            let fingerprint = action.fingerprint()?;
            let change = PlannedChange::new(
                action.name(),
                action.kind(),
                merged.target(),
                &fingerprint,
                state.get_action(action.name()),
            );
            info!(action = %change.name, "Planned {}", change.change);
            changes.push(change);
        }

        Ok(ActionPlan::new(changes))
    }

    /// Applies every pending change in `plan`.
    ///
    /// Fingerprints are recomputed at apply time. A deferred action whose
    /// inputs are still unknown fails with a configuration error.
    ///
    /// # Errors
    ///
    /// Returns an error only when the state cannot be loaded or saved, or the
    /// run was cancelled. Action failures are reported in the result.
    pub async fn apply(&self, plan: &ActionPlan, actions: &[Action]) -> Result<ApplyReport> {
        let mut state = self.store.load_or_default().await?;
        let mut report = ApplyReport {
            unchanged: plan.count(ChangeKind::NoOp),
            ..ApplyReport::default()
        };

        let pending: Vec<&PlannedChange> = plan.pending().collect();
        info!("Applying {} of {} actions", pending.len(), plan.changes.len());

        for (index, change) in pending.iter().enumerate() {
            let Some(action) = actions.iter().find(|a| a.name() == change.name) else {
                return Err(OutpostError::internal(format!(
                    "planned action '{}' is not defined",
                    change.name
                )));
            };

            let operation = if state.get_action(&change.name).is_some() {
                Operation::Replace
            } else {
                Operation::Create
            };

            let result = self.apply_one(action, &mut state, operation).await;
            self.store.save(&state).await?;

            match result {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(OutpostError::Cancelled) => return Err(OutpostError::Cancelled),
                Err(e) => {
                    error!(action = %change.name, "Action failed: {}", e);
                    report.outcomes.push(ActionOutcome {
                        name: change.name.clone(),
                        operation,
                        success: false,
                        state: None,
                        error: Some(e.to_string()),
                    });
                    if !self.continue_on_error {
                        report.not_attempted = pending.len() - index - 1;
                        break;
                    }
                }
            }
        }

        info!("{}", report);
        Ok(report)
    }

    /// Applies one action and records the attempt in `state`.
    async fn apply_one(
        &self,
        action: &Action,
        state: &mut DeploymentState,
        operation: Operation,
    ) -> Result<ActionOutcome> {
        let name = action.name();
        let fingerprint = action.fingerprint()?;
        let Some(fingerprint) = fingerprint.as_known() else {
            let err = ConfigError::validation("inputs are still unknown at apply time", name);
            state.record(name, operation, None, Some(err.to_string()));
            return Err(err.into());
        };

        match self.run(action, fingerprint).await {
            Ok(record) => {
                state.set_action(record.clone());
                state.record(name, operation, Some(fingerprint), None);
                info!(action = %name, "Applied ({:?})", operation);
                Ok(ActionOutcome {
                    name: name.to_string(),
                    operation,
                    success: true,
                    state: Some(record),
                    error: None,
                })
            }
            Err(e) => {
                state.record(name, operation, Some(fingerprint), Some(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run(&self, action: &Action, fingerprint: &str) -> Result<ActionState> {
        let transport = self.defaults.resolve(action.transport())?;
        let client = retry(&self.retry, &self.cancel, "connect", || {
            self.connector.connect(&transport, &self.cancel)
        })
        .await?;

        let orchestrator = RemoteOrchestrator::new(client.as_ref(), self.cancel.clone())
            .with_retry(self.retry)
            .with_step_timeout(action.step_timeout());
        let result = action.run(&orchestrator, fingerprint).await;

        if let Err(e) = client.close().await {
            warn!(action = %action.name(), "Failed to close transport: {}", e);
        }

        result.map(|record| record.with_transport(action.transport().to_redacted_wire()))
    }

    /// Drops an action's record without touching the target, so the next
    /// apply runs it again.
    ///
    /// # Errors
    ///
    /// Returns a state error if the state cannot be loaded or saved.
    pub async fn forget(&self, name: &str) -> Result<bool> {
        let mut state = self.store.load_or_default().await?;
        let removed = state.remove_action(name);
        let Some(removed) = removed else {
            return Ok(false);
        };

        state.record(name, Operation::Forget, Some(&removed.fingerprint), None);
        self.store.save(&state).await?;
        info!(action = %name, "Forgot recorded state");
        Ok(true)
    }
}
