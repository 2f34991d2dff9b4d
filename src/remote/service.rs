//! systemd service lifecycle: reload, restart, status and waiting.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{OutpostError, Result, TimeoutError};
use crate::transport::{RemoteCommand, shell};

use super::orchestrator::RemoteOrchestrator;

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// `systemctl is-active` exit code for an inactive or failed unit.
pub const STATUS_NOT_RUNNING: i32 = 3;

/// `systemctl is-active` exit code for a unit that does not exist.
pub const STATUS_NO_SUCH_UNIT: i32 = 4;

/// Observed service state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// State word printed by systemd, e.g. `active`, `activating`, `failed`.
    pub state: String,
    /// `systemctl is-active` exit code: 0 active, 3 not running, 4 no such
    /// unit.
    pub code: i32,
}

impl ServiceStatus {
    /// True when systemd reports the unit active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.code == 0 && self.state == "active"
    }

    /// True when the state is one of `desired`.
    #[must_use]
    pub fn matches(&self, desired: &[&str]) -> bool {
        desired.iter().any(|d| *d == self.state)
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.state, self.code)
    }
}

impl RemoteOrchestrator<'_> {
    /// Reloads systemd unit definitions.
    ///
    /// # Errors
    ///
    /// Returns a remote execution error if the reload fails.
    pub async fn daemon_reload(&self) -> Result<()> {
        self.exec(
            "systemctl daemon-reload",
            RemoteCommand::new("systemctl daemon-reload").privileged(true),
        )
        .await?;
        Ok(())
    }

    /// Enables a unit so it starts at boot.
    ///
    /// # Errors
    ///
    /// Returns a remote execution error if the unit cannot be enabled.
    pub async fn enable_service(&self, name: &str) -> Result<()> {
        let script = format!("systemctl enable {}", shell::quote(name));
        self.exec(&script, RemoteCommand::new(script.clone()).privileged(true))
            .await?;
        Ok(())
    }

    /// Restarts a unit; a stopped unit is started.
    ///
    /// # Errors
    ///
    /// Returns a remote execution error if systemd rejects the restart.
    pub async fn restart_service(&self, name: &str) -> Result<()> {
        let script = format!("systemctl restart {}", shell::quote(name));
        self.exec(&script, RemoteCommand::new(script.clone()).privileged(true))
            .await?;
        info!(target = %self.transport.target(), "Restarted {}", name);
        Ok(())
    }

    /// Queries the current state of a unit.
    ///
    /// A non-zero `is-active` exit is a valid answer, not an error.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the channel fails.
    pub async fn service_status(&self, name: &str) -> Result<ServiceStatus> {
        let script = format!("systemctl is-active {}", shell::quote(name));
        let output = self
            .exec_unchecked(&script, RemoteCommand::new(script.clone()))
            .await?;

        let code = output.exit_code.unwrap_or(-1);
        let state = output
            .stdout
            .lines()
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("unknown")
            .to_string();
        Ok(ServiceStatus { state, code })
    }

    /// Polls until the unit reaches one of `desired` or `timeout` elapses.
    ///
    /// Every poll is bounded by the time left before the deadline. A channel
    /// failure during a poll counts as an unanswered poll; the wait carries on
    /// and the last state actually observed is reported on timeout.
    ///
    /// # Errors
    ///
    /// Returns a [`TimeoutError`] with the last observed state, or
    /// [`OutpostError::Cancelled`].
    pub async fn wait_for_status(
        &self,
        name: &str,
        desired: &[&str],
        timeout: Duration,
        interval: Duration,
    ) -> Result<ServiceStatus> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut last_observed = String::from("unknown");

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, self.service_status(name)).await {
                Ok(Ok(status)) => {
                    if status.matches(desired) {
                        debug!("{} reached {}", name, status);
                        return Ok(status);
                    }
                    debug!("{} is {}, waiting", name, status);
                    last_observed = status.state;
                }
                Ok(Err(e)) if e.is_retryable() => {
                    warn!("Status poll for {} failed: {}", name, e);
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => debug!("Status poll for {} did not answer in time", name),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(TimeoutError {
                    service: name.to_string(),
                    desired: desired.iter().map(|d| (*d).to_string()).collect(),
                    last_observed,
                    waited: now.duration_since(started),
                }
                .into());
            }

            let pause = interval.min(deadline - now);
            tokio::select! {
                () = self.cancel.cancelled() => return Err(OutpostError::Cancelled),
                () = tokio::time::sleep(pause) => {}
            }
        }
    }
}
