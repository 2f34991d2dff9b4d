//! Remote orchestration against a [`Transport`].
//!
//! Every primitive runs through [`RemoteOrchestrator::exec`], which applies
//! the retry policy to channel failures and turns a non-zero exit into a
//! [`RemoteExecutionError`] carrying the captured output.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ConfigError, RemoteExecutionError, Result};
use crate::fingerprint::FingerprintEngine;
use crate::transport::{CommandOutput, RemoteCommand, Transport, shell};

use super::request::ScriptRun;
use super::retry::{RetryPolicy, retry};

/// Default timeout for a single remote command.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(300);

/// Runs provisioning primitives over one transport.
pub struct RemoteOrchestrator<'a> {
    pub(super) transport: &'a dyn Transport,
    pub(super) cancel: CancellationToken,
    pub(super) retry: RetryPolicy,
    pub(super) step_timeout: Duration,
}

impl<'a> RemoteOrchestrator<'a> {
    /// Creates an orchestrator with the default retry policy.
    #[must_use]
    pub fn new(transport: &'a dyn Transport, cancel: CancellationToken) -> Self {
        Self {
            transport,
            cancel,
            retry: RetryPolicy::default(),
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    /// Sets the retry policy for channel failures.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the timeout applied to each command.
    #[must_use]
    pub const fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &dyn Transport {
        self.transport
    }

    /// Retry policy applied to channel failures.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Timeout applied to each command.
    #[must_use]
    pub const fn step_timeout(&self) -> Duration {
        self.step_timeout
    }

    /// Runs a command, retrying channel failures, and requires exit zero.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteExecutionError`] with captured output for a non-zero
    /// exit, or the last transport error once retries are exhausted.
    pub async fn exec(&self, what: &str, command: RemoteCommand) -> Result<CommandOutput> {
        let output = self.exec_unchecked(what, command).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(RemoteExecutionError {
                command: what.to_string(),
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            }
            .into())
        }
    }

    /// Runs a command, retrying channel failures, without checking its exit
    /// code.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an environment key that is not a
    /// shell variable name, or the last transport error once retries are
    /// exhausted.
    pub async fn exec_unchecked(&self, what: &str, command: RemoteCommand) -> Result<CommandOutput> {
        if let Some(key) = command.env.keys().find(|k| !shell::is_variable_name(k)) {
            return Err(ConfigError::invalid(
                format!("environment.{key}"),
                "not a valid shell variable name",
            )
            .into());
        }
        let command = if command.timeout.is_some() {
            command
        } else {
            command.with_timeout(self.step_timeout)
        };
        debug!(target = %self.transport.target(), "Running: {}", what);
        retry(&self.retry, &self.cancel, what, || self.transport.run(&command)).await
    }

    /// Uploads a script and executes it as the channel's login user.
    ///
    /// The upload path is `/tmp/outpost-<digest>-<id>.sh` unless the request
    /// names one, so concurrent runs of the same script never collide. The
    /// script is removed after it runs.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteExecutionError`] with stdout and stderr when the
    /// script exits non-zero.
    pub async fn run_script(&self, run: &ScriptRun) -> Result<CommandOutput> {
        let destination = run.destination.clone().unwrap_or_else(|| {
            let digest = FingerprintEngine::digest(run.content.as_bytes());
            format!(
                "/tmp/outpost-{}-{}.sh",
                FingerprintEngine::short_hash(&digest),
                Uuid::new_v4().simple()
            )
        });
        let quoted = shell::quote(&destination);

        info!(target = %self.transport.target(), "Running {} as {}", run.label, destination);

        retry(&self.retry, &self.cancel, &run.label, || {
            self.transport.copy(run.content.as_bytes(), &destination)
        })
        .await?;

        let command = RemoteCommand::new(format!(
            "chmod {:o} {quoted} && {quoted}; rc=$?; rm -f {quoted}; exit $rc",
            run.mode
        ))
        .with_env(&run.env);

        self.exec(&run.label, command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{OutpostError, TransportError};
    use crate::remote::testing::RecordingTransport;
    use crate::transport::MockTransport;
    use std::collections::BTreeMap;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(3)
            .with_base_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_exec_nonzero_exit_attaches_output() {
        let transport = RecordingTransport::new().respond(|_| CommandOutput {
            stdout: String::from("partial"),
            stderr: String::from("boom"),
            exit_code: Some(1),
        });
        let orchestrator = RemoteOrchestrator::new(&transport, CancellationToken::new());

        let err = orchestrator
            .exec("install", RemoteCommand::new("false"))
            .await
            .expect_err("should fail");

        assert_eq!(err.captured_output(), Some(("partial", "boom")));
        assert_eq!(transport.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_exec_retries_channel_failures() {
        let mut mock = MockTransport::new();
        let mut calls = 0;
        mock.expect_target().return_const(String::from("mock"));
        mock.expect_run().times(3).returning(move |_| {
            calls += 1;
            if calls < 3 {
                Err(TransportError::channel("mock", "connection reset").into())
            } else {
                Ok(CommandOutput {
                    exit_code: Some(0),
                    ..CommandOutput::default()
                })
            }
        });

        let orchestrator =
            RemoteOrchestrator::new(&mock, CancellationToken::new()).with_retry(fast_retry());
        let output = orchestrator
            .exec("uptime", RemoteCommand::new("uptime"))
            .await
            .expect("succeeds on third attempt");

        assert!(output.success());
    }

    #[tokio::test]
    async fn test_exec_does_not_retry_remote_failure() {
        let mut mock = MockTransport::new();
        mock.expect_target().return_const(String::from("mock"));
        mock.expect_run().times(1).returning(|_| {
            Ok(CommandOutput {
                stderr: String::from("permission denied"),
                exit_code: Some(126),
                ..CommandOutput::default()
            })
        });

        let orchestrator =
            RemoteOrchestrator::new(&mock, CancellationToken::new()).with_retry(fast_retry());
        let err = orchestrator
            .exec("deploy", RemoteCommand::new("./deploy.sh"))
            .await
            .expect_err("remote failure");

        assert!(matches!(err, OutpostError::Remote(_)));
    }

    #[tokio::test]
    async fn test_exec_applies_step_timeout() {
        let transport = RecordingTransport::new();
        let orchestrator = RemoteOrchestrator::new(&transport, CancellationToken::new())
            .with_step_timeout(Duration::from_secs(7));

        orchestrator
            .exec("noop", RemoteCommand::new("true"))
            .await
            .expect("ok");

        assert_eq!(transport.commands()[0].timeout, Some(Duration::from_secs(7)));
    }

    #[tokio::test]
    async fn test_run_script_uploads_then_executes_with_env() {
        let transport = RecordingTransport::new().respond(|_| CommandOutput {
            stdout: String::from("hi\n"),
            exit_code: Some(0),
            ..CommandOutput::default()
        });
        let orchestrator = RemoteOrchestrator::new(&transport, CancellationToken::new());
        let mut env = BTreeMap::new();
        env.insert(String::from("FOO"), String::from("bar"));

        let output = orchestrator
            .run_script(&ScriptRun::new("#!/bin/sh\necho hi\n").with_env(env))
            .await
            .expect("run");

        assert_eq!(output.stdout, "hi\n");

        let copies = transport.copies();
        assert_eq!(copies.len(), 1);
        let (path, body) = &copies[0];
        assert!(path.starts_with("/tmp/outpost-"));
        assert!(path.ends_with(".sh"));
        assert_eq!(body, b"#!/bin/sh\necho hi\n");

        let commands = transport.commands();
        assert!(commands[0].script.contains("chmod 700"));
        assert!(commands[0].script.contains("rm -f"));
        assert_eq!(commands[0].env.get("FOO").map(String::as_str), Some("bar"));
    }

    #[tokio::test]
    async fn test_run_script_paths_are_unique() {
        let transport = RecordingTransport::new();
        let orchestrator = RemoteOrchestrator::new(&transport, CancellationToken::new());
        let run = ScriptRun::new("echo same");

        orchestrator.run_script(&run).await.expect("first");
        orchestrator.run_script(&run).await.expect("second");

        let copies = transport.copies();
        assert_ne!(copies[0].0, copies[1].0);
    }

    #[tokio::test]
    async fn test_run_script_observes_cancellation() {
        let transport = RecordingTransport::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let orchestrator = RemoteOrchestrator::new(&transport, cancel);

        let err = orchestrator
            .run_script(&ScriptRun::new("echo never"))
            .await
            .expect_err("cancelled");

        assert!(matches!(err, OutpostError::Cancelled));
        assert!(transport.copies().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_environment_key_that_is_not_a_variable_name() {
        let transport = RecordingTransport::new();
        let orchestrator = RemoteOrchestrator::new(&transport, CancellationToken::new());
        let mut env = BTreeMap::new();
        env.insert(String::from("X=1; touch /tmp/owned; Y"), String::from("v"));

        let err = orchestrator
            .exec("true", RemoteCommand::new("true").with_env(&env))
            .await
            .expect_err("rejected");

        assert!(matches!(err, OutpostError::Config(ConfigError::InvalidAttribute { .. })));
        assert!(transport.commands().is_empty());
    }
}
