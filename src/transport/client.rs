//! Channel client backed by a platform CLI.
//!
//! Each variant builds a [`ChannelClient`] with the invocation prefix for its
//! client program; the remote shell text is appended per command.

use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{OutpostError, RemoteExecutionError, Result, TransportError};

use super::capability::{CommandOutput, RemoteCommand, Transport, TransportKind};
use super::process::{Invocation, ProcessOutput, ProcessRunner, REACHABILITY_TIMEOUT};
use super::shell;

/// `kubectl exec` prints this when the remote command itself failed.
const KUBECTL_REMOTE_EXIT: &str = "command terminated with exit code";

/// A [`Transport`] that drives `ssh`, `kubectl` or `nomad` as a subprocess.
pub struct ChannelClient {
    kind: TransportKind,
    target: String,
    prefix: Invocation,
    runner: ProcessRunner,
    material: Mutex<Option<TempDir>>,
}

impl ChannelClient {
    /// Creates a client. `prefix` holds everything before the shell text.
    #[must_use]
    pub fn new(
        kind: TransportKind,
        target: impl Into<String>,
        prefix: Invocation,
        runner: ProcessRunner,
    ) -> Self {
        Self {
            kind,
            target: target.into(),
            prefix,
            runner,
            material: Mutex::new(None),
        }
    }

    /// Attaches a private directory of key material, removed on close.
    #[must_use]
    pub fn with_material(self, dir: TempDir) -> Self {
        Self {
            material: Mutex::new(Some(dir)),
            ..self
        }
    }

    /// Runs a connectivity check and fails with a connection error if the
    /// client cannot reach the target.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] when the check exits non-zero.
    pub async fn check_reachable(&self, invocation: &Invocation) -> Result<()> {
        debug!(kind = %self.kind, target = %self.target, "Probing channel");
        let output = self
            .runner
            .run(&self.target, invocation, None, Some(REACHABILITY_TIMEOUT))
            .await?;

        if output.status == Some(0) {
            Ok(())
        } else {
            Err(TransportError::connect(&self.target, failure_message(&output)).into())
        }
    }

    fn invocation_for(&self, script: String) -> Invocation {
        let invocation = self.prefix.clone();
        match self.kind {
            TransportKind::Ssh => invocation.arg(script),
            TransportKind::K8s | TransportKind::Nomad => invocation.args(["sh", "-c"]).arg(script),
        }
    }

    /// Distinguishes a broken channel from a remote command that failed.
    fn channel_failure(&self, output: &ProcessOutput) -> Option<String> {
        if output.status == Some(0) {
            return None;
        }
        let broken = match self.kind {
            TransportKind::Ssh => output.status == Some(255),
            TransportKind::K8s => !output.stderr.contains(KUBECTL_REMOTE_EXIT),
            TransportKind::Nomad => {
                output.stderr.starts_with("Error ")
                    || output.stderr.contains("failed to exec into task")
            }
        };
        broken.then(|| failure_message(output))
    }
}

fn failure_message(output: &ProcessOutput) -> String {
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        output
            .status
            .map_or_else(|| String::from("terminated by signal"), |c| format!("client exited with {c}"))
    } else {
        stderr.to_string()
    }
}

impl fmt::Debug for ChannelClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelClient")
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("program", &self.prefix.program)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for ChannelClient {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn target(&self) -> String {
        self.target.clone()
    }

    async fn run(&self, command: &RemoteCommand) -> Result<CommandOutput> {
        let invocation = self.invocation_for(command.render(self.kind));
        let output = self
            .runner
            .run(&self.target, &invocation, command.stdin.as_deref(), command.timeout)
            .await?;

        if let Some(message) = self.channel_failure(&output) {
            warn!(target = %self.target, "Channel failure: {}", message);
            return Err(TransportError::channel(&self.target, message).into());
        }

        Ok(CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.status,
        })
    }

    async fn copy(&self, content: &[u8], destination: &str) -> Result<()> {
        let command = RemoteCommand::new(format!("cat > {}", shell::quote(destination)))
            .with_stdin(content);
        let output = self.run(&command).await?;

        if output.success() {
            Ok(())
        } else {
            Err(RemoteExecutionError {
                command: format!("copy to {destination}"),
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            }
            .into())
        }
    }

    async fn close(&self) -> Result<()> {
        let material = self
            .material
            .lock()
            .map_err(|_| OutpostError::internal("channel material lock poisoned"))?
            .take();
        if let Some(dir) = material {
            debug!(target = %self.target, "Removing channel key material");
            dir.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn output(status: i32, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    fn client(kind: TransportKind) -> ChannelClient {
        ChannelClient::new(
            kind,
            "test-target",
            Invocation::new("true"),
            ProcessRunner::new(CancellationToken::new()),
        )
    }

    #[test]
    fn test_ssh_255_is_channel_failure() {
        let ssh = client(TransportKind::Ssh);
        assert!(ssh.channel_failure(&output(255, "Connection reset")).is_some());
        assert!(ssh.channel_failure(&output(1, "No such file")).is_none());
    }

    #[test]
    fn test_kubectl_remote_exit_is_not_channel_failure() {
        let k8s = client(TransportKind::K8s);
        assert!(
            k8s.channel_failure(&output(2, "command terminated with exit code 2"))
                .is_none()
        );
        assert!(
            k8s.channel_failure(&output(1, "error: unable to upgrade connection"))
                .is_some()
        );
    }

    #[test]
    fn test_nomad_lookup_error_is_channel_failure() {
        let nomad = client(TransportKind::Nomad);
        assert!(
            nomad
                .channel_failure(&output(1, "Error querying allocation: Unexpected response code: 403"))
                .is_some()
        );
        assert!(nomad.channel_failure(&output(1, "vault: not found")).is_none());
    }

    #[test]
    fn test_shell_wrapping_per_kind() {
        let ssh = client(TransportKind::Ssh).invocation_for(String::from("uptime"));
        assert_eq!(ssh.args, vec![String::from("uptime")]);

        let k8s = client(TransportKind::K8s).invocation_for(String::from("uptime"));
        assert_eq!(k8s.args, vec!["sh", "-c", "uptime"]);
    }

    #[tokio::test]
    async fn test_close_removes_material() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().to_path_buf();
        let client = client(TransportKind::Ssh).with_material(dir);

        client.close().await.expect("close");
        assert!(!path.exists());

        client.close().await.expect("second close is a no-op");
    }
}
