//! The execution capability every transport variant produces.
//!
//! Orchestration code depends only on [`Transport`]; it never sees which
//! channel carries the commands.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::error::Result;

use super::shell;

/// Execution channel kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// SSH session.
    Ssh,
    /// Kubernetes pod exec.
    K8s,
    /// Nomad allocation exec.
    Nomad,
}

impl TransportKind {
    /// All kinds, in wire order.
    pub const ALL: [Self; 3] = [Self::Ssh, Self::K8s, Self::Nomad];

    /// Block name used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ssh => "ssh",
            Self::K8s => "k8s",
            Self::Nomad => "nomad",
        }
    }

    /// Parses a wire block name.
    #[must_use]
    pub fn from_block(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// Whether privileged steps on this channel need `sudo`.
    ///
    /// SSH logs in as an unprivileged user; exec channels land in the
    /// container as whatever user the image runs.
    #[must_use]
    pub const fn needs_sudo(self) -> bool {
        matches!(self, Self::Ssh)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A shell command to run on the target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteCommand {
    /// Shell text to execute.
    pub script: String,
    /// Environment exported before the script runs.
    pub env: BTreeMap<String, String>,
    /// Bytes piped to the command's standard input.
    pub stdin: Option<Vec<u8>>,
    /// Run through `sudo` on channels that need it.
    pub privileged: bool,
    /// Per-command timeout; the channel default applies when unset.
    pub timeout: Option<Duration>,
}

impl RemoteCommand {
    /// Creates a command from shell text.
    #[must_use]
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            ..Self::default()
        }
    }

    /// Adds exported environment variables.
    #[must_use]
    pub fn with_env(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Pipes the given bytes to standard input.
    #[must_use]
    pub fn with_stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Marks the command as privileged.
    #[must_use]
    pub const fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Renders the final shell text sent over the channel.
    ///
    /// Exports come first so they are visible to the script; a privileged
    /// command wraps the whole body in `sudo -n sh -c` so the exports survive
    /// sudo's environment reset.
    #[must_use]
    pub fn render(&self, kind: TransportKind) -> String {
        let mut body = String::new();
        for (key, value) in &self.env {
            body.push_str("export ");
            body.push_str(key);
            body.push('=');
            body.push_str(&shell::quote(value));
            body.push('\n');
        }
        body.push_str(&self.script);

        if self.privileged && kind.needs_sudo() {
            format!("sudo -n sh -c {}", shell::quote(&body))
        } else {
            body
        }
    }
}

/// Output of a command that ran to completion on the target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit code, absent when the process was killed by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// True when the command exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// A connected execution channel.
///
/// `run` returns `Ok` whenever the command ran, regardless of its exit code;
/// `Err` means the channel itself failed. `copy` writes bytes to a path as the
/// channel's login user.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Channel kind.
    fn kind(&self) -> TransportKind;

    /// Human readable description of the target, used in errors and logs.
    fn target(&self) -> String;

    /// Runs a command and captures its output.
    async fn run(&self, command: &RemoteCommand) -> Result<CommandOutput>;

    /// Writes `content` to `destination` on the target.
    async fn copy(&self, content: &[u8], destination: &str) -> Result<()>;

    /// Releases local resources held by the channel.
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_exports_before_script() {
        let mut env = BTreeMap::new();
        env.insert(String::from("VAULT_ADDR"), String::from("http://127.0.0.1:8200"));
        let command = RemoteCommand::new("vault status").with_env(&env);

        assert_eq!(
            command.render(TransportKind::K8s),
            "export VAULT_ADDR='http://127.0.0.1:8200'\nvault status"
        );
    }

    #[test]
    fn test_privileged_wraps_only_on_ssh() {
        let command = RemoteCommand::new("systemctl restart consul").privileged(true);

        assert_eq!(
            command.render(TransportKind::Ssh),
            "sudo -n sh -c 'systemctl restart consul'"
        );
        assert_eq!(command.render(TransportKind::Nomad), "systemctl restart consul");
    }

    #[test]
    fn test_kind_block_names() {
        for kind in TransportKind::ALL {
            assert_eq!(TransportKind::from_block(kind.as_str()), Some(kind));
        }
        assert_eq!(TransportKind::from_block("winrm"), None);
    }
}
