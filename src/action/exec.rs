//! Remote exec action: uploaded content, inline commands and scripts.

use std::time::Duration;

use tracing::info;

use crate::config::ExecConfig;
use crate::error::{ConfigError, Result};
use crate::fingerprint::{ActionInputs, Fingerprint, FingerprintEngine};
use crate::remote::{RemoteOrchestrator, ScriptRun};
use crate::state::{ActionKind, ActionState};
use crate::transport::{CommandOutput, EmbeddedTransport, RemoteCommand};

/// Runs commands on a target, gated by a fingerprint of its inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecAction {
    /// Unique action name.
    pub name: String,
    /// Transport overrides.
    pub transport: EmbeddedTransport,
    /// Everything the outcome depends on.
    pub inputs: ActionInputs,
    /// Per-command timeout.
    pub timeout: Option<Duration>,
}

impl ExecAction {
    /// Creates an action with no inputs.
    #[must_use]
    pub fn new(name: impl Into<String>, transport: EmbeddedTransport) -> Self {
        Self {
            name: name.into(),
            transport,
            inputs: ActionInputs::default(),
            timeout: None,
        }
    }

    /// Sets the inputs.
    #[must_use]
    pub fn with_inputs(mut self, inputs: ActionInputs) -> Self {
        self.inputs = inputs;
        self
    }

    /// Builds the action from its configuration block.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the transport block is malformed.
    pub fn from_config(config: &ExecConfig) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            name: config.name.clone(),
            transport: EmbeddedTransport::from_wire(&config.transport)?,
            inputs: ActionInputs {
                content: config.content.clone(),
                inline: config.inline.clone(),
                scripts: config.scripts.clone(),
                environment: config.environment.clone(),
            },
            timeout: config.timeout_secs.map(Duration::from_secs),
        })
    }

    /// Fingerprint of the inputs.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a script file cannot be read.
    pub fn fingerprint(&self) -> std::result::Result<Fingerprint, ConfigError> {
        FingerprintEngine::new().compute(&self.inputs)
    }

    /// Runs content, then each inline command, then each script, stopping at
    /// the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first remote execution or transport error. A remote
    /// execution error carries the output of the failing step only.
    pub async fn run(&self, orchestrator: &RemoteOrchestrator<'_>, fingerprint: &str) -> Result<ActionState> {
        let env = self.inputs.environment_vars();
        let mut collected = Collected::default();

        if let Some(content) = self.inputs.content.get() {
            let run = ScriptRun::new(content.as_str())
                .with_env(env.clone())
                .with_label(format!("{} content", self.name));
            collected.push(orchestrator.run_script(&run).await?);
        }

        for command in self.inputs.inline_commands() {
            let output = orchestrator
                .exec(&command, RemoteCommand::new(command.as_str()).with_env(&env))
                .await?;
            collected.push(output);
        }

        for (path, body) in self.inputs.read_scripts()? {
            let run = ScriptRun::new(body)
                .with_env(env.clone())
                .with_label(path.display().to_string());
            collected.push(orchestrator.run_script(&run).await?);
        }

        info!(action = %self.name, "Exec action finished ({} steps)", collected.steps);
        Ok(ActionState::new(&self.name, ActionKind::Exec, fingerprint)
            .with_output(collected.stdout, collected.stderr))
    }
}

#[derive(Default)]
struct Collected {
    stdout: String,
    stderr: String,
    steps: usize,
}

impl Collected {
    fn push(&mut self, output: CommandOutput) {
        self.stdout.push_str(&output.stdout);
        self.stderr.push_str(&output.stderr);
        self.steps += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::RecordingTransport;
    use crate::value::TriState;
    use std::collections::BTreeMap;
    use std::io::Write;
    use tokio_util::sync::CancellationToken;

    fn strings(items: &[&str]) -> TriState<Vec<TriState<String>>> {
        TriState::Known(items.iter().map(|s| TriState::Known((*s).to_string())).collect())
    }

    fn echo_transport() -> RecordingTransport {
        RecordingTransport::new().respond(|command| CommandOutput {
            stdout: format!("ran {}\n", command.script.lines().last().unwrap_or_default()),
            stderr: String::new(),
            exit_code: Some(0),
        })
    }

    #[tokio::test]
    async fn test_runs_content_inline_then_scripts() {
        let mut script = tempfile::NamedTempFile::new().expect("temp file");
        write!(script, "#!/bin/sh\necho from-script\n").expect("write");
        let script_path = script.path().display().to_string();

        let mut env = BTreeMap::new();
        env.insert(String::from("FOO"), TriState::Known(String::from("bar")));
        let action = ExecAction::new("bootstrap", EmbeddedTransport::new()).with_inputs(ActionInputs {
            content: TriState::Known(String::from("echo content")),
            inline: strings(&["echo one", "echo two"]),
            scripts: strings(&[script_path.as_str()]),
            environment: TriState::Known(env),
        });

        let transport = echo_transport();
        let orchestrator = RemoteOrchestrator::new(&transport, CancellationToken::new());
        let state = action.run(&orchestrator, "f1").await.expect("run");

        let copies = transport.copies();
        assert_eq!(copies.len(), 2);
        assert_eq!(copies[0].1, b"echo content");
        assert_eq!(copies[1].1, b"#!/bin/sh\necho from-script\n");

        let scripts = transport.scripts();
        assert_eq!(scripts.len(), 4);
        assert!(scripts[1].ends_with("echo one"));
        assert!(scripts[2].ends_with("echo two"));
        assert!(transport.commands().iter().all(|c| c.env.get("FOO").map(String::as_str) == Some("bar")));

        assert_eq!(state.fingerprint, "f1");
        assert_eq!(state.kind, ActionKind::Exec);
        assert_eq!(state.stdout.lines().count(), 4);
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let transport = RecordingTransport::new().respond(|command| CommandOutput {
            stdout: String::new(),
            stderr: String::from("nope"),
            exit_code: Some(i32::from(command.script.contains("false"))),
        });
        let action = ExecAction::new("bootstrap", EmbeddedTransport::new()).with_inputs(ActionInputs {
            inline: strings(&["false", "echo never"]),
            ..ActionInputs::default()
        });

        let orchestrator = RemoteOrchestrator::new(&transport, CancellationToken::new());
        let err = action.run(&orchestrator, "f1").await.expect_err("fails");

        assert_eq!(err.captured_output().map(|(_, e)| e), Some("nope"));
        assert_eq!(transport.commands().len(), 1);
    }

    #[test]
    fn test_from_config() {
        let config: ExecConfig = serde_yaml::from_str(
            "name: bootstrap\ntransport:\n  ssh:\n    host: 10.0.0.4\ninline: [echo hi]\ntimeout_secs: 30\n",
        )
        .expect("parse");

        let action = ExecAction::from_config(&config).expect("action");
        assert_eq!(action.timeout, Some(Duration::from_secs(30)));
        assert_eq!(action.inputs.inline_commands(), vec![String::from("echo hi")]);
        assert_eq!(
            action.transport.attribute("host").and_then(TriState::get).map(String::as_str),
            Some("10.0.0.4")
        );
    }

    #[test]
    fn test_fingerprint_matches_engine() {
        let action = ExecAction::new("bootstrap", EmbeddedTransport::new()).with_inputs(ActionInputs {
            inline: strings(&["echo hi"]),
            ..ActionInputs::default()
        });

        let expected = FingerprintEngine::combine([FingerprintEngine::digest(b"echo hi")]);
        assert_eq!(action.fingerprint().expect("fingerprint"), Fingerprint::Known(expected));
    }
}
