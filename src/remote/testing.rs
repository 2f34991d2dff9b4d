//! In-memory transport that records what it is asked to do.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::transport::{CommandOutput, RemoteCommand, Transport, TransportKind};

type Responder = Box<dyn Fn(&RemoteCommand) -> Result<CommandOutput> + Send + Sync>;

/// Records every command and copy; answers commands through a responder.
pub struct RecordingTransport {
    kind: TransportKind,
    commands: Mutex<Vec<RemoteCommand>>,
    copies: Mutex<Vec<(String, Vec<u8>)>>,
    responder: Responder,
}

impl RecordingTransport {
    /// An SSH-kind transport where every command succeeds with no output.
    pub fn new() -> Self {
        Self {
            kind: TransportKind::Ssh,
            commands: Mutex::new(Vec::new()),
            copies: Mutex::new(Vec::new()),
            responder: Box::new(|_| {
                Ok(CommandOutput {
                    exit_code: Some(0),
                    ..CommandOutput::default()
                })
            }),
        }
    }

    /// Changes the reported kind.
    pub fn with_kind(mut self, kind: TransportKind) -> Self {
        self.kind = kind;
        self
    }

    /// Answers every command with the output built by `f`.
    pub fn respond<F>(self, f: F) -> Self
    where
        F: Fn(&RemoteCommand) -> CommandOutput + Send + Sync + 'static,
    {
        self.respond_with(move |command| Ok(f(command)))
    }

    /// Answers every command with the result built by `f`.
    pub fn respond_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&RemoteCommand) -> Result<CommandOutput> + Send + Sync + 'static,
    {
        self.responder = Box::new(f);
        self
    }

    /// Commands run so far.
    pub fn commands(&self) -> Vec<RemoteCommand> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Scripts of the commands run so far.
    pub fn scripts(&self) -> Vec<String> {
        self.commands().into_iter().map(|c| c.script).collect()
    }

    /// Files copied so far.
    pub fn copies(&self) -> Vec<(String, Vec<u8>)> {
        self.copies.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn target(&self) -> String {
        String::from("recording")
    }

    async fn run(&self, command: &RemoteCommand) -> Result<CommandOutput> {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command.clone());
        }
        (self.responder)(command)
    }

    async fn copy(&self, content: &[u8], destination: &str) -> Result<()> {
        if let Ok(mut copies) = self.copies.lock() {
            copies.push((destination.to_string(), content.to_vec()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Lets several owners share one recording transport.
#[async_trait]
impl Transport for std::sync::Arc<RecordingTransport> {
    fn kind(&self) -> TransportKind {
        self.as_ref().kind()
    }

    fn target(&self) -> String {
        self.as_ref().target()
    }

    async fn run(&self, command: &RemoteCommand) -> Result<CommandOutput> {
        self.as_ref().run(command).await
    }

    async fn copy(&self, content: &[u8], destination: &str) -> Result<()> {
        self.as_ref().copy(content, destination).await
    }

    async fn close(&self) -> Result<()> {
        self.as_ref().close().await
    }
}
