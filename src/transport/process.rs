//! Local subprocess runner used by every channel client.
//!
//! The platform clients (`ssh`, `kubectl`, `nomad`) do the protocol work; this
//! runner spawns them, feeds stdin, captures output, and enforces timeout and
//! cancellation by killing the child.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{OutpostError, Result, TransportError};

/// Default timeout for a single command on a channel.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// Timeout for the connectivity check run while building a client.
pub const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// What to run locally.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    /// Client program.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Extra environment for the local process.
    pub env: Vec<(String, String)>,
}

impl Invocation {
    /// Creates an invocation of `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Appends arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Raw result of a finished local process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, absent when killed by a signal.
    pub status: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// Spawns client processes with kill-on-drop, timeout and cancellation.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    cancel: CancellationToken,
}

impl ProcessRunner {
    /// Creates a runner bound to a cancellation token.
    #[must_use]
    pub const fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Runs the invocation to completion.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the program cannot be spawned or exceeds
    /// its timeout, and [`OutpostError::Cancelled`] if the token fires first.
    /// In both of the latter cases the child is killed.
    pub async fn run(
        &self,
        target: &str,
        invocation: &Invocation,
        stdin: Option<&[u8]>,
        timeout: Option<Duration>,
    ) -> Result<ProcessOutput> {
        if self.cancel.is_cancelled() {
            return Err(OutpostError::Cancelled);
        }

        let timeout = timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT);
        debug!(program = %invocation.program, target, "Spawning channel client");

        let mut child = tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::Spawn {
                program: invocation.program.clone(),
                message: e.to_string(),
            })?;

        let stdin_handle = child.stdin.take();
        let input = stdin.map(<[u8]>::to_vec);
        let stdin_task = tokio::spawn(async move {
            if let (Some(mut handle), Some(data)) = (stdin_handle, input) {
                let _ = handle.write_all(&data).await;
                let _ = handle.shutdown().await;
            }
        });

        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        tokio::select! {
            result = async {
                let (status, stdout, stderr) = tokio::join!(
                    child.wait(),
                    drain(&mut stdout_handle),
                    drain(&mut stderr_handle),
                );
                let _ = stdin_task.await;
                let status = status.map_err(|e| TransportError::channel(target, e.to_string()))?;
                Ok::<_, OutpostError>(ProcessOutput {
                    status: status.code(),
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                })
            } => result,
            () = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                Err(TransportError::CommandTimedOut {
                    target: target.to_string(),
                    timeout,
                }
                .into())
            }
            () = self.cancel.cancelled() => {
                let _ = child.kill().await;
                debug!(target, "Channel command cancelled");
                Err(OutpostError::Cancelled)
            }
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(handle: &mut Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle.as_mut() {
        let _ = h.read_to_end(&mut buf).await;
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captures_output_and_status() {
        let runner = ProcessRunner::new(CancellationToken::new());
        let invocation = Invocation::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]);

        let output = runner.run("local", &invocation, None, None).await.expect("run");

        assert_eq!(output.status, Some(3));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[tokio::test]
    async fn test_run_feeds_stdin() {
        let runner = ProcessRunner::new(CancellationToken::new());
        let invocation = Invocation::new("cat");

        let output = runner
            .run("local", &invocation, Some(b"payload"), None)
            .await
            .expect("run");

        assert_eq!(output.stdout, "payload");
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let runner = ProcessRunner::new(CancellationToken::new());
        let invocation = Invocation::new("sleep").arg("5");

        let err = runner
            .run("local", &invocation, None, Some(Duration::from_millis(100)))
            .await
            .expect_err("should time out");

        assert!(matches!(
            err,
            OutpostError::Transport(TransportError::CommandTimedOut { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_observes_cancellation() {
        let cancel = CancellationToken::new();
        let runner = ProcessRunner::new(cancel.clone());
        let invocation = Invocation::new("sleep").arg("5");

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let err = runner
            .run("local", &invocation, None, None)
            .await
            .expect_err("should be cancelled");
        let _ = trigger.await;

        assert!(matches!(err, OutpostError::Cancelled));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_transport_error() {
        let runner = ProcessRunner::new(CancellationToken::new());
        let invocation = Invocation::new("outpost-no-such-binary");

        let err = runner
            .run("local", &invocation, None, None)
            .await
            .expect_err("should fail");

        assert!(err.is_retryable());
    }
}
