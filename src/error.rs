//! Error types for the Outpost provisioning engine.
//!
//! This module provides the error hierarchy for every stage of a remote
//! action: configuration, transport channels, remote execution, status
//! waiting, and fingerprint state persistence.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The main error type for the Outpost provisioning engine.
#[derive(Debug, Error)]
pub enum OutpostError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport channel errors.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A remote command ran but failed.
    #[error("Remote execution error: {0}")]
    Remote(#[from] RemoteExecutionError),

    /// A service did not reach a desired state in time.
    #[error("Timeout: {0}")]
    Timeout(#[from] TimeoutError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// The surrounding action was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors. These are never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required attribute has no known value.
    #[error("missing required attribute '{path}'")]
    MissingAttribute {
        /// Attribute path, e.g. `transport.ssh.host`.
        path: String,
    },

    /// None of a group of alternative attributes has a known value.
    #[error("one of [{}] must be set", .paths.join(", "))]
    MissingOneOf {
        /// Attribute paths of the group.
        paths: Vec<String>,
    },

    /// An attribute value is present but unusable.
    #[error("invalid attribute '{path}': {message}")]
    InvalidAttribute {
        /// Attribute path.
        path: String,
        /// Why the value was rejected.
        message: String,
    },

    /// An attribute name that the variant does not define.
    #[error("unsupported attribute '{path}'")]
    UnknownAttribute {
        /// Attribute path.
        path: String,
    },

    /// Two different transport kinds were combined in one action.
    #[error("cannot merge a {incoming} transport into a {existing} transport")]
    TransportKindConflict {
        /// Kind already configured on the target.
        existing: String,
        /// Kind carried by the source.
        incoming: String,
    },

    /// More than one transport block was given.
    #[error("only one transport may be configured, found: {}", .kinds.join(", "))]
    MultipleTransports {
        /// Kinds that were present.
        kinds: Vec<String>,
    },

    /// No transport block was configured at all.
    #[error("no transport is configured")]
    NoTransport,

    /// A client was requested from a transport that was not validated.
    #[error("transport must be validated before a client can be built")]
    NotValidated,

    /// A local script file could not be read.
    #[error("unable to read script '{path}': {message}")]
    ScriptUnreadable {
        /// Path of the script.
        path: PathBuf,
        /// Underlying IO failure.
        message: String,
    },

    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },
}

/// Errors raised by the execution channel itself, not by the remote command.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The local client binary could not be started.
    #[error("failed to start {program}: {message}")]
    Spawn {
        /// Client program, e.g. `ssh`.
        program: String,
        /// Underlying failure.
        message: String,
    },

    /// The channel could not reach the target.
    #[error("unable to connect to {target}: {message}")]
    Connect {
        /// Human readable target description.
        target: String,
        /// Failure reported by the client.
        message: String,
    },

    /// The channel broke while a command was in flight.
    #[error("channel to {target} failed: {message}")]
    Channel {
        /// Human readable target description.
        target: String,
        /// Failure reported by the client.
        message: String,
    },

    /// A single command exceeded its timeout and was killed.
    #[error("command on {target} timed out after {}s", .timeout.as_secs())]
    CommandTimedOut {
        /// Human readable target description.
        target: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },
}

/// A remote command exited unsuccessfully.
#[derive(Debug, Error)]
pub struct RemoteExecutionError {
    /// Command or script description.
    pub command: String,
    /// Exit code if the channel reported one.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// A service never reached any of the desired states.
#[derive(Debug, Error)]
pub struct TimeoutError {
    /// Service unit name.
    pub service: String,
    /// States that would have satisfied the wait.
    pub desired: Vec<String>,
    /// Last state observed before giving up.
    pub last_observed: String,
    /// How long the wait lasted.
    pub waited: Duration,
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State file not found.
    #[error("State file not found: {path}")]
    NotFound {
        /// Path to the missing state file.
        path: PathBuf,
    },

    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// Writing the state failed.
    #[error("State write failed: {message}")]
    WriteFailed {
        /// Description of the failure.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Result type alias for Outpost operations.
pub type Result<T> = std::result::Result<T, OutpostError>;

impl std::fmt::Display for RemoteExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} exited with {}{}",
            self.command,
            exit_label(self.exit_code),
            captured_output(&self.stdout, &self.stderr)
        )
    }
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "service '{}' did not reach [{}] within {}s, last observed state: {}",
            self.service,
            self.desired.join(", "),
            self.waited.as_secs(),
            self.last_observed
        )
    }
}

fn exit_label(code: Option<i32>) -> String {
    code.map_or_else(|| String::from("no exit status"), |c| format!("exit code {c}"))
}

fn captured_output(stdout: &str, stderr: &str) -> String {
    let mut out = String::new();
    if !stdout.trim().is_empty() {
        out.push_str("\nstdout:\n");
        out.push_str(stdout.trim_end());
    }
    if !stderr.trim().is_empty() {
        out.push_str("\nstderr:\n");
        out.push_str(stderr.trim_end());
    }
    out
}

impl OutpostError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    ///
    /// Only channel failures qualify. Configuration errors, remote command
    /// failures and status timeouts are surfaced to the caller as-is.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns the captured remote output attached to this error, if any.
    #[must_use]
    pub fn captured_output(&self) -> Option<(&str, &str)> {
        match self {
            Self::Remote(e) => Some((e.stdout.as_str(), e.stderr.as_str())),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates an invalid attribute error.
    #[must_use]
    pub fn invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAttribute {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl TransportError {
    /// Creates a connection error.
    #[must_use]
    pub fn connect(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connect {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Creates a channel error.
    #[must_use]
    pub fn channel(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Channel {
            target: target.into(),
            message: message.into(),
        }
    }
}

impl StateError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }
}
