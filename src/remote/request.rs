//! Value objects consumed by the remote primitives.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, Result};

use super::retry::RetryPolicy;

/// Default timeout for a single file operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Where the bytes of a remote file come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSource {
    /// Bytes held in memory.
    Inline(Vec<u8>),
    /// A local file read at apply time.
    File(PathBuf),
}

impl ContentSource {
    /// Reads the content.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a local file cannot be read.
    pub async fn load(&self) -> Result<Vec<u8>> {
        match self {
            Self::Inline(bytes) => Ok(bytes.clone()),
            Self::File(path) => tokio::fs::read(path).await.map_err(|e| {
                ConfigError::invalid(path.display().to_string(), format!("cannot read: {e}")).into()
            }),
        }
    }
}

impl From<String> for ContentSource {
    fn from(value: String) -> Self {
        Self::Inline(value.into_bytes())
    }
}

impl From<&str> for ContentSource {
    fn from(value: &str) -> Self {
        Self::Inline(value.as_bytes().to_vec())
    }
}

/// A single-use request to place a file on the target.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteOperationRequest {
    /// Absolute destination path.
    pub target_path: String,
    /// Octal permission bits.
    pub mode: u32,
    /// `user` or `user:group`; unchanged when absent.
    pub owner: Option<String>,
    /// Content to write.
    pub source: ContentSource,
    /// Retry policy for transport failures.
    pub retry: RetryPolicy,
    /// Timeout for each command of the operation.
    pub timeout: Duration,
}

impl RemoteOperationRequest {
    /// Creates a request with mode `0644`, no owner change and default
    /// retry and timeout.
    #[must_use]
    pub fn new(target_path: impl Into<String>, source: impl Into<ContentSource>) -> Self {
        Self {
            target_path: target_path.into(),
            mode: 0o644,
            owner: None,
            source: source.into(),
            retry: RetryPolicy::default(),
            timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Sets the permission bits.
    #[must_use]
    pub const fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the owner.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A script to upload and execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRun {
    /// Script body.
    pub content: String,
    /// Upload path; derived from the content digest when unset.
    pub destination: Option<String>,
    /// Environment exported for the script.
    pub env: BTreeMap<String, String>,
    /// Permission bits of the uploaded file.
    pub mode: u32,
    /// Label used in logs and errors.
    pub label: String,
}

impl ScriptRun {
    /// Creates a run for the given script body.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            destination: None,
            env: BTreeMap::new(),
            mode: 0o700,
            label: String::from("script"),
        }
    }

    /// Sets the environment.
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Sets an explicit upload path.
    #[must_use]
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Sets the permission bits.
    #[must_use]
    pub const fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}
