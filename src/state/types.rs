//! Recorded outcome of each applied action.
//!
//! The stored fingerprint is what the next plan compares against, so it has
//! to survive process restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Number of history entries kept.
const MAX_HISTORY: usize = 100;

/// Action kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Upload and run commands and scripts.
    Exec,
    /// Install and start a systemd service.
    Service,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exec => write!(f, "exec"),
            Self::Service => write!(f, "service"),
        }
    }
}

/// All recorded actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentState {
    /// State format version.
    pub version: String,
    /// State of individual actions, keyed by name.
    pub actions: BTreeMap<String, ActionState>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Recent apply history.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// Outcome of the last successful apply of one action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionState {
    /// Action name.
    pub name: String,
    /// Action kind.
    pub kind: ActionKind,
    /// Fingerprint of the inputs that were applied.
    pub fingerprint: String,
    /// Captured standard output.
    #[serde(default)]
    pub stdout: String,
    /// Captured standard error.
    #[serde(default)]
    pub stderr: String,
    /// Service state word, for service actions.
    #[serde(default)]
    pub status: Option<String>,
    /// Service status code, for service actions.
    #[serde(default)]
    pub status_code: Option<i32>,
    /// The action's transport block as supplied, secrets included only as
    /// given.
    #[serde(default)]
    pub transport: serde_json::Value,
    /// When the action was last applied.
    pub updated_at: DateTime<Utc>,
}

impl ActionState {
    /// Creates a record for a freshly applied action.
    #[must_use]
    pub fn new(name: &str, kind: ActionKind, fingerprint: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            fingerprint: fingerprint.into(),
            stdout: String::new(),
            stderr: String::new(),
            status: None,
            status_code: None,
            transport: serde_json::Value::Null,
            updated_at: Utc::now(),
        }
    }

    /// Attaches captured output.
    #[must_use]
    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }

    /// Attaches a service status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>, code: i32) -> Self {
        self.status = Some(status.into());
        self.status_code = Some(code);
        self
    }

    /// Attaches the transport wire block.
    #[must_use]
    pub fn with_transport(mut self, transport: serde_json::Value) -> Self {
        self.transport = transport;
        self
    }
}

/// A single entry in the apply history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the apply happened.
    pub timestamp: DateTime<Utc>,
    /// Action name.
    pub action: String,
    /// What was done.
    pub operation: Operation,
    /// Fingerprint at the time.
    pub fingerprint: Option<String>,
    /// Whether it succeeded.
    pub success: bool,
    /// Error message on failure.
    #[serde(default)]
    pub error: Option<String>,
}

/// Types of recorded operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// First apply of an action.
    Create,
    /// Re-run after inputs changed.
    Replace,
    /// Record removed without touching the target.
    Forget,
}

impl Default for DeploymentState {
    fn default() -> Self {
        Self::new()
    }
}

impl DeploymentState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            actions: BTreeMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Gets an action by name.
    #[must_use]
    pub fn get_action(&self, name: &str) -> Option<&ActionState> {
        self.actions.get(name)
    }

    /// Stored fingerprint of an action.
    #[must_use]
    pub fn fingerprint_of(&self, name: &str) -> Option<&str> {
        self.actions.get(name).map(|a| a.fingerprint.as_str())
    }

    /// Adds or replaces an action record.
    pub fn set_action(&mut self, action: ActionState) {
        self.actions.insert(action.name.clone(), action);
        self.last_updated = Utc::now();
    }

    /// Removes an action record.
    pub fn remove_action(&mut self, name: &str) -> Option<ActionState> {
        let result = self.actions.remove(name);
        if result.is_some() {
            self.last_updated = Utc::now();
        }
        result
    }

    /// Appends a history entry, dropping the oldest past the limit.
    pub fn add_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }

    /// Records an apply attempt.
    pub fn record(&mut self, action: &str, operation: Operation, fingerprint: Option<&str>, error: Option<String>) {
        self.add_history(HistoryEntry {
            timestamp: Utc::now(),
            action: action.to_string(),
            operation,
            fingerprint: fingerprint.map(str::to_string),
            success: error.is_none(),
            error,
        });
    }
}
