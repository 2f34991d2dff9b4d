//! Action plan types and construction.
//!
//! A plan compares each action's freshly computed fingerprint with the one
//! recorded by the last successful apply.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::fingerprint::{Fingerprint, FingerprintEngine};
use crate::state::{ActionKind, ActionState};
use crate::value::TriState;

/// What an apply will do with one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Never applied before.
    Create,
    /// Inputs changed since the last apply.
    Replace,
    /// Inputs unchanged; nothing runs.
    NoOp,
    /// Some input is unknown; decided at apply time.
    Deferred,
}

impl ChangeKind {
    /// Decides from the stored and the fresh fingerprint.
    #[must_use]
    pub fn decide(prior: Option<&str>, fingerprint: &Fingerprint) -> Self {
        match (prior, fingerprint.as_known()) {
            (_, None) => Self::Deferred,
            (None, Some(_)) => Self::Create,
            (Some(prior), Some(fresh)) if FingerprintEngine::hashes_match(prior, fresh) => Self::NoOp,
            (Some(_), Some(_)) => Self::Replace,
        }
    }

    /// True when apply will run the action.
    #[must_use]
    pub const fn will_run(self) -> bool {
        !matches!(self, Self::NoOp)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Replace => "replace",
            Self::NoOp => "no-op",
            Self::Deferred => "deferred",
        };
        write!(f, "{s}")
    }
}

/// One planned action.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedChange {
    /// Action name.
    pub name: String,
    /// Action kind.
    pub kind: ActionKind,
    /// What apply will do.
    pub change: ChangeKind,
    /// Where the action runs.
    pub target: String,
    /// Fingerprint recorded by the last apply.
    pub prior: Option<String>,
    /// Fingerprint after apply.
    pub fingerprint: TriState<String>,
    /// Captured stdout after apply.
    pub stdout: TriState<String>,
    /// Captured stderr after apply.
    pub stderr: TriState<String>,
    /// Why the action is in this state.
    pub reason: String,
}

impl PlannedChange {
    /// Plans one action.
    ///
    /// Anything that will run has unknown output. An unchanged action keeps
    /// the output recorded by the last apply.
    #[must_use]
    pub fn new(
        name: &str,
        kind: ActionKind,
        target: String,
        fingerprint: &Fingerprint,
        recorded: Option<&ActionState>,
    ) -> Self {
        let prior = recorded.map(|r| r.fingerprint.clone());
        let change = ChangeKind::decide(prior.as_deref(), fingerprint);
        let reason = match change {
            ChangeKind::Create => String::from("not applied yet"),
            ChangeKind::Replace => String::from("inputs changed"),
            ChangeKind::NoOp => String::from("up to date"),
            ChangeKind::Deferred => String::from("inputs known after apply"),
        };
        let (stdout, stderr) = match (change, recorded) {
            (ChangeKind::NoOp, Some(r)) => (
                TriState::Known(r.stdout.clone()),
                TriState::Known(r.stderr.clone()),
            ),
            _ => (TriState::Unknown, TriState::Unknown),
        };

        Self {
            name: name.to_string(),
            kind,
            change,
            target,
            prior,
            fingerprint: fingerprint.to_tristate(),
            stdout,
            stderr,
            reason,
        }
    }
}

impl fmt::Display for PlannedChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} on {}", self.change, self.kind, self.name, self.target)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

/// A complete plan, in action order.
#[derive(Debug, Clone, Serialize)]
pub struct ActionPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Planned actions in execution order.
    pub changes: Vec<PlannedChange>,
}

impl ActionPlan {
    /// Creates a plan from planned changes.
    #[must_use]
    pub fn new(changes: Vec<PlannedChange>) -> Self {
        Self {
            created_at: Utc::now(),
            changes,
        }
    }

    /// True when nothing will run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.changes.iter().any(|c| c.change.will_run())
    }

    /// Actions that will run.
    pub fn pending(&self) -> impl Iterator<Item = &PlannedChange> {
        self.changes.iter().filter(|c| c.change.will_run())
    }

    /// Number of actions with the given change.
    #[must_use]
    pub fn count(&self, change: ChangeKind) -> usize {
        self.changes.iter().filter(|c| c.change == change).count()
    }

    /// Looks up a planned action by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PlannedChange> {
        self.changes.iter().find(|c| c.name == name)
    }
}

impl fmt::Display for ActionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(f, "Plan ({} to run):", self.pending().count())?;
        for (i, change) in self.pending().enumerate() {
            writeln!(f, "  {i}. {change}")?;
        }
        Ok(())
    }
}
