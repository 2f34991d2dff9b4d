//! State management module.
//!
//! This module persists, per action, the fingerprint of the last applied
//! inputs together with captured output, so repeated applies are no-ops.

mod local;
mod store;
mod types;

pub use local::{LocalStateStore, STATE_DIR};
pub use store::StateStore;
pub use types::{ActionKind, ActionState, DeploymentState, HistoryEntry, Operation, STATE_VERSION};
