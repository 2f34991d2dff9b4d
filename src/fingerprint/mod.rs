//! Idempotence engine.
//!
//! Decides from a deterministic digest of an action's inputs whether remote
//! work has to be redone.

mod engine;
mod inputs;

pub use engine::{Fingerprint, FingerprintEngine};
pub use inputs::{ActionInputs, StringList, StringMap};
