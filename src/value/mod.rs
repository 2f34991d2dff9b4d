//! Tri-state values for the plan/apply exchange.
//!
//! Every attribute that crosses the host boundary is carried as a
//! [`TriState`], so "not known yet" survives planning untouched.

mod tristate;

pub use tristate::{TriState, UNKNOWN_SENTINEL};
