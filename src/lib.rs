// ============================================================================
// Strict linting
// ============================================================================

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(unused_must_use)]
#![deny(nonstandard_style)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]
#![warn(clippy::todo)]
#![warn(clippy::unimplemented)]
#![warn(clippy::redundant_clone)]

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Outpost
//!
//! Transport-agnostic, fingerprint-gated remote provisioning.
//!
//! ## Overview
//!
//! Outpost runs commands and installs systemd services on remote hosts that
//! are reached through a platform client:
//!
//! - SSH (`ssh`)
//! - Kubernetes exec (`kubectl exec`)
//! - Nomad exec (`nomad alloc exec`)
//!
//! Every action carries a fingerprint of its inputs. An action only runs again
//! when its fingerprint changes, and the outcome is recorded locally.
//!
//! ## Modules
//!
//! - [`value`]: Three-state values (known, null, unknown)
//! - [`transport`]: Transport containers, merging and the channel clients
//! - [`fingerprint`]: Input digests for actions
//! - [`remote`]: Remote file, script and service operations
//! - [`action`]: Exec and service actions, plans and the runner
//! - [`state`]: Recorded action state
//! - [`config`]: Configuration parsing and validation
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! transport:
//!   ssh:
//!     host: 10.0.0.4
//!     user: ubuntu
//!
//! actions:
//!   - type: exec
//!     name: bootstrap
//!     inline:
//!       - apt-get update
//!   - type: service
//!     name: vault
//!     product: vault
//!     config_file: ./vault.hcl
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod action;
pub mod cli;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod remote;
pub mod state;
pub mod transport;
pub mod value;

// ============================================================================
// Re-exports
// ============================================================================

pub use action::{Action, ActionPlan, ActionRunner, ApplyReport, ChangeKind};
pub use config::{ConfigParser, ConfigValidator, DeployConfig};
pub use error::{OutpostError, Result};
pub use fingerprint::{ActionInputs, Fingerprint, FingerprintEngine};
pub use state::{DeploymentState, LocalStateStore, StateStore};
pub use transport::{EmbeddedTransport, ProviderDefaults, Transport, TransportKind};
pub use value::TriState;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
