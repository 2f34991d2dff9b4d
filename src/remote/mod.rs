//! Remote orchestration protocol.
//!
//! This module provides:
//! - Idempotent provisioning primitives (users, directories, files, units)
//! - Script upload and execution
//! - systemd service restart, status and wait
//! - The retry policy applied to channel failures

mod files;
mod orchestrator;
mod request;
mod retry;
mod service;
#[cfg(test)]
pub(crate) mod testing;
mod unit;

pub use orchestrator::{DEFAULT_STEP_TIMEOUT, RemoteOrchestrator};
pub use request::{ContentSource, DEFAULT_OPERATION_TIMEOUT, RemoteOperationRequest, ScriptRun};
pub use retry::{RetryPolicy, retry};
pub use service::{DEFAULT_POLL_INTERVAL, STATUS_NO_SUCH_UNIT, STATUS_NOT_RUNNING, ServiceStatus};
pub use unit::{ServiceLayout, ServiceUnitDescriptor, render_env_file};
