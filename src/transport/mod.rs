//! Pluggable execution channels.
//!
//! This module provides:
//! - Per-channel configuration variants (SSH, pod exec, allocation exec)
//! - The embedded container that merges provider defaults with action overrides
//! - The [`Transport`] capability every channel produces

mod attributes;
mod capability;
mod client;
mod defaults;
mod embedded;
mod k8s;
mod nomad;
mod process;
pub mod shell;
mod ssh;
mod variant;

pub use attributes::{REDACTED, VariantConfig, attribute_path, expand_home};
pub use capability::{CommandOutput, RemoteCommand, Transport, TransportKind};
#[cfg(test)]
pub use capability::MockTransport;
pub use client::ChannelClient;
pub use defaults::ProviderDefaults;
pub use embedded::{EmbeddedTransport, TransportState};
pub use k8s::K8sTransport;
pub use nomad::NomadTransport;
pub use process::{DEFAULT_COMMAND_TIMEOUT, Invocation, ProcessOutput, ProcessRunner};
pub use ssh::SshTransport;
pub use variant::TransportVariant;
