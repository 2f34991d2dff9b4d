//! Nomad allocation exec transport variant.

use std::fmt;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{ConfigError, Result};
use crate::value::TriState;

use super::attributes::{VariantConfig, attribute_path, redacted};
use super::capability::TransportKind;
use super::client::ChannelClient;
use super::process::{Invocation, ProcessRunner};

/// Allocation exec settings.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct NomadTransport {
    /// Nomad API address, e.g. `https://nomad.service.consul:4646`.
    pub host: TriState<String>,
    /// ACL token.
    pub secret_id: TriState<String>,
    /// Allocation to exec into.
    pub allocation_id: TriState<String>,
    /// Task within the allocation.
    pub task_name: TriState<String>,
}

impl VariantConfig for NomadTransport {
    const KIND: TransportKind = TransportKind::Nomad;
    const ATTRIBUTES: &'static [&'static str] = &["host", "secret_id", "allocation_id", "task_name"];
    const REQUIRED: &'static [&'static str] = &["host", "allocation_id", "task_name"];
    const ONE_OF: &'static [&'static [&'static str]] = &[];
    const SENSITIVE: &'static [&'static str] = &["secret_id"];

    fn attribute(&self, name: &str) -> Option<&TriState<String>> {
        match name {
            "host" => Some(&self.host),
            "secret_id" => Some(&self.secret_id),
            "allocation_id" => Some(&self.allocation_id),
            "task_name" => Some(&self.task_name),
            _ => None,
        }
    }

    fn attribute_mut(&mut self, name: &str) -> Option<&mut TriState<String>> {
        match name {
            "host" => Some(&mut self.host),
            "secret_id" => Some(&mut self.secret_id),
            "allocation_id" => Some(&mut self.allocation_id),
            "task_name" => Some(&mut self.task_name),
            _ => None,
        }
    }

    fn check_values(&self) -> std::result::Result<(), ConfigError> {
        let host = self.host.get().map_or("", String::as_str);
        if host.starts_with("http://") || host.starts_with("https://") {
            Ok(())
        } else {
            Err(ConfigError::invalid(
                attribute_path(Self::KIND, "host"),
                "must be an http:// or https:// address",
            ))
        }
    }
}

impl NomadTransport {
    /// `allocation/task` description used in logs and errors.
    #[must_use]
    pub fn target(&self) -> String {
        format!(
            "{}/{}",
            self.allocation_id.get().map_or("?", String::as_str),
            self.task_name.get().map_or("?", String::as_str)
        )
    }

    /// Points the `nomad` client at the cluster and checks the allocation is
    /// visible.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the allocation cannot be looked up.
    pub async fn build_client(&self, cancel: &CancellationToken) -> Result<ChannelClient> {
        let allocation = self.allocation_id.get().cloned().unwrap_or_default();
        let task = self.task_name.get().cloned().unwrap_or_default();

        let mut base = Invocation::new("nomad");
        base.env.push((
            String::from("NOMAD_ADDR"),
            self.host.get().cloned().unwrap_or_default(),
        ));
        if let Some(token) = self.secret_id.get() {
            base.env.push((String::from("NOMAD_TOKEN"), token.clone()));
        }

        let reachable = base.clone().args(["alloc", "status", "-short", allocation.as_str()]);
        let exec = base.args([
            "alloc",
            "exec",
            "-i",
            "-t=false",
            "-task",
            task.as_str(),
            allocation.as_str(),
        ]);

        let client = ChannelClient::new(
            Self::KIND,
            self.target(),
            exec,
            ProcessRunner::new(cancel.clone()),
        );

        client.check_reachable(&reachable).await?;
        info!(target = %self.target(), "Allocation exec channel ready");
        Ok(client)
    }
}

impl fmt::Debug for NomadTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NomadTransport")
            .field("host", &self.host)
            .field("secret_id", &redacted(&self.secret_id))
            .field("allocation_id", &self.allocation_id)
            .field("task_name", &self.task_name)
            .finish()
    }
}
