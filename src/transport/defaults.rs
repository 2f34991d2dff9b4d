//! Provider-wide transport defaults shared by every action.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::{OutpostError, Result};

use super::embedded::EmbeddedTransport;

/// Read-mostly handle to the provider's default transport.
///
/// Set once when the provider is configured. Each action takes a private
/// copy under a short-lived lock and merges its own overrides into it.
#[derive(Debug, Clone, Default)]
pub struct ProviderDefaults {
    inner: Arc<Mutex<EmbeddedTransport>>,
}

impl ProviderDefaults {
    /// Wraps the provider-level transport block.
    #[must_use]
    pub fn new(transport: EmbeddedTransport) -> Self {
        Self {
            inner: Arc::new(Mutex::new(transport)),
        }
    }

    /// Replaces the defaults, e.g. when the provider is reconfigured.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the lock is poisoned.
    pub fn replace(&self, transport: EmbeddedTransport) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| OutpostError::internal("provider defaults lock poisoned"))?;
        *guard = transport;
        Ok(())
    }

    /// Returns a private copy of the defaults.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the lock is poisoned.
    pub fn snapshot(&self) -> Result<EmbeddedTransport> {
        self.inner
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| OutpostError::internal("provider defaults lock poisoned"))
    }

    /// Merges an action's transport over the defaults and validates the
    /// result, ready for [`EmbeddedTransport::client`].
    ///
    /// # Errors
    ///
    /// Returns a configuration error on a kind conflict or a missing
    /// attribute.
    pub fn resolve(&self, action: &EmbeddedTransport) -> Result<EmbeddedTransport> {
        let base = self.snapshot()?;
        let mut merged = EmbeddedTransport::merge(&base, action)?;
        merged.validate()?;
        debug!(target = %merged.target(), "Resolved action transport");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportKind;
    use crate::value::TriState;

    fn defaults() -> ProviderDefaults {
        let transport = EmbeddedTransport::new()
            .with_attribute(TransportKind::Ssh, "user", String::from("deploy"))
            .and_then(|t| t.with_attribute(TransportKind::Ssh, "private_key", String::from("key")))
            .expect("defaults");
        ProviderDefaults::new(transport)
    }

    #[test]
    fn test_resolve_fills_from_defaults() {
        let action = EmbeddedTransport::new()
            .with_attribute(TransportKind::Ssh, "host", String::from("10.0.0.9"))
            .expect("action");

        let resolved = defaults().resolve(&action).expect("resolve");

        assert_eq!(
            resolved.attribute("user").and_then(TriState::get).map(String::as_str),
            Some("deploy")
        );
        assert_eq!(
            resolved.attribute("host").and_then(TriState::get).map(String::as_str),
            Some("10.0.0.9")
        );
    }

    #[test]
    fn test_resolve_does_not_mutate_defaults() {
        let shared = defaults();
        let action = EmbeddedTransport::new()
            .with_attribute(TransportKind::Ssh, "user", String::from("root"))
            .and_then(|t| t.with_attribute(TransportKind::Ssh, "host", String::from("h")))
            .expect("action");

        shared.resolve(&action).expect("resolve");

        let snapshot = shared.snapshot().expect("snapshot");
        assert_eq!(
            snapshot.attribute("user").and_then(TriState::get).map(String::as_str),
            Some("deploy")
        );
        assert!(snapshot.attribute("host").is_some_and(TriState::is_null));
    }

    #[test]
    fn test_resolve_incomplete_is_config_error() {
        let err = defaults()
            .resolve(&EmbeddedTransport::new())
            .expect_err("host missing");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("transport.ssh.host"));
    }

    #[test]
    fn test_replace() {
        let shared = ProviderDefaults::default();
        assert!(shared.snapshot().expect("snapshot").kind().is_none());

        shared.replace(defaults().snapshot().expect("snapshot")).expect("replace");
        assert_eq!(shared.snapshot().expect("snapshot").kind(), Some(TransportKind::Ssh));
    }
}
