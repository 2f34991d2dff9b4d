//! The tagged union over transport variants.

use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;

use crate::error::{ConfigError, Result};
use crate::value::TriState;

use super::attributes::VariantConfig;
use super::capability::{Transport, TransportKind};
use super::k8s::K8sTransport;
use super::nomad::NomadTransport;
use super::ssh::SshTransport;

/// One configured execution channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportVariant {
    /// SSH session.
    Ssh(SshTransport),
    /// Kubernetes pod exec.
    K8s(K8sTransport),
    /// Nomad allocation exec.
    Nomad(NomadTransport),
}

impl TransportVariant {
    /// An empty configuration of the given kind.
    #[must_use]
    pub fn empty(kind: TransportKind) -> Self {
        match kind {
            TransportKind::Ssh => Self::Ssh(SshTransport::default()),
            TransportKind::K8s => Self::K8s(K8sTransport::default()),
            TransportKind::Nomad => Self::Nomad(NomadTransport::default()),
        }
    }

    /// Variant kind.
    #[must_use]
    pub const fn kind(&self) -> TransportKind {
        match self {
            Self::Ssh(_) => TransportKind::Ssh,
            Self::K8s(_) => TransportKind::K8s,
            Self::Nomad(_) => TransportKind::Nomad,
        }
    }

    /// Attribute names the variant accepts.
    #[must_use]
    pub const fn attribute_names(&self) -> &'static [&'static str] {
        match self {
            Self::Ssh(_) => SshTransport::ATTRIBUTES,
            Self::K8s(_) => K8sTransport::ATTRIBUTES,
            Self::Nomad(_) => NomadTransport::ATTRIBUTES,
        }
    }

    /// Attribute names holding credentials.
    #[must_use]
    pub const fn sensitive_names(&self) -> &'static [&'static str] {
        match self {
            Self::Ssh(_) => SshTransport::SENSITIVE,
            Self::K8s(_) => K8sTransport::SENSITIVE,
            Self::Nomad(_) => NomadTransport::SENSITIVE,
        }
    }

    /// Looks up an attribute by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&TriState<String>> {
        match self {
            Self::Ssh(c) => c.attribute(name),
            Self::K8s(c) => c.attribute(name),
            Self::Nomad(c) => c.attribute(name),
        }
    }

    /// Looks up an attribute by name for writing.
    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut TriState<String>> {
        match self {
            Self::Ssh(c) => c.attribute_mut(name),
            Self::K8s(c) => c.attribute_mut(name),
            Self::Nomad(c) => c.attribute_mut(name),
        }
    }

    /// Every attribute keyed by name.
    #[must_use]
    pub fn attributes(&self) -> BTreeMap<&'static str, &TriState<String>> {
        match self {
            Self::Ssh(c) => c.attributes(),
            Self::K8s(c) => c.attributes(),
            Self::Nomad(c) => c.attributes(),
        }
    }

    /// Checks required attributes and one-of groups without any I/O.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the attribute path.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        match self {
            Self::Ssh(c) => c.validate(),
            Self::K8s(c) => c.validate(),
            Self::Nomad(c) => c.validate(),
        }
    }

    /// Human readable target description.
    #[must_use]
    pub fn target(&self) -> String {
        match self {
            Self::Ssh(c) => c.target(),
            Self::K8s(c) => c.target(),
            Self::Nomad(c) => c.target(),
        }
    }

    /// Constructs the concrete channel and checks it is reachable.
    ///
    /// # Errors
    ///
    /// Configuration errors for unusable material; transport errors when the
    /// target cannot be reached.
    pub async fn build_client(&self, cancel: &CancellationToken) -> Result<Box<dyn Transport>> {
        let client = match self {
            Self::Ssh(c) => c.build_client(cancel).await?,
            Self::K8s(c) => c.build_client(cancel).await?,
            Self::Nomad(c) => c.build_client(cancel).await?,
        };
        Ok(Box::new(client))
    }
}
