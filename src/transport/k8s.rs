//! Kubernetes pod exec transport variant.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{ConfigError, Result};
use crate::value::TriState;

use super::attributes::{VariantConfig, attribute_path, redacted};
use super::capability::TransportKind;
use super::client::ChannelClient;
use super::process::{Invocation, ProcessRunner};
use super::ssh::write_private;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Pod exec settings.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct K8sTransport {
    /// Base64 encoded kubeconfig.
    pub kubeconfig_base64: TriState<String>,
    /// Kubeconfig context to use.
    pub context_name: TriState<String>,
    /// Namespace of the pod.
    pub namespace: TriState<String>,
    /// Pod name.
    pub pod: TriState<String>,
    /// Container within the pod; the default container when null.
    pub container: TriState<String>,
}

impl VariantConfig for K8sTransport {
    const KIND: TransportKind = TransportKind::K8s;
    const ATTRIBUTES: &'static [&'static str] =
        &["kubeconfig_base64", "context_name", "namespace", "pod", "container"];
    const REQUIRED: &'static [&'static str] = &["kubeconfig_base64", "context_name", "pod"];
    const ONE_OF: &'static [&'static [&'static str]] = &[];
    const SENSITIVE: &'static [&'static str] = &["kubeconfig_base64"];

    fn attribute(&self, name: &str) -> Option<&TriState<String>> {
        match name {
            "kubeconfig_base64" => Some(&self.kubeconfig_base64),
            "context_name" => Some(&self.context_name),
            "namespace" => Some(&self.namespace),
            "pod" => Some(&self.pod),
            "container" => Some(&self.container),
            _ => None,
        }
    }

    fn attribute_mut(&mut self, name: &str) -> Option<&mut TriState<String>> {
        match name {
            "kubeconfig_base64" => Some(&mut self.kubeconfig_base64),
            "context_name" => Some(&mut self.context_name),
            "namespace" => Some(&mut self.namespace),
            "pod" => Some(&mut self.pod),
            "container" => Some(&mut self.container),
            _ => None,
        }
    }

    fn check_values(&self) -> std::result::Result<(), ConfigError> {
        self.decoded_kubeconfig().map(|_| ())
    }
}

impl K8sTransport {
    /// `namespace/pod[/container]` description used in logs and errors.
    #[must_use]
    pub fn target(&self) -> String {
        let mut target = format!("{}/{}", self.namespace(), self.pod.get().map_or("?", String::as_str));
        if let Some(container) = self.container.get() {
            target.push('/');
            target.push_str(container);
        }
        target
    }

    fn namespace(&self) -> &str {
        self.namespace.get().map_or(DEFAULT_NAMESPACE, String::as_str)
    }

    fn decoded_kubeconfig(&self) -> std::result::Result<String, ConfigError> {
        let path = attribute_path(Self::KIND, "kubeconfig_base64");
        let encoded = self
            .kubeconfig_base64
            .get()
            .ok_or_else(|| ConfigError::MissingAttribute { path: path.clone() })?;
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ConfigError::invalid(&path, format!("not valid base64: {e}")))?;
        String::from_utf8(bytes).map_err(|_| ConfigError::invalid(path, "kubeconfig is not UTF-8"))
    }

    /// Writes the kubeconfig to a private file and checks the pod is
    /// reachable.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an undecodable kubeconfig and a
    /// transport error if the pod cannot be reached.
    pub async fn build_client(&self, cancel: &CancellationToken) -> Result<ChannelClient> {
        let kubeconfig = self.decoded_kubeconfig()?;
        let dir = tempfile::Builder::new().prefix("outpost-k8s-").tempdir()?;
        let kubeconfig_path = dir.path().join("kubeconfig");
        write_private(&kubeconfig_path, &kubeconfig, 0o600)?;

        let context = self.context_name.get().cloned().unwrap_or_default();
        let pod = self.pod.get().cloned().unwrap_or_default();
        let kubeconfig_arg = kubeconfig_path.to_string_lossy().into_owned();
        let global = Invocation::new("kubectl").args([
            "--kubeconfig",
            kubeconfig_arg.as_str(),
            "--context",
            context.as_str(),
            "--namespace",
            self.namespace(),
        ]);

        let reachable = global.clone().args(["get", "pod", pod.as_str(), "-o", "name"]);
        let mut exec = global.args(["exec", "-i", pod.as_str()]);
        if let Some(container) = self.container.get() {
            exec = exec.args(["-c", container.as_str()]);
        }
        exec = exec.arg("--");

        let client = ChannelClient::new(
            Self::KIND,
            self.target(),
            exec,
            ProcessRunner::new(cancel.clone()),
        )
        .with_material(dir);

        client.check_reachable(&reachable).await?;
        info!(target = %self.target(), "Pod exec channel ready");
        Ok(client)
    }
}

impl fmt::Debug for K8sTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("K8sTransport")
            .field("kubeconfig_base64", &redacted(&self.kubeconfig_base64))
            .field("context_name", &self.context_name)
            .field("namespace", &self.namespace)
            .field("pod", &self.pod)
            .field("container", &self.container)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> K8sTransport {
        K8sTransport {
            kubeconfig_base64: TriState::Known(STANDARD.encode("apiVersion: v1\nkind: Config\n")),
            context_name: TriState::Known(String::from("staging")),
            pod: TriState::Known(String::from("vault-0")),
            ..K8sTransport::default()
        }
    }

    #[test]
    fn test_validate_accepts_minimal_config() {
        assert!(configured().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_base64() {
        let mut k8s = configured();
        k8s.kubeconfig_base64 = TriState::Known(String::from("!!not base64!!"));

        let err = k8s.validate().expect_err("bad base64");
        assert!(err.to_string().contains("transport.k8s.kubeconfig_base64"));
    }

    #[test]
    fn test_validate_requires_pod() {
        let mut k8s = configured();
        k8s.pod = TriState::Null;

        assert!(matches!(
            k8s.validate(),
            Err(ConfigError::MissingAttribute { path }) if path == "transport.k8s.pod"
        ));
    }

    #[test]
    fn test_target_defaults_namespace() {
        let mut k8s = configured();
        assert_eq!(k8s.target(), "default/vault-0");

        k8s.namespace = TriState::Known(String::from("security"));
        k8s.container = TriState::Known(String::from("vault"));
        assert_eq!(k8s.target(), "security/vault-0/vault");
    }

    #[test]
    fn test_debug_redacts_kubeconfig() {
        let rendered = format!("{:?}", configured());
        assert!(!rendered.contains("apiVersion"));
        assert!(rendered.contains("<redacted>"));
    }
}
