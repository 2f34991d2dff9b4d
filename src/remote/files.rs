//! User, directory and file primitives.

use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::transport::{RemoteCommand, shell};

use super::orchestrator::RemoteOrchestrator;
use super::request::RemoteOperationRequest;
use super::retry::retry;
use super::unit::ServiceUnitDescriptor;

/// Parent directory of an absolute path.
fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(index) => &path[..index],
        None => ".",
    }
}

impl RemoteOrchestrator<'_> {
    /// Creates a system user, or updates home and shell of an existing one.
    ///
    /// # Errors
    ///
    /// Returns a remote execution error if `useradd`/`usermod` fails.
    pub async fn ensure_user(&self, name: &str, home: Option<&str>, login_shell: Option<&str>) -> Result<()> {
        let user = shell::quote(name);
        let mut add = String::from("useradd --system");
        let mut modify = Vec::new();
        if let Some(home) = home {
            add.push_str(&format!(" --home-dir {}", shell::quote(home)));
            modify.push(format!("--home {}", shell::quote(home)));
        }
        if let Some(login_shell) = login_shell {
            add.push_str(&format!(" --shell {}", shell::quote(login_shell)));
            modify.push(format!("--shell {}", shell::quote(login_shell)));
        }
        let update = if modify.is_empty() {
            String::from("true")
        } else {
            format!("usermod {} {user}", modify.join(" "))
        };

        let script = format!(
            "if id -u {user} >/dev/null 2>&1; then {update}; else {add} {user}; fi"
        );
        self.exec(&format!("ensure user {name}"), RemoteCommand::new(script).privileged(true))
            .await?;
        info!(target = %self.transport.target(), "User {} present", name);
        Ok(())
    }

    /// Creates a directory tree; existing directories are left in place.
    ///
    /// # Errors
    ///
    /// Returns a remote execution error if the directory cannot be created.
    pub async fn create_directory(&self, path: &str, owner: Option<&str>, mode: Option<u32>) -> Result<()> {
        let quoted = shell::quote(path);
        let mut script = format!("mkdir -p {quoted}");
        if let Some(owner) = owner {
            script.push_str(&format!(" && chown {} {quoted}", shell::quote(owner)));
        }
        if let Some(mode) = mode {
            script.push_str(&format!(" && chmod {mode:o} {quoted}"));
        }
        self.exec(&format!("create directory {path}"), RemoteCommand::new(script).privileged(true))
            .await?;
        Ok(())
    }

    /// Writes a file, replacing whatever is at the destination.
    ///
    /// The content is uploaded to a staging path as the login user and then
    /// moved into place with the requested mode and owner, so privileged
    /// destinations work over SSH.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a local source cannot be read and a
    /// remote execution error if the move fails.
    pub async fn copy_file(&self, request: &RemoteOperationRequest) -> Result<()> {
        let content = request.source.load().await?;
        let staging = format!("/tmp/outpost-stage-{}", Uuid::new_v4().simple());
        let destination = shell::quote(&request.target_path);
        let staged = shell::quote(&staging);

        retry(&request.retry, &self.cancel, &request.target_path, || {
            self.transport.copy(&content, &staging)
        })
        .await?;

        let mut script = format!(
            "mkdir -p {parent} && mv -f {staged} {destination} && chmod {mode:o} {destination}",
            parent = shell::quote(parent_of(&request.target_path)),
            mode = request.mode,
        );
        if let Some(owner) = &request.owner {
            script.push_str(&format!(" && chown {} {destination}", shell::quote(owner)));
        }

        let command = RemoteCommand::new(script)
            .privileged(true)
            .with_timeout(request.timeout);
        self.exec(&format!("install {}", request.target_path), command)
            .await?;

        info!(
            target = %self.transport.target(),
            "Wrote {} ({} bytes)", request.target_path, content.len()
        );
        Ok(())
    }

    /// Renders a unit descriptor and writes it to `path`.
    ///
    /// # Errors
    ///
    /// See [`RemoteOrchestrator::copy_file`].
    pub async fn write_service_unit(
        &self,
        descriptor: &ServiceUnitDescriptor,
        path: &str,
        mode: u32,
        owner: Option<&str>,
    ) -> Result<()> {
        let mut request = RemoteOperationRequest::new(path, descriptor.render())
            .with_mode(mode)
            .with_retry(self.retry)
            .with_timeout(self.step_timeout);
        if let Some(owner) = owner {
            request = request.with_owner(owner);
        }
        self.copy_file(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::RecordingTransport;
    use crate::transport::TransportKind;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of("/etc/vault.d/vault.hcl"), "/etc/vault.d");
        assert_eq!(parent_of("/vault.hcl"), "/");
        assert_eq!(parent_of("vault.hcl"), ".");
    }

    #[tokio::test]
    async fn test_ensure_user_creates_or_updates() {
        let transport = RecordingTransport::new();
        let orchestrator = RemoteOrchestrator::new(&transport, CancellationToken::new());

        orchestrator
            .ensure_user("vault", Some("/opt/vault"), Some("/bin/false"))
            .await
            .expect("ensure user");

        let commands = transport.commands();
        let script = &commands[0].script;
        assert!(script.starts_with("if id -u 'vault'"));
        assert!(script.contains("usermod --home '/opt/vault' --shell '/bin/false' 'vault'"));
        assert!(script.contains("useradd --system --home-dir '/opt/vault' --shell '/bin/false' 'vault'"));
        assert!(commands[0].privileged);
    }

    #[tokio::test]
    async fn test_ensure_user_without_options_leaves_existing_user() {
        let transport = RecordingTransport::new();
        let orchestrator = RemoteOrchestrator::new(&transport, CancellationToken::new());

        orchestrator.ensure_user("consul", None, None).await.expect("ensure user");

        assert!(transport.scripts()[0].contains("then true; else useradd --system 'consul'"));
    }

    #[tokio::test]
    async fn test_create_directory_is_idempotent_mkdir() {
        let transport = RecordingTransport::new();
        let orchestrator = RemoteOrchestrator::new(&transport, CancellationToken::new());

        orchestrator
            .create_directory("/opt/vault/data", Some("vault:vault"), Some(0o750))
            .await
            .expect("create directory");

        assert_eq!(
            transport.scripts()[0],
            "mkdir -p '/opt/vault/data' && chown 'vault:vault' '/opt/vault/data' && chmod 750 '/opt/vault/data'"
        );
    }

    #[tokio::test]
    async fn test_copy_file_stages_then_moves() {
        let transport = RecordingTransport::new();
        let orchestrator = RemoteOrchestrator::new(&transport, CancellationToken::new());
        let request = RemoteOperationRequest::new("/etc/vault.d/vault.hcl", "ui = true\n")
            .with_mode(0o640)
            .with_owner("vault:vault");

        orchestrator.copy_file(&request).await.expect("copy");

        let copies = transport.copies();
        assert_eq!(copies.len(), 1);
        assert!(copies[0].0.starts_with("/tmp/outpost-stage-"));
        assert_eq!(copies[0].1, b"ui = true\n");

        let script = &transport.scripts()[0];
        assert!(script.contains("mkdir -p '/etc/vault.d'"));
        assert!(script.contains("mv -f"));
        assert!(script.contains("chmod 640 '/etc/vault.d/vault.hcl'"));
        assert!(script.contains("chown 'vault:vault' '/etc/vault.d/vault.hcl'"));
    }

    #[tokio::test]
    async fn test_copy_file_privileged_rendering_depends_on_kind() {
        let transport = RecordingTransport::new().with_kind(TransportKind::K8s);
        let orchestrator = RemoteOrchestrator::new(&transport, CancellationToken::new());

        orchestrator
            .copy_file(&RemoteOperationRequest::new("/etc/consul.d/consul.hcl", "server = true"))
            .await
            .expect("copy");

        let command = &transport.commands()[0];
        assert!(command.privileged);
        assert!(!command.render(TransportKind::K8s).starts_with("sudo"));
        assert!(command.render(TransportKind::Ssh).starts_with("sudo -n sh -c"));
    }

    #[tokio::test]
    async fn test_write_service_unit_renders_descriptor() {
        let transport = RecordingTransport::new();
        let orchestrator = RemoteOrchestrator::new(&transport, CancellationToken::new());
        let unit = ServiceUnitDescriptor::new()
            .set("Unit", "Description", "vault")
            .set("Install", "WantedBy", "multi-user.target");

        orchestrator
            .write_service_unit(&unit, "/etc/systemd/system/vault.service", 0o644, None)
            .await
            .expect("write unit");

        assert_eq!(transport.copies()[0].1, unit.render().into_bytes());
        assert!(transport.scripts()[0].contains("'/etc/systemd/system/vault.service'"));
    }
}
