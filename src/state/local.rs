//! Local file-based state storage backend.
//!
//! State is a single pretty-printed JSON file, replaced atomically on save.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{OutpostError, Result, StateError};

use super::store::StateStore;
use super::types::{DeploymentState, STATE_VERSION};

/// Default state directory name.
pub const STATE_DIR: &str = ".outpost";

/// State file name.
const STATE_FILE: &str = "state.json";

/// Owner-only permissions for the state file.
#[cfg(unix)]
const STATE_FILE_MODE: u32 = 0o600;

/// Local file-based state store.
#[derive(Debug)]
pub struct LocalStateStore {
    /// Directory holding the state file.
    base_dir: PathBuf,
    /// Path to the state file.
    state_path: PathBuf,
}

impl LocalStateStore {
    /// Creates a store under `.outpost/` in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn new() -> Result<Self> {
        let base_dir = std::env::current_dir()
            .map_err(|e| OutpostError::internal(format!("Cannot determine current directory: {e}")))?
            .join(STATE_DIR);

        Ok(Self::with_base_dir(base_dir))
    }

    /// Creates a store in a custom directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let state_path = base_dir.join(STATE_FILE);
        Self {
            base_dir,
            state_path,
        }
    }

    /// Creates a store backed by a specific file.
    #[must_use]
    pub fn with_state_path(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let base_dir = state_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self {
            base_dir,
            state_path,
        }
    }

    /// Path of the state file.
    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    async fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating state directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir)
                .await
                .map_err(|e| StateError::write(format!("Failed to create state directory: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn load(&self) -> Result<Option<DeploymentState>> {
        if !self.state_path.exists() {
            debug!("State file does not exist: {}", self.state_path.display());
            return Ok(None);
        }

        debug!("Loading state from: {}", self.state_path.display());

        let content = fs::read_to_string(&self.state_path).await.map_err(|e| StateError::Corrupted {
            message: format!("Failed to read state file: {e}"),
        })?;

        let state: DeploymentState = serde_json::from_str(&content).map_err(|e| StateError::Corrupted {
            message: format!("Failed to parse state file: {e}"),
        })?;

        if state.version != STATE_VERSION {
            return Err(StateError::VersionMismatch {
                expected: STATE_VERSION.to_string(),
                found: state.version,
            }
            .into());
        }

        Ok(Some(state))
    }

    async fn save(&self, state: &DeploymentState) -> Result<()> {
        self.ensure_dir().await?;

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| StateError::serialization(format!("Failed to serialize state: {e}")))?;

        let temp_path = self.state_path.with_extension("tmp");

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(STATE_FILE_MODE);
        let mut file = options
            .open(&temp_path)
            .await
            .map_err(|e| StateError::write(format!("Failed to create temp state file: {e}")))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| StateError::write(format!("Failed to write state file: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| StateError::write(format!("Failed to sync state file: {e}")))?;

        fs::rename(&temp_path, &self.state_path)
            .await
            .map_err(|e| StateError::write(format!("Failed to rename state file: {e}")))?;

        info!("State saved to {}", self.state_path.display());
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        if self.state_path.exists() {
            info!("Deleting state file: {}", self.state_path.display());
            fs::remove_file(&self.state_path)
                .await
                .map_err(|e| StateError::write(format!("Failed to delete state file: {e}")))?;
        }
        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.state_path.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ActionKind, ActionState};
    use tempfile::TempDir;

    fn create_test_store() -> (LocalStateStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalStateStore::with_base_dir(temp_dir.path().join("nested"));
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _temp) = create_test_store();

        let mut state = DeploymentState::new();
        state.set_action(ActionState::new("bootstrap", ActionKind::Exec, "f1").with_output("hi\n", ""));
        store.save(&state).await.expect("Failed to save state");

        let loaded = store
            .load()
            .await
            .expect("Failed to load state")
            .expect("State should exist");

        assert_eq!(loaded.fingerprint_of("bootstrap"), Some("f1"));
        assert_eq!(loaded.get_action("bootstrap").map(|a| a.stdout.as_str()), Some("hi\n"));
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _temp) = create_test_store();

        assert!(store.load().await.expect("Load should not fail").is_none());
        assert!(store.load_or_default().await.expect("default").actions.is_empty());
    }

    #[tokio::test]
    async fn test_exists_and_delete() {
        let (store, _temp) = create_test_store();
        assert!(!store.exists().await.expect("exists check failed"));

        store.save(&DeploymentState::new()).await.expect("Failed to save state");
        assert!(store.exists().await.expect("exists check failed"));
        assert!(!store.state_path().with_extension("tmp").exists());

        store.delete().await.expect("delete");
        assert!(!store.exists().await.expect("exists check failed"));
    }

    #[tokio::test]
    async fn test_corrupted_state() {
        let (store, _temp) = create_test_store();
        store.save(&DeploymentState::new()).await.expect("save");
        std::fs::write(store.state_path(), "{not json").expect("write");

        let err = store.load().await.expect_err("corrupted");
        assert!(matches!(err, OutpostError::State(StateError::Corrupted { .. })));
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let (store, _temp) = create_test_store();
        let mut state = DeploymentState::new();
        state.version = String::from("0.1");
        store.save(&state).await.expect("save");

        let err = store.load().await.expect_err("old version");
        assert!(matches!(err, OutpostError::State(StateError::VersionMismatch { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_state_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let (store, _temp) = create_test_store();
        store.save(&DeploymentState::new()).await.expect("save");

        let mode = std::fs::metadata(store.state_path()).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_with_state_path_bare_file() {
        let store = LocalStateStore::with_state_path("state.json");
        assert_eq!(store.base_dir, PathBuf::from("."));
    }
}
