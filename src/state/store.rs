//! Storage interface for recorded action state.

use async_trait::async_trait;

use super::types::DeploymentState;
use crate::error::Result;

/// Persists the fingerprints and outputs of applied actions.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the recorded state, or `None` before the first save.
    async fn load(&self) -> Result<Option<DeploymentState>>;

    /// Replaces the recorded state.
    async fn save(&self, state: &DeploymentState) -> Result<()>;

    /// Removes the recorded state entirely.
    async fn delete(&self) -> Result<()>;

    /// True once state has been saved.
    async fn exists(&self) -> Result<bool>;

    /// Loads the state, starting empty when none has been saved.
    async fn load_or_default(&self) -> Result<DeploymentState> {
        Ok(self.load().await?.unwrap_or_default())
    }
}
