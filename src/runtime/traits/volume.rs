// ABOUTME: Volume operations trait for container runtimes.
// ABOUTME: Query, create, locate and remove named volumes.

use super::sealed::Sealed;
use super::shared_types::{VolumeConfig, VolumeSummary};
use crate::types::VolumeId;
use async_trait::async_trait;
use std::collections::HashMap;

#[async_trait]
pub trait VolumeOps: Sealed + Send + Sync {
    async fn volume_exists(&self, name: &str) -> Result<bool, VolumeError>;

    async fn create_volume(&self, config: &VolumeConfig) -> Result<VolumeId, VolumeError>;

    /// Look up a volume, including its host mountpoint.
    async fn inspect_volume(&self, name: &str) -> Result<VolumeSummary, VolumeError>;

    /// Volumes carrying every given label.
    async fn list_volumes(
        &self,
        labels: &HashMap<String, String>,
    ) -> Result<Vec<VolumeSummary>, VolumeError>;

    async fn remove_volume(&self, name: &str, force: bool) -> Result<(), VolumeError>;
}

#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    #[error("volume not found: {0}")]
    NotFound(String),

    #[error("volume in use, cannot remove: {0}")]
    InUse(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
