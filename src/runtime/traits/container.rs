// ABOUTME: Container operations trait for container runtimes.
// ABOUTME: Create, start, remove, inspect and list containers.

use super::sealed::Sealed;
use super::shared_types::{ContainerConfig, ContainerInfo};
use crate::types::ContainerId;
use async_trait::async_trait;
use std::collections::HashMap;

/// Container lifecycle operations.
#[async_trait]
pub trait ContainerOps: Sealed + Send + Sync {
    /// Create a container from the given configuration.
    async fn create_container(
        &self,
        config: &ContainerConfig,
    ) -> Result<ContainerId, ContainerError>;

    /// Start a created container.
    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError>;

    /// Remove a container.
    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError>;

    /// Get detailed information about a container.
    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError>;

    /// List containers matching the given filters.
    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError>;
}

/// Filters for listing containers.
#[derive(Debug, Clone, Default)]
pub struct ContainerFilters {
    /// Filter by label (key=value).
    pub labels: HashMap<String, String>,
    /// Include stopped containers.
    pub all: bool,
}

impl ContainerFilters {
    /// Every container, running or not, of one compose project.
    pub fn for_project(project: &str) -> Self {
        let mut labels = HashMap::new();
        labels.insert(
            crate::runtime::COMPOSE_PROJECT_LABEL.to_string(),
            project.to_string(),
        );
        Self { labels, all: true }
    }
}

#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub state: String,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("container not found: {0}")]
    NotFound(String),

    #[error("container already exists: {0}")]
    AlreadyExists(String),

    #[error("container already running: {0}")]
    AlreadyRunning(String),

    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
