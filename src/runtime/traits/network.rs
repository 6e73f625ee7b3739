// ABOUTME: Network operations trait for container runtimes.
// ABOUTME: Create and remove site networks, attach the proxy to them.

use super::sealed::Sealed;
use super::shared_types::NetworkConfig;
use crate::types::{ContainerId, NetworkId};
use async_trait::async_trait;

/// Network operations: create, connect, disconnect.
#[async_trait]
pub trait NetworkOps: Sealed + Send + Sync {
    async fn create_network(&self, config: &NetworkConfig) -> Result<NetworkId, NetworkError>;

    async fn remove_network(&self, id: &NetworkId) -> Result<(), NetworkError>;

    async fn connect_to_network(
        &self,
        container: &ContainerId,
        network: &NetworkId,
    ) -> Result<(), NetworkError>;

    async fn disconnect_from_network(
        &self,
        container: &ContainerId,
        network: &NetworkId,
    ) -> Result<(), NetworkError>;

    async fn network_exists(&self, name: &str) -> Result<bool, NetworkError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("network not found: {0}")]
    NotFound(String),

    #[error("network already exists: {0}")]
    AlreadyExists(String),

    #[error("container already connected to network: {0}")]
    AlreadyConnected(String),

    #[error("container not connected to network: {0}")]
    NotConnected(String),

    #[error("network in use, cannot remove: {0}")]
    InUse(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
