// ABOUTME: Disposable containers that carry a mysql client to a remote server.
// ABOUTME: A probe is launched for one check and force-removed afterwards.

use super::DbError;
use super::client::{DatabaseClient, MysqlExecClient};
use crate::runtime::{ContainerConfig, ContainerOps, ExecOps, ImageOps, PROBE_LABEL};
use crate::site::{DbCredentials, random_secret};
use crate::types::{ContainerId, ImageRef};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// A running probe and a client that talks through it.
pub struct Probe {
    pub container: ContainerId,
    pub client: Box<dyn DatabaseClient>,
}

#[async_trait]
pub trait ProbeLauncher: Send + Sync {
    async fn launch(&self, credentials: &DbCredentials) -> Result<Probe, DbError>;

    async fn release(&self, probe: Probe) -> Result<(), DbError>;
}

/// Launches probes from the mariadb image on the local runtime.
pub struct ContainerProbeLauncher<R: ?Sized> {
    runtime: Arc<R>,
    image: ImageRef,
}

impl<R> ContainerProbeLauncher<R>
where
    R: ContainerOps + ExecOps + ImageOps + ?Sized + 'static,
{
    pub fn new(runtime: Arc<R>, image: ImageRef) -> Self {
        Self { runtime, image }
    }

    async fn ensure_image(&self) -> Result<(), DbError> {
        let present = self
            .runtime
            .image_exists(&self.image)
            .await
            .map_err(|e| DbError::Probe(e.to_string()))?;
        if !present {
            tracing::debug!("pulling probe image {}", self.image);
            self.runtime
                .pull_image(&self.image)
                .await
                .map_err(|e| DbError::Probe(e.to_string()))?;
        }
        Ok(())
    }

    /// Host as seen from inside the probe. Loopback names point at the probe
    /// itself, so they are swapped for its default gateway.
    async fn resolve_host(&self, id: &ContainerId, host: &str) -> Result<String, DbError> {
        if host != "localhost" && host != "127.0.0.1" {
            return Ok(host.to_string());
        }
        let info = self
            .runtime
            .inspect_container(id)
            .await
            .map_err(|e| DbError::Probe(e.to_string()))?;
        info.gateway()
            .map(str::to_string)
            .ok_or_else(|| DbError::Probe(format!("probe {id} has no default gateway")))
    }

    async fn start(&self, id: &ContainerId, credentials: &DbCredentials) -> Result<Probe, DbError> {
        self.runtime
            .start_container(id)
            .await
            .map_err(|e| DbError::Probe(e.to_string()))?;
        let host = self.resolve_host(id, &credentials.host).await?;
        let client = MysqlExecClient::remote(
            self.runtime.clone(),
            id.clone(),
            &host,
            credentials.port,
            &credentials.user,
            &credentials.password,
        );
        Ok(Probe {
            container: id.clone(),
            client: Box::new(client),
        })
    }
}

#[async_trait]
impl<R> ProbeLauncher for ContainerProbeLauncher<R>
where
    R: ContainerOps + ExecOps + ImageOps + ?Sized + 'static,
{
    async fn launch(&self, credentials: &DbCredentials) -> Result<Probe, DbError> {
        self.ensure_image().await?;

        let name = format!("sitewright-dbprobe-{}", random_secret(10).to_ascii_lowercase());
        let config = ContainerConfig {
            name: name.clone(),
            image: self.image.clone(),
            env: HashMap::new(),
            labels: HashMap::from([(PROBE_LABEL.to_string(), "true".to_string())]),
            command: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            network: None,
        };
        let id = self
            .runtime
            .create_container(&config)
            .await
            .map_err(|e| DbError::Probe(e.to_string()))?;
        tracing::debug!("launched database probe {}", name);

        match self.start(&id, credentials).await {
            Ok(probe) => Ok(probe),
            Err(e) => {
                if let Err(remove) = self.runtime.remove_container(&id, true).await {
                    tracing::warn!("failed to remove probe {}: {}", id, remove);
                }
                Err(e)
            }
        }
    }

    async fn release(&self, probe: Probe) -> Result<(), DbError> {
        self.runtime
            .remove_container(&probe.container, true)
            .await
            .map_err(|e| DbError::Probe(e.to_string()))
    }
}
