// ABOUTME: Level-driven compensation for a failed provisioning run.
// ABOUTME: Steps are independent and tolerate absent resources; failures are reported, not raised.

use super::Collaborators;
use super::progress::ProgressLevel;
use crate::database::{DatabaseClient, MysqlExecClient};
use crate::io::remove_tree;
use crate::runtime::{
    ContainerError, ContainerFilters, NetworkError, SITE_LABEL, SiteRuntime, VolumeError,
};
use crate::site::DbCredentials;
use crate::types::{ContainerId, NetworkId, SiteUrl};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Database artifacts created by this run, to drop on rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbCleanup {
    /// Created inside the shared database server.
    Shared {
        database: Option<String>,
        user: Option<String>,
    },
    /// A database created on a remote server.
    Remote { credentials: DbCredentials },
}

/// What a rollback operates on.
#[derive(Debug, Clone)]
pub struct RollbackTarget {
    pub url: SiteUrl,
    pub root: PathBuf,
    pub db_cleanup: Option<DbCleanup>,
    /// Also delete the site record (the record write itself failed).
    pub remove_record: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackFailure {
    pub step: &'static str,
    pub error: String,
}

/// Outcome of every rollback step that ran.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RollbackReport {
    pub completed: Vec<&'static str>,
    pub failed: Vec<RollbackFailure>,
}

impl RollbackReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, step: &'static str, result: Result<(), String>) {
        match result {
            Ok(()) => {
                tracing::debug!("rollback: {} done", step);
                self.completed.push(step);
            }
            Err(error) => {
                tracing::warn!("rollback: {} failed: {}", step, error);
                self.failed.push(RollbackFailure { step, error });
            }
        }
    }
}

pub const STEP_CONTAINERS: &str = "remove containers";
pub const STEP_VOLUMES: &str = "remove volumes";
pub const STEP_HOSTS: &str = "remove hosts entry";
pub const STEP_DISCONNECT_PROXY: &str = "disconnect proxy";
pub const STEP_NETWORK: &str = "remove network";
pub const STEP_DATABASE: &str = "drop database";
pub const STEP_ROOT: &str = "remove site root";
pub const STEP_RECORD: &str = "remove site record";

/// Undo everything a run at `level` may have done.
pub async fn rollback<R>(
    level: ProgressLevel,
    target: &RollbackTarget,
    collab: &Collaborators<R>,
) -> RollbackReport
where
    R: SiteRuntime + 'static,
{
    tracing::info!("rolling back {} from level {}", target.url, level);
    let mut report = RollbackReport::default();

    if level >= ProgressLevel::STARTED {
        report.record(STEP_CONTAINERS, remove_containers(collab, &target.url).await);
        report.record(STEP_VOLUMES, remove_volumes(collab, &target.url).await);
        report.record(
            STEP_HOSTS,
            collab.hosts.remove(&target.url).map_err(|e| e.to_string()),
        );
    }

    if level >= ProgressLevel::NETWORK_JOINED {
        report.record(STEP_DISCONNECT_PROXY, disconnect_proxy(collab, &target.url).await);
        report.record(STEP_NETWORK, remove_network(collab, &target.url).await);
        if let Some(cleanup) = &target.db_cleanup {
            report.record(STEP_DATABASE, drop_database(collab, cleanup).await);
        }
    }

    if level >= ProgressLevel::ROOT_CREATED {
        report.record(
            STEP_ROOT,
            remove_tree(&target.root).await.map_err(|e| e.to_string()),
        );
    }

    if target.remove_record {
        report.record(
            STEP_RECORD,
            collab.records.remove(&target.url).map_err(|e| e.to_string()),
        );
    }

    report
}

async fn remove_containers<R: SiteRuntime>(
    collab: &Collaborators<R>,
    url: &SiteUrl,
) -> Result<(), String> {
    let containers = collab
        .runtime
        .list_containers(&ContainerFilters::for_project(&url.prefix()))
        .await
        .map_err(|e| e.to_string())?;

    let mut errors = Vec::new();
    for container in containers {
        match collab.runtime.remove_container(&container.id, true).await {
            Ok(()) | Err(ContainerError::NotFound(_)) => {}
            Err(e) => errors.push(format!("{}: {}", container.name, e)),
        }
    }
    joined(errors)
}

async fn remove_volumes<R: SiteRuntime>(
    collab: &Collaborators<R>,
    url: &SiteUrl,
) -> Result<(), String> {
    let labels = HashMap::from([(SITE_LABEL.to_string(), url.to_string())]);
    let volumes = collab
        .runtime
        .list_volumes(&labels)
        .await
        .map_err(|e| e.to_string())?;

    let mut errors = Vec::new();
    for volume in volumes {
        match collab.runtime.remove_volume(&volume.name, true).await {
            Ok(()) | Err(VolumeError::NotFound(_)) => {}
            Err(e) => errors.push(format!("{}: {}", volume.name, e)),
        }
    }
    joined(errors)
}

async fn disconnect_proxy<R: SiteRuntime>(
    collab: &Collaborators<R>,
    url: &SiteUrl,
) -> Result<(), String> {
    let proxy = ContainerId::new(collab.settings.proxy.container.as_str());
    match collab
        .runtime
        .disconnect_from_network(&proxy, &NetworkId::new(url.as_str()))
        .await
    {
        Ok(()) | Err(NetworkError::NotFound(_)) | Err(NetworkError::NotConnected(_)) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

async fn remove_network<R: SiteRuntime>(
    collab: &Collaborators<R>,
    url: &SiteUrl,
) -> Result<(), String> {
    match collab
        .runtime
        .remove_network(&NetworkId::new(url.as_str()))
        .await
    {
        Ok(()) | Err(NetworkError::NotFound(_)) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

async fn drop_database<R>(collab: &Collaborators<R>, cleanup: &DbCleanup) -> Result<(), String>
where
    R: SiteRuntime + 'static,
{
    match cleanup {
        DbCleanup::Shared { database, user } => {
            let client = MysqlExecClient::local_root(
                collab.runtime.clone(),
                ContainerId::new(collab.settings.shared.db_container.as_str()),
            );
            let mut errors = Vec::new();
            if let Some(database) = database
                && let Err(e) = client.drop_database(database).await
            {
                errors.push(format!("database {database}: {e}"));
            }
            if let Some(user) = user
                && let Err(e) = client.drop_user(user).await
            {
                errors.push(format!("user {user}: {e}"));
            }
            joined(errors)
        }
        DbCleanup::Remote { credentials } => {
            let probe = collab
                .probes
                .launch(credentials)
                .await
                .map_err(|e| e.to_string())?;
            let result = probe
                .client
                .drop_database(&credentials.name)
                .await
                .map_err(|e| e.to_string());
            if let Err(e) = collab.probes.release(probe).await {
                tracing::warn!("failed to remove database probe: {}", e);
            }
            result
        }
    }
}

fn joined(errors: Vec<String>) -> Result<(), String> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}
