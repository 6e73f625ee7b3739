// ABOUTME: Bollard-based container runtime implementation.
// ABOUTME: Talks to Docker or Podman through the Docker-compatible API on a local socket.

use crate::runtime::traits::sealed::Sealed;
use crate::runtime::traits::{
    ContainerConfig, ContainerError, ContainerFilters, ContainerInfo, ContainerOps, ContainerState,
    ContainerSummary, ExecConfig, ExecError, ExecOps, ExecResult, ImageError, ImageOps,
    NetworkConfig, NetworkError, NetworkInfo, NetworkOps, RuntimeInfo, RuntimeInfoError,
    RuntimeMetadata, VolumeConfig, VolumeError, VolumeOps, VolumeSummary,
};
use crate::runtime::types::{DetectedRuntime, RuntimeType};
use crate::types::{ContainerId, ImageRef, NetworkId, VolumeId};
use async_trait::async_trait;
use bollard::Docker;
use bollard::errors::Error as BollardError;
use bollard::exec::{StartExecOptions, StartExecResults};
use bollard::models::{ContainerCreateBody, HostConfig, RestartPolicy, RestartPolicyNameEnum};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, ListContainersOptions,
    ListVolumesOptions, RemoveContainerOptions, RemoveVolumeOptions,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// Error Mapping Helpers
// =============================================================================

/// Status code and message of an API error response, if it is one.
fn server_error(e: &BollardError) -> Option<(u16, &str)> {
    match e {
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => Some((*status_code, message.as_str())),
        _ => None,
    }
}

fn map_container_create_error(e: BollardError) -> ContainerError {
    match server_error(&e) {
        Some((404, msg)) => ContainerError::ImageNotFound(msg.to_string()),
        Some((409, msg)) => ContainerError::AlreadyExists(msg.to_string()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_start_error(e: BollardError) -> ContainerError {
    match server_error(&e) {
        Some((404, msg)) => ContainerError::NotFound(msg.to_string()),
        Some((304, msg)) => ContainerError::AlreadyRunning(msg.to_string()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_not_found_error(e: BollardError) -> ContainerError {
    match server_error(&e) {
        Some((404, msg)) => ContainerError::NotFound(msg.to_string()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_network_create_error(e: BollardError) -> NetworkError {
    match server_error(&e) {
        Some((409, msg)) => NetworkError::AlreadyExists(msg.to_string()),
        _ => NetworkError::Runtime(e.to_string()),
    }
}

fn map_network_remove_error(e: BollardError) -> NetworkError {
    match server_error(&e) {
        Some((404, msg)) => NetworkError::NotFound(msg.to_string()),
        Some((403, msg)) | Some((409, msg)) => NetworkError::InUse(msg.to_string()),
        _ => NetworkError::Runtime(e.to_string()),
    }
}

fn map_network_connect_error(e: BollardError) -> NetworkError {
    match server_error(&e) {
        Some((404, msg)) => NetworkError::NotFound(msg.to_string()),
        Some((403, msg)) if msg.contains("already exists") => {
            NetworkError::AlreadyConnected(msg.to_string())
        }
        _ => NetworkError::Runtime(e.to_string()),
    }
}

fn map_network_disconnect_error(e: BollardError) -> NetworkError {
    match server_error(&e) {
        Some((404, msg)) => NetworkError::NotFound(msg.to_string()),
        Some((403, msg)) => NetworkError::NotConnected(msg.to_string()),
        _ => NetworkError::Runtime(e.to_string()),
    }
}

fn map_volume_error(e: BollardError) -> VolumeError {
    match server_error(&e) {
        Some((404, msg)) => VolumeError::NotFound(msg.to_string()),
        Some((409, msg)) => VolumeError::InUse(msg.to_string()),
        _ => VolumeError::Runtime(e.to_string()),
    }
}

fn map_exec_create_error(e: BollardError) -> ExecError {
    match server_error(&e) {
        Some((404, msg)) => ExecError::ContainerNotFound(msg.to_string()),
        Some((409, msg)) => ExecError::ContainerNotRunning(msg.to_string()),
        _ => ExecError::Runtime(e.to_string()),
    }
}

fn label_filters(labels: &HashMap<String, String>) -> HashMap<String, Vec<String>> {
    let mut filter_map: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in labels {
        filter_map
            .entry("label".to_string())
            .or_default()
            .push(format!("{}={}", key, value));
    }
    filter_map
}

fn volume_summary(volume: bollard::models::Volume) -> VolumeSummary {
    VolumeSummary {
        name: volume.name,
        mountpoint: PathBuf::from(volume.mountpoint),
        labels: volume.labels,
    }
}

// =============================================================================
// BollardRuntime
// =============================================================================

/// Container runtime backed by bollard.
pub struct BollardRuntime {
    client: Docker,
    runtime_type: RuntimeType,
}

impl BollardRuntime {
    pub fn new(client: Docker, runtime_type: RuntimeType) -> Self {
        Self {
            client,
            runtime_type,
        }
    }

    /// Connect to a detected runtime socket.
    ///
    /// `timeout` bounds every API request made through this client.
    pub fn connect(info: &DetectedRuntime, timeout: Duration) -> Result<Self, RuntimeInfoError> {
        let client = Docker::connect_with_unix(
            &info.socket_path,
            timeout.as_secs().max(1),
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(|e| RuntimeInfoError::ConnectionFailed(e.to_string()))?;
        Ok(Self::new(client, info.runtime_type))
    }

    pub fn runtime_type(&self) -> RuntimeType {
        self.runtime_type
    }
}

impl Sealed for BollardRuntime {}

#[async_trait]
impl RuntimeInfo for BollardRuntime {
    async fn info(&self) -> Result<RuntimeMetadata, RuntimeInfoError> {
        let info = self
            .client
            .info()
            .await
            .map_err(|e| RuntimeInfoError::ConnectionFailed(e.to_string()))?;

        let name = match self.runtime_type {
            RuntimeType::Docker => "Docker".to_string(),
            RuntimeType::Podman => "Podman".to_string(),
        };

        Ok(RuntimeMetadata {
            name,
            version: info.server_version.unwrap_or_default(),
            os: info.operating_system.unwrap_or_default(),
            arch: info.architecture.unwrap_or_default(),
        })
    }

    async fn ping(&self) -> Result<(), RuntimeInfoError> {
        self.client
            .ping()
            .await
            .map_err(|e| RuntimeInfoError::ConnectionFailed(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ImageOps for BollardRuntime {
    async fn pull_image(&self, reference: &ImageRef) -> Result<(), ImageError> {
        let image_name = reference.to_string();
        tracing::debug!("pulling image {}", image_name);

        let opts = CreateImageOptions {
            from_image: Some(image_name.clone()),
            ..Default::default()
        };

        // Progress updates arrive as a stream; drain it to surface errors.
        let mut stream = self.client.create_image(Some(opts), None, None);
        while let Some(result) = stream.next().await {
            result.map_err(|e| ImageError::PullFailed(format!("{}: {}", image_name, e)))?;
        }

        Ok(())
    }

    async fn image_exists(&self, reference: &ImageRef) -> Result<bool, ImageError> {
        let image_name = reference.to_string();

        match self.client.inspect_image(&image_name).await {
            Ok(_) => Ok(true),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(ImageError::Runtime(format!(
                "failed to inspect {}: {}",
                image_name, e
            ))),
        }
    }
}

#[async_trait]
impl ContainerOps for BollardRuntime {
    async fn create_container(
        &self,
        config: &ContainerConfig,
    ) -> Result<ContainerId, ContainerError> {
        let env: Vec<String> = config
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let host_config = HostConfig {
            restart_policy: Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::NO),
                maximum_retry_count: None,
            }),
            network_mode: config.network.clone(),
            ..Default::default()
        };

        let body = ContainerCreateBody {
            image: Some(config.image.to_string()),
            env: if env.is_empty() { None } else { Some(env) },
            labels: if config.labels.is_empty() {
                None
            } else {
                Some(config.labels.clone())
            },
            cmd: config.command.clone(),
            host_config: Some(host_config),
            ..Default::default()
        };

        let opts = CreateContainerOptions {
            name: Some(config.name.clone()),
            ..Default::default()
        };

        tracing::debug!("creating container {}", config.name);
        let response = self
            .client
            .create_container(Some(opts), body)
            .await
            .map_err(map_container_create_error)?;

        Ok(ContainerId::new(response.id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.client
            .start_container(
                id.as_str(),
                None::<bollard::query_parameters::StartContainerOptions>,
            )
            .await
            .map_err(map_container_start_error)
    }

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError> {
        let opts = RemoveContainerOptions {
            force,
            ..Default::default()
        };

        tracing::debug!("removing container {}", id);
        self.client
            .remove_container(id.as_str(), Some(opts))
            .await
            .map_err(map_container_not_found_error)
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError> {
        let details = self
            .client
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await
            .map_err(map_container_not_found_error)?;

        let state = details
            .state
            .as_ref()
            .and_then(|s| s.status)
            .map(|s| match s {
                bollard::models::ContainerStateStatusEnum::CREATED => ContainerState::Created,
                bollard::models::ContainerStateStatusEnum::RUNNING => ContainerState::Running,
                bollard::models::ContainerStateStatusEnum::PAUSED => ContainerState::Paused,
                bollard::models::ContainerStateStatusEnum::RESTARTING => ContainerState::Restarting,
                bollard::models::ContainerStateStatusEnum::REMOVING => ContainerState::Removing,
                bollard::models::ContainerStateStatusEnum::DEAD => ContainerState::Dead,
                _ => ContainerState::Exited,
            })
            .unwrap_or(ContainerState::Exited);

        let mut networks = HashMap::new();
        if let Some(ref network_settings) = details.network_settings
            && let Some(ref nets) = network_settings.networks
        {
            for (name, endpoint) in nets {
                networks.insert(
                    name.clone(),
                    NetworkInfo {
                        network_id: endpoint.network_id.clone().unwrap_or_default(),
                        ip_address: endpoint.ip_address.clone().unwrap_or_default(),
                        gateway: endpoint.gateway.clone().unwrap_or_default(),
                    },
                );
            }
        }

        Ok(ContainerInfo {
            id: id.clone(),
            name: details
                .name
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            image: details
                .config
                .as_ref()
                .and_then(|c| c.image.clone())
                .unwrap_or_default(),
            state,
            labels: details.config.and_then(|c| c.labels).unwrap_or_default(),
            networks,
        })
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        let opts = ListContainersOptions {
            all: filters.all,
            filters: Some(label_filters(&filters.labels)),
            ..Default::default()
        };

        let containers = self
            .client
            .list_containers(Some(opts))
            .await
            .map_err(|e| ContainerError::Runtime(e.to_string()))?;

        Ok(containers
            .into_iter()
            .map(|c| {
                let name = c
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default();

                ContainerSummary {
                    id: ContainerId::new(c.id.unwrap_or_default()),
                    name,
                    image: c.image.unwrap_or_default(),
                    state: c
                        .state
                        .map(|s| format!("{:?}", s).to_lowercase())
                        .unwrap_or_default(),
                    labels: c.labels.unwrap_or_default(),
                }
            })
            .collect())
    }
}

#[async_trait]
impl NetworkOps for BollardRuntime {
    async fn create_network(&self, config: &NetworkConfig) -> Result<NetworkId, NetworkError> {
        let opts = bollard::models::NetworkCreateRequest {
            name: config.name.clone(),
            driver: config.driver.clone(),
            labels: if config.labels.is_empty() {
                None
            } else {
                Some(config.labels.clone())
            },
            ..Default::default()
        };

        tracing::debug!("creating network {}", config.name);
        let response = self
            .client
            .create_network(opts)
            .await
            .map_err(map_network_create_error)?;

        Ok(NetworkId::new(response.id))
    }

    async fn remove_network(&self, id: &NetworkId) -> Result<(), NetworkError> {
        tracing::debug!("removing network {}", id);
        self.client
            .remove_network(id.as_str())
            .await
            .map_err(map_network_remove_error)
    }

    async fn connect_to_network(
        &self,
        container: &ContainerId,
        network: &NetworkId,
    ) -> Result<(), NetworkError> {
        let config = bollard::models::NetworkConnectRequest {
            container: container.to_string(),
            endpoint_config: None,
        };

        self.client
            .connect_network(network.as_str(), config)
            .await
            .map_err(map_network_connect_error)
    }

    async fn disconnect_from_network(
        &self,
        container: &ContainerId,
        network: &NetworkId,
    ) -> Result<(), NetworkError> {
        let config = bollard::models::NetworkDisconnectRequest {
            container: container.to_string(),
            force: Some(true),
        };

        self.client
            .disconnect_network(network.as_str(), config)
            .await
            .map_err(map_network_disconnect_error)
    }

    async fn network_exists(&self, name: &str) -> Result<bool, NetworkError> {
        match self
            .client
            .inspect_network(
                name,
                None::<bollard::query_parameters::InspectNetworkOptions>,
            )
            .await
        {
            Ok(_) => Ok(true),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(NetworkError::Runtime(e.to_string())),
        }
    }
}

#[async_trait]
impl VolumeOps for BollardRuntime {
    async fn volume_exists(&self, name: &str) -> Result<bool, VolumeError> {
        match self.client.inspect_volume(name).await {
            Ok(_) => Ok(true),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(VolumeError::Runtime(e.to_string())),
        }
    }

    async fn create_volume(&self, config: &VolumeConfig) -> Result<VolumeId, VolumeError> {
        let opts = bollard::models::VolumeCreateRequest {
            name: Some(config.name.clone()),
            labels: Some(config.labels.clone()),
            ..Default::default()
        };

        tracing::debug!("creating volume {}", config.name);
        let volume = self
            .client
            .create_volume(opts)
            .await
            .map_err(map_volume_error)?;

        Ok(VolumeId::new(volume.name))
    }

    async fn inspect_volume(&self, name: &str) -> Result<VolumeSummary, VolumeError> {
        self.client
            .inspect_volume(name)
            .await
            .map(volume_summary)
            .map_err(map_volume_error)
    }

    async fn list_volumes(
        &self,
        labels: &HashMap<String, String>,
    ) -> Result<Vec<VolumeSummary>, VolumeError> {
        let opts = ListVolumesOptions {
            filters: Some(label_filters(labels)),
        };

        let response = self
            .client
            .list_volumes(Some(opts))
            .await
            .map_err(map_volume_error)?;

        Ok(response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(volume_summary)
            .collect())
    }

    async fn remove_volume(&self, name: &str, force: bool) -> Result<(), VolumeError> {
        tracing::debug!("removing volume {}", name);
        self.client
            .remove_volume(name, Some(RemoveVolumeOptions { force }))
            .await
            .map_err(map_volume_error)
    }
}

#[async_trait]
impl ExecOps for BollardRuntime {
    async fn exec(
        &self,
        container: &ContainerId,
        config: &ExecConfig,
    ) -> Result<ExecResult, ExecError> {
        let opts = bollard::models::ExecConfig {
            cmd: Some(config.cmd.clone()),
            env: if config.env.is_empty() {
                None
            } else {
                Some(config.env.clone())
            },
            working_dir: config.working_dir.clone(),
            user: config.user.clone(),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        tracing::debug!("exec in {}: {}", container, config.cmd.join(" "));
        let exec_id = self
            .client
            .create_exec(container.as_str(), opts)
            .await
            .map_err(map_exec_create_error)?
            .id;

        let started = self
            .client
            .start_exec(
                &exec_id,
                Some(StartExecOptions {
                    detach: false,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| ExecError::Runtime(e.to_string()))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        if let StartExecResults::Attached { mut output, .. } = started {
            while let Some(item) = output.next().await {
                match item {
                    Ok(bollard::container::LogOutput::StdOut { message }) => {
                        stdout.extend(message);
                    }
                    Ok(bollard::container::LogOutput::StdErr { message }) => {
                        stderr.extend(message);
                    }
                    Ok(_) => {}
                    Err(e) => return Err(ExecError::Failed(e.to_string())),
                }
            }
        }

        let details = self
            .client
            .inspect_exec(&exec_id)
            .await
            .map_err(|e| ExecError::Runtime(e.to_string()))?;

        Ok(ExecResult {
            exit_code: details.exit_code.unwrap_or(0),
            stdout,
            stderr,
        })
    }
}
