// ABOUTME: Container runtime access: detection, bollard client, capability traits, compose.
// ABOUTME: Label constants shared by everything that creates or finds site resources.

mod bollard;
mod compose;
mod detection;
mod error;
mod traits;
mod types;

pub use self::bollard::BollardRuntime;
pub use compose::{ComposeCli, ComposeError, ComposeOps, ComposeProject};
pub use detection::{DetectionError, detect_local, detect_runtime};
pub use error::{RuntimeError, RuntimeErrorKind};
pub use traits::{
    ContainerConfig, ContainerError, ContainerFilters, ContainerInfo, ContainerOps, ContainerState,
    ContainerSummary, ExecConfig, ExecError, ExecOps, ExecResult, ImageError, ImageOps,
    NetworkConfig, NetworkError, NetworkInfo, NetworkOps, RuntimeInfo, RuntimeInfoError, RuntimeMetadata,
    SiteRuntime, VolumeConfig, VolumeError, VolumeOps, VolumeSummary,
};
pub(crate) use traits::sealed;
pub use types::{DetectedRuntime, RuntimeConfig, RuntimeType};

use std::time::Duration;

/// Label compose puts on every container of a project.
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";

/// Label carrying the owning site URL on networks, volumes and containers.
pub const SITE_LABEL: &str = "io.sitewright.site";

/// Label marking disposable database probe containers.
pub const PROBE_LABEL: &str = "io.sitewright.probe";

/// Detect the local runtime and verify it answers.
pub async fn connect(
    config: &RuntimeConfig,
    timeout: Duration,
) -> Result<BollardRuntime, RuntimeError> {
    let detected = detect_runtime(config)?;
    tracing::debug!(
        "using {} at {}",
        detected.runtime_type,
        detected.socket_path
    );
    let runtime = BollardRuntime::connect(&detected, timeout)?;
    runtime.ping().await?;
    Ok(runtime)
}
