// ABOUTME: Composable capability traits for container runtimes.
// ABOUTME: ContainerOps, NetworkOps, VolumeOps, ExecOps, ImageOps, RuntimeInfo.

mod container;
mod exec;
mod image;
mod network;
mod runtime_info;
pub(crate) mod sealed;
mod shared_types;
mod volume;

pub use container::{ContainerError, ContainerFilters, ContainerOps, ContainerSummary};
pub use exec::{ExecError, ExecOps};
pub use image::{ImageError, ImageOps};
pub use network::{NetworkError, NetworkOps};
pub use runtime_info::{RuntimeInfo, RuntimeInfoError};
pub use shared_types::*;
pub use volume::{VolumeError, VolumeOps};

/// Everything the provisioning workflow needs from a runtime.
pub trait SiteRuntime:
    ContainerOps + NetworkOps + VolumeOps + ExecOps + ImageOps + RuntimeInfo
{
}

impl<T> SiteRuntime for T where
    T: ContainerOps + NetworkOps + VolumeOps + ExecOps + ImageOps + RuntimeInfo
{
}
