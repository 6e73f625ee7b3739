// ABOUTME: Shared types used across runtime trait definitions.
// ABOUTME: ContainerConfig, ContainerInfo, NetworkConfig, VolumeConfig, ExecConfig, etc.

use crate::types::{ContainerId, ImageRef};
use std::collections::HashMap;
use std::path::PathBuf;

/// Configuration for creating a standalone container.
///
/// Site services are created by compose; this is only used for short-lived
/// helper containers such as the database probe.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    pub name: String,
    pub image: ImageRef,
    pub env: HashMap<String, String>,
    pub labels: HashMap<String, String>,
    /// Command to run (overrides image CMD).
    pub command: Option<Vec<String>>,
    /// Network to attach to instead of the default bridge.
    pub network: Option<String>,
}

/// Information about a container.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    pub labels: HashMap<String, String>,
    /// Endpoint settings keyed by network name.
    pub networks: HashMap<String, NetworkInfo>,
}

impl ContainerInfo {
    /// First non-empty gateway across the container's networks.
    pub fn gateway(&self) -> Option<&str> {
        let mut names: Vec<&String> = self.networks.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|name| self.networks.get(name))
            .map(|net| net.gateway.as_str())
            .find(|gw| !gw.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
}

#[derive(Debug, Clone, Default)]
pub struct NetworkInfo {
    pub network_id: String,
    pub ip_address: String,
    pub gateway: String,
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub name: String,
    /// Network driver (bridge when unset).
    pub driver: Option<String>,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct VolumeConfig {
    pub name: String,
    pub labels: HashMap<String, String>,
}

/// A named volume as reported by the runtime.
#[derive(Debug, Clone)]
pub struct VolumeSummary {
    pub name: String,
    /// Host directory backing the volume.
    pub mountpoint: PathBuf,
    pub labels: HashMap<String, String>,
}

/// Runtime metadata.
#[derive(Debug, Clone)]
pub struct RuntimeMetadata {
    /// Runtime name (e.g., "Docker", "Podman").
    pub name: String,
    pub version: String,
    pub os: String,
    pub arch: String,
}

/// A command to run inside a running container.
#[derive(Debug, Clone, Default)]
pub struct ExecConfig {
    pub cmd: Vec<String>,
    /// `KEY=value` pairs.
    pub env: Vec<String>,
    pub user: Option<String>,
    pub working_dir: Option<String>,
}

impl ExecConfig {
    pub fn new<I, S>(cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cmd: cmd.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push(format!("{key}={value}"));
        self
    }

    pub fn user(mut self, user: &str) -> Self {
        self.user = Some(user.to_string());
        self
    }
}

/// Captured output of an exec.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub exit_code: i64,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}
