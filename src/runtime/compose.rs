// ABOUTME: Compose invocation for bringing a site's services up and restarting them.
// ABOUTME: ComposeCli shells out to the configured compose program with a timeout.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// A compose project on disk: `-p <name> -f <file>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeProject {
    pub name: String,
    pub file: PathBuf,
}

impl ComposeProject {
    pub fn new(name: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
        }
    }

    fn dir(&self) -> &Path {
        self.file.parent().unwrap_or(Path::new("."))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("compose {action} timed out after {timeout:?}")]
    Timeout { action: String, timeout: Duration },

    #[error("compose {action} exited with {code:?}: {stderr}")]
    Failed {
        action: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Compose operations used by the workflow and lifecycle commands.
#[async_trait]
pub trait ComposeOps: Send + Sync {
    /// `up -d` for the given services, or every service when empty.
    async fn up(&self, project: &ComposeProject, services: &[&str]) -> Result<(), ComposeError>;

    /// Restart the given services, or every service when empty.
    async fn restart(
        &self,
        project: &ComposeProject,
        services: &[&str],
    ) -> Result<(), ComposeError>;
}

/// Runs compose as a child process.
pub struct ComposeCli {
    command: Vec<String>,
    timeout: Duration,
}

impl ComposeCli {
    /// `command` is the program followed by any leading arguments, e.g.
    /// `["docker", "compose"]`. It must not be empty.
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    fn build_args(project: &ComposeProject, action: &[&str], services: &[&str]) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            project.name.clone(),
            "-f".to_string(),
            project.file.display().to_string(),
        ];
        args.extend(action.iter().map(|s| s.to_string()));
        args.extend(services.iter().map(|s| s.to_string()));
        args
    }

    async fn run(
        &self,
        project: &ComposeProject,
        action: &[&str],
        services: &[&str],
    ) -> Result<(), ComposeError> {
        let (program, leading) = self.command.split_first().ok_or_else(|| ComposeError::Spawn {
            program: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty compose command"),
        })?;
        let args = Self::build_args(project, action, services);
        let action_name = action.join(" ");

        tracing::debug!("{} {} {}", program, leading.join(" "), args.join(" "));

        let child = Command::new(program)
            .args(leading)
            .args(&args)
            .current_dir(project.dir())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| ComposeError::Timeout {
                action: action_name.clone(),
                timeout: self.timeout,
            })?
            .map_err(|source| ComposeError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ComposeError::Failed {
                action: action_name,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl ComposeOps for ComposeCli {
    async fn up(&self, project: &ComposeProject, services: &[&str]) -> Result<(), ComposeError> {
        self.run(project, &["up", "-d"], services).await
    }

    async fn restart(
        &self,
        project: &ComposeProject,
        services: &[&str],
    ) -> Result<(), ComposeError> {
        self.run(project, &["restart"], services).await
    }
}
