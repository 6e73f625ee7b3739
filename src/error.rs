// ABOUTME: Application-wide error type for sitewright.
// ABOUTME: Aggregates module errors so main can report them and exit 1.

use crate::manifest::RenderError;
use crate::record::RecordError;
use crate::runtime::{ComposeError, ExecError, RuntimeError};
use crate::site::ValidationError;
use crate::workflow::ProvisionFailure;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Provision(#[from] Box<ProvisionFailure>),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error("exec failed: {0}")]
    Exec(#[from] ExecError),

    #[error("site {0} does not exist")]
    SiteNotFound(String),

    #[error("{service}: {message}")]
    ServiceCommand { service: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
