// ABOUTME: Image operations trait for container runtimes.
// ABOUTME: Check for and pull images needed by helper containers.

use super::sealed::Sealed;
use crate::types::ImageRef;
use async_trait::async_trait;

#[async_trait]
pub trait ImageOps: Sealed + Send + Sync {
    async fn pull_image(&self, reference: &ImageRef) -> Result<(), ImageError>;

    async fn image_exists(&self, reference: &ImageRef) -> Result<bool, ImageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("pull failed: {0}")]
    PullFailed(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
