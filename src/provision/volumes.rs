// ABOUTME: Idempotent creation of a site's named volumes.
// ABOUTME: Each volume is labelled with the site URL and linked from its host path.

use crate::runtime::{SITE_LABEL, VolumeConfig, VolumeError, VolumeOps};
use crate::site::{Platform, VolumeTable};
use crate::types::SiteUrl;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum VolumeProvisionError {
    #[error("volume {name}: {source}")]
    Volume {
        name: String,
        #[source]
        source: VolumeError,
    },

    #[error("failed to link {path} to its volume: {source}")]
    Link {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Make sure every site volume in `table` exists and is reachable from its
/// host path. Returns how many volumes were created.
///
/// Darwin sites bind-mount host paths directly, so nothing is done there.
pub async fn ensure_volumes<R>(
    runtime: &R,
    url: &SiteUrl,
    table: &VolumeTable,
    platform: Platform,
) -> Result<usize, VolumeProvisionError>
where
    R: VolumeOps + ?Sized,
{
    if platform == Platform::Darwin {
        return Ok(0);
    }

    let prefix = url.prefix();
    let labels = HashMap::from([(SITE_LABEL.to_string(), url.to_string())]);
    let mut created = 0;

    for descriptor in table.site_volumes(platform) {
        let name = format!("{}_{}", prefix, descriptor.name);
        let volume_err = |source| VolumeProvisionError::Volume {
            name: name.clone(),
            source,
        };

        if !runtime.volume_exists(&name).await.map_err(volume_err)? {
            tracing::debug!("creating volume {}", name);
            let _ = runtime
                .create_volume(&VolumeConfig {
                    name: name.clone(),
                    labels: labels.clone(),
                })
                .await
                .map_err(volume_err)?;
            created += 1;
        }

        if let Some(host_path) = &descriptor.host_path {
            let summary = runtime.inspect_volume(&name).await.map_err(volume_err)?;
            link_host_path(host_path, &summary.mountpoint).await?;
        }
    }

    Ok(created)
}

/// Create `path` as a symlink to `target` unless something is already there.
async fn link_host_path(path: &Path, target: &Path) -> Result<(), VolumeProvisionError> {
    let link_err = |source| VolumeProvisionError::Link {
        path: path.to_path_buf(),
        source,
    };

    if tokio::fs::symlink_metadata(path).await.is_ok() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(link_err)?;
    }
    tokio::fs::symlink(target, path).await.map_err(link_err)
}
