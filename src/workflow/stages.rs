// ABOUTME: The ordered provisioning stages, each raising the progress level first.
// ABOUTME: Stages are raced against the cancel token, except the database step, which always finishes.

use super::cancel::CancelToken;
use super::progress::{Progress, ProgressLevel};
use super::rollback::DbCleanup;
use super::{Collaborators, ProvisionError};
use crate::database::{DbArtifacts, MysqlExecClient, ensure_database, provision_shared};
use crate::io::write_file;
use crate::manifest::{ManifestContext, my_cnf, php_ini};
use crate::provision::ensure_volumes;
use crate::runtime::{
    ComposeProject, ExecConfig, NetworkConfig, NetworkError, SITE_LABEL, SiteRuntime,
};
use crate::site::{DbMode, Platform, ServiceKind, SiteParams, build_volumes};
use crate::types::{ContainerId, NetworkId};
use std::collections::HashMap;
use std::future::Future;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

/// Run every stage in order. On error `progress` holds the level reached.
pub async fn run_stages<R>(
    collab: &Collaborators<R>,
    site: &SiteParams,
    progress: &mut Progress,
    cancel: &CancelToken,
) -> Result<(), ProvisionError>
where
    R: SiteRuntime + 'static,
{
    let stages = Stages { collab, site };

    guarded(cancel, stages.create_root(progress)).await?;
    guarded(cancel, stages.join_network(progress)).await?;
    // Not raced: created database artifacts must reach `progress` and the
    // helper container must be released before the run can stop.
    stages.prepare_database(progress).await?;
    if cancel.is_cancelled() {
        return Err(ProvisionError::Interrupted);
    }
    guarded(cancel, stages.configure_and_start(progress)).await?;
    if site.skip_status_check() {
        tracing::info!("skipping status check for {}", site.url());
    } else {
        guarded(cancel, stages.verify_health(progress)).await?;
    }
    guarded(cancel, stages.issue_certificate()).await
}

/// Run `stage` unless cancelled before or during it.
async fn guarded<F>(cancel: &CancelToken, stage: F) -> Result<(), ProvisionError>
where
    F: Future<Output = Result<(), ProvisionError>>,
{
    if cancel.is_cancelled() {
        return Err(ProvisionError::Interrupted);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProvisionError::Interrupted),
        result = stage => result,
    }
}

struct Stages<'a, R> {
    collab: &'a Collaborators<R>,
    site: &'a SiteParams,
}

impl<R> Stages<'_, R>
where
    R: SiteRuntime + 'static,
{
    async fn create_root(&self, progress: &mut Progress) -> Result<(), ProvisionError> {
        let root = self.site.root();
        if tokio::fs::symlink_metadata(root).await.is_ok() {
            return Err(ProvisionError::RootExists(root.to_path_buf()));
        }

        progress.raise(ProgressLevel::ROOT_CREATED);
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| ProvisionError::io("create site root", root, source))
    }

    async fn join_network(&self, progress: &mut Progress) -> Result<(), ProvisionError> {
        progress.raise(ProgressLevel::NETWORK_JOINED);
        let runtime = &self.collab.runtime;
        let url = self.site.url();
        let network = NetworkId::new(url.as_str());

        if !runtime.network_exists(url.as_str()).await? {
            let _ = runtime
                .create_network(&NetworkConfig {
                    name: url.to_string(),
                    driver: Some("bridge".to_string()),
                    labels: HashMap::from([(SITE_LABEL.to_string(), url.to_string())]),
                })
                .await?;
        }

        let proxy = ContainerId::new(self.collab.settings.proxy.container.as_str());
        match runtime.connect_to_network(&proxy, &network).await {
            Ok(()) | Err(NetworkError::AlreadyConnected(_)) => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Verify or create the site database. Runs at the network level.
    async fn prepare_database(&self, progress: &mut Progress) -> Result<(), ProvisionError> {
        let runtime = &self.collab.runtime;
        let Some(db) = self.site.database() else {
            return Ok(());
        };
        match db.mode {
            DbMode::Local => Ok(()),
            DbMode::Shared => {
                let client = MysqlExecClient::local_root(
                    runtime.clone(),
                    ContainerId::new(self.collab.settings.shared.db_container.as_str()),
                );
                let mut artifacts = DbArtifacts::default();
                let result =
                    provision_shared(&client, &db.credentials, self.site.force(), &mut artifacts)
                        .await;
                if artifacts.database.is_some() || artifacts.user.is_some() {
                    progress.set_db_cleanup(DbCleanup::Shared {
                        database: artifacts.database,
                        user: artifacts.user,
                    });
                }
                result.map_err(Into::into)
            }
            DbMode::Remote => {
                let outcome =
                    ensure_database(self.collab.probes.as_ref(), &db.credentials, self.site.force())
                        .await?;
                if outcome.created_here() {
                    progress.set_db_cleanup(DbCleanup::Remote {
                        credentials: db.credentials.clone(),
                    });
                }
                Ok(())
            }
        }
    }

    async fn configure_and_start(&self, progress: &mut Progress) -> Result<(), ProvisionError> {
        progress.raise(ProgressLevel::STARTED);
        let collab = self.collab;
        let site = self.site;
        let platform = collab.platform;
        let paths = site.paths();

        let volumes = build_volumes(site);
        ensure_volumes(collab.runtime.as_ref(), site.url(), &volumes, platform).await?;

        let (uid, gid) = owner_of(site.root()).await?;
        let context = ManifestContext::new(site, &collab.settings, platform, uid, gid);
        let manifest = collab.templates.render_manifest(&context, &volumes)?;
        let env = collab.templates.render_env(site, uid, gid)?;
        let main_conf = collab.templates.render_main_conf(site)?;
        let custom_ini = php_ini(site.php());

        write(&paths.manifest(), manifest).await?;
        write(&paths.env_file(), env).await?;

        // Darwin binds single files, which must exist before the first start.
        if platform == Platform::Darwin {
            write(&paths.nginx_main_conf(), main_conf.clone()).await?;
            write(&paths.php_custom_ini(), custom_ini).await?;
            if site.has_local_db() {
                write(&paths.db_my_cnf(), my_cnf()).await?;
            }
        }

        let project = ComposeProject::new(site.prefix(), paths.manifest());
        tracing::info!("starting containers for {}", site.url());
        collab.compose.up(&project, &[]).await?;

        if platform == Platform::Linux {
            write(&paths.nginx_main_conf(), main_conf).await?;
            write(&paths.php_custom_ini(), custom_ini).await?;
            collab
                .compose
                .restart(
                    &project,
                    &[ServiceKind::Nginx.as_str(), ServiceKind::Php.as_str()],
                )
                .await?;
        }

        let mut docroot = paths.htdocs();
        if !site.public_dir().is_empty() {
            docroot = docroot.join(site.public_dir());
        }
        write(&docroot.join("index.php"), collab.templates.render_index(site)?).await?;

        self.exec(
            ServiceKind::Php,
            ExecConfig::new(["chown", "-R", "www-data:", "/var/www/"]).user("root"),
        )
        .await?;
        self.configure_postfix().await?;

        if site.ssl().needs_hosts_entry() {
            let domains: Vec<_> = site.domains().iter().cloned().collect();
            collab
                .hosts
                .add(site.url(), &domains)
                .map_err(ProvisionError::Hosts)?;
        }
        Ok(())
    }

    async fn configure_postfix(&self) -> Result<(), ProvisionError> {
        let url = self.site.url();
        self.exec(
            ServiceKind::Postfix,
            ExecConfig::new([
                "postconf".to_string(),
                "-e".to_string(),
                "relayhost =".to_string(),
                "smtpd_recipient_restrictions = permit_mynetworks".to_string(),
                format!("myhostname = {url}"),
                "mydestination = localhost".to_string(),
            ]),
        )
        .await?;
        self.exec(ServiceKind::Postfix, ExecConfig::new(["postfix", "reload"]))
            .await
    }

    async fn verify_health(&self, progress: &mut Progress) -> Result<(), ProvisionError> {
        progress.raise(ProgressLevel::HEALTHY);
        tracing::info!("waiting for {} to answer", self.site.url());
        self.collab.status.wait_ready(self.site.url()).await?;
        Ok(())
    }

    async fn issue_certificate(&self) -> Result<(), ProvisionError> {
        if !self.site.ssl().is_enabled() {
            return Ok(());
        }
        tracing::info!("issuing {} certificate for {}", self.site.ssl().as_str(), self.site.url());
        self.collab.tls.issue(self.site).await?;
        Ok(())
    }

    async fn exec(&self, service: ServiceKind, config: ExecConfig) -> Result<(), ProvisionError> {
        let container = service.container_name(&self.site.prefix());
        let result = self
            .collab
            .runtime
            .exec(&ContainerId::new(container.as_str()), &config)
            .await
            .map_err(|source| ProvisionError::Exec {
                container: container.clone(),
                source,
            })?;

        if !result.success() {
            return Err(ProvisionError::CommandFailed {
                container,
                command: config.cmd.join(" "),
                code: result.exit_code,
                stderr: result.stderr_lossy().trim().to_string(),
            });
        }
        Ok(())
    }
}

async fn owner_of(path: &Path) -> Result<(u32, u32), ProvisionError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|source| ProvisionError::io("read site root owner", path, source))?;
    Ok((meta.uid(), meta.gid()))
}

async fn write(path: &Path, data: impl Into<Vec<u8>>) -> Result<(), ProvisionError> {
    tracing::debug!("writing {}", path.display());
    write_file(path, data)
        .await
        .map_err(|source| ProvisionError::io("write", path, source))
}
