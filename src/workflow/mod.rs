// ABOUTME: Staged site provisioning with transactional rollback.
// ABOUTME: The progress level reached decides what a failure has to undo.

mod cancel;
mod progress;
mod rollback;
mod stages;

pub use cancel::CancelToken;
pub use progress::{Progress, ProgressLevel};
pub use rollback::{DbCleanup, RollbackFailure, RollbackReport, RollbackTarget, rollback};
pub use stages::run_stages;

use crate::config::Settings;
use crate::database::{DbError, ProbeLauncher};
use crate::diagnostics::{Diagnostics, Warning};
use crate::hosts::HostsRegistry;
use crate::manifest::{RenderError, Templates};
use crate::provision::VolumeProvisionError;
use crate::record::{RecordError, RecordStore, SiteRecord};
use crate::runtime::{ComposeError, ComposeOps, ExecError, NetworkError, SiteRuntime};
use crate::site::{Platform, SiteParams};
use crate::status::{StatusError, StatusProbe};
use crate::tls::{CertificateIssuer, TlsError};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("site root {0} already exists")]
    RootExists(PathBuf),

    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("network: {0}")]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Volume(#[from] VolumeProvisionError),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error("exec in {container} failed: {source}")]
    Exec {
        container: String,
        #[source]
        source: ExecError,
    },

    #[error("`{command}` in {container} exited with {code}: {stderr}")]
    CommandFailed {
        container: String,
        command: String,
        code: i64,
        stderr: String,
    },

    #[error("failed to update hosts file: {0}")]
    Hosts(#[source] std::io::Error),

    #[error(transparent)]
    Status(#[from] StatusError),

    #[error("certificate: {0}")]
    Tls(#[from] TlsError),

    #[error("failed to save site record: {0}")]
    Record(#[from] RecordError),

    #[error("interrupted")]
    Interrupted,
}

impl ProvisionError {
    pub(crate) fn io(action: &'static str, path: &Path, source: std::io::Error) -> Self {
        ProvisionError::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A failed run together with what rollback did about it.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ProvisionFailure {
    #[source]
    pub error: ProvisionError,
    pub level: ProgressLevel,
    pub rollback: RollbackReport,
}

/// Everything the workflow talks to.
pub struct Collaborators<R> {
    pub runtime: Arc<R>,
    pub compose: Arc<dyn ComposeOps>,
    pub templates: Arc<Templates>,
    pub records: Arc<dyn RecordStore>,
    pub hosts: Arc<dyn HostsRegistry>,
    pub tls: Arc<dyn CertificateIssuer>,
    pub status: Arc<dyn StatusProbe>,
    pub probes: Arc<dyn ProbeLauncher>,
    pub settings: Settings,
    pub platform: Platform,
}

/// Creates sites and cleans up after failed attempts.
pub struct Provisioner<R> {
    collab: Collaborators<R>,
}

impl<R> Provisioner<R>
where
    R: SiteRuntime + 'static,
{
    pub fn new(collab: Collaborators<R>) -> Self {
        Self { collab }
    }

    pub fn collaborators(&self) -> &Collaborators<R> {
        &self.collab
    }

    /// Provision `site` and write its record.
    ///
    /// Any failure after validation is rolled back according to the level
    /// reached; rollback step failures are added to `diag`.
    pub async fn create(
        &self,
        site: &SiteParams,
        cancel: &CancelToken,
        diag: &mut Diagnostics,
    ) -> Result<SiteRecord, Box<ProvisionFailure>> {
        let mut progress = Progress::new();

        let (error, remove_record) =
            match run_stages(&self.collab, site, &mut progress, cancel).await {
                Ok(()) => {
                    let record = SiteRecord::new(site, chrono::Utc::now());
                    match self.collab.records.create(&record) {
                        Ok(()) => {
                            tracing::info!("site {} created", site.url());
                            return Ok(record);
                        }
                        // Someone else owns that record; leave it alone.
                        Err(e @ RecordError::AlreadyExists(_)) => (ProvisionError::Record(e), false),
                        Err(e) => (ProvisionError::Record(e), true),
                    }
                }
                Err(e) => (e, false),
            };

        let level = progress.level();
        tracing::warn!("provisioning {} failed at level {}: {}", site.url(), level, error);

        let target = RollbackTarget {
            url: site.url().clone(),
            root: site.root().to_path_buf(),
            db_cleanup: progress.take_db_cleanup(),
            remove_record,
        };
        let report = rollback(level, &target, &self.collab).await;
        for failure in &report.failed {
            diag.warn(Warning::rollback_step(failure.step, &failure.error));
        }

        Err(Box::new(ProvisionFailure {
            error,
            level,
            rollback: report,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::WarningKind;
    use crate::runtime::ExecConfig;
    use crate::site::SslKind;
    use crate::testing::{CreateFailure, Harness, StatusBehavior};
    use std::time::Duration;

    async fn create(
        h: &Harness,
        site: &SiteParams,
    ) -> (Result<SiteRecord, Box<ProvisionFailure>>, Diagnostics) {
        let mut diag = Diagnostics::default();
        let result = h
            .provisioner()
            .create(site, &CancelToken::new(), &mut diag)
            .await;
        (result, diag)
    }

    fn ran(execs: &[(String, ExecConfig)], container: &str, program: &str) -> bool {
        execs
            .iter()
            .any(|(c, config)| c == container && config.cmd.first().map(String::as_str) == Some(program))
    }

    /// Nothing of the site is left behind; only the proxy remains.
    fn assert_clean(h: &Harness, site: &SiteParams) {
        assert!(!site.root().exists(), "site root left behind");
        assert_eq!(h.runtime.container_names(), vec![h.settings.proxy.container.clone()]);
        assert!(h.runtime.network_names().is_empty());
        assert!(h.runtime.volume_names().is_empty());
        assert!(!h.hosts().contains(site.url().as_str()));
        assert!(h.records.find(site.url()).unwrap().is_none());
    }

    #[tokio::test]
    async fn creates_site_end_to_end() {
        let h = Harness::new();
        let site = h.site("example.test", |_| {});

        let (result, diag) = create(&h, &site).await;
        let record = result.unwrap();

        assert_eq!(record.site_url.as_str(), "example.test");
        assert!(h.records.find(site.url()).unwrap().is_some());
        assert!(site.paths().manifest().is_file());
        assert!(site.paths().env_file().is_file());
        assert!(site.paths().htdocs().join("index.php").is_file());
        assert_eq!(
            h.runtime.connected("example.test"),
            vec![h.settings.proxy.container.clone()]
        );
        assert!(h.hosts().contains("example.test"));
        assert!(!diag.has_warnings());

        let calls = h.compose.calls();
        assert_eq!(calls[0].0, "up");
        assert_eq!(calls[0].1, "exampletest");
        assert_eq!(calls[1], (
            "restart".to_string(),
            "exampletest".to_string(),
            vec!["nginx".to_string(), "php".to_string()],
        ));

        let execs = h.runtime.execs();
        assert!(ran(&execs, "exampletest_php_1", "chown"));
        assert!(ran(&execs, "exampletest_postfix_1", "postconf"));
        assert!(ran(&execs, "exampletest_postfix_1", "postfix"));
        assert_eq!(h.status.checked(), 1);
    }

    #[tokio::test]
    async fn darwin_writes_configs_before_first_start() {
        let mut h = Harness::new();
        h.platform = Platform::Darwin;
        let site = h.site("example.test", |_| {});

        create(&h, &site).await.0.unwrap();

        assert!(site.paths().nginx_main_conf().is_file());
        assert!(site.paths().php_custom_ini().is_file());
        assert!(h.runtime.volume_names().is_empty());
        assert!(h.compose.calls().iter().all(|(action, _, _)| action == "up"));
    }

    #[tokio::test]
    async fn compose_failure_rolls_back_started_site() {
        let h = Harness::new();
        h.compose.fail_on("up");
        let site = h.site("example.test", |_| {});

        let (result, diag) = create(&h, &site).await;
        let failure = result.unwrap_err();

        assert!(matches!(failure.error, ProvisionError::Compose(_)));
        assert_eq!(failure.level, ProgressLevel::STARTED);
        assert!(failure.rollback.all_succeeded());
        assert!(!diag.has_warnings());
        assert_clean(&h, &site);
    }

    #[tokio::test]
    async fn failed_status_check_removes_hosts_entry() {
        let h = Harness::new();
        h.status.set(StatusBehavior::Fail);
        let site = h.site("example.test", |_| {});

        let failure = create(&h, &site).await.0.unwrap_err();

        assert!(matches!(failure.error, ProvisionError::Status(_)));
        assert_eq!(failure.level, ProgressLevel::HEALTHY);
        assert!(failure.rollback.completed.contains(&rollback::STEP_HOSTS));
        assert_clean(&h, &site);
        assert!(h.hosts().contains("localhost"));
    }

    #[tokio::test]
    async fn skipped_status_check_is_not_probed() {
        let h = Harness::new();
        h.status.set(StatusBehavior::Fail);
        let site = h.site("example.test", |r| r.skip_status_check = true);

        create(&h, &site).await.0.unwrap();
        assert_eq!(h.status.checked(), 0);
    }

    #[tokio::test]
    async fn existing_root_is_never_removed() {
        let h = Harness::new();
        let site = h.site("example.test", |_| {});
        std::fs::create_dir_all(site.root()).unwrap();
        std::fs::write(site.root().join("keep.txt"), "mine").unwrap();

        let failure = create(&h, &site).await.0.unwrap_err();

        assert!(matches!(failure.error, ProvisionError::RootExists(_)));
        assert_eq!(failure.level, ProgressLevel::NONE);
        assert!(failure.rollback.completed.is_empty());
        assert!(site.root().join("keep.txt").is_file());
        assert!(h.runtime.network_names().is_empty());
    }

    #[tokio::test]
    async fn shared_database_is_created_and_kept_on_success() {
        let h = Harness::new();
        let site = h.site("example.test", |r| {
            r.with_db = true;
            r.dbname = Some("shop".into());
            r.dbuser = Some("shop_user".into());
        });

        create(&h, &site).await.0.unwrap();
        assert!(h.shared_db.has_database("shop"));
        assert!(h.shared_db.has_user("shop_user"));
    }

    #[tokio::test]
    async fn shared_database_created_by_the_run_is_dropped() {
        let h = Harness::new();
        h.status.set(StatusBehavior::Fail);
        let site = h.site("example.test", |r| {
            r.with_db = true;
            r.dbname = Some("shop".into());
            r.dbuser = Some("shop_user".into());
        });

        let failure = create(&h, &site).await.0.unwrap_err();

        assert!(failure.rollback.completed.contains(&rollback::STEP_DATABASE));
        assert!(!h.shared_db.has_database("shop"));
        assert!(!h.shared_db.has_user("shop_user"));
        assert_clean(&h, &site);
    }

    #[tokio::test]
    async fn pre_existing_shared_user_survives_rollback() {
        let h = Harness::new();
        let _ = h.shared_db.clone().with_user("shop_user");
        h.status.set(StatusBehavior::Fail);
        let site = h.site("example.test", |r| {
            r.with_db = true;
            r.dbname = Some("shop".into());
            r.dbuser = Some("shop_user".into());
        });

        create(&h, &site).await.0.unwrap_err();

        assert!(!h.shared_db.has_database("shop"));
        assert!(h.shared_db.has_user("shop_user"));
    }

    fn remote(r: &mut crate::site::SiteRequest) {
        r.with_db = true;
        r.dbhost = Some("10.0.0.5:3307".into());
        r.dbname = Some("shop".into());
        r.dbuser = Some("app".into());
        r.dbpass = Some("pw".into());
    }

    #[tokio::test]
    async fn populated_remote_database_stops_at_network_level() {
        let h = Harness::new();
        let _ = h.remote_db.clone().with_database("shop", &["wp_posts"]);
        let site = h.site("example.test", remote);

        let failure = create(&h, &site).await.0.unwrap_err();

        assert!(matches!(
            failure.error,
            ProvisionError::Database(crate::database::DbError::NotEmpty(_))
        ));
        assert_eq!(failure.level, ProgressLevel::NETWORK_JOINED);
        assert!(!failure.rollback.completed.contains(&rollback::STEP_DATABASE));
        assert_eq!(h.remote_db.tables("shop"), vec!["wp_posts".to_string()]);
        assert!(h.compose.calls().is_empty());
        assert_clean(&h, &site);
    }

    #[tokio::test]
    async fn local_database_site_skips_remote_check() {
        let h = Harness::new();
        let site = h.site("example.test", |r| {
            r.with_db = true;
            r.local_db = true;
        });

        let record = create(&h, &site).await.0.unwrap();

        let db = record.database.expect("local site keeps its database");
        assert_eq!(db.credentials.host, crate::site::LOCAL_DB_HOST);
        assert!(db.credentials.root_password.is_some());
        assert_eq!(h.probes.launches(), 0);
        assert!(h.records.find(site.url()).unwrap().is_some());
    }

    #[tokio::test]
    async fn unreachable_remote_database_rolls_back_network_level() {
        let h = Harness::new();
        let _ = h.remote_db.clone().unreachable();
        let site = h.site("example.test", remote);

        let failure = create(&h, &site).await.0.unwrap_err();

        assert!(matches!(
            failure.error,
            ProvisionError::Database(crate::database::DbError::ConnectionFailed { .. })
        ));
        assert_eq!(failure.level, ProgressLevel::NETWORK_JOINED);
        assert!(failure.rollback.completed.contains(&rollback::STEP_ROOT));
        assert!(!failure.rollback.completed.contains(&rollback::STEP_DATABASE));
        assert_eq!(h.probes.launches(), 1);
        assert_eq!(h.probes.releases(), 1);
        assert!(h.compose.calls().is_empty());
        assert_clean(&h, &site);
    }

    #[tokio::test]
    async fn cancellation_during_remote_check_drops_created_database() {
        let h = Harness::new();
        h.probes.slow_release(Duration::from_millis(50));
        let site = h.site("example.test", remote);
        let provisioner = h.provisioner();
        let cancel = CancelToken::new();
        let mut diag = Diagnostics::default();

        let (result, ()) = tokio::join!(provisioner.create(&site, &cancel, &mut diag), async {
            while h.probes.releases_started() == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            cancel.cancel();
        });
        let failure = result.unwrap_err();

        assert!(matches!(failure.error, ProvisionError::Interrupted));
        assert_eq!(failure.level, ProgressLevel::NETWORK_JOINED);
        assert!(failure.rollback.completed.contains(&rollback::STEP_DATABASE));
        assert!(!h.remote_db.has_database("shop"));
        // One helper for the check, one for the rollback drop; both released.
        assert_eq!(h.probes.launches(), 2);
        assert_eq!(h.probes.releases(), 2);
        assert!(h.compose.calls().is_empty());
        assert_clean(&h, &site);
    }

    #[tokio::test]
    async fn cancellation_during_shared_setup_drops_created_database() {
        let h = Harness::new();
        let site = h.site("example.test", |r| r.with_db = true);
        let credentials = site.database().unwrap().credentials.clone();
        let provisioner = h.provisioner();
        let cancel = CancelToken::new();
        let _ = h.shared_db.clone().cancel_after_create(cancel.clone());

        let failure = provisioner
            .create(&site, &cancel, &mut Diagnostics::default())
            .await
            .unwrap_err();

        assert!(matches!(failure.error, ProvisionError::Interrupted));
        assert_eq!(failure.level, ProgressLevel::NETWORK_JOINED);
        assert!(failure.rollback.completed.contains(&rollback::STEP_DATABASE));
        assert!(!h.shared_db.has_database(&credentials.name));
        assert!(!h.shared_db.has_user(&credentials.user));
        assert_clean(&h, &site);
    }

    #[tokio::test]
    async fn remote_database_created_by_the_run_is_dropped() {
        let h = Harness::new();
        h.compose.fail_on("restart");
        let site = h.site("example.test", remote);

        let failure = create(&h, &site).await.0.unwrap_err();

        assert_eq!(failure.level, ProgressLevel::STARTED);
        assert!(!h.remote_db.has_database("shop"));
        assert_eq!(h.probes.launches(), 2);
        assert_eq!(h.probes.releases(), 2);
        assert_clean(&h, &site);
    }

    #[tokio::test]
    async fn record_write_failure_removes_everything() {
        let h = Harness::new();
        h.records.fail_create(CreateFailure::Io);
        let site = h.site("example.test", |_| {});

        let failure = create(&h, &site).await.0.unwrap_err();

        assert!(matches!(failure.error, ProvisionError::Record(_)));
        assert_eq!(failure.level, ProgressLevel::HEALTHY);
        assert!(failure.rollback.completed.contains(&rollback::STEP_RECORD));
        assert_clean(&h, &site);
    }

    #[tokio::test]
    async fn record_owned_by_someone_else_is_left_alone() {
        let h = Harness::new();
        h.records.fail_create(CreateFailure::Exists);
        let site = h.site("example.test", |_| {});

        let failure = create(&h, &site).await.0.unwrap_err();

        assert!(!failure.rollback.completed.contains(&rollback::STEP_RECORD));
        assert!(!site.root().exists());
    }

    #[tokio::test]
    async fn certificate_is_issued_after_health_check() {
        let h = Harness::new();
        let site = h.site("example.test", |r| r.ssl = SslKind::Le);

        create(&h, &site).await.0.unwrap();
        assert_eq!(h.issuer.issued(), vec!["example.test".to_string()]);
        assert!(!h.hosts().contains("example.test"));
    }

    #[tokio::test]
    async fn certificate_failure_rolls_back() {
        let h = Harness::new();
        h.issuer.fail();
        let site = h.site("example.test", |r| r.ssl = SslKind::Le);

        let failure = create(&h, &site).await.0.unwrap_err();
        assert!(matches!(failure.error, ProvisionError::Tls(_)));
        assert_clean(&h, &site);
    }

    #[tokio::test]
    async fn failed_rollback_step_is_a_warning_and_others_still_run() {
        let h = Harness::new();
        h.status.set(StatusBehavior::Fail);
        h.runtime.fail_on("remove_volume");
        let site = h.site("example.test", |_| {});

        let (result, diag) = create(&h, &site).await;
        let failure = result.unwrap_err();

        assert!(!failure.rollback.all_succeeded());
        assert_eq!(failure.rollback.failed.len(), 1);
        assert_eq!(failure.rollback.failed[0].step, rollback::STEP_VOLUMES);
        assert_eq!(diag.warnings().len(), 1);
        assert_eq!(diag.warnings()[0].kind, WarningKind::RollbackStep);

        assert!(!site.root().exists());
        assert!(h.runtime.network_names().is_empty());
        assert!(!h.runtime.volume_names().is_empty());
    }

    #[tokio::test]
    async fn cancellation_during_health_check_rolls_back() {
        let h = Harness::new();
        h.status.set(StatusBehavior::Hang);
        let site = h.site("example.test", |_| {});
        let provisioner = h.provisioner();
        let cancel = CancelToken::new();
        let mut diag = Diagnostics::default();

        let (result, ()) = tokio::join!(provisioner.create(&site, &cancel, &mut diag), async {
            while h.status.checked() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            cancel.cancel();
        });
        let failure = result.unwrap_err();

        assert!(matches!(failure.error, ProvisionError::Interrupted));
        assert_eq!(failure.level, ProgressLevel::HEALTHY);
        assert_clean(&h, &site);
    }

    #[tokio::test]
    async fn cancelled_before_start_touches_nothing() {
        let h = Harness::new();
        let site = h.site("example.test", |_| {});
        let cancel = CancelToken::new();
        cancel.cancel();

        let failure = h
            .provisioner()
            .create(&site, &cancel, &mut Diagnostics::default())
            .await
            .unwrap_err();

        assert!(matches!(failure.error, ProvisionError::Interrupted));
        assert_eq!(failure.level, ProgressLevel::NONE);
        assert!(failure.rollback.completed.is_empty());
        assert!(!site.root().exists());
    }

    #[test]
    fn failure_displays_underlying_error() {
        let failure = ProvisionFailure {
            error: ProvisionError::RootExists("/srv/example.test".into()),
            level: ProgressLevel::NONE,
            rollback: RollbackReport::default(),
        };
        assert_eq!(failure.to_string(), "site root /srv/example.test already exists");
    }
}
