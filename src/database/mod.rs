// ABOUTME: Verifies or creates the database a site will use.
// ABOUTME: Non-destructive by default: a populated database is only reset with force.

mod client;
mod probe;

pub use client::{ClientError, DatabaseClient, MysqlExecClient};
pub use probe::{ContainerProbeLauncher, Probe, ProbeLauncher};

use crate::site::DbCredentials;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("cannot connect to database at {host}: {source}")]
    ConnectionFailed {
        host: String,
        #[source]
        source: ClientError,
    },

    #[error(
        "database {0} already has tables; back it up and reset it, or pass --force to reset it"
    )]
    NotEmpty(String),

    #[error("could not create database {name}: {source}")]
    CreateFailed {
        name: String,
        #[source]
        source: ClientError,
    },

    #[error("database probe failed: {0}")]
    Probe(String),

    #[error("database query failed: {0}")]
    Query(#[from] ClientError),
}

/// What `ensure_database` found or did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbOutcome {
    /// The server is run by sitewright; nothing to verify.
    Managed,
    /// The database did not exist and was created.
    Created,
    /// An empty database already existed and is used as is.
    Existing,
    /// A populated database was dropped and recreated.
    Reset,
}

impl DbOutcome {
    /// Whether the database should be dropped if provisioning is rolled back.
    pub fn created_here(&self) -> bool {
        matches!(self, DbOutcome::Created)
    }
}

/// Database artifacts created in the shared server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbArtifacts {
    pub database: Option<String>,
    pub user: Option<String>,
}

/// Make sure the database behind `credentials` is usable.
///
/// Managed hosts are skipped. Anything else is checked through a probe
/// container, which is released on every path.
pub async fn ensure_database(
    launcher: &dyn ProbeLauncher,
    credentials: &DbCredentials,
    force: bool,
) -> Result<DbOutcome, DbError> {
    if credentials.is_managed() {
        return Ok(DbOutcome::Managed);
    }

    tracing::info!("verifying database {} on {}", credentials.name, credentials.address());
    let probe = launcher.launch(credentials).await?;
    let result = prepare_database(probe.client.as_ref(), credentials, force).await;

    let container = probe.container.clone();
    if let Err(e) = launcher.release(probe).await {
        tracing::warn!("failed to remove database probe {}: {}", container, e);
    }
    result
}

/// Create the site database and user inside the shared server.
///
/// `artifacts` is filled in as objects are created, so a caller still knows
/// what to drop when a later statement fails.
pub async fn provision_shared(
    client: &dyn DatabaseClient,
    credentials: &DbCredentials,
    force: bool,
    artifacts: &mut DbArtifacts,
) -> Result<(), DbError> {
    let outcome = prepare_database(client, credentials, force).await?;
    if outcome.created_here() {
        artifacts.database = Some(credentials.name.clone());
    }

    let existed = client.user_exists(&credentials.user).await?;
    if !existed {
        artifacts.user = Some(credentials.user.clone());
    }
    client
        .create_user(&credentials.user, &credentials.password, &credentials.name)
        .await?;

    tracing::info!("database {} ready in shared server", credentials.name);
    Ok(())
}

async fn prepare_database(
    client: &dyn DatabaseClient,
    credentials: &DbCredentials,
    force: bool,
) -> Result<DbOutcome, DbError> {
    let name = &credentials.name;

    client
        .ping()
        .await
        .map_err(|source| DbError::ConnectionFailed {
            host: credentials.address(),
            source,
        })?;

    if !client.database_exists(name).await? {
        client
            .create_database(name)
            .await
            .map_err(|source| DbError::CreateFailed {
                name: name.clone(),
                source,
            })?;
        return Ok(DbOutcome::Created);
    }

    if client.list_tables(name).await?.is_empty() {
        return Ok(DbOutcome::Existing);
    }
    if !force {
        return Err(DbError::NotEmpty(name.clone()));
    }

    tracing::warn!("resetting database {} on {}", name, credentials.address());
    client.drop_database(name).await?;
    client
        .create_database(name)
        .await
        .map_err(|source| DbError::CreateFailed {
            name: name.clone(),
            source,
        })?;
    Ok(DbOutcome::Reset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::{DEFAULT_DB_PORT, LOCAL_DB_HOST, SHARED_DB_HOST};
    use crate::testing::{FakeDatabase, FakeProbeLauncher};

    fn credentials(host: &str) -> DbCredentials {
        DbCredentials {
            host: host.to_string(),
            port: DEFAULT_DB_PORT,
            name: "shop".into(),
            user: "app".into(),
            password: "pw".into(),
            root_password: None,
        }
    }

    #[tokio::test]
    async fn managed_hosts_are_not_probed() {
        let launcher = FakeProbeLauncher::new(FakeDatabase::default());
        for host in [LOCAL_DB_HOST, SHARED_DB_HOST] {
            let outcome = ensure_database(&launcher, &credentials(host), false)
                .await
                .unwrap();
            assert_eq!(outcome, DbOutcome::Managed);
        }
        assert_eq!(launcher.launches(), 0);
    }

    #[tokio::test]
    async fn missing_database_is_created() {
        let db = FakeDatabase::default();
        let launcher = FakeProbeLauncher::new(db.clone());

        let outcome = ensure_database(&launcher, &credentials("10.0.0.5"), false)
            .await
            .unwrap();
        assert_eq!(outcome, DbOutcome::Created);
        assert!(db.has_database("shop"));
        assert_eq!(launcher.releases(), 1);
    }

    #[tokio::test]
    async fn populated_database_is_left_alone_without_force() {
        let db = FakeDatabase::default().with_database("shop", &["wp_posts"]);
        let launcher = FakeProbeLauncher::new(db.clone());

        let err = ensure_database(&launcher, &credentials("10.0.0.5"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotEmpty(ref name) if name == "shop"));
        assert_eq!(db.tables("shop"), vec!["wp_posts".to_string()]);
        assert_eq!(launcher.releases(), 1);
    }

    #[tokio::test]
    async fn force_resets_populated_database() {
        let db = FakeDatabase::default().with_database("shop", &["wp_posts"]);
        let launcher = FakeProbeLauncher::new(db.clone());

        let outcome = ensure_database(&launcher, &credentials("10.0.0.5"), true)
            .await
            .unwrap();
        assert_eq!(outcome, DbOutcome::Reset);
        assert!(db.has_database("shop"));
        assert!(db.tables("shop").is_empty());
    }

    #[tokio::test]
    async fn empty_existing_database_is_reused() {
        let db = FakeDatabase::default().with_database("shop", &[]);
        let launcher = FakeProbeLauncher::new(db);

        let outcome = ensure_database(&launcher, &credentials("10.0.0.5"), false)
            .await
            .unwrap();
        assert_eq!(outcome, DbOutcome::Existing);
        assert!(!outcome.created_here());
    }

    #[tokio::test]
    async fn unreachable_server_is_connection_failure_and_probe_released() {
        let db = FakeDatabase::default().unreachable();
        let launcher = FakeProbeLauncher::new(db);

        let err = ensure_database(&launcher, &credentials("10.0.0.5"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::ConnectionFailed { .. }));
        assert_eq!(launcher.releases(), 1);
    }

    #[tokio::test]
    async fn create_failure_is_reported() {
        let db = FakeDatabase::default().deny_create();
        let launcher = FakeProbeLauncher::new(db);

        let err = ensure_database(&launcher, &credentials("10.0.0.5"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::CreateFailed { .. }));
    }

    #[tokio::test]
    async fn shared_provisioning_reports_created_artifacts() {
        let db = FakeDatabase::default();
        let mut artifacts = DbArtifacts::default();
        provision_shared(&db, &credentials(SHARED_DB_HOST), false, &mut artifacts)
            .await
            .unwrap();

        assert_eq!(artifacts.database.as_deref(), Some("shop"));
        assert_eq!(artifacts.user.as_deref(), Some("app"));
        assert!(db.has_user("app"));
    }

    #[tokio::test]
    async fn shared_provisioning_does_not_claim_existing_user() {
        let db = FakeDatabase::default().with_user("app");
        let mut artifacts = DbArtifacts::default();
        provision_shared(&db, &credentials(SHARED_DB_HOST), false, &mut artifacts)
            .await
            .unwrap();
        assert!(artifacts.user.is_none());
    }

    #[tokio::test]
    async fn shared_provisioning_keeps_database_artifact_on_populated_refusal() {
        let db = FakeDatabase::default().with_database("shop", &["wp_posts"]);
        let mut artifacts = DbArtifacts::default();
        let err = provision_shared(&db, &credentials(SHARED_DB_HOST), false, &mut artifacts)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotEmpty(_)));
        assert_eq!(artifacts, DbArtifacts::default());
    }
}
