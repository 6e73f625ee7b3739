// ABOUTME: Database client seam and its implementation over `mysql` in a container.
// ABOUTME: Statements run through exec; connection and statement failures are told apart.

use crate::runtime::{ExecConfig, ExecError, ExecOps};
use crate::types::ContainerId;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("cannot connect to database server: {0}")]
    Connection(String),

    #[error("statement failed: {0}")]
    Statement(String),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Operations on one MySQL-compatible server.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    async fn ping(&self) -> Result<(), ClientError>;

    async fn database_exists(&self, name: &str) -> Result<bool, ClientError>;

    async fn list_tables(&self, database: &str) -> Result<Vec<String>, ClientError>;

    async fn create_database(&self, name: &str) -> Result<(), ClientError>;

    /// Drop a database; a missing database is not an error.
    async fn drop_database(&self, name: &str) -> Result<(), ClientError>;

    async fn user_exists(&self, user: &str) -> Result<bool, ClientError>;

    /// Create `user` if needed and grant it everything on `database`.
    async fn create_user(
        &self,
        user: &str,
        password: &str,
        database: &str,
    ) -> Result<(), ClientError>;

    /// Drop a user; a missing user is not an error.
    async fn drop_user(&self, user: &str) -> Result<(), ClientError>;
}

/// How `mysql` authenticates inside the container.
#[derive(Debug, Clone)]
enum Login {
    /// Explicit server and user, password passed via `MYSQL_PWD`.
    User {
        host: String,
        port: u16,
        user: String,
        password: String,
    },
    /// Root on the server running in the same container, using the
    /// container's own `MYSQL_ROOT_PASSWORD`.
    LocalRoot,
}

const SQL_ENV: &str = "SITEWRIGHT_SQL";

/// Runs the `mysql` command-line client inside a container.
pub struct MysqlExecClient<R: ?Sized> {
    runtime: Arc<R>,
    container: ContainerId,
    login: Login,
}

impl<R> MysqlExecClient<R>
where
    R: ExecOps + ?Sized,
{
    /// Connect from `container` to a server elsewhere.
    pub fn remote(
        runtime: Arc<R>,
        container: ContainerId,
        host: &str,
        port: u16,
        user: &str,
        password: &str,
    ) -> Self {
        Self {
            runtime,
            container,
            login: Login::User {
                host: host.to_string(),
                port,
                user: user.to_string(),
                password: password.to_string(),
            },
        }
    }

    /// Connect as root to the server running inside `container`.
    pub fn local_root(runtime: Arc<R>, container: ContainerId) -> Self {
        Self {
            runtime,
            container,
            login: Login::LocalRoot,
        }
    }

    fn exec_config(&self, sql: &str) -> ExecConfig {
        match &self.login {
            Login::User {
                host,
                port,
                user,
                password,
            } => ExecConfig::new([
                "mysql".to_string(),
                format!("--host={host}"),
                format!("--port={port}"),
                format!("--user={user}"),
                "--batch".to_string(),
                "--skip-column-names".to_string(),
                format!("--execute={sql}"),
            ])
            .env("MYSQL_PWD", password),
            Login::LocalRoot => ExecConfig::new([
                "sh",
                "-c",
                "MYSQL_PWD=\"$MYSQL_ROOT_PASSWORD\" exec mysql --user=root --batch --skip-column-names --execute=\"$SITEWRIGHT_SQL\"",
            ])
            .env(SQL_ENV, sql),
        }
    }

    /// Run `sql` and return stdout lines.
    async fn query(&self, sql: &str) -> Result<Vec<String>, ClientError> {
        tracing::debug!("mysql in {}: {}", self.container, sql);
        let result = self
            .runtime
            .exec(&self.container, &self.exec_config(sql))
            .await?;

        if !result.success() {
            let stderr = result.stderr_lossy().trim().to_string();
            return Err(classify(&stderr));
        }

        Ok(result
            .stdout_lossy()
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Client errors 1045 (access denied) and 2xxx (cannot reach server) are
/// connection failures; everything else is a failed statement.
fn classify(stderr: &str) -> ClientError {
    let code = stderr
        .strip_prefix("ERROR ")
        .and_then(|rest| rest.split(|c: char| !c.is_ascii_digit()).next())
        .and_then(|digits| digits.parse::<u32>().ok());

    match code {
        Some(1045) | Some(2000..=2999) => ClientError::Connection(stderr.to_string()),
        _ => ClientError::Statement(stderr.to_string()),
    }
}

fn ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[async_trait]
impl<R> DatabaseClient for MysqlExecClient<R>
where
    R: ExecOps + ?Sized,
{
    async fn ping(&self) -> Result<(), ClientError> {
        self.query("SELECT 1").await.map(|_| ())
    }

    async fn database_exists(&self, name: &str) -> Result<bool, ClientError> {
        let rows = self
            .query(&format!(
                "SELECT SCHEMA_NAME FROM INFORMATION_SCHEMA.SCHEMATA WHERE SCHEMA_NAME = {}",
                literal(name)
            ))
            .await?;
        Ok(!rows.is_empty())
    }

    async fn list_tables(&self, database: &str) -> Result<Vec<String>, ClientError> {
        self.query(&format!(
            "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA = {}",
            literal(database)
        ))
        .await
    }

    async fn create_database(&self, name: &str) -> Result<(), ClientError> {
        self.query(&format!("CREATE DATABASE {}", ident(name)))
            .await
            .map(|_| ())
    }

    async fn drop_database(&self, name: &str) -> Result<(), ClientError> {
        self.query(&format!("DROP DATABASE IF EXISTS {}", ident(name)))
            .await
            .map(|_| ())
    }

    async fn user_exists(&self, user: &str) -> Result<bool, ClientError> {
        let rows = self
            .query(&format!(
                "SELECT User FROM mysql.user WHERE User = {}",
                literal(user)
            ))
            .await?;
        Ok(!rows.is_empty())
    }

    async fn create_user(
        &self,
        user: &str,
        password: &str,
        database: &str,
    ) -> Result<(), ClientError> {
        let account = format!("{}@'%'", literal(user));
        self.query(&format!(
            "CREATE USER IF NOT EXISTS {account} IDENTIFIED BY {}; \
             GRANT ALL PRIVILEGES ON {}.* TO {account}; FLUSH PRIVILEGES;",
            literal(password),
            ident(database),
        ))
        .await
        .map(|_| ())
    }

    async fn drop_user(&self, user: &str) -> Result<(), ClientError> {
        self.query(&format!("DROP USER IF EXISTS {}@'%'", literal(user)))
            .await
            .map(|_| ())
    }
}
