// ABOUTME: Site model: validated parameters, services, SSL/cache/database modes.
// ABOUTME: SiteParams is only built by validation and is read-only afterwards.

mod descriptors;
mod paths;
mod validate;

pub use descriptors::{VolumeDescriptor, VolumeTable, build_volumes};
pub use paths::SitePaths;
pub use validate::{SiteRequest, SslKind, ValidationError, random_secret, validate};

use crate::types::{Domain, PhpVersion, SiteUrl};
use nonempty::NonEmpty;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Host name of a database running inside the site's own compose project.
pub const LOCAL_DB_HOST: &str = "db";
/// Host name of the shared database server on the backend network.
pub const SHARED_DB_HOST: &str = "global-db";
pub const DEFAULT_DB_PORT: u16 = 3306;

/// A service in the site's compose project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Nginx,
    Php,
    Postfix,
    Db,
    Redis,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Nginx => "nginx",
            ServiceKind::Php => "php",
            ServiceKind::Postfix => "postfix",
            ServiceKind::Db => "db",
            ServiceKind::Redis => "redis",
        }
    }

    /// Container name used for this service in a project with `prefix`.
    pub fn container_name(&self, prefix: &str) -> String {
        format!("{}_{}_1", prefix, self.as_str())
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host platform, which decides between named volumes and bind mounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Darwin,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::Darwin
        } else {
            Platform::Linux
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum SslMode {
    None,
    #[serde(rename = "self")]
    SelfSigned,
    Le,
    Inherit,
    Custom {
        key: PathBuf,
        crt: PathBuf,
    },
}

impl SslMode {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, SslMode::None)
    }

    /// Sites without a publicly verifiable certificate get a hosts entry.
    pub fn needs_hosts_entry(&self) -> bool {
        matches!(self, SslMode::None | SslMode::SelfSigned)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::None => "none",
            SslMode::SelfSigned => "self",
            SslMode::Le => "le",
            SslMode::Inherit => "inherit",
            SslMode::Custom { .. } => "custom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    None,
    Shared,
    Local,
}

impl CacheMode {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, CacheMode::None)
    }

    pub fn cache_host(&self) -> Option<&'static str> {
        match self {
            CacheMode::None => None,
            CacheMode::Shared => Some("global-redis"),
            CacheMode::Local => Some("redis"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbMode {
    /// Database and user inside the shared database server.
    Shared,
    /// A `db` service in the site's own project.
    Local,
    /// A server outside sitewright's control.
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbCredentials {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    /// Only set for a local database, whose server this site owns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_password: Option<String>,
}

impl DbCredentials {
    /// Whether sitewright runs the server this database lives on.
    pub fn is_managed(&self) -> bool {
        self.host == LOCAL_DB_HOST || self.host == SHARED_DB_HOST
    }

    /// `host` for the local service, `host:port` otherwise.
    pub fn address(&self) -> String {
        if self.host == LOCAL_DB_HOST {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteDatabase {
    pub mode: DbMode,
    pub credentials: DbCredentials,
}

/// Fully validated parameters for creating one site.
#[derive(Debug, Clone)]
pub struct SiteParams {
    url: SiteUrl,
    root: PathBuf,
    php: PhpVersion,
    cache: CacheMode,
    domains: NonEmpty<Domain>,
    ssl: SslMode,
    wildcard: bool,
    database: Option<SiteDatabase>,
    admin_email: String,
    public_dir: String,
    skip_status_check: bool,
    force: bool,
}

impl SiteParams {
    pub fn url(&self) -> &SiteUrl {
        &self.url
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn paths(&self) -> SitePaths {
        SitePaths::new(&self.root)
    }

    /// Compose project name and volume prefix.
    pub fn prefix(&self) -> String {
        self.url.prefix()
    }

    pub fn php(&self) -> PhpVersion {
        self.php
    }

    pub fn cache(&self) -> CacheMode {
        self.cache
    }

    /// The site URL followed by its alias domains.
    pub fn domains(&self) -> &NonEmpty<Domain> {
        &self.domains
    }

    /// Alias domains without the primary URL.
    pub fn aliases(&self) -> impl Iterator<Item = &Domain> {
        self.domains.tail.iter()
    }

    pub fn ssl(&self) -> &SslMode {
        &self.ssl
    }

    pub fn wildcard(&self) -> bool {
        self.wildcard
    }

    pub fn database(&self) -> Option<&SiteDatabase> {
        self.database.as_ref()
    }

    pub fn has_local_db(&self) -> bool {
        matches!(self.database.as_ref().map(|db| db.mode), Some(DbMode::Local))
    }

    pub fn admin_email(&self) -> &str {
        &self.admin_email
    }

    /// Document-root subpath below htdocs, without leading or trailing slash.
    pub fn public_dir(&self) -> &str {
        &self.public_dir
    }

    /// Document root as seen from inside the containers.
    pub fn container_docroot(&self) -> String {
        if self.public_dir.is_empty() {
            "/var/www/htdocs".to_string()
        } else {
            format!("/var/www/htdocs/{}", self.public_dir)
        }
    }

    pub fn skip_status_check(&self) -> bool {
        self.skip_status_check
    }

    pub fn force(&self) -> bool {
        self.force
    }

    pub fn app_sub_type(&self) -> &'static str {
        if self.database.is_some() {
            "mysql"
        } else {
            "php"
        }
    }
}
