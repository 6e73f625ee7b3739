// ABOUTME: Turns raw create-command input into validated SiteParams.
// ABOUTME: Every check that needs no side effect happens here, before level 1.

use super::{
    CacheMode, DEFAULT_DB_PORT, DbCredentials, DbMode, LOCAL_DB_HOST, SHARED_DB_HOST,
    SiteDatabase, SiteParams, SslMode,
};
use crate::config::Settings;
use crate::diagnostics::{Diagnostics, Warning};
use crate::record::{RecordError, RecordStore};
use crate::types::{Domain, DomainError, PhpVersion, PhpVersionError, SiteUrl};
use nonempty::NonEmpty;
use rand::{Rng, distributions::Alphanumeric};
use std::path::PathBuf;
use std::str::FromStr;

const DB_USER_URL_LIMIT: usize = 53;

/// SSL mode as requested on the command line, before its inputs are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslKind {
    #[default]
    None,
    SelfSigned,
    Le,
    Inherit,
    Custom,
}

impl FromStr for SslKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(SslKind::None),
            "self" => Ok(SslKind::SelfSigned),
            "le" => Ok(SslKind::Le),
            "inherit" => Ok(SslKind::Inherit),
            "custom" => Ok(SslKind::Custom),
            other => Err(format!(
                "unknown SSL mode '{other}' (expected le, self, inherit, custom or none)"
            )),
        }
    }
}

/// Unvalidated input for `create`.
#[derive(Debug, Clone, Default)]
pub struct SiteRequest {
    pub url: String,
    pub php: Option<String>,
    pub cache: bool,
    pub local_cache: bool,
    /// Comma-separated alias domains.
    pub alias_domains: Option<String>,
    pub ssl: SslKind,
    pub ssl_key: Option<PathBuf>,
    pub ssl_crt: Option<PathBuf>,
    pub wildcard: bool,
    pub with_db: bool,
    pub local_db: bool,
    pub dbname: Option<String>,
    pub dbuser: Option<String>,
    pub dbpass: Option<String>,
    /// `host` or `host:port`.
    pub dbhost: Option<String>,
    pub admin_email: Option<String>,
    pub public_dir: Option<String>,
    pub skip_status_check: bool,
    pub force: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid site url '{url}': {source}")]
    Url { url: String, source: DomainError },

    #[error("invalid alias domain '{domain}': {source}")]
    Alias { domain: String, source: DomainError },

    #[error("site {0} already exists")]
    SiteExists(String),

    #[error("domain {0} is already used by another site")]
    DomainInUse(String),

    #[error(transparent)]
    Php(#[from] PhpVersionError),

    #[error("custom SSL requires both --ssl-key and --ssl-crt")]
    CustomSslIncomplete,

    #[error("SSL file not found: {0}")]
    SslFileMissing(PathBuf),

    #[error("{0} has no parent domain to inherit a certificate from")]
    NoParentDomain(String),

    #[error("cannot inherit SSL: parent site {0} has no wildcard certificate")]
    ParentNotWildcard(String),

    #[error("--dbuser and --dbpass are required for a remote database host")]
    RemoteCredentialsRequired,

    #[error("invalid database port in '{0}'")]
    DbPort(String),

    #[error("invalid public dir '{0}'")]
    PublicDir(String),

    #[error("failed to read site records: {0}")]
    Record(#[from] RecordError),
}

/// A random alphanumeric string for passwords and name suffixes.
pub fn random_secret(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Validate a create request against settings and existing records.
pub fn validate(
    request: &SiteRequest,
    settings: &Settings,
    store: &dyn RecordStore,
    diagnostics: &mut Diagnostics,
) -> Result<SiteParams, ValidationError> {
    let url = SiteUrl::parse(&request.url).map_err(|source| ValidationError::Url {
        url: request.url.clone(),
        source,
    })?;

    if store.find(&url)?.is_some() {
        return Err(ValidationError::SiteExists(url.to_string()));
    }

    let domains = collect_domains(&url, request.alias_domains.as_deref())?;
    let taken = store.domains()?;
    if let Some(domain) = domains.iter().find(|d| taken.contains(d.as_str())) {
        return Err(ValidationError::DomainInUse(domain.to_string()));
    }

    let resolved = PhpVersion::resolve(request.php.as_deref().unwrap_or("latest"))?;
    if let Some(requested) = &resolved.fallback_from {
        diagnostics.warn(Warning::php_fallback(requested, resolved.version.as_str()));
    }

    let cache = match (request.cache, request.local_cache) {
        (false, _) => CacheMode::None,
        (true, false) => CacheMode::Shared,
        (true, true) => CacheMode::Local,
    };

    let ssl = resolve_ssl(request, &url, store)?;
    let database = if request.with_db {
        Some(resolve_database(request, &url)?)
    } else {
        None
    };

    let admin_email = request
        .admin_email
        .as_deref()
        .map(|e| e.trim().to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| url.default_admin_email());

    let public_dir = normalize_public_dir(request.public_dir.as_deref().unwrap_or(""))?;

    Ok(SiteParams {
        root: settings.site_root(&url),
        url,
        php: resolved.version,
        cache,
        domains,
        ssl,
        wildcard: request.wildcard,
        database,
        admin_email,
        public_dir,
        skip_status_check: request.skip_status_check,
        force: request.force,
    })
}

/// The URL first, then each alias once, in the order given.
fn collect_domains(url: &SiteUrl, aliases: Option<&str>) -> Result<NonEmpty<Domain>, ValidationError> {
    let mut domains = NonEmpty::new(url.domain().clone());
    for raw in aliases.unwrap_or("").split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let domain = Domain::parse(raw).map_err(|source| ValidationError::Alias {
            domain: raw.to_string(),
            source,
        })?;
        if !domains.contains(&domain) {
            domains.push(domain);
        }
    }
    Ok(domains)
}

fn resolve_ssl(
    request: &SiteRequest,
    url: &SiteUrl,
    store: &dyn RecordStore,
) -> Result<SslMode, ValidationError> {
    match request.ssl {
        SslKind::None => Ok(SslMode::None),
        SslKind::SelfSigned => Ok(SslMode::SelfSigned),
        SslKind::Le => Ok(SslMode::Le),
        SslKind::Custom => {
            let (Some(key), Some(crt)) = (&request.ssl_key, &request.ssl_crt) else {
                return Err(ValidationError::CustomSslIncomplete);
            };
            for path in [key, crt] {
                if !path.is_file() {
                    return Err(ValidationError::SslFileMissing(path.clone()));
                }
            }
            Ok(SslMode::Custom {
                key: key.clone(),
                crt: crt.clone(),
            })
        }
        SslKind::Inherit => {
            let parent = url
                .domain()
                .parent()
                .and_then(|d| SiteUrl::parse(d.as_str()).ok())
                .ok_or_else(|| ValidationError::NoParentDomain(url.to_string()))?;
            match store.find(&parent)? {
                Some(record) if record.ssl.is_enabled() && record.ssl_wildcard => {
                    Ok(SslMode::Inherit)
                }
                _ => Err(ValidationError::ParentNotWildcard(parent.to_string())),
            }
        }
    }
}

fn resolve_database(request: &SiteRequest, url: &SiteUrl) -> Result<SiteDatabase, ValidationError> {
    let name = request
        .dbname
        .clone()
        .unwrap_or_else(|| url.default_db_name());
    let user = request
        .dbuser
        .clone()
        .unwrap_or_else(|| default_db_user(url));
    let password = request.dbpass.clone().unwrap_or_else(|| random_secret(16));

    if request.local_db {
        return Ok(SiteDatabase {
            mode: DbMode::Local,
            credentials: DbCredentials {
                host: LOCAL_DB_HOST.to_string(),
                port: DEFAULT_DB_PORT,
                name,
                user,
                password,
                root_password: Some(random_secret(16)),
            },
        });
    }

    let raw_host = request
        .dbhost
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .unwrap_or(SHARED_DB_HOST);

    if raw_host == SHARED_DB_HOST {
        return Ok(SiteDatabase {
            mode: DbMode::Shared,
            credentials: DbCredentials {
                host: SHARED_DB_HOST.to_string(),
                port: DEFAULT_DB_PORT,
                name,
                user,
                password,
                root_password: None,
            },
        });
    }

    if request.dbuser.is_none() || request.dbpass.is_none() {
        return Err(ValidationError::RemoteCredentialsRequired);
    }

    let (host, port) = match raw_host.split_once(':') {
        Some((host, "")) => (host, DEFAULT_DB_PORT),
        Some((host, port)) => (
            host,
            port.parse()
                .map_err(|_| ValidationError::DbPort(raw_host.to_string()))?,
        ),
        None => (raw_host, DEFAULT_DB_PORT),
    };

    Ok(SiteDatabase {
        mode: DbMode::Remote,
        credentials: DbCredentials {
            host: host.to_string(),
            port,
            name,
            user,
            password,
            root_password: None,
        },
    })
}

fn default_db_user(url: &SiteUrl) -> String {
    let base: String = url.as_str().chars().take(DB_USER_URL_LIMIT).collect();
    format!("{}-{}", base, random_secret(6))
}

fn normalize_public_dir(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed
        .split('/')
        .any(|part| part == ".." || part == "." || (part.is_empty() && !trimmed.is_empty()))
    {
        return Err(ValidationError::PublicDir(raw.to_string()));
    }
    Ok(trimmed.to_string())
}
