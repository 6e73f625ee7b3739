// ABOUTME: Host-level settings for sitewright loaded from YAML.
// ABOUTME: Every key has a default so a missing config file is not an error.

use crate::error::{Error, Result};
use crate::runtime::RuntimeConfig;
use crate::types::ImageRef;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/sitewright/config.yml";

/// Environment variable naming a config file when `--config` is not given.
pub const CONFIG_ENV: &str = "SITEWRIGHT_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Directory under which each site gets `<sites_root>/<url>`.
    #[serde(default = "default_sites_root")]
    pub sites_root: PathBuf,

    /// SQLite file holding site records.
    #[serde(default = "default_database")]
    pub database: PathBuf,

    #[serde(default)]
    pub proxy: ProxySettings,

    #[serde(default)]
    pub shared: SharedServices,

    #[serde(default)]
    pub images: ImageSettings,

    #[serde(default)]
    pub timeouts: Timeouts,

    #[serde(default = "default_hosts_file")]
    pub hosts_file: PathBuf,

    #[serde(default)]
    pub tls: TlsSettings,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Program and leading arguments used to invoke compose.
    #[serde(default = "default_compose_command")]
    pub compose_command: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxySettings {
    /// Container that fronts every site; joined to each site network.
    #[serde(default = "default_proxy_container")]
    pub container: String,

    /// Address the readiness probe connects to.
    #[serde(default = "default_proxy_address")]
    pub address: String,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            container: default_proxy_container(),
            address: default_proxy_address(),
        }
    }
}

fn default_proxy_container() -> String {
    "sitewright-global-nginx-proxy".to_string()
}

fn default_proxy_address() -> String {
    "127.0.0.1:80".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SharedServices {
    /// Network shared by sites and global services.
    #[serde(default = "default_backend_network")]
    pub backend_network: String,

    /// Container running the shared database server.
    #[serde(default = "default_db_container")]
    pub db_container: String,
}

impl Default for SharedServices {
    fn default() -> Self {
        Self {
            backend_network: default_backend_network(),
            db_container: default_db_container(),
        }
    }
}

fn default_backend_network() -> String {
    "sitewright-global-backend-network".to_string()
}

fn default_db_container() -> String {
    "sitewright-global-db".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageSettings {
    #[serde(default = "default_nginx_image")]
    pub nginx: ImageRef,
    /// Repository for PHP; the tag is replaced by the site's PHP version.
    #[serde(default = "default_php_image")]
    pub php: ImageRef,
    #[serde(default = "default_postfix_image")]
    pub postfix: ImageRef,
    #[serde(default = "default_mariadb_image")]
    pub mariadb: ImageRef,
    #[serde(default = "default_redis_image")]
    pub redis: ImageRef,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            nginx: default_nginx_image(),
            php: default_php_image(),
            postfix: default_postfix_image(),
            mariadb: default_mariadb_image(),
            redis: default_redis_image(),
        }
    }
}

fn default_nginx_image() -> ImageRef {
    ImageRef::new("easyengine/nginx", "v4.9.0")
}

fn default_php_image() -> ImageRef {
    ImageRef::new("easyengine/php", "latest")
}

fn default_postfix_image() -> ImageRef {
    ImageRef::new("easyengine/postfix", "v4.9.0")
}

fn default_mariadb_image() -> ImageRef {
    ImageRef::new("easyengine/mariadb", "v4.9.0")
}

fn default_redis_image() -> ImageRef {
    ImageRef::new("easyengine/redis", "v4.9.0")
}

#[derive(Debug, Clone, Deserialize)]
pub struct Timeouts {
    /// Timeout for each container runtime API call.
    #[serde(default = "default_runtime_timeout", with = "humantime_serde")]
    pub runtime: Duration,

    /// Total time the readiness probe may take.
    #[serde(default = "default_status_timeout", with = "humantime_serde")]
    pub status_check: Duration,

    /// Timeout for compose invocations.
    #[serde(default = "default_compose_timeout", with = "humantime_serde")]
    pub compose: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            runtime: default_runtime_timeout(),
            status_check: default_status_timeout(),
            compose: default_compose_timeout(),
        }
    }
}

fn default_runtime_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_status_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_compose_timeout() -> Duration {
    Duration::from_secs(600)
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsSettings {
    /// Directory the proxy reads `<domain>.crt` / `<domain>.key` from.
    #[serde(default = "default_certs_dir")]
    pub certs_dir: PathBuf,

    /// Command run to obtain a Let's Encrypt certificate. The site URL and
    /// every alias are appended as arguments.
    #[serde(default)]
    pub acme_command: Option<Vec<String>>,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            certs_dir: default_certs_dir(),
            acme_command: None,
        }
    }
}

fn default_certs_dir() -> PathBuf {
    PathBuf::from("/opt/sitewright/services/nginx-proxy/certs")
}

fn default_sites_root() -> PathBuf {
    PathBuf::from("/opt/sitewright/sites")
}

fn default_database() -> PathBuf {
    PathBuf::from("/opt/sitewright/db/sites.sqlite")
}

fn default_hosts_file() -> PathBuf {
    PathBuf::from("/etc/hosts")
}

fn default_compose_command() -> Vec<String> {
    vec!["docker".to_string(), "compose".to_string()]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sites_root: default_sites_root(),
            database: default_database(),
            proxy: ProxySettings::default(),
            shared: SharedServices::default(),
            images: ImageSettings::default(),
            timeouts: Timeouts::default(),
            hosts_file: default_hosts_file(),
            tls: TlsSettings::default(),
            runtime: RuntimeConfig::default(),
            compose_command: default_compose_command(),
        }
    }
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load an explicit config file, else `$SITEWRIGHT_CONFIG`, else the
    /// default location if it exists.
    ///
    /// An explicit or env-named path that does not exist is an error; a
    /// missing default file yields built-in defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        match explicit.or(from_env.as_deref()) {
            Some(path) if !path.exists() => Err(Error::ConfigNotFound(path.to_path_buf())),
            Some(path) => Self::load(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::load(default)
                } else {
                    tracing::debug!("no config at {}, using defaults", DEFAULT_CONFIG_PATH);
                    Ok(Self::default())
                }
            }
        }
    }

    /// Filesystem root for one site.
    pub fn site_root(&self, url: &crate::types::SiteUrl) -> PathBuf {
        self.sites_root.join(url.as_str())
    }

    fn validate(&self) -> Result<()> {
        if self.compose_command.is_empty() {
            return Err(Error::InvalidConfig(
                "compose_command must name a program".to_string(),
            ));
        }
        if !self.sites_root.is_absolute() {
            return Err(Error::InvalidConfig(format!(
                "sites_root must be absolute: {}",
                self.sites_root.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let settings = Settings::from_yaml("{}").unwrap();
        assert_eq!(settings.sites_root, PathBuf::from("/opt/sitewright/sites"));
        assert_eq!(settings.timeouts.runtime, Duration::from_secs(120));
        assert_eq!(settings.compose_command, vec!["docker", "compose"]);
        assert_eq!(settings.images.php.tag(), "latest");
    }

    #[test]
    fn durations_use_humantime() {
        let yaml = r#"
timeouts:
  runtime: 30s
  status_check: 2m
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.timeouts.runtime, Duration::from_secs(30));
        assert_eq!(settings.timeouts.status_check, Duration::from_secs(120));
        assert_eq!(settings.timeouts.compose, Duration::from_secs(600));
    }

    #[test]
    fn rejects_relative_sites_root() {
        let err = Settings::from_yaml("sites_root: sites\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn rejects_empty_compose_command() {
        let err = Settings::from_yaml("compose_command: []\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = Settings::discover(Some(Path::new("/nonexistent/sitewright.yml"))).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(_)));
    }
}
