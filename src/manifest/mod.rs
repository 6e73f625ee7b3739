// ABOUTME: Renders the compose manifest and auxiliary site files with tera.
// ABOUTME: Templates are embedded in the binary; rendering is deterministic.

mod context;

pub use context::ManifestContext;

use crate::site::{Platform, SiteParams, VolumeDescriptor, VolumeTable};
use crate::types::PhpVersion;
use std::collections::BTreeMap;
use tera::{Context, Tera};

pub const COMPOSE_TEMPLATE: &str = "docker-compose.yml";
pub const ENV_TEMPLATE: &str = ".env";
pub const MAIN_CONF_TEMPLATE: &str = "main.conf";
pub const INDEX_TEMPLATE: &str = "index.php";

const ALL_TEMPLATES: &[(&str, &str)] = &[
    (COMPOSE_TEMPLATE, include_str!("templates/docker-compose.yml.tera")),
    (ENV_TEMPLATE, include_str!("templates/env.tera")),
    (MAIN_CONF_TEMPLATE, include_str!("templates/main.conf.tera")),
    (INDEX_TEMPLATE, include_str!("templates/index.php.tera")),
];

const PHP_INI: &str = include_str!("templates/php.ini");
const PHP_INI_LEGACY: &str = include_str!("templates/php-5.6.ini");
const MY_CNF: &str = include_str!("templates/my.cnf");

/// Keys the compose template reads from the caller's context.
const COMPOSE_KEYS: &[&str] = &[
    "site_url",
    "site_prefix",
    "php_version",
    "is_ssl",
    "alias_domains",
    "virtual_host",
    "cache_host",
    "db_host",
    "platform",
    "nohttps",
    "nginx_image",
    "php_image",
    "postfix_image",
    "mariadb_image",
    "redis_image",
    "site_network",
    "backend_network",
    "join_backend",
    "local_redis",
    "user_id",
    "group_id",
];

const ENV_KEYS: &[&str] = &["virtual_host", "user_id", "group_id", "has_db"];
const MAIN_CONF_KEYS: &[&str] = &[
    "server_name",
    "document_root",
    "site_url",
    "include_php_conf",
    "include_redis_conf",
    "cache_host",
];
const INDEX_KEYS: &[&str] = &["version", "site_url", "site_src_root"];

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("template {0} is not registered")]
    MissingTemplate(String),

    #[error("template {template} needs context key '{key}'")]
    MissingKey { template: String, key: String },

    #[error("failed to render {template}: {source}")]
    Template {
        template: String,
        #[source]
        source: tera::Error,
    },
}

/// The embedded template set.
pub struct Templates {
    tera: Tera,
}

impl Templates {
    pub fn embedded() -> Result<Self, RenderError> {
        let mut tera = Tera::default();
        for (name, content) in ALL_TEMPLATES {
            tera.add_raw_template(name, content)
                .map_err(|source| RenderError::Template {
                    template: name.to_string(),
                    source,
                })?;
        }
        tracing::debug!("loaded {} embedded templates", ALL_TEMPLATES.len());
        Ok(Self { tera })
    }

    /// Render `template` after checking every key in `required` is present.
    pub fn render(
        &self,
        template: &str,
        context: &Context,
        required: &[&str],
    ) -> Result<String, RenderError> {
        if !self.tera.get_template_names().any(|name| name == template) {
            return Err(RenderError::MissingTemplate(template.to_string()));
        }
        if let Some(key) = required.iter().find(|key| !context.contains_key(key)) {
            return Err(RenderError::MissingKey {
                template: template.to_string(),
                key: key.to_string(),
            });
        }
        self.tera
            .render(template, context)
            .map_err(|source| RenderError::Template {
                template: template.to_string(),
                source,
            })
    }

    /// Render the compose manifest for a site.
    pub fn render_manifest(
        &self,
        ctx: &ManifestContext,
        volumes: &VolumeTable,
    ) -> Result<String, RenderError> {
        let mut context = ctx.to_tera();
        if let Some(key) = COMPOSE_KEYS.iter().find(|key| !context.contains_key(key)) {
            return Err(RenderError::MissingKey {
                template: COMPOSE_TEMPLATE.to_string(),
                key: key.to_string(),
            });
        }

        let prefix = ctx.get_str("site_prefix");
        let platform = ctx.platform();

        // A service block is rendered only when its kind has an entry here.
        let mut mounts: BTreeMap<&str, Vec<String>> = volumes
            .services()
            .map(|kind| (kind.as_str(), Vec::new()))
            .collect();
        let mut external = Vec::new();

        for (kind, descriptors) in volumes.iter() {
            let entry = mounts.entry(kind.as_str()).or_default();
            for descriptor in descriptors {
                let Some(source) = mount_source(descriptor, prefix, platform) else {
                    continue;
                };
                if source.named && !external.contains(&source.value) {
                    external.push(source.value.clone());
                }
                entry.push(format!("{}:{}", source.value, descriptor.container_path));
            }
        }

        context.insert("mounts", &mounts);
        context.insert("external_volumes", &external);
        self.render(COMPOSE_TEMPLATE, &context, COMPOSE_KEYS)
    }

    /// `.env` read by the php and db services.
    pub fn render_env(&self, site: &SiteParams, uid: u32, gid: u32) -> Result<String, RenderError> {
        let mut context = Context::new();
        context.insert("virtual_host", site.url().as_str());
        context.insert("user_id", &uid);
        context.insert("group_id", &gid);
        context.insert("has_db", &site.database().is_some());
        if let Some(db) = site.database() {
            let creds = &db.credentials;
            context.insert("local", &site.has_local_db());
            context.insert("root_password", creds.root_password.as_deref().unwrap_or(""));
            context.insert("database_host", &creds.address());
            context.insert("database_name", &creds.name);
            context.insert("database_user", &creds.user);
            context.insert("user_password", &creds.password);
        }
        self.render(ENV_TEMPLATE, &context, ENV_KEYS)
    }

    /// nginx server block for the site.
    pub fn render_main_conf(&self, site: &SiteParams) -> Result<String, RenderError> {
        let server_name = site
            .domains()
            .iter()
            .map(|d| d.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let cached = site.cache().is_enabled();

        let mut context = Context::new();
        context.insert("server_name", &server_name);
        context.insert("document_root", &site.container_docroot());
        context.insert("site_url", site.url().as_str());
        context.insert("include_php_conf", &!cached);
        context.insert("include_redis_conf", &cached);
        context.insert("cache_host", site.cache().cache_host().unwrap_or(""));
        self.render(MAIN_CONF_TEMPLATE, &context, MAIN_CONF_KEYS)
    }

    /// Placeholder index page for the document root.
    pub fn render_index(&self, site: &SiteParams) -> Result<String, RenderError> {
        let mut context = Context::new();
        context.insert("version", concat!("v", env!("CARGO_PKG_VERSION")));
        context.insert("site_url", site.url().as_str());
        context.insert("site_src_root", &site.container_docroot());
        self.render(INDEX_TEMPLATE, &context, INDEX_KEYS)
    }
}

/// `custom.ini` for the given runtime.
pub fn php_ini(version: PhpVersion) -> &'static str {
    if version.is_legacy() {
        PHP_INI_LEGACY
    } else {
        PHP_INI
    }
}

/// `my.cnf` for a local database.
pub fn my_cnf() -> &'static str {
    MY_CNF
}

struct MountSource {
    value: String,
    named: bool,
}

/// Where a descriptor's data comes from on `platform`, or `None` if it is
/// not mounted there.
fn mount_source(
    descriptor: &VolumeDescriptor,
    prefix: &str,
    platform: Platform,
) -> Option<MountSource> {
    if !descriptor.applies_to(platform) {
        return None;
    }
    let Some(host_path) = &descriptor.host_path else {
        return Some(MountSource {
            value: descriptor.name.clone(),
            named: true,
        });
    };
    if platform == Platform::Linux && !descriptor.skip_volume {
        return Some(MountSource {
            value: format!("{}_{}", prefix, descriptor.name),
            named: true,
        });
    }
    Some(MountSource {
        value: host_path.display().to_string(),
        named: false,
    })
}
