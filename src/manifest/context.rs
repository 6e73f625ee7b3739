// ABOUTME: Ordered key/value context for the compose template.
// ABOUTME: Built from validated site parameters; keys can be overridden before rendering.

use crate::config::Settings;
use crate::site::{CacheMode, DbMode, Platform, SiteParams};
use serde_json::Value;
use std::collections::BTreeMap;

/// Template context for the compose manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestContext {
    values: BTreeMap<String, Value>,
}

impl ManifestContext {
    pub fn new(
        site: &SiteParams,
        settings: &Settings,
        platform: Platform,
        uid: u32,
        gid: u32,
    ) -> Self {
        let images = &settings.images;
        let php_image = images.php.with_tag(site.php().as_str());
        let aliases = site
            .aliases()
            .map(|d| d.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let virtual_host = site
            .domains()
            .iter()
            .map(|d| d.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let shared_db = matches!(site.database().map(|db| db.mode), Some(DbMode::Shared));
        let db_host = site
            .database()
            .map(|db| db.credentials.address())
            .unwrap_or_default();

        let mut ctx = Self {
            values: BTreeMap::new(),
        };
        ctx.insert("site_url", site.url().as_str());
        ctx.insert("site_prefix", site.prefix());
        ctx.insert("php_version", site.php().as_str());
        ctx.insert("is_ssl", site.ssl().is_enabled());
        ctx.insert("alias_domains", aliases);
        ctx.insert("virtual_host", virtual_host);
        ctx.insert("cache_host", site.cache().cache_host().unwrap_or(""));
        ctx.insert("db_host", db_host);
        ctx.insert(
            "platform",
            match platform {
                Platform::Linux => "linux",
                Platform::Darwin => "darwin",
            },
        );
        ctx.insert("nohttps", !site.ssl().is_enabled());
        ctx.insert("nginx_image", images.nginx.to_string());
        ctx.insert("php_image", php_image.to_string());
        ctx.insert("postfix_image", images.postfix.to_string());
        ctx.insert("mariadb_image", images.mariadb.to_string());
        ctx.insert("redis_image", images.redis.to_string());
        ctx.insert("site_network", site.url().as_str());
        ctx.insert("backend_network", settings.shared.backend_network.as_str());
        ctx.insert(
            "join_backend",
            site.cache() == CacheMode::Shared || shared_db,
        );
        ctx.insert("local_redis", site.cache() == CacheMode::Local);
        ctx.insert("user_id", uid);
        ctx.insert("group_id", gid);
        ctx
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// String value of `key`, empty when absent or not a string.
    pub fn get_str(&self, key: &str) -> &str {
        self.values.get(key).and_then(Value::as_str).unwrap_or("")
    }

    pub fn platform(&self) -> Platform {
        match self.get_str("platform") {
            "darwin" => Platform::Darwin,
            _ => Platform::Linux,
        }
    }

    pub(super) fn to_tera(&self) -> tera::Context {
        let mut context = tera::Context::new();
        for (key, value) in &self.values {
            context.insert(key.as_str(), value);
        }
        context
    }
}
