// ABOUTME: Durable site records and the store they live in.
// ABOUTME: A record is written once, after every provisioning stage succeeded.

mod sqlite;

pub use sqlite::SqliteRecordStore;

use crate::site::{CacheMode, SiteDatabase, SiteParams, SslMode};
use crate::types::{Domain, PhpVersion, SiteUrl};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Everything needed to operate on an existing site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub site_url: SiteUrl,
    pub site_type: String,
    pub site_fs_path: PathBuf,
    /// Document root inside the containers.
    pub site_container_fs_path: String,
    /// The site URL followed by every alias.
    pub alias_domains: Vec<Domain>,
    pub php_version: PhpVersion,
    pub cache: CacheMode,
    pub cache_host: Option<String>,
    pub ssl: SslMode,
    pub ssl_wildcard: bool,
    pub admin_email: String,
    pub app_sub_type: String,
    pub database: Option<SiteDatabase>,
    pub created_on: DateTime<Utc>,
}

impl SiteRecord {
    pub fn new(params: &SiteParams, created_on: DateTime<Utc>) -> Self {
        Self {
            site_url: params.url().clone(),
            site_type: "php".to_string(),
            site_fs_path: params.root().to_path_buf(),
            site_container_fs_path: params.container_docroot(),
            alias_domains: params.domains().iter().cloned().collect(),
            php_version: params.php(),
            cache: params.cache(),
            cache_host: params.cache().cache_host().map(str::to_string),
            ssl: params.ssl().clone(),
            ssl_wildcard: params.wildcard(),
            admin_email: params.admin_email().to_string(),
            app_sub_type: params.app_sub_type().to_string(),
            database: params.database().cloned(),
            created_on,
        }
    }

    /// Alias domains other than the site URL.
    pub fn aliases(&self) -> impl Iterator<Item = &Domain> {
        self.alias_domains
            .iter()
            .filter(|d| d.as_str() != self.site_url.as_str())
    }

    pub fn has_local_db(&self) -> bool {
        self.database
            .as_ref()
            .is_some_and(|db| db.mode == crate::site::DbMode::Local)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("site {0} already exists")]
    AlreadyExists(String),

    #[error("record store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("failed to create record store directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed site record: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Persistence for site records.
///
/// The store enforces URL uniqueness itself; a concurrent create for the same
/// URL fails with [`RecordError::AlreadyExists`].
pub trait RecordStore: Send + Sync {
    fn find(&self, url: &SiteUrl) -> Result<Option<SiteRecord>, RecordError>;

    fn create(&self, record: &SiteRecord) -> Result<(), RecordError>;

    /// Every site URL and alias domain currently claimed.
    fn domains(&self) -> Result<BTreeSet<String>, RecordError>;

    /// Delete a record. Removing a missing record is not an error.
    fn remove(&self, url: &SiteUrl) -> Result<(), RecordError>;
}
