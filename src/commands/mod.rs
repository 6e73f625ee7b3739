// ABOUTME: Command handlers for the sitewright CLI.
// ABOUTME: Each opens the record store and settings-driven collaborators it needs.

mod create;
mod info;
mod lifecycle;
mod runtime_connection;

pub use create::create;
pub use info::info;
pub use lifecycle::{reload, restart};

use sitewright::config::Settings;
use sitewright::error::{Error, Result};
use sitewright::record::{RecordStore, SiteRecord, SqliteRecordStore};
use sitewright::types::SiteUrl;

/// Look up an existing site by URL.
fn find_site(settings: &Settings, url: &str) -> Result<SiteRecord> {
    let url = SiteUrl::parse(url).map_err(|_| Error::SiteNotFound(url.to_string()))?;
    let store = SqliteRecordStore::open(&settings.database)?;
    store
        .find(&url)?
        .ok_or_else(|| Error::SiteNotFound(url.to_string()))
}
