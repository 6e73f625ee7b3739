// ABOUTME: SQLite-backed record store.
// ABOUTME: The site URL is the primary key, which serialises concurrent creates.

use super::{RecordError, RecordStore, SiteRecord};
use crate::types::SiteUrl;
use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use std::collections::BTreeSet;
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sites (
    site_url      TEXT PRIMARY KEY NOT NULL,
    alias_domains TEXT NOT NULL,
    record        TEXT NOT NULL,
    created_on    TEXT NOT NULL
);
";

pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Open (and create if needed) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, RecordError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, RecordError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, RecordError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl RecordStore for SqliteRecordStore {
    fn find(&self, url: &SiteUrl) -> Result<Option<SiteRecord>, RecordError> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT record FROM sites WHERE site_url = ?1",
                params![url.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn create(&self, record: &SiteRecord) -> Result<(), RecordError> {
        let json = serde_json::to_string(record)?;
        let aliases = record
            .alias_domains
            .iter()
            .map(|d| d.as_str())
            .collect::<Vec<_>>()
            .join(",");

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sites (site_url, alias_domains, record, created_on) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.site_url.as_str(),
                aliases,
                json,
                record.created_on.to_rfc3339()
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                RecordError::AlreadyExists(record.site_url.to_string())
            } else {
                RecordError::Store(e)
            }
        })?;

        tracing::debug!("site record created for {}", record.site_url);
        Ok(())
    }

    fn domains(&self) -> Result<BTreeSet<String>, RecordError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT site_url, alias_domains FROM sites")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut domains = BTreeSet::new();
        for row in rows {
            let (url, aliases) = row?;
            domains.insert(url);
            domains.extend(
                aliases
                    .split(',')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string),
            );
        }
        Ok(domains)
    }

    fn remove(&self, url: &SiteUrl) -> Result<(), RecordError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM sites WHERE site_url = ?1", params![url.as_str()])?;
        Ok(())
    }
}
