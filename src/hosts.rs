// ABOUTME: Local name resolution for sites without a public certificate.
// ABOUTME: Each site owns one marker-delimited block in the hosts file.

use crate::types::{Domain, SiteUrl};
use std::path::{Path, PathBuf};

const LOOPBACK: &str = "127.0.0.1";

pub trait HostsRegistry: Send + Sync {
    /// Point the site's domains at the loopback address. Replaces any block
    /// already present for the site.
    fn add(&self, url: &SiteUrl, domains: &[Domain]) -> std::io::Result<()>;

    /// Remove the site's block. A missing block or file is not an error.
    fn remove(&self, url: &SiteUrl) -> std::io::Result<()>;
}

/// Edits a hosts file in place.
pub struct HostsFile {
    path: PathBuf,
}

impl HostsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> std::io::Result<String> {
        match std::fs::read_to_string(&self.path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            other => other,
        }
    }

    // /etc/hosts is often a bind mount, which cannot be replaced by rename.
    fn write(&self, content: &str) -> std::io::Result<()> {
        std::fs::write(&self.path, content)
    }
}

impl HostsRegistry for HostsFile {
    fn add(&self, url: &SiteUrl, domains: &[Domain]) -> std::io::Result<()> {
        let names: Vec<&str> = domains
            .iter()
            .filter(|d| !d.is_wildcard())
            .map(|d| d.as_str())
            .collect();
        let line = format!("{} {}", LOOPBACK, names.join(" "));
        let content = self.read()?;
        let updated = with_block(&content, url.as_str(), Some(&line));
        if updated != content {
            tracing::debug!("adding hosts entry for {} to {}", url, self.path.display());
            self.write(&updated)?;
        }
        Ok(())
    }

    fn remove(&self, url: &SiteUrl) -> std::io::Result<()> {
        let content = self.read()?;
        let updated = with_block(&content, url.as_str(), None);
        if updated != content {
            tracing::debug!("removing hosts entry for {}", url);
            self.write(&updated)?;
        }
        Ok(())
    }
}

fn markers(site: &str) -> (String, String) {
    (
        format!("# sitewright:{site}:begin"),
        format!("# sitewright:{site}:end"),
    )
}

/// `content` with the block for `site` set to `line`, or removed when `None`.
fn with_block(content: &str, site: &str, line: Option<&str>) -> String {
    let (begin, end) = markers(site);
    let mut out = Vec::new();
    let mut inside = false;

    for current in content.lines() {
        if current.trim() == begin {
            inside = true;
            continue;
        }
        if inside {
            if current.trim() == end {
                inside = false;
            }
            continue;
        }
        out.push(current.to_string());
    }

    if let Some(line) = line {
        out.push(begin);
        out.push(line.to_string());
        out.push(end);
    }

    let mut text = out.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    text
}
