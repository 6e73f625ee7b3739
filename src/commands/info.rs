// ABOUTME: Info command: print a site's record as a table or JSON.

use super::find_site;
use sitewright::config::Settings;
use sitewright::error::Result;
use sitewright::output::{Output, OutputMode};
use sitewright::record::SiteRecord;
use std::fmt::Write;

pub fn info(settings: &Settings, url: &str, json: bool, output: &Output) -> Result<()> {
    let record = find_site(settings, url)?;
    if json && output.mode() != OutputMode::Json {
        println!(
            "{}",
            serde_json::to_string_pretty(&record).unwrap_or_default()
        );
    } else {
        output.record(record.site_url.as_str(), &record, &table(&record));
    }
    Ok(())
}

fn table(record: &SiteRecord) -> String {
    let aliases: Vec<&str> = record.aliases().map(|d| d.as_str()).collect();
    let mut rows = vec![
        ("Site", record.site_url.to_string()),
        ("Type", record.site_type.clone()),
        ("Root", record.site_fs_path.display().to_string()),
        ("Document root", record.site_container_fs_path.clone()),
        ("Aliases", aliases.join(", ")),
        ("PHP", record.php_version.to_string()),
        ("SSL", record.ssl.as_str().to_string()),
        ("SSL wildcard", record.ssl_wildcard.to_string()),
        ("Cache host", record.cache_host.clone().unwrap_or_default()),
        ("Admin email", record.admin_email.clone()),
    ];
    if let Some(db) = &record.database {
        rows.push(("DB host", db.credentials.address()));
        rows.push(("DB name", db.credentials.name.clone()));
        rows.push(("DB user", db.credentials.user.clone()));
        rows.push(("DB password", db.credentials.password.clone()));
    }
    rows.push(("Created", record.created_on.to_rfc3339()));

    let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    let mut out = String::new();
    for (key, value) in rows {
        let _ = writeln!(out, "{key:<width$}  {value}");
    }
    out
}
