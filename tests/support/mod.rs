// ABOUTME: Test support utilities.
// ABOUTME: Tracing setup and a throwaway settings file pointing into a temp dir.

use std::path::{Path, PathBuf};
use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("sitewright=debug".parse().unwrap())
            .add_directive("bollard=info".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Write a config file whose sites, records and hosts file all live in `dir`.
#[allow(dead_code)]
pub fn write_settings(dir: &Path) -> PathBuf {
    let hosts = dir.join("hosts");
    std::fs::write(&hosts, "127.0.0.1\tlocalhost\n").unwrap();

    let path = dir.join("config.yml");
    let yaml = format!(
        "sites_root: {}\ndatabase: {}\nhosts_file: {}\n",
        dir.join("sites").display(),
        dir.join("db/sites.sqlite").display(),
        hosts.display(),
    );
    std::fs::write(&path, yaml).unwrap();
    path
}
