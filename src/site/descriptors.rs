// ABOUTME: Declarative volume table for a site's services.
// ABOUTME: Pure: the same parameters always produce the same ordered table.

use super::{Platform, ServiceKind, SiteParams};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;

/// Global volume shared by every site's php container.
pub const NEWRELIC_VOLUME: &str = "newrelic_sock";

/// One mount of one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeDescriptor {
    /// Volume name without the site prefix.
    pub name: String,
    /// Host path linked to the volume, or bind-mounted directly. `None` marks
    /// a shared global volume.
    pub host_path: Option<PathBuf>,
    pub container_path: String,
    pub skip_darwin: bool,
    pub skip_linux: bool,
    /// Never pre-created as a named volume.
    pub skip_volume: bool,
}

impl VolumeDescriptor {
    fn new(name: &str, host_path: PathBuf, container_path: &str) -> Self {
        Self {
            name: name.to_string(),
            host_path: Some(host_path),
            container_path: container_path.to_string(),
            skip_darwin: false,
            skip_linux: false,
            skip_volume: false,
        }
    }

    fn shared(name: &str, container_path: &str) -> Self {
        Self {
            name: name.to_string(),
            host_path: None,
            container_path: container_path.to_string(),
            skip_darwin: false,
            skip_linux: false,
            skip_volume: true,
        }
    }

    fn darwin_only(mut self) -> Self {
        self.skip_linux = true;
        self
    }

    fn linux_only(mut self) -> Self {
        self.skip_darwin = true;
        self
    }

    fn bind_only(mut self) -> Self {
        self.skip_volume = true;
        self
    }

    /// Whether this mount exists at all on `platform`.
    pub fn applies_to(&self, platform: Platform) -> bool {
        match platform {
            Platform::Linux => !self.skip_linux,
            Platform::Darwin => !self.skip_darwin,
        }
    }

    /// Whether this mount is backed by a site-owned named volume.
    pub fn is_site_volume(&self) -> bool {
        !self.skip_volume && self.host_path.is_some()
    }
}

/// Ordered mounts per service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeTable {
    services: Vec<(ServiceKind, Vec<VolumeDescriptor>)>,
}

impl VolumeTable {
    pub fn iter(&self) -> impl Iterator<Item = (ServiceKind, &[VolumeDescriptor])> {
        self.services.iter().map(|(kind, v)| (*kind, v.as_slice()))
    }

    pub fn services(&self) -> impl Iterator<Item = ServiceKind> + '_ {
        self.services.iter().map(|(kind, _)| *kind)
    }

    pub fn get(&self, kind: ServiceKind) -> Option<&[VolumeDescriptor]> {
        self.services
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, v)| v.as_slice())
    }

    /// Site volumes to pre-create on `platform`, first occurrence per name.
    pub fn site_volumes(&self, platform: Platform) -> Vec<&VolumeDescriptor> {
        let mut seen = HashSet::new();
        self.services
            .iter()
            .flat_map(|(_, v)| v.iter())
            .filter(|d| d.is_site_volume() && d.applies_to(platform))
            .filter(|d| seen.insert(d.name.as_str()))
            .collect()
    }
}

/// Build the volume table for a site.
pub fn build_volumes(site: &SiteParams) -> VolumeTable {
    let paths = site.paths();

    let mut services = vec![
        (
            ServiceKind::Nginx,
            vec![
                VolumeDescriptor::new("htdocs", paths.app(), "/var/www"),
                VolumeDescriptor::new(
                    "config_nginx",
                    paths.nginx_conf(),
                    "/usr/local/openresty/nginx/conf",
                )
                .linux_only(),
                VolumeDescriptor::new(
                    "config_nginx",
                    paths.nginx_main_conf(),
                    "/usr/local/openresty/nginx/conf/conf.d/main.conf",
                )
                .darwin_only()
                .bind_only(),
                VolumeDescriptor::new("log_nginx", paths.nginx_logs(), "/var/log/nginx"),
            ],
        ),
        (
            ServiceKind::Php,
            vec![
                VolumeDescriptor::new("htdocs", paths.app(), "/var/www"),
                VolumeDescriptor::new("config_php", paths.php_conf(), "/usr/local/etc").linux_only(),
                VolumeDescriptor::new(
                    "config_php",
                    paths.php_custom_ini(),
                    "/usr/local/etc/php/php/conf.d/custom.ini",
                )
                .darwin_only()
                .bind_only(),
                VolumeDescriptor::new("log_php", paths.php_logs(), "/var/log/php"),
                VolumeDescriptor::shared(NEWRELIC_VOLUME, "/run/newrelic").linux_only(),
            ],
        ),
        (
            ServiceKind::Postfix,
            vec![
                VolumeDescriptor::new("/dev/log", PathBuf::from("/dev/log"), "/dev/log")
                    .bind_only()
                    .linux_only(),
                VolumeDescriptor::new("data_postfix", paths.postfix_spool(), "/var/spool/postfix"),
                VolumeDescriptor::new("ssl_postfix", paths.postfix_ssl(), "/etc/ssl/postfix"),
                VolumeDescriptor::new("config_postfix", paths.postfix_conf(), "/etc/postfix")
                    .linux_only(),
            ],
        ),
    ];

    if site.has_local_db() {
        services.push((
            ServiceKind::Db,
            vec![
                VolumeDescriptor::new("db_data", paths.db_data(), "/var/lib/mysql"),
                VolumeDescriptor::new("db_conf", paths.db_conf(), "/etc/mysql").linux_only(),
                VolumeDescriptor::new("db_conf", paths.db_my_cnf(), "/etc/mysql/my.cnf")
                    .darwin_only()
                    .bind_only(),
                VolumeDescriptor::new("db_logs", paths.db_logs(), "/var/log/mysql"),
            ],
        ));
    }

    VolumeTable { services }
}
