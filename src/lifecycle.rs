// ABOUTME: Restart and reload for services of an existing site.
// ABOUTME: Only whitelisted services are touched; db only when the site runs its own.

use crate::error::{Error, Result};
use crate::record::SiteRecord;
use crate::runtime::{ComposeOps, ComposeProject, ExecConfig, ExecOps};
use crate::site::{ServiceKind, SitePaths};
use crate::types::ContainerId;

/// Services selected on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceFlags {
    pub nginx: bool,
    pub php: bool,
    pub db: bool,
}

impl ServiceFlags {
    fn none(&self) -> bool {
        !(self.nginx || self.php || self.db)
    }
}

/// Services `restart` acts on. No flags means every whitelisted service.
pub fn restart_targets(record: &SiteRecord, flags: ServiceFlags) -> Result<Vec<ServiceKind>> {
    let local_db = record.has_local_db();
    if flags.db && !local_db {
        return Err(Error::ServiceCommand {
            service: ServiceKind::Db.to_string(),
            message: "site does not run a local database".to_string(),
        });
    }

    let all = flags.none();
    let mut services = Vec::new();
    if all || flags.nginx {
        services.push(ServiceKind::Nginx);
    }
    if all || flags.php {
        services.push(ServiceKind::Php);
    }
    if (all && local_db) || flags.db {
        services.push(ServiceKind::Db);
    }
    Ok(services)
}

/// Services `reload` acts on. No flags means nginx and php.
pub fn reload_targets(flags: ServiceFlags) -> Vec<ServiceKind> {
    let all = !(flags.nginx || flags.php);
    let mut services = Vec::new();
    if all || flags.nginx {
        services.push(ServiceKind::Nginx);
    }
    if all || flags.php {
        services.push(ServiceKind::Php);
    }
    services
}

fn project(record: &SiteRecord) -> ComposeProject {
    ComposeProject::new(
        record.site_url.prefix(),
        SitePaths::new(&record.site_fs_path).manifest(),
    )
}

pub async fn restart(
    compose: &dyn ComposeOps,
    record: &SiteRecord,
    services: &[ServiceKind],
) -> Result<()> {
    let names: Vec<&str> = services.iter().map(ServiceKind::as_str).collect();
    tracing::info!("restarting {} for {}", names.join(", "), record.site_url);
    compose.restart(&project(record), &names).await?;
    Ok(())
}

fn reload_command(service: ServiceKind) -> Option<ExecConfig> {
    match service {
        ServiceKind::Nginx => Some(ExecConfig::new([
            "sh",
            "-c",
            "nginx -t && nginx -s reload",
        ])),
        // php-fpm reloads its workers on USR2.
        ServiceKind::Php => Some(ExecConfig::new(["kill", "-USR2", "1"])),
        _ => None,
    }
}

/// Reload configuration inside running containers without restarting them.
pub async fn reload<R>(runtime: &R, record: &SiteRecord, services: &[ServiceKind]) -> Result<()>
where
    R: ExecOps + ?Sized,
{
    let prefix = record.site_url.prefix();
    for &service in services {
        let Some(config) = reload_command(service) else {
            continue;
        };
        let container = service.container_name(&prefix);
        tracing::debug!("reloading {} in {}", service, container);
        let result = runtime
            .exec(&ContainerId::new(container.as_str()), &config)
            .await?;
        if !result.success() {
            let stderr = result.stderr_lossy();
            return Err(Error::ServiceCommand {
                service: service.to_string(),
                message: format!("reload exited with {}: {}", result.exit_code, stderr.trim()),
            });
        }
    }
    Ok(())
}
