// ABOUTME: Restart and reload commands for services of an existing site.

use super::find_site;
use super::runtime_connection::connect_to_runtime;
use sitewright::config::Settings;
use sitewright::error::Result;
use sitewright::lifecycle::{self, ServiceFlags};
use sitewright::output::Output;
use sitewright::runtime::ComposeCli;
use sitewright::site::ServiceKind;

fn names(services: &[ServiceKind]) -> String {
    services
        .iter()
        .map(ServiceKind::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

pub async fn restart(settings: &Settings, url: &str, flags: ServiceFlags, output: &Output) -> Result<()> {
    let record = find_site(settings, url)?;
    let services = lifecycle::restart_targets(&record, flags)?;
    output.progress(&format!("Restarting {} for {}", names(&services), record.site_url));

    let compose = ComposeCli::new(settings.compose_command.clone(), settings.timeouts.compose);
    lifecycle::restart(&compose, &record, &services).await?;
    output.success(&format!("Restarted {} for {}", names(&services), record.site_url));
    Ok(())
}

pub async fn reload(settings: &Settings, url: &str, flags: ServiceFlags, output: &Output) -> Result<()> {
    let record = find_site(settings, url)?;
    let services = lifecycle::reload_targets(flags);
    let runtime = connect_to_runtime(settings, output).await?;

    lifecycle::reload(&runtime, &record, &services).await?;
    output.success(&format!("Reloaded {} for {}", names(&services), record.site_url));
    Ok(())
}
