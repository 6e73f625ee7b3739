// ABOUTME: Create command: validate the request, then run the provisioning workflow.
// ABOUTME: Rollback outcomes are reported as warnings before the error is returned.

use super::runtime_connection::connect_to_runtime;
use sitewright::config::Settings;
use sitewright::database::ContainerProbeLauncher;
use sitewright::diagnostics::Diagnostics;
use sitewright::error::Result;
use sitewright::hosts::HostsFile;
use sitewright::manifest::Templates;
use sitewright::output::Output;
use sitewright::record::SqliteRecordStore;
use sitewright::runtime::ComposeCli;
use sitewright::site::{Platform, SiteRequest, validate};
use sitewright::status::HttpStatusProbe;
use sitewright::tls::CommandIssuer;
use sitewright::workflow::{CancelToken, Collaborators, Provisioner};
use std::sync::Arc;

pub async fn create(
    settings: Settings,
    request: SiteRequest,
    cancel: CancelToken,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    let records = Arc::new(SqliteRecordStore::open(&settings.database)?);
    let mut diag = Diagnostics::default();

    let site = validate(&request, &settings, records.as_ref(), &mut diag)?;
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }
    output.progress(&format!("Creating site {}", site.url()));

    let runtime = Arc::new(connect_to_runtime(&settings, &output).await?);
    let collab = Collaborators {
        probes: Arc::new(ContainerProbeLauncher::new(
            runtime.clone(),
            settings.images.mariadb.clone(),
        )),
        runtime,
        compose: Arc::new(ComposeCli::new(
            settings.compose_command.clone(),
            settings.timeouts.compose,
        )),
        templates: Arc::new(Templates::embedded()?),
        records,
        hosts: Arc::new(HostsFile::new(settings.hosts_file.clone())),
        tls: Arc::new(CommandIssuer::new(
            settings.tls.certs_dir.clone(),
            settings.tls.acme_command.clone(),
            settings.timeouts.compose,
        )),
        status: Arc::new(HttpStatusProbe::new(
            settings.proxy.address.clone(),
            settings.timeouts.status_check,
        )),
        platform: Platform::current(),
        settings,
    };

    let mut diag = Diagnostics::default();
    match Provisioner::new(collab).create(&site, &cancel, &mut diag).await {
        Ok(record) => {
            output.success(&format!("Site {} created", record.site_url));
            Ok(())
        }
        Err(failure) => {
            output.progress(&format!(
                "  → Rolled back from level {}",
                failure.level
            ));
            for warning in diag.warnings() {
                output.warning(&warning.message);
            }
            Err(failure.into())
        }
    }
}
