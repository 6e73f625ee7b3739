// ABOUTME: Library root for sitewright: site provisioning with staged rollback.
// ABOUTME: The CLI binary in main.rs drives these modules.

pub mod config;
pub mod database;
pub mod diagnostics;
pub mod error;
pub mod hosts;
pub mod io;
pub mod lifecycle;
pub mod manifest;
pub mod output;
pub mod provision;
pub mod record;
pub mod runtime;
pub mod site;
pub mod status;
pub mod tls;
pub mod types;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;
