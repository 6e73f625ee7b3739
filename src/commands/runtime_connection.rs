// ABOUTME: Shared helper for connecting to the local container runtime.
// ABOUTME: Used by every command that touches containers.

use sitewright::config::Settings;
use sitewright::error::Result;
use sitewright::output::Output;
use sitewright::runtime::{BollardRuntime, connect};

/// Detect the runtime configured in `settings`, connect and ping it.
pub async fn connect_to_runtime(settings: &Settings, output: &Output) -> Result<BollardRuntime> {
    output.progress("  → Connecting to container runtime...");
    let runtime = connect(&settings.runtime, settings.timeouts.runtime).await?;
    output.progress(&format!("  → Using {}", runtime.runtime_type()));
    Ok(runtime)
}
