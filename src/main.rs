// ABOUTME: Entry point for the sitewright CLI.
// ABOUTME: Sets up logging and signal handling, then dispatches to command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands, InfoFormat};
use sitewright::config::Settings;
use sitewright::error::Result;
use sitewright::output::{Output, OutputMode};
use sitewright::workflow::CancelToken;
use tokio::signal::unix::{SignalKind, signal};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = OutputMode::from_flags(cli.quiet, cli.json);
    if let Err(e) = run(cli, mode).await {
        Output::new(mode).error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, mode: OutputMode) -> Result<()> {
    let settings = Settings::discover(cli.config.as_deref())?;
    let output = Output::new(mode);

    match cli.command {
        Commands::Create(args) => {
            // SIGINT and SIGTERM cancel the workflow; rollback still runs.
            let cancel = CancelToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                tracing::warn!("interrupted, rolling back");
                on_signal.cancel();
            });
            commands::create(settings, args.into(), cancel, output).await
        }
        Commands::Info { url, format } => {
            commands::info(&settings, &url, format == InfoFormat::Json, &output)
        }
        Commands::Restart { url, services } => {
            commands::restart(&settings, &url, services.into(), &output).await
        }
        Commands::Reload { url, services } => {
            commands::reload(&settings, &url, services.into(), &output).await
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("cannot listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
