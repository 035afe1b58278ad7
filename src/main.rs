// EcoReceipt - command-line client for the EcoReceipt API
//
// Every run follows the same lifecycle:
// - Config: env > ~/.config/ecoreceipt/config.toml > defaults
// - Logging: stderr, plus optional JSON log files
// - Session: resume the stored session (no login call), refresh the dashboard
// - Command: dispatch, then report if the server ended the session

mod cli;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Commands};
use ecoreceipt::config::Config;
use ecoreceipt::session::SessionController;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config commands manage the file itself; no logging or session needed
    if let Commands::Config {
        show,
        reset,
        edit,
        path,
    } = cli.command
    {
        cli::handle_config(show, reset, edit, path);
        return Ok(());
    }

    // Ensure config template exists (helps users discover options)
    Config::ensure_config_exists();
    let config = Config::from_env();

    // The guard flushes file logs on drop, keep it for the whole run
    let _log_guard = ecoreceipt::logging::init(&config.logging);

    tracing::debug!(
        api_url = %config.api_url,
        session_file = %config.session_file.display(),
        timeout_secs = config.request_timeout_secs,
        "Starting ecoreceipt {}",
        ecoreceipt::config::VERSION
    );

    let mut controller =
        SessionController::from_config(&config).context("Failed to create HTTP client")?;

    controller.resume().await;

    cli::run(cli.command, &mut controller).await
}
