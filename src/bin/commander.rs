// src/bin/commander.rs

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use commander::{CancellationToken, cli};

/// The main entry point of the `commander` binary.
/// Loads settings, sets up logging and interrupt handling, then runs the input.
fn main() {
    let code = match start(cli::Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("\n{}: {:#}", "Error".red().bold(), e);
            1
        }
    };
    std::process::exit(code);
}

fn start(args: cli::Cli) -> Result<i32> {
    let config = cli::load_settings(&args)?;
    cli::init_logging(args.verbose, &config);
    log::debug!("CLI args parsed: {:?}", args);

    let cancellation = CancellationToken::new();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .context("Failed to start the signal runtime")?;
    runtime.spawn(watch_interrupts(cancellation.clone()));

    let code = cli::run(&args, &config, &cancellation)?;
    runtime.shutdown_background();
    Ok(code)
}

/// First Ctrl-C cancels the running pipeline; a second one exits immediately.
async fn watch_interrupts(cancellation: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("Could not listen for Ctrl-C: {}", e);
        return;
    }
    log::warn!("Interrupt received, cancelling running commands.");
    cancellation.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        std::process::exit(130);
    }
}
