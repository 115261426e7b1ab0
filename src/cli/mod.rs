// src/cli/mod.rs

use crate::{
    CancellationToken,
    core::{
        config_loader::{apply_env_overrides, load_config},
        converter::DefaultConverter,
        executor::{ExecutionFault, Executor, Outcome},
        registry::Registry,
    },
    models::CommanderConfig,
};
use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::{
    io::{self, BufRead},
    path::PathBuf,
    sync::Arc,
};

pub mod commands;

/// commander: runs pipelines of typed commands.
///
/// The trailing words form one input line, e.g.
/// `commander echo hi -n 2 '|' sleep 500 -async`. Without input, every line read
/// from stdin is run as its own pipeline.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a `commander.toml` to use instead of the default location.
    #[arg(long, short, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Worker threads for `-async` commands. Overrides config and environment.
    #[arg(long, short = 'j', value_name = "N")]
    pub concurrency: Option<usize>,

    /// Increases log verbosity (-v debug, -vv trace) unless RUST_LOG is set.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// The pipeline to run.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "INPUT")]
    pub input: Vec<String>,
}

/// Loads the config file and applies environment overrides.
pub fn load_settings(cli: &Cli) -> Result<CommanderConfig> {
    let mut config = load_config(cli.config.as_deref())?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    Ok(config)
}

/// The log filter used when `RUST_LOG` is absent.
pub fn log_filter(verbose: u8, config: &CommanderConfig) -> String {
    match verbose {
        0 => config.log_level.clone().unwrap_or_else(|| "warn".to_string()),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

pub fn init_logging(verbose: u8, config: &CommanderConfig) {
    let filter = log_filter(verbose, config);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp_millis()
        .init();
}

/// Wraps `value` in quotes, escaping internal quotes.
fn wrap_value(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\\\""))
}

/// Re-joins shell words into one input line. Words the shell had to quote are
/// quoted again so they stay single tokens.
pub fn join_input(words: &[String]) -> String {
    words
        .iter()
        .map(|word| {
            if word.is_empty() || word.contains(char::is_whitespace) || word.contains('"') {
                wrap_value(word)
            } else {
                word.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builds the registry of built-in commands and an executor over it.
pub fn build_executor(concurrency: usize) -> Result<Executor> {
    let handle = commands::RegistryHandle::default();
    let mut registry = Registry::new(Arc::new(DefaultConverter::new()));
    commands::register_builtins(&mut registry, &handle)
        .context("Failed to register the built-in commands")?;
    let registry = Arc::new(registry);
    if handle.set(registry.clone()).is_err() {
        anyhow::bail!("Internal error: command registry was initialized twice.");
    }
    Executor::for_registry(registry, concurrency).context("Failed to start the worker pool")
}

/// Runs the CLI input, or stdin line by line, and returns the process exit code.
pub fn run(cli: &Cli, config: &CommanderConfig, cancellation: &CancellationToken) -> Result<i32> {
    let concurrency = cli
        .concurrency
        .filter(|&n| n > 0)
        .unwrap_or_else(|| config.executor.concurrency());
    let executor = build_executor(concurrency)?;
    log::debug!("Executor ready with {} worker(s).", executor.concurrency());

    if !cli.input.is_empty() {
        return Ok(run_line(&executor, &join_input(&cli.input), cancellation));
    }

    let mut exit_code = 0;
    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read from stdin")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let code = run_line(&executor, line, cancellation);
        if code != 0 {
            exit_code = code;
        }
        if cancellation.is_cancelled() {
            log::debug!("Stopped reading stdin after an interrupt.");
            break;
        }
    }
    Ok(exit_code)
}

fn run_line(executor: &Executor, input: &str, cancellation: &CancellationToken) -> i32 {
    match executor.execute_with(input, cancellation, &print_fault) {
        Ok(report) => {
            if let Outcome::Cancelled = report.outcome {
                eprintln!(
                    "{} {} command(s) did not finish.",
                    "Cancelled:".yellow().bold(),
                    report.cancelled.len()
                );
            }
            report.exit_code()
        }
        Err(e) => {
            eprintln!("{} ({}): {}", "Error".red().bold(), e.phase(), e);
            1
        }
    }
}

fn print_fault(fault: &ExecutionFault) {
    eprintln!("{}: {}", "Error".red().bold(), fault);
}
