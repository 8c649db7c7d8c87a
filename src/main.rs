// ABOUTME: Entry point for the tether CLI application.
// ABOUTME: Parses arguments, sets up logging, and dispatches to command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use std::io::Write;
use tether::config::Settings;
use tether::diagnostics::Diagnostics;
use tether::error::Result;
use tether::output::{Output, OutputMode};
use tether::ssh::DialOptions;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cli.verbose)
        .with_writer(std::io::stderr)
        .init();

    let mut output = Output::new(OutputMode::from_flags(cli.quiet, cli.json));
    output.start_timer();
    let result = run(cli, &output).await;

    if output.mode() == OutputMode::Json {
        for warning in Diagnostics::global().warnings() {
            output.warning(&warning.message);
        }
    }

    std::io::stdout().flush().ok();
    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            output.error(&e.to_string(), e.code(), &e.suggestion());
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli, output: &Output) -> Result<i32> {
    let settings = Settings::load(cli.config.as_deref())?;
    let options = DialOptions::from_settings(&settings).with_env();

    match cli.command {
        Commands::Exec { target, command } => {
            commands::exec(&target, &command, &options, output).await
        }
        Commands::Run { target, command } => {
            commands::run(&target, &command, &options, output).await
        }
        Commands::Pty { target, command } => {
            commands::pty(&target, &command, &options, output).await
        }
        Commands::Shell { target } => commands::shell(&target, &options, output).await,
        Commands::Hosts => commands::hosts(&settings, output),
        Commands::Push {
            target,
            local,
            remote,
        } => commands::push(&target, &local, &remote, &options, output).await,
        Commands::Info { target } => commands::info(&target, &options, output).await,
    }
}
