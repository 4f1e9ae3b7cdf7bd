// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

mod config;
mod error;
mod locker;
mod metrics;
mod simulate;
mod utils;

use clap::{Parser, Subcommand};
use error::result_to_exit_code;
use std::process::ExitCode;

/// Strobe CLI - Flash sequencer simulation and buffer locker exercise tool
#[derive(Parser)]
#[command(name = "strobe")]
#[command(version)]
#[command(about = "Strobe CLI - Flash sequencer simulation and buffer locker exercise tool")]
#[command(long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (use RUST_LOG=trace for per-frame state)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output results in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run flash episodes against simulated hardware and report metrics
    Simulate(simulate::Args),

    /// Exercise a buffer locker with submission and completion threads
    Locker(locker::Args),

    /// Print the effective flash configuration
    Config(config::Args),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Simulate(args) => simulate::execute(args, cli.json),
        Commands::Locker(args) => locker::execute(args, cli.json),
        Commands::Config(args) => config::execute(args, cli.json),
    };

    result_to_exit_code(result)
}

/// Initialize env_logger based on verbosity flags
fn init_logging(verbose: bool, quiet: bool) {
    let env = env_logger::Env::default();

    let env = if quiet {
        env.default_filter_or("error")
    } else if verbose {
        env.default_filter_or("debug")
    } else {
        env.default_filter_or("info")
    };

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .init();

    log::debug!("Logging initialized");
}
