//! outboxctl - command-line front end for the outbox mutation queue

use std::process::ExitCode;

use clap::Parser;
use log::warn;

mod args;
mod commands;

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config and data directories
    if let Err(e) = config::init() {
        warn!("Failed to initialize outbox directories: {:#}", e);
    }

    let cli = args::Cli::parse();
    match commands::run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
