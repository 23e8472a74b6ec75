// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! dmpilot - multi-tenant Instagram DM auto-reply service.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod send;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dmpilot_config::DmpilotConfig;

/// dmpilot - multi-tenant Instagram DM auto-reply service.
#[derive(Parser, Debug)]
#[command(name = "dmpilot", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Run the webhook gateway and the reply workers (default).
    Serve,
    /// Validate configuration and print a summary.
    CheckConfig,
    /// Send a reply withheld by manual review.
    Send {
        /// Row id of the stored reply.
        message_id: i64,
    },
}

fn load_config(path: Option<&PathBuf>) -> DmpilotConfig {
    let loaded = match path {
        Some(path) => dmpilot_config::load_and_validate_path(path),
        None => dmpilot_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            dmpilot_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Commands::CheckConfig => {
            for line in serve::config_summary(&config) {
                println!("{line}");
            }
            for warning in serve::startup_warnings(&config) {
                eprintln!("warning: {warning}");
            }
        }
        Commands::Send { message_id } => match send::run_send(config, message_id).await {
            Ok(outcome) => {
                println!("{}", send::describe(message_id, outcome));
                if !send::succeeded(outcome) {
                    std::process::exit(1);
                }
            }
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        },
    }
}
