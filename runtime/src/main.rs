// Copyright 2026 Prospector Contributors
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code, unused_imports)]

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

mod audit;
mod auth;
mod browser;
mod capture;
mod cli;
mod config;
mod events;
mod harvest;
mod poll;
mod store;

#[derive(Parser)]
#[command(
    name = "prospector",
    about = "Prospector, a session-driven contact harvester",
    version,
    after_help = "Run 'prospector <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and harvest the configured saved list
    Run {
        /// Path to the config file
        #[arg(long, default_value = "config.json")]
        config: String,
        /// JSON output path (the CSV twin sits alongside)
        #[arg(long, default_value = "apollo_data.json")]
        output: String,
        /// Run the browser headless (challenges cannot be solved by hand)
        #[arg(long)]
        headless: bool,
        /// Override the configured page ceiling
        #[arg(long)]
        max_pages: Option<u32>,
    },
    /// Convert a JSON store to CSV
    Convert {
        /// JSON store to convert
        #[arg(default_value = "apollo_data.json")]
        json: String,
        /// CSV destination (defaults to the JSON path with .csv)
        #[arg(long)]
        csv: Option<String>,
    },
    /// Check environment and diagnose issues
    Doctor {
        /// Path to the config file
        #[arg(long, default_value = "config.json")]
        config: String,
    },
    /// Write a starter config file
    Init {
        /// Destination path
        #[arg(default_value = "config.json")]
        path: String,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var("PROSPECTOR_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("PROSPECTOR_QUIET", "1");
    }
    if cli.verbose {
        std::env::set_var("PROSPECTOR_VERBOSE", "1");
    }
    if cli.no_color {
        std::env::set_var("PROSPECTOR_NO_COLOR", "1");
    }

    let result = match cli.command {
        Commands::Run {
            config,
            output,
            headless,
            max_pages,
        } => cli::run_cmd::run(&config, &output, headless, max_pages).await,
        Commands::Convert { json, csv } => cli::convert_cmd::run(&json, csv.as_deref()).await,
        Commands::Doctor { config } => cli::doctor::run(&config).await,
        Commands::Init { path, force } => cli::init_cmd::run(&path, force).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "prospector", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if !cli::output::is_quiet() && !cli::output::is_json() {
            eprintln!("  Error: {e:#}");
        }
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        }
        std::process::exit(1);
    }

    result
}
