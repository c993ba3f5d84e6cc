//! GatorPay - wallet API server and admin CLI

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gatorpay_core::config::{Config, LogFormat};
use gatorpay_core::services::{EntryPoint, LogEvent};

mod api;
mod commands;
mod logging;
mod output;

use commands::{doctor, logs, migrate, serve, user, wallet};

/// GatorPay - digital wallet backend
#[derive(Parser)]
#[command(name = "gatorpay", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    Serve {
        /// Port to listen on (defaults to PORT or 8080)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Apply pending schema migrations
    Migrate {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check ledger integrity
    Doctor {
        /// Show detailed findings
        #[arg(long, short)]
        verbose: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Administer wallets
    Wallet {
        #[command(subcommand)]
        command: wallet::WalletCommands,
    },

    /// Administer user accounts
    User {
        #[command(subcommand)]
        command: user::UserCommands,
    },

    /// View the activity log
    Logs {
        #[command(subcommand)]
        command: Option<logs::LogsCommands>,
        /// Number of entries to show
        #[arg(long, default_value = "50")]
        limit: usize,
        /// Only show failures
        #[arg(long)]
        errors: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Serve { .. } => "serve",
            Commands::Migrate { .. } => "migrate",
            Commands::Doctor { .. } => "doctor",
            Commands::Wallet { .. } => "wallet",
            Commands::User { .. } => "user",
            Commands::Logs { .. } => "logs",
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // A broken config file is reported by the command itself
    let format = commands::get_data_dir()
        .ok()
        .and_then(|dir| Config::load(&dir).ok())
        .map(|config| config.log_format)
        .unwrap_or(LogFormat::Pretty);
    logging::init_tracing(format);

    if !matches!(cli.command, Commands::Serve { .. }) {
        let logger = commands::get_logger(EntryPoint::Cli);
        commands::log_event(&logger, LogEvent::new("command_run").with_command(cli.command.name()));
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve { port } => serve::run(port),
        Commands::Migrate { json } => migrate::run(json),
        Commands::Doctor { verbose, json } => doctor::run(verbose, json),
        Commands::Wallet { command } => wallet::run(command),
        Commands::User { command } => user::run(command),
        Commands::Logs {
            command,
            limit,
            errors,
            json,
        } => match command {
            Some(command) => logs::run(command),
            None => logs::list(limit, errors, json),
        },
    }
}
