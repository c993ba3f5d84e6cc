//! Logs command - view and manage the activity log

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use gatorpay_core::services::{EntryPoint, LoggingService};

use super::get_data_dir;
use crate::output::{self, format_timestamp};

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Delete old log entries
    Clear {
        /// Delete logs older than N days
        #[arg(long, default_value = "30")]
        older_than_days: u64,
        /// Required to actually delete
        #[arg(long, short = 'f')]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show log statistics and database path
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn get_logging_service() -> Result<LoggingService> {
    let data_dir = get_data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;
    LoggingService::new(&data_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION"))
        .context("Failed to open activity log")
}

/// List recent entries, or only failures with `errors`
pub fn list(limit: usize, errors: bool, json: bool) -> Result<()> {
    let service = get_logging_service()?;
    let entries = if errors {
        service.get_errors(limit)?
    } else {
        service.get_recent(limit)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No log entries found.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Time", "Entry", "Event", "Context", "Error"]);

    for entry in entries {
        let context = [entry.command.as_deref(), entry.operation.as_deref()]
            .iter()
            .filter_map(|&s| s)
            .collect::<Vec<_>>()
            .join(", ");

        let error = match (&entry.error_kind, &entry.error_message) {
            (Some(kind), _) => kind.red().to_string(),
            (None, Some(_)) => "!".red().to_string(),
            (None, None) => String::new(),
        };

        table.add_row(vec![
            format_timestamp(entry.timestamp),
            entry.entry_point,
            entry.event,
            context,
            error,
        ]);
    }

    println!("{}", table);
    Ok(())
}

pub fn run(command: LogsCommands) -> Result<()> {
    match command {
        LogsCommands::Clear {
            older_than_days,
            force,
            json,
        } => {
            if !force {
                output::warning(&format!(
                    "This deletes log entries older than {} days. Re-run with --force to confirm.",
                    older_than_days
                ));
                return Ok(());
            }

            let service = get_logging_service()?;
            let cutoff_ms = chrono::Utc::now().timestamp_millis()
                - (older_than_days as i64 * 24 * 60 * 60 * 1000);
            let deleted = service.delete_before(cutoff_ms)?;

            if json {
                println!("{}", serde_json::json!({"deleted": deleted}));
            } else {
                println!("Deleted {} log entries", deleted);
            }
        }
        LogsCommands::Stats { json } => {
            let service = get_logging_service()?;
            let total = service.count()?;
            let errors = service.get_errors(1000)?.len();
            let db_path = service.db_path().to_path_buf();
            let size_bytes = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "total_entries": total,
                        "error_count": errors,
                        "database_path": db_path.to_string_lossy(),
                        "database_size_bytes": size_bytes
                    })
                );
            } else {
                println!("{}", "Log Statistics".bold());
                println!("  Total entries: {}", total);
                println!("  Errors: {}", errors);
                println!("  Database: {}", db_path.display());
                println!("  Size: {} bytes", size_bytes);
            }
        }
    }

    Ok(())
}
