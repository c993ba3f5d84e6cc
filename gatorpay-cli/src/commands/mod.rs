//! CLI command implementations

pub mod doctor;
pub mod logs;
pub mod migrate;
pub mod serve;
pub mod user;
pub mod wallet;

use std::path::PathBuf;

use anyhow::{Context, Result};
use gatorpay_core::services::{EntryPoint, LogEvent, LoggingService};
use gatorpay_core::GatorPayContext;

/// Get the logging service for a binary surface
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger(entry_point: EntryPoint) -> Option<LoggingService> {
    let data_dir = get_data_dir().ok()?;
    std::fs::create_dir_all(&data_dir).ok()?;
    LoggingService::new(&data_dir, entry_point, env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        if let Err(e) = l.log(event) {
            tracing::debug!(error = %e, "activity log write failed");
        }
    }
}

/// Get the data directory from environment or default
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("GATORPAY_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".gatorpay"))
}

/// Open the ledger and build every service
pub fn get_context() -> Result<GatorPayContext> {
    let data_dir = get_data_dir()?;

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

    GatorPayContext::new(&data_dir).context("Failed to initialize gatorpay context")
}

/// Parse a user id argument
pub fn parse_user_id(raw: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(raw.trim()).with_context(|| format!("Invalid user id: {}", raw))
}
