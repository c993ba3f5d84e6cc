//! Migrate command - apply pending schema migrations

use anyhow::{Context, Result};
use gatorpay_core::adapters::duckdb::DuckDbRepository;
use gatorpay_core::config::Config;

use super::get_data_dir;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let data_dir = get_data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

    let config = Config::load(&data_dir)?;
    let db_path = config.database_file(&data_dir);
    let repository = DuckDbRepository::new(&db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    let result = repository.run_migrations()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.is_current() {
        output::info(&format!(
            "The {} schema is up to date ({} migration(s) already applied)",
            result.schema, result.already_applied
        ));
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Applied migration"]);
    for name in &result.applied {
        table.add_row(vec![name.as_str()]);
    }
    println!("{}", table);
    output::success(&format!(
        "Applied {} {} migration(s) to {}",
        result.applied.len(),
        result.schema,
        db_path.display()
    ));
    Ok(())
}
