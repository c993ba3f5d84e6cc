//! Ledger schema files, applied by `MigrationService` with `LEDGER_SCHEMA`

/// `(file name, sql)` in application order
pub const MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
];
