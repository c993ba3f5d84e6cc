//! Schema migrations for the ledger and the activity log
//!
//! Both databases keep a `sys_migrations` table naming every applied file.
//! `000_migrations.sql` creates that table and sorts first, so a fresh
//! database bootstraps itself on the first pass.

use std::collections::HashSet;

use duckdb::Connection;
use serde::Serialize;

use crate::domain::result::Result;
use crate::log_migrations::LOG_MIGRATIONS;
use crate::migrations::MIGRATIONS;

/// A named, ordered set of embedded SQL files
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub name: &'static str,
    pub files: &'static [(&'static str, &'static str)],
}

/// Users, wallets, transactions and verification codes
pub const LEDGER_SCHEMA: Schema = Schema {
    name: "ledger",
    files: MIGRATIONS,
};

/// `sys_logs` in logs.duckdb
pub const ACTIVITY_LOG_SCHEMA: Schema = Schema {
    name: "activity_log",
    files: LOG_MIGRATIONS,
};

#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    pub schema: &'static str,
    /// Files applied by this run, in order
    pub applied: Vec<String>,
    pub already_applied: usize,
}

impl MigrationResult {
    pub fn is_current(&self) -> bool {
        self.applied.is_empty()
    }
}

pub struct MigrationService<'a> {
    conn: &'a Connection,
    schema: Schema,
}

impl<'a> MigrationService<'a> {
    pub fn new(conn: &'a Connection, schema: Schema) -> Self {
        Self { conn, schema }
    }

    /// Apply every file not yet recorded
    pub fn run_pending(&self) -> Result<MigrationResult> {
        let recorded = self.recorded()?;
        let mut applied = Vec::new();

        for (name, sql) in self.schema.files {
            if recorded.contains(*name) {
                continue;
            }
            self.conn.execute_batch(sql)?;
            self.conn
                .execute("INSERT INTO sys_migrations (migration_name) VALUES (?)", [name])?;
            tracing::info!(schema = self.schema.name, migration = *name, "migration applied");
            applied.push(name.to_string());
        }

        Ok(MigrationResult {
            schema: self.schema.name,
            applied,
            already_applied: recorded.len(),
        })
    }

    /// Files this binary ships that the database has not recorded
    pub fn pending(&self) -> Result<Vec<&'static str>> {
        let recorded = self.recorded()?;
        Ok(self
            .schema
            .files
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| !recorded.contains(*name))
            .collect())
    }

    fn recorded(&self) -> Result<HashSet<String>> {
        let exists: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = 'sys_migrations'",
            [],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Ok(HashSet::new());
        }

        let mut stmt = self.conn.prepare("SELECT migration_name FROM sys_migrations")?;
        let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut recorded = HashSet::new();
        for name in names {
            recorded.insert(name?);
        }
        Ok(recorded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, table: &str) -> bool {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
                [table],
                |row| row.get(0),
            )
            .unwrap();
        count == 1
    }

    #[test]
    fn test_fresh_ledger_is_bootstrapped_then_current() {
        let conn = Connection::open_in_memory().unwrap();
        let service = MigrationService::new(&conn, LEDGER_SCHEMA);
        assert_eq!(service.pending().unwrap().len(), MIGRATIONS.len());

        let first = service.run_pending().unwrap();
        assert_eq!(first.schema, "ledger");
        assert_eq!(first.applied[0], "000_migrations.sql");
        assert_eq!(first.applied.len(), MIGRATIONS.len());
        assert_eq!(first.already_applied, 0);

        let second = service.run_pending().unwrap();
        assert!(second.is_current());
        assert_eq!(second.already_applied, MIGRATIONS.len());
        assert!(service.pending().unwrap().is_empty());

        for table in ["users", "wallets", "transactions", "verification_codes"] {
            assert!(table_exists(&conn, table), "missing table {}", table);
        }
    }

    #[test]
    fn test_partially_migrated_database_resumes() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(MIGRATIONS[0].1).unwrap();
        conn.execute(
            "INSERT INTO sys_migrations (migration_name) VALUES (?)",
            [MIGRATIONS[0].0],
        )
        .unwrap();

        let service = MigrationService::new(&conn, LEDGER_SCHEMA);
        assert_eq!(service.pending().unwrap(), vec!["001_initial_schema.sql"]);

        let result = service.run_pending().unwrap();
        assert_eq!(result.applied, vec!["001_initial_schema.sql".to_string()]);
        assert_eq!(result.already_applied, 1);
    }

    #[test]
    fn test_activity_log_schema_stays_separate() {
        let conn = Connection::open_in_memory().unwrap();
        let result = MigrationService::new(&conn, ACTIVITY_LOG_SCHEMA)
            .run_pending()
            .unwrap();

        assert_eq!(result.schema, "activity_log");
        assert!(table_exists(&conn, "sys_logs"));
        assert!(!table_exists(&conn, "wallets"));
    }
}
