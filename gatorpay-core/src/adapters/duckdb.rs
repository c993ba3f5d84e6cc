//! DuckDB repository implementation

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{params, Connection};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::adapters::locks::{identity_key, KeyedLocks};
use crate::domain::result::{Error, Result};
use crate::domain::{CodePurpose, Transaction, User, VerificationCode, Wallet};
use crate::services::{MigrationResult, MigrationService, LEDGER_SCHEMA};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// Identity columns guarded by a unique constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    Email,
    Username,
    Phone,
}

impl IdentityField {
    fn column(&self) -> &'static str {
        match self {
            IdentityField::Email => "email",
            IdentityField::Username => "username",
            IdentityField::Phone => "phone",
        }
    }

    /// Lock key serializing claims on `value` in this column
    pub fn lock_key(&self, value: &str) -> String {
        identity_key(self.column(), value)
    }

    /// Caller-facing message for a collision on this field
    pub fn conflict_message(&self) -> &'static str {
        match self {
            IdentityField::Email => "email already registered",
            IdentityField::Username => "username already taken",
            IdentityField::Phone => "phone number already registered",
        }
    }
}

/// Map a unique-constraint violation on an identity column to
/// `DuplicateIdentity`; everything else stays a storage failure
fn classify_constraint(err: duckdb::Error) -> Error {
    let msg = err.to_string();
    if msg.contains("Duplicate key") || msg.contains("unique constraint") {
        for field in [IdentityField::Email, IdentityField::Username, IdentityField::Phone] {
            if msg.contains(&format!("\"{}:", field.column())) {
                return Error::DuplicateIdentity(field.conflict_message().to_string());
            }
        }
    }
    Error::Storage(msg)
}

/// DuckDB repository implementation
///
/// Holds the base connection of one database instance. Every operation
/// works on its own cloned connection, so units of work on different
/// records run side by side.
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
    locks: KeyedLocks,
}

impl DuckDbRepository {
    /// Open (or create) the database file
    ///
    /// Includes retry logic with exponential backoff for file locking errors,
    /// which can occur while another process still holds the file.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                        locks: KeyedLocks::new(),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            "database busy, retrying: {}",
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::storage(format!("failed to open database after {} retries", MAX_RETRIES))
        }))
    }

    /// Private in-memory database, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
            locks: KeyedLocks::new(),
        })
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading stays off: nothing here needs one
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Apply pending ledger migrations
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.conn.lock();
        MigrationService::new(&conn, LEDGER_SCHEMA).run_pending()
    }

    /// Ledger migrations shipped with this build but not yet applied
    pub fn pending_migrations(&self) -> Result<Vec<&'static str>> {
        let conn = self.conn.lock();
        MigrationService::new(&conn, LEDGER_SCHEMA).pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    fn connection(&self) -> Result<Connection> {
        Ok(self.conn.lock().try_clone()?)
    }

    /// Run `f` inside one database transaction
    ///
    /// Commits only when `f` succeeds; any error (including a failed
    /// commit) rolls back every write made through the store.
    pub fn unit_of_work<T>(&self, f: impl FnOnce(&Store<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let value = f(&Store { conn: &tx })?;
        tx.commit().map_err(classify_constraint)?;
        Ok(value)
    }

    /// Run read-only queries outside a transaction
    pub fn read<T>(&self, f: impl FnOnce(&Store<'_>) -> Result<T>) -> Result<T> {
        let conn = self.connection()?;
        f(&Store { conn: &conn })
    }

    /// Run `f` holding the exclusive lock for `key`
    pub fn with_lock<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        self.locks.with_key(key, f)
    }

    /// Run `f` holding every lock in `keys`, taken in sorted order
    pub fn with_locks<T>(&self, keys: &[&str], f: impl FnOnce() -> T) -> T {
        self.locks.with_keys(keys, f)
    }

    pub fn locks(&self) -> &KeyedLocks {
        &self.locks
    }
}

/// Journal replay for one wallet, as read by the integrity checks
#[derive(Debug, Clone)]
pub struct WalletJournal {
    pub wallet_id: String,
    pub user_id: String,
    pub balance: Decimal,
    pub journal_total: Decimal,
}

/// Typed queries over one connection (or one open transaction)
pub struct Store<'a> {
    conn: &'a Connection,
}

const USER_COLUMNS: &str = "id, email, username, phone, password_hash, first_name, last_name, \
     avatar_url, auth_provider, google_id, email_verified, kyc_status, credit_score, \
     lifecycle_state, deleted_at::VARCHAR, created_at::VARCHAR, updated_at::VARCHAR";

const WALLET_COLUMNS: &str = "id, user_id, balance::VARCHAR, currency, is_active, \
     created_at::VARCHAR, updated_at::VARCHAR";

const TRANSACTION_COLUMNS: &str = "id, wallet_id, type, amount::VARCHAR, description, status, \
     created_at::VARCHAR";

const CODE_COLUMNS: &str = "id, user_id, code, purpose, expires_at::VARCHAR, used, \
     created_at::VARCHAR";

impl<'a> Store<'a> {
    // === Users ===

    pub fn insert_user(&self, user: &User) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO users (id, email, username, phone, password_hash, first_name,
                                    last_name, avatar_url, auth_provider, google_id,
                                    email_verified, kyc_status, credit_score, lifecycle_state,
                                    deleted_at, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                         CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))",
                params![
                    user.id.to_string(),
                    user.email,
                    user.username,
                    user.phone,
                    user.password_hash,
                    user.first_name,
                    user.last_name,
                    user.avatar_url,
                    user.auth_provider.as_str(),
                    user.google_id,
                    user.email_verified,
                    user.kyc_status.as_str(),
                    user.credit_score,
                    user.lifecycle_state.as_str(),
                    user.deleted_at.as_ref().map(format_timestamp),
                    format_timestamp(&user.created_at),
                    format_timestamp(&user.updated_at),
                ],
            )
            .map_err(classify_constraint)?;
        Ok(())
    }

    fn query_user(&self, filter: &str, value: &str) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE {} = ? AND lifecycle_state = 'active'",
            USER_COLUMNS, filter
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([value])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_user(row)?)),
            None => Ok(None),
        }
    }

    /// Active user by id; closed accounts are not returned
    pub fn find_user(&self, id: &Uuid) -> Result<Option<User>> {
        self.query_user("id", &id.to_string())
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.query_user("email", email)
    }

    pub fn find_user_by_google_id(&self, google_id: &str) -> Result<Option<User>> {
        self.query_user("google_id", google_id)
    }

    /// Whether any record, closed or not, already holds `value`
    pub fn identity_taken(&self, field: IdentityField, value: &str) -> Result<bool> {
        let sql = format!("SELECT COUNT(*) FROM users WHERE {} = ?", field.column());
        let count: i64 = self.conn.query_row(&sql, [value], |row| row.get(0))?;
        Ok(count > 0)
    }

    pub fn mark_email_verified(&self, user_id: &Uuid) -> Result<()> {
        self.conn.execute(
            "UPDATE users SET email_verified = TRUE, updated_at = CAST(? AS TIMESTAMP)
             WHERE id = ?",
            params![format_timestamp(&Utc::now()), user_id.to_string()],
        )?;
        Ok(())
    }

    /// Persist the external-identity fields of an already linked user
    pub fn save_external_identity(&self, user: &User) -> Result<()> {
        self.conn.execute(
            "UPDATE users SET google_id = ?, auth_provider = ?, email_verified = ?,
                              avatar_url = ?, updated_at = CAST(? AS TIMESTAMP)
             WHERE id = ?",
            params![
                user.google_id,
                user.auth_provider.as_str(),
                user.email_verified,
                user.avatar_url,
                format_timestamp(&user.updated_at),
                user.id.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Soft-close an account. Returns false when no active user matched.
    pub fn close_user(&self, user_id: &Uuid) -> Result<bool> {
        let now = format_timestamp(&Utc::now());
        let changed = self.conn.execute(
            "UPDATE users SET lifecycle_state = 'closed', deleted_at = CAST(? AS TIMESTAMP),
                              updated_at = CAST(? AS TIMESTAMP)
             WHERE id = ? AND lifecycle_state = 'active'",
            params![now, now, user_id.to_string()],
        )?;
        Ok(changed > 0)
    }

    // === Wallets ===

    pub fn insert_wallet(&self, wallet: &Wallet) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO wallets (id, user_id, balance, currency, is_active, created_at, updated_at)
                 VALUES (?, ?, CAST(? AS DECIMAL(20, 2)), ?, ?,
                         CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP))",
                params![
                    wallet.id.to_string(),
                    wallet.user_id.to_string(),
                    wallet.balance.to_string(),
                    wallet.currency,
                    wallet.is_active,
                    format_timestamp(&wallet.created_at),
                    format_timestamp(&wallet.updated_at),
                ],
            )
            .map_err(classify_constraint)?;
        Ok(())
    }

    pub fn find_wallet_by_user(&self, user_id: &Uuid) -> Result<Option<Wallet>> {
        let sql = format!("SELECT {} FROM wallets WHERE user_id = ?", WALLET_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([user_id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_wallet(row)?)),
            None => Ok(None),
        }
    }

    pub fn save_wallet_balance(&self, wallet: &Wallet) -> Result<()> {
        self.conn.execute(
            "UPDATE wallets SET balance = CAST(? AS DECIMAL(20, 2)),
                                updated_at = CAST(? AS TIMESTAMP)
             WHERE id = ?",
            params![
                wallet.balance.to_string(),
                format_timestamp(&wallet.updated_at),
                wallet.id.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Freeze or unfreeze a user's wallet. Returns false when none exists.
    pub fn set_wallet_active(&self, user_id: &Uuid, active: bool) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE wallets SET is_active = ?, updated_at = CAST(? AS TIMESTAMP)
             WHERE user_id = ?",
            params![active, format_timestamp(&Utc::now()), user_id.to_string()],
        )?;
        Ok(changed > 0)
    }

    // === Transactions ===

    pub fn insert_transaction(&self, tx: &Transaction) -> Result<()> {
        self.conn.execute(
            "INSERT INTO transactions (id, wallet_id, type, amount, description, status, created_at)
             VALUES (?, ?, ?, CAST(? AS DECIMAL(20, 2)), ?, ?, CAST(? AS TIMESTAMP))",
            params![
                tx.id.to_string(),
                tx.wallet_id.to_string(),
                tx.kind.as_str(),
                tx.amount.to_string(),
                tx.description,
                tx.status.as_str(),
                format_timestamp(&tx.created_at),
            ],
        )?;
        Ok(())
    }

    /// One page of a wallet's journal, newest first
    pub fn list_transactions(
        &self,
        wallet_id: &Uuid,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE wallet_id = ?
             ORDER BY created_at DESC, seq DESC
             LIMIT ? OFFSET ?",
            TRANSACTION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let offset = offset.min(i64::MAX as u64) as i64;
        let mut rows = stmt.query(params![wallet_id.to_string(), limit as i64, offset])?;

        let mut transactions = Vec::new();
        while let Some(row) = rows.next()? {
            transactions.push(row_to_transaction(row)?);
        }
        Ok(transactions)
    }

    pub fn count_transactions(&self, wallet_id: &Uuid) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE wallet_id = ?",
            [wallet_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // === Verification codes ===

    /// Mark every unused code for (user, purpose) as used
    pub fn invalidate_codes(&self, user_id: &Uuid, purpose: CodePurpose) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE verification_codes SET used = TRUE
             WHERE user_id = ? AND purpose = ? AND used = FALSE",
            params![user_id.to_string(), purpose.as_str()],
        )?;
        Ok(changed)
    }

    pub fn insert_code(&self, code: &VerificationCode) -> Result<()> {
        self.conn.execute(
            "INSERT INTO verification_codes (id, user_id, code, purpose, expires_at, used, created_at)
             VALUES (?, ?, ?, ?, CAST(? AS TIMESTAMP), ?, CAST(? AS TIMESTAMP))",
            params![
                code.id.to_string(),
                code.user_id.to_string(),
                code.code,
                code.purpose.as_str(),
                format_timestamp(&code.expires_at),
                code.used,
                format_timestamp(&code.created_at),
            ],
        )?;
        Ok(())
    }

    /// Most recently created unused record matching (user, code, purpose)
    pub fn find_unused_code(
        &self,
        user_id: &Uuid,
        code: &str,
        purpose: CodePurpose,
    ) -> Result<Option<VerificationCode>> {
        let sql = format!(
            "SELECT {} FROM verification_codes
             WHERE user_id = ? AND code = ? AND purpose = ? AND used = FALSE
             ORDER BY created_at DESC, seq DESC
             LIMIT 1",
            CODE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![user_id.to_string(), code, purpose.as_str()])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_code(row)?)),
            None => Ok(None),
        }
    }

    pub fn mark_code_used(&self, code_id: &Uuid) -> Result<()> {
        self.conn.execute(
            "UPDATE verification_codes SET used = TRUE WHERE id = ?",
            [code_id.to_string()],
        )?;
        Ok(())
    }

    /// Number of unused codes for (user, purpose), expired or not
    pub fn count_unused_codes(&self, user_id: &Uuid, purpose: CodePurpose) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM verification_codes
             WHERE user_id = ? AND purpose = ? AND used = FALSE",
            params![user_id.to_string(), purpose.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // === Integrity checks ===

    /// Stored balance next to the signed sum of successful journal entries,
    /// for every wallet
    pub fn wallet_journals(&self) -> Result<Vec<WalletJournal>> {
        let mut stmt = self.conn.prepare(
            "SELECT w.id, w.user_id, w.balance::VARCHAR,
                    CAST(COALESCE(SUM(CASE WHEN t.type = 'deposit' THEN t.amount
                                           WHEN t.type = 'withdraw' THEN -t.amount
                                      END), 0) AS DECIMAL(38, 2))::VARCHAR
             FROM wallets w
             LEFT JOIN transactions t ON t.wallet_id = w.id AND t.status = 'success'
             GROUP BY w.id, w.user_id, w.balance
             ORDER BY w.id",
        )?;
        let mut rows = stmt.query([])?;

        let mut journals = Vec::new();
        while let Some(row) = rows.next()? {
            let balance: String = row.get(2)?;
            let total: String = row.get(3)?;
            journals.push(WalletJournal {
                wallet_id: row.get(0)?,
                user_id: row.get(1)?,
                balance: parse_money(&balance)?,
                journal_total: parse_money(&total)?,
            });
        }
        Ok(journals)
    }

    /// Active users whose wallet count is not exactly one: (user_id, count)
    pub fn users_without_single_wallet(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT u.id, COUNT(w.id)
             FROM users u
             LEFT JOIN wallets w ON w.user_id = u.id
             WHERE u.lifecycle_state = 'active'
             GROUP BY u.id
             HAVING COUNT(w.id) <> 1",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// (user, purpose) pairs holding more than one unused code
    pub fn duplicate_live_codes(&self) -> Result<Vec<(String, String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, purpose, COUNT(*)
             FROM verification_codes
             WHERE used = FALSE
             GROUP BY user_id, purpose
             HAVING COUNT(*) > 1",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count_rows(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }
}

// === Row mapping ===

fn row_to_user(row: &duckdb::Row) -> Result<User> {
    let id: String = row.get(0)?;
    let auth_provider: String = row.get(8)?;
    let kyc_status: String = row.get(11)?;
    let lifecycle_state: String = row.get(13)?;
    let deleted_at: Option<String> = row.get(14)?;
    let created_at: String = row.get(15)?;
    let updated_at: String = row.get(16)?;

    Ok(User {
        id: parse_uuid(&id)?,
        email: row.get(1)?,
        username: row.get(2)?,
        phone: row.get(3)?,
        password_hash: row.get(4)?,
        first_name: row.get(5)?,
        last_name: row.get(6)?,
        avatar_url: row.get(7)?,
        auth_provider: auth_provider.parse()?,
        google_id: row.get(9)?,
        email_verified: row.get(10)?,
        kyc_status: kyc_status.parse()?,
        credit_score: row.get(12)?,
        lifecycle_state: lifecycle_state.parse()?,
        deleted_at: deleted_at.as_deref().map(parse_timestamp).transpose()?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn row_to_wallet(row: &duckdb::Row) -> Result<Wallet> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let balance: String = row.get(2)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;

    Ok(Wallet {
        id: parse_uuid(&id)?,
        user_id: parse_uuid(&user_id)?,
        balance: parse_money(&balance)?,
        currency: row.get(3)?,
        is_active: row.get(4)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn row_to_transaction(row: &duckdb::Row) -> Result<Transaction> {
    let id: String = row.get(0)?;
    let wallet_id: String = row.get(1)?;
    let kind: String = row.get(2)?;
    let amount: String = row.get(3)?;
    let status: String = row.get(5)?;
    let created_at: String = row.get(6)?;

    Ok(Transaction {
        id: parse_uuid(&id)?,
        wallet_id: parse_uuid(&wallet_id)?,
        kind: kind.parse()?,
        amount: parse_money(&amount)?,
        description: row.get(4)?,
        status: status.parse()?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_code(row: &duckdb::Row) -> Result<VerificationCode> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let purpose: String = row.get(3)?;
    let expires_at: String = row.get(4)?;
    let created_at: String = row.get(6)?;

    Ok(VerificationCode {
        id: parse_uuid(&id)?,
        user_id: parse_uuid(&user_id)?,
        code: row.get(2)?,
        purpose: CodePurpose::from_str(&purpose)
            .map_err(|_| Error::storage(format!("unknown code purpose '{}'", purpose)))?,
        expires_at: parse_timestamp(&expires_at)?,
        used: row.get(5)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::storage(format!("invalid stored id '{}': {}", s, e)))
}

/// Exact decimal from DuckDB's text rendering of a DECIMAL column
fn parse_money(s: &str) -> Result<Decimal> {
    Decimal::from_str_exact(s.trim())
        .map_err(|e| Error::storage(format!("invalid stored amount '{}': {}", s, e)))
}

/// Naive UTC text accepted by `CAST(? AS TIMESTAMP)`
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(Error::storage(format!("invalid stored timestamp '{}'", s)))
}
