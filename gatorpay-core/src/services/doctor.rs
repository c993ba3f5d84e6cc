//! Doctor service - ledger integrity checks

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::Result;

/// Doctor service for ledger health checks
pub struct DoctorService {
    repository: Arc<DuckDbRepository>,
}

impl DoctorService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Run all health checks
    pub fn run_checks(&self) -> Result<DoctorResult> {
        let mut checks = HashMap::new();

        let journals = self.repository.read(|store| store.wallet_journals())?;

        // Journal replay must reproduce every stored balance
        let drifted: Vec<serde_json::Value> = journals
            .iter()
            .filter(|j| j.balance != j.journal_total)
            .map(|j| {
                json!({
                    "wallet_id": j.wallet_id,
                    "user_id": j.user_id,
                    "balance": j.balance.to_string(),
                    "journal_total": j.journal_total.to_string()
                })
            })
            .collect();
        checks.insert(
            "journal_replay".to_string(),
            CheckResult::from_findings(
                "error",
                format!("All {} wallet balance(s) match their journal", journals.len()),
                |n| format!("{} wallet(s) disagree with their journal", n),
                drifted,
            ),
        );

        let negative: Vec<serde_json::Value> = journals
            .iter()
            .filter(|j| j.balance < Decimal::ZERO)
            .map(|j| json!({"wallet_id": j.wallet_id, "balance": j.balance.to_string()}))
            .collect();
        checks.insert(
            "negative_balances".to_string(),
            CheckResult::from_findings(
                "error",
                "No negative balances found".to_string(),
                |n| format!("{} wallet(s) have a negative balance", n),
                negative,
            ),
        );

        let wallet_counts = self.repository.read(|store| store.users_without_single_wallet())?;
        let wallet_details = wallet_counts
            .iter()
            .map(|(user_id, count)| json!({"user_id": user_id, "wallets": count}))
            .collect();
        checks.insert(
            "wallet_per_user".to_string(),
            CheckResult::from_findings(
                "error",
                "Every active user has exactly one wallet".to_string(),
                |n| format!("{} active user(s) do not have exactly one wallet", n),
                wallet_details,
            ),
        );

        // More than one live code means an issue raced an invalidation
        let live_codes = self.repository.read(|store| store.duplicate_live_codes())?;
        let code_details = live_codes
            .iter()
            .map(|(user_id, purpose, count)| {
                json!({"user_id": user_id, "purpose": purpose, "unused_codes": count})
            })
            .collect();
        checks.insert(
            "live_codes".to_string(),
            CheckResult::from_findings(
                "warning",
                "At most one live code per user and purpose".to_string(),
                |n| format!("{} user/purpose pair(s) hold several unused codes", n),
                code_details,
            ),
        );

        let pending: Vec<serde_json::Value> = self
            .repository
            .pending_migrations()?
            .into_iter()
            .map(|name| json!({"migration": name}))
            .collect();
        checks.insert(
            "schema_current".to_string(),
            CheckResult::from_findings(
                "error",
                "Ledger schema is up to date".to_string(),
                |n| format!("{} migration(s) pending, run `gatorpay migrate`", n),
                pending,
            ),
        );

        let passed = checks.values().filter(|c| c.status == "pass").count() as i64;
        let warnings = checks.values().filter(|c| c.status == "warning").count() as i64;
        let errors = checks.values().filter(|c| c.status == "error").count() as i64;

        tracing::debug!(passed, warnings, errors, "doctor checks finished");

        Ok(DoctorResult {
            checks,
            summary: DoctorSummary { passed, warnings, errors },
        })
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorResult {
    pub checks: HashMap<String, CheckResult>,
    pub summary: DoctorSummary,
}

impl DoctorResult {
    pub fn is_healthy(&self) -> bool {
        self.summary.errors == 0
    }
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<serde_json::Value>>,
}

impl CheckResult {
    /// "pass" when `findings` is empty, otherwise `failing_status`
    fn from_findings(
        failing_status: &str,
        pass_message: String,
        failure_message: impl FnOnce(usize) -> String,
        findings: Vec<serde_json::Value>,
    ) -> Self {
        if findings.is_empty() {
            Self {
                status: "pass".to_string(),
                message: pass_message,
                details: None,
            }
        } else {
            Self {
                status: failing_status.to_string(),
                message: failure_message(findings.len()),
                details: Some(findings),
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorSummary {
    pub passed: i64,
    pub warnings: i64,
    pub errors: i64,
}
