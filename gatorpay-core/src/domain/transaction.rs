//! Transaction domain model

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::{Error, Result};

/// Direction of a balance movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Withdraw,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdraw => "withdraw",
        }
    }
}

impl FromStr for TransactionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "deposit" => Ok(TransactionType::Deposit),
            "withdraw" => Ok(TransactionType::Withdraw),
            other => Err(Error::storage(format!("unknown transaction type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(Error::storage(format!("unknown transaction status '{}'", other))),
        }
    }
}

/// Immutable journal entry for one wallet balance change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    /// Always positive; direction comes from `kind`
    pub amount: Decimal,
    pub description: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    fn new(wallet_id: Uuid, kind: TransactionType, amount: Decimal, description: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            wallet_id,
            kind,
            amount,
            description,
            status: TransactionStatus::Success,
            created_at: Utc::now(),
        }
    }

    pub fn deposit(wallet_id: Uuid, amount: Decimal, description: impl Into<String>) -> Self {
        Self::new(wallet_id, TransactionType::Deposit, amount, description.into())
    }

    pub fn withdrawal(wallet_id: Uuid, amount: Decimal, description: impl Into<String>) -> Self {
        Self::new(wallet_id, TransactionType::Withdraw, amount, description.into())
    }

    /// Amount with the sign of its effect on the balance
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            TransactionType::Deposit => self.amount,
            TransactionType::Withdraw => -self.amount,
        }
    }
}
