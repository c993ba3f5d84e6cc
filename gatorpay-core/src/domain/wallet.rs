//! Wallet domain model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::{Error, Result};

/// Fractional digits carried by every monetary value
pub const MONEY_SCALE: u32 = 2;

pub const DEFAULT_CURRENCY: &str = "USD";

/// Largest value a DECIMAL(20,2) column holds: 999999999999999999.99
pub const MAX_BALANCE: Decimal = Decimal::from_parts(1_661_992_959, 1_808_227_885, 5, false, MONEY_SCALE);

/// Rescale a value to the persisted money precision
pub fn to_money(value: Decimal) -> Decimal {
    let mut value = value;
    value.rescale(MONEY_SCALE);
    value
}

/// Validate a caller-supplied amount: positive, at most two fractional digits
pub fn validate_amount(amount: Decimal) -> Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(Error::validation("amount must be greater than 0"));
    }
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(Error::validation("amount supports at most 2 decimal places"));
    }
    if amount > MAX_BALANCE {
        return Err(Error::validation("amount exceeds the maximum wallet balance"));
    }
    Ok(to_money(amount))
}

/// A user's single-currency balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: Decimal,
    /// ISO 4217 currency code
    pub currency: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Zero-balance wallet for a freshly created user
    pub fn for_user(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            balance: to_money(Decimal::ZERO),
            currency: DEFAULT_CURRENCY.to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn ensure_active(&self) -> Result<()> {
        if !self.is_active {
            return Err(Error::WalletInactive);
        }
        Ok(())
    }

    /// Add funds. The amount must already be validated.
    pub fn credit(&mut self, amount: Decimal) -> Result<()> {
        self.ensure_active()?;
        let balance = self
            .balance
            .checked_add(amount)
            .filter(|balance| *balance <= MAX_BALANCE)
            .ok_or_else(|| Error::validation("amount exceeds the maximum wallet balance"))?;
        self.balance = to_money(balance);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Remove funds, refusing to go below zero
    pub fn debit(&mut self, amount: Decimal) -> Result<()> {
        self.ensure_active()?;
        if self.balance < amount {
            return Err(Error::InsufficientBalance);
        }
        self.balance = to_money(self.balance - amount);
        self.updated_at = Utc::now();
        Ok(())
    }
}
