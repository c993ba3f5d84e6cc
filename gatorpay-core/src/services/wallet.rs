//! Wallet service - balance mutation and journal history
//!
//! Every mutation holds the wallet's exclusive lock for the whole
//! read-modify-write and commits the balance update together with its
//! journal entry.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapters::duckdb::{DuckDbRepository, Store};
use crate::adapters::locks::wallet_key;
use crate::domain::result::{Error, Result};
use crate::domain::wallet::validate_amount;
use crate::domain::{Transaction, Wallet};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct DepositInput {
    pub amount: Decimal,
    pub source: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawInput {
    pub amount: Decimal,
    pub bank_account: String,
}

/// One page of a wallet's history, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionPage {
    pub transactions: Vec<Transaction>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

/// Clamp caller paging into `(page >= 1, limit in 1..=50)`
pub fn normalize_paging(page: i64, limit: i64) -> (u32, u32) {
    let page = page.clamp(1, u32::MAX as i64) as u32;
    let limit = if (1..=MAX_PAGE_SIZE as i64).contains(&limit) {
        limit as u32
    } else {
        DEFAULT_PAGE_SIZE
    };
    (page, limit)
}

pub struct WalletService {
    repository: Arc<DuckDbRepository>,
}

impl WalletService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    pub fn get_wallet(&self, user_id: &Uuid) -> Result<Wallet> {
        self.repository.read(|store| load_wallet(store, user_id))
    }

    pub fn deposit(&self, user_id: &Uuid, input: &DepositInput) -> Result<Wallet> {
        let amount = validate_amount(input.amount)?;
        let source = input.source.trim();
        if source.is_empty() {
            return Err(Error::validation("source is required"));
        }
        let description = match input.description.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => format!("Deposit from {}", source),
        };

        let wallet = self.mutate(user_id, |wallet| {
            wallet.credit(amount)?;
            Ok(Transaction::deposit(wallet.id, amount, description))
        })?;

        tracing::info!(user_id = %user_id, wallet_id = %wallet.id, "deposit committed");
        Ok(wallet)
    }

    pub fn withdraw(&self, user_id: &Uuid, input: &WithdrawInput) -> Result<Wallet> {
        let amount = validate_amount(input.amount)?;
        let bank_account = input.bank_account.trim();
        if bank_account.is_empty() {
            return Err(Error::validation("bank_account is required"));
        }
        let description = format!("Withdrawal to {}", bank_account);

        let wallet = self.mutate(user_id, |wallet| {
            wallet.debit(amount)?;
            Ok(Transaction::withdrawal(wallet.id, amount, description))
        })?;

        tracing::info!(user_id = %user_id, wallet_id = %wallet.id, "withdrawal committed");
        Ok(wallet)
    }

    pub fn list_transactions(&self, user_id: &Uuid, page: i64, limit: i64) -> Result<TransactionPage> {
        let (page, limit) = normalize_paging(page, limit);
        let offset = (page as u64 - 1) * limit as u64;

        self.repository.read(|store| {
            let wallet = load_wallet(store, user_id)?;
            let total = store.count_transactions(&wallet.id)?;
            let transactions = store.list_transactions(&wallet.id, limit, offset)?;
            Ok(TransactionPage {
                transactions,
                total,
                page,
                limit,
                total_pages: total.div_ceil(limit as u64),
            })
        })
    }

    /// Freeze or unfreeze a wallet. Frozen wallets refuse every mutation.
    pub fn set_active(&self, user_id: &Uuid, active: bool) -> Result<Wallet> {
        let wallet = self.repository.with_lock(&wallet_key(user_id), || {
            self.repository.unit_of_work(|store| {
                if !store.set_wallet_active(user_id, active)? {
                    return Err(Error::WalletNotFound);
                }
                load_wallet(store, user_id)
            })
        })?;
        tracing::info!(user_id = %user_id, active, "wallet activity changed");
        Ok(wallet)
    }

    /// Apply `change` to the locked wallet and append the journal entry it
    /// returns, all in one unit of work
    fn mutate(
        &self,
        user_id: &Uuid,
        change: impl FnOnce(&mut Wallet) -> Result<Transaction>,
    ) -> Result<Wallet> {
        self.repository.with_lock(&wallet_key(user_id), || {
            self.repository.unit_of_work(|store| {
                if store.find_user(user_id)?.is_none() {
                    return Err(Error::UserNotFound);
                }
                let mut wallet = load_wallet(store, user_id)?;
                let entry = change(&mut wallet)?;
                store.save_wallet_balance(&wallet)?;
                store.insert_transaction(&entry)?;
                Ok(wallet)
            })
        })
    }
}

fn load_wallet(store: &Store<'_>, user_id: &Uuid) -> Result<Wallet> {
    store.find_wallet_by_user(user_id)?.ok_or(Error::WalletNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TransactionType, User};
    use std::str::FromStr;

    fn money(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn setup() -> (WalletService, Arc<DuckDbRepository>, Uuid) {
        let repository = Arc::new(DuckDbRepository::open_in_memory().unwrap());
        repository.ensure_schema().unwrap();

        let user = User::new_local("a@fla.edu", "auser", "3525550100", "A", "User", "hash");
        let wallet = Wallet::for_user(user.id);
        repository
            .unit_of_work(|store| {
                store.insert_user(&user)?;
                store.insert_wallet(&wallet)
            })
            .unwrap();

        (WalletService::new(Arc::clone(&repository)), repository, user.id)
    }

    fn deposit(amount: &str) -> DepositInput {
        DepositInput {
            amount: money(amount),
            source: "bank".to_string(),
            description: None,
        }
    }

    fn withdraw(amount: &str) -> WithdrawInput {
        WithdrawInput {
            amount: money(amount),
            bank_account: "acct".to_string(),
        }
    }

    #[test]
    fn test_normalize_paging() {
        assert_eq!(normalize_paging(0, 0), (1, 10));
        assert_eq!(normalize_paging(-3, 51), (1, 10));
        assert_eq!(normalize_paging(2, 50), (2, 50));
        assert_eq!(normalize_paging(5, 1), (5, 1));
    }

    #[test]
    fn test_deposit_then_overdraw() {
        let (service, _, user_id) = setup();

        let wallet = service.deposit(&user_id, &deposit("100.00")).unwrap();
        assert_eq!(wallet.balance, money("100.00"));

        assert!(matches!(
            service.withdraw(&user_id, &withdraw("150.00")),
            Err(Error::InsufficientBalance)
        ));
        assert_eq!(service.get_wallet(&user_id).unwrap().balance, money("100.00"));

        let page = service.list_transactions(&user_id, 1, 10).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.transactions[0].kind, TransactionType::Deposit);
        assert_eq!(page.transactions[0].description, "Deposit from bank");
    }

    #[test]
    fn test_descriptions() {
        let (service, _, user_id) = setup();
        service
            .deposit(
                &user_id,
                &DepositInput {
                    description: Some("Birthday".to_string()),
                    ..deposit("20")
                },
            )
            .unwrap();
        service.withdraw(&user_id, &withdraw("5.50")).unwrap();

        let page = service.list_transactions(&user_id, 1, 10).unwrap();
        assert_eq!(page.transactions[0].description, "Withdrawal to acct");
        assert_eq!(page.transactions[1].description, "Birthday");
        assert_eq!(service.get_wallet(&user_id).unwrap().balance, money("14.50"));
    }

    #[test]
    fn test_invalid_amounts_touch_nothing() {
        let (service, _, user_id) = setup();
        for amount in ["0", "-1.00", "1.005"] {
            assert!(matches!(
                service.deposit(&user_id, &deposit(amount)),
                Err(Error::Validation(_))
            ));
        }
        assert!(matches!(
            service.deposit(
                &user_id,
                &DepositInput {
                    source: "  ".to_string(),
                    ..deposit("1")
                }
            ),
            Err(Error::Validation(_))
        ));
        assert_eq!(service.list_transactions(&user_id, 1, 10).unwrap().total, 0);
    }

    #[test]
    fn test_balance_beyond_column_range_is_rejected() {
        let (service, _, user_id) = setup();
        assert!(matches!(
            service.deposit(&user_id, &deposit("100000000000000000000.00")),
            Err(Error::Validation(_))
        ));

        service.deposit(&user_id, &deposit("999999999999999999.00")).unwrap();
        assert!(matches!(
            service.deposit(&user_id, &deposit("1.00")),
            Err(Error::Validation(_))
        ));

        let wallet = service.get_wallet(&user_id).unwrap();
        assert_eq!(wallet.balance, money("999999999999999999.00"));
        assert_eq!(service.list_transactions(&user_id, 1, 10).unwrap().total, 1);
    }

    #[test]
    fn test_frozen_wallet_refuses_mutation() {
        let (service, _, user_id) = setup();
        service.deposit(&user_id, &deposit("10")).unwrap();

        let frozen = service.set_active(&user_id, false).unwrap();
        assert!(!frozen.is_active);
        assert!(matches!(
            service.deposit(&user_id, &deposit("1")),
            Err(Error::WalletInactive)
        ));
        assert!(matches!(
            service.withdraw(&user_id, &withdraw("1")),
            Err(Error::WalletInactive)
        ));

        service.set_active(&user_id, true).unwrap();
        service.withdraw(&user_id, &withdraw("1")).unwrap();
        assert_eq!(service.get_wallet(&user_id).unwrap().balance, money("9.00"));
    }

    #[test]
    fn test_unknown_user() {
        let (service, _, _) = setup();
        let stranger = Uuid::new_v4();
        assert!(matches!(service.get_wallet(&stranger), Err(Error::WalletNotFound)));
        assert!(matches!(
            service.deposit(&stranger, &deposit("1")),
            Err(Error::UserNotFound)
        ));
        assert!(matches!(
            service.set_active(&stranger, false),
            Err(Error::WalletNotFound)
        ));
    }

    #[test]
    fn test_closed_user_cannot_transact() {
        let (service, repository, user_id) = setup();
        repository.unit_of_work(|store| store.close_user(&user_id)).unwrap();
        assert!(matches!(
            service.deposit(&user_id, &deposit("1")),
            Err(Error::UserNotFound)
        ));
    }

    #[test]
    fn test_pagination() {
        let (service, _, user_id) = setup();
        for _ in 0..12 {
            service.deposit(&user_id, &deposit("1")).unwrap();
        }

        let first = service.list_transactions(&user_id, 1, 5).unwrap();
        assert_eq!(first.total, 12);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.transactions.len(), 5);

        let last = service.list_transactions(&user_id, 3, 5).unwrap();
        assert_eq!(last.transactions.len(), 2);

        let beyond = service.list_transactions(&user_id, 9, 5).unwrap();
        assert!(beyond.transactions.is_empty());
        assert_eq!(beyond.page, 9);

        let coerced = service.list_transactions(&user_id, 0, 500).unwrap();
        assert_eq!((coerced.page, coerced.limit), (1, 10));
        assert_eq!(coerced.transactions.len(), 10);
    }
}
