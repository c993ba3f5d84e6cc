//! Integration tests for gatorpay-core services
//!
//! These tests drive full auth and ledger flows against real DuckDB.
//! Code delivery is captured at the trait level.
//!
//! Run with: cargo test --test integration_tests -- --nocapture

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use tempfile::TempDir;
use uuid::Uuid;

use gatorpay_core::adapters::duckdb::DuckDbRepository;
use gatorpay_core::config::{Argon2Params, Config};
use gatorpay_core::domain::{CodePurpose, TransactionType};
use gatorpay_core::ports::CodeDelivery;
use gatorpay_core::services::{
    DepositInput, FederatedInput, LoginInput, RegisterInput, WithdrawInput,
};
use gatorpay_core::{Error, GatorPayContext, Result};

// ============================================================================
// Test Helpers
// ============================================================================

/// Keeps every code handed to the transport, newest last
#[derive(Default)]
struct CapturedCodes {
    sent: Mutex<Vec<(String, String, CodePurpose)>>,
}

impl CapturedCodes {
    fn latest(&self, destination: &str, purpose: CodePurpose) -> String {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _, p)| to == destination && *p == purpose)
            .map(|(_, code, _)| code.clone())
            .expect("no code was sent")
    }
}

impl CodeDelivery for CapturedCodes {
    fn name(&self) -> &str {
        "captured"
    }

    fn send(&self, destination: &str, code: &str, purpose: CodePurpose) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), code.to_string(), purpose));
        Ok(())
    }
}

fn test_config() -> Config {
    Config {
        jwt_secret: Some("integration-test-secret".to_string()),
        argon2: Argon2Params {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        },
        ..Config::default()
    }
}

/// Context over a file-backed database, with codes captured
fn create_test_context(temp_dir: &TempDir) -> (GatorPayContext, Arc<CapturedCodes>) {
    let repo = DuckDbRepository::new(&temp_dir.path().join("test.duckdb"))
        .expect("Failed to create repository");
    repo.ensure_schema().expect("Failed to initialize schema");
    let repo = Arc::new(repo);

    let mut context = GatorPayContext::with_repository(test_config(), Arc::clone(&repo))
        .expect("Failed to build context");

    // Swap the console transport for a capturing one
    let codes = Arc::new(CapturedCodes::default());
    context.otp_service = Arc::new(gatorpay_core::services::OtpService::new(
        Arc::clone(&repo),
        codes.clone(),
        context.config.otp_ttl_secs,
    ));
    context.auth_service = gatorpay_core::services::AuthService::new(
        Arc::clone(&repo),
        Arc::clone(&context.otp_service),
        Arc::clone(&context.token_service),
        context.config.argon2,
    )
    .expect("Failed to build auth service");

    (context, codes)
}

fn register_input() -> RegisterInput {
    RegisterInput {
        email: "a@fla.edu".to_string(),
        password: "pw12345678".to_string(),
        username: "auser".to_string(),
        phone: "352-555-0100".to_string(),
        first_name: "A".to_string(),
        last_name: "User".to_string(),
    }
}

fn money(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// A code guaranteed to differ from `code`
fn other_code(code: &str) -> String {
    if code == "000000" {
        "000001".to_string()
    } else {
        "000000".to_string()
    }
}

/// Register and verify, returning the new user's id
fn registered_user(context: &GatorPayContext, codes: &CapturedCodes) -> Uuid {
    let sent = context.auth_service.register(&register_input()).unwrap();
    let code = codes.latest("a@fla.edu", CodePurpose::Register);
    context
        .auth_service
        .verify_code(&sent.user_id, &code, CodePurpose::Register)
        .unwrap();
    sent.user_id
}

// ============================================================================
// Auth flows
// ============================================================================

#[test]
fn test_registration_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let (context, codes) = create_test_context(&temp_dir);

    let sent = context.auth_service.register(&register_input()).unwrap();
    assert_eq!(sent.email, "a***@fla.edu");
    assert_eq!(sent.purpose, CodePurpose::Register);

    // The acknowledgment never carries the code
    let code = codes.latest("a@fla.edu", CodePurpose::Register);
    let ack = serde_json::to_string(&sent).unwrap();
    assert!(!ack.contains(&code));

    let wrong = context
        .auth_service
        .verify_code(&sent.user_id, &other_code(&code), CodePurpose::Register);
    assert!(matches!(wrong, Err(Error::InvalidCode)));

    let session = context
        .auth_service
        .verify_code(&sent.user_id, &code, CodePurpose::Register)
        .unwrap();
    assert!(session.user.email_verified);
    assert_eq!(session.user.phone, "3525550100");
    assert_eq!(session.wallet.balance, Decimal::ZERO);
    assert_eq!(
        context.auth_service.authenticate(&session.token).unwrap(),
        sent.user_id
    );
}

#[test]
fn test_login_requires_second_factor() {
    let temp_dir = TempDir::new().unwrap();
    let (context, codes) = create_test_context(&temp_dir);
    let user_id = registered_user(&context, &codes);

    let sent = context
        .auth_service
        .login(&LoginInput {
            email: "a@fla.edu".to_string(),
            password: "pw12345678".to_string(),
        })
        .unwrap();
    assert_eq!(sent.user_id, user_id);

    let login_code = codes.latest("a@fla.edu", CodePurpose::Login);

    // A login code does not complete registration and vice versa
    assert!(matches!(
        context
            .auth_service
            .verify_code(&user_id, &login_code, CodePurpose::Register),
        Err(Error::InvalidCode)
    ));

    let session = context
        .auth_service
        .verify_code(&user_id, &login_code, CodePurpose::Login)
        .unwrap();
    assert_eq!(session.user.id, user_id);

    // Consumed
    assert!(matches!(
        context
            .auth_service
            .verify_code(&user_id, &login_code, CodePurpose::Login),
        Err(Error::InvalidCode)
    ));
}

#[test]
fn test_resend_invalidates_previous_code() {
    let temp_dir = TempDir::new().unwrap();
    let (context, codes) = create_test_context(&temp_dir);

    let sent = context.auth_service.register(&register_input()).unwrap();
    let first = codes.latest("a@fla.edu", CodePurpose::Register);

    context
        .auth_service
        .resend_code(&sent.user_id, CodePurpose::Register)
        .unwrap();
    let second = codes.latest("a@fla.edu", CodePurpose::Register);

    if first != second {
        assert!(matches!(
            context
                .auth_service
                .verify_code(&sent.user_id, &first, CodePurpose::Register),
            Err(Error::InvalidCode)
        ));
    }
    context
        .auth_service
        .verify_code(&sent.user_id, &second, CodePurpose::Register)
        .unwrap();
}

#[test]
fn test_duplicate_registration_leaves_one_account() {
    let temp_dir = TempDir::new().unwrap();
    let (context, _codes) = create_test_context(&temp_dir);

    context.auth_service.register(&register_input()).unwrap();
    let again = context.auth_service.register(&register_input());
    assert!(matches!(again, Err(Error::DuplicateIdentity(_))));

    let users = context.repository.read(|store| store.count_rows("users")).unwrap();
    let wallets = context.repository.read(|store| store.count_rows("wallets")).unwrap();
    assert_eq!((users, wallets), (1, 1));
}

#[test]
fn test_federated_login_links_then_reuses_account() {
    let temp_dir = TempDir::new().unwrap();
    let (context, codes) = create_test_context(&temp_dir);
    let user_id = registered_user(&context, &codes);

    let input = FederatedInput {
        google_id: "google-sub-1".to_string(),
        email: "a@fla.edu".to_string(),
        name: "A User".to_string(),
        avatar: None,
    };
    let linked = context.auth_service.federated(&input).unwrap();
    assert_eq!(linked.user.id, user_id);

    let again = context.auth_service.federated(&input).unwrap();
    assert_eq!(again.user.id, user_id);

    // Password login keeps working after linking
    context
        .auth_service
        .login(&LoginInput {
            email: "a@fla.edu".to_string(),
            password: "pw12345678".to_string(),
        })
        .unwrap();

    let users = context.repository.read(|store| store.count_rows("users")).unwrap();
    assert_eq!(users, 1);
}

#[test]
fn test_closed_account_disappears() {
    let temp_dir = TempDir::new().unwrap();
    let (context, codes) = create_test_context(&temp_dir);
    let user_id = registered_user(&context, &codes);

    context.auth_service.close_account(&user_id).unwrap();

    assert!(matches!(
        context.auth_service.get_profile(&user_id),
        Err(Error::UserNotFound)
    ));
    assert!(matches!(
        context.auth_service.login(&LoginInput {
            email: "a@fla.edu".to_string(),
            password: "pw12345678".to_string(),
        }),
        Err(Error::InvalidCredentials)
    ));
    assert!(matches!(
        context.auth_service.close_account(&user_id),
        Err(Error::UserNotFound)
    ));

    // The tombstoned row still holds its identity
    assert!(matches!(
        context.auth_service.register(&register_input()),
        Err(Error::DuplicateIdentity(_))
    ));
}

// ============================================================================
// Ledger
// ============================================================================

#[test]
fn test_overdraw_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let (context, codes) = create_test_context(&temp_dir);
    let user_id = registered_user(&context, &codes);

    context
        .wallet_service
        .deposit(
            &user_id,
            &DepositInput {
                amount: money("100.00"),
                source: "bank".to_string(),
                description: None,
            },
        )
        .unwrap();

    let result = context.wallet_service.withdraw(
        &user_id,
        &WithdrawInput {
            amount: money("150.00"),
            bank_account: "acct".to_string(),
        },
    );
    assert!(matches!(result, Err(Error::InsufficientBalance)));

    let wallet = context.wallet_service.get_wallet(&user_id).unwrap();
    assert_eq!(wallet.balance, money("100.00"));

    let page = context.wallet_service.list_transactions(&user_id, 1, 10).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.total_pages, 1);
}

#[test]
fn test_balance_equals_journal_replay() {
    let temp_dir = TempDir::new().unwrap();
    let (context, codes) = create_test_context(&temp_dir);
    let user_id = registered_user(&context, &codes);

    let steps = [
        ("deposit", "10.10"),
        ("deposit", "0.20"),
        ("withdraw", "5.05"),
        ("withdraw", "100.00"),
        ("deposit", "1234.56"),
        ("withdraw", "0.01"),
        ("withdraw", "1239.80"),
        ("deposit", "0.30"),
    ];

    for (kind, amount) in steps {
        let amount = money(amount);
        let result = if kind == "deposit" {
            context.wallet_service.deposit(
                &user_id,
                &DepositInput {
                    amount,
                    source: "bank".to_string(),
                    description: None,
                },
            )
        } else {
            context.wallet_service.withdraw(
                &user_id,
                &WithdrawInput {
                    amount,
                    bank_account: "acct".to_string(),
                },
            )
        };
        match result {
            Ok(wallet) => assert!(wallet.balance >= Decimal::ZERO),
            Err(Error::InsufficientBalance) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    let page = context.wallet_service.list_transactions(&user_id, 1, 50).unwrap();
    let replayed: Decimal = page.transactions.iter().map(|t| t.signed_amount()).sum();
    let wallet = context.wallet_service.get_wallet(&user_id).unwrap();

    // 10.10 + 0.20 - 5.05 + 1234.56 - 0.01 - 1239.80 + 0.30
    assert_eq!(wallet.balance, money("0.30"));
    assert_eq!(replayed, wallet.balance);
    assert_eq!(page.total, 7);
    assert_eq!(page.transactions[0].kind, TransactionType::Deposit);

    assert!(context.doctor_service.run_checks().unwrap().is_healthy());
}

#[test]
fn test_ledger_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let user_id = {
        let (context, codes) = create_test_context(&temp_dir);
        let user_id = registered_user(&context, &codes);
        context
            .wallet_service
            .deposit(
                &user_id,
                &DepositInput {
                    amount: money("42.50"),
                    source: "bank".to_string(),
                    description: Some("Paycheck".to_string()),
                },
            )
            .unwrap();
        user_id
    };

    let (context, _codes) = create_test_context(&temp_dir);
    let wallet = context.wallet_service.get_wallet(&user_id).unwrap();
    assert_eq!(wallet.balance, money("42.50"));

    let page = context.wallet_service.list_transactions(&user_id, 1, 10).unwrap();
    assert_eq!(page.transactions[0].description, "Paycheck");

    // Migrations are not re-applied
    let result = context.repository.run_migrations().unwrap();
    assert!(result.applied.is_empty());
}
