//! GatorPay Core - Business logic for the GatorPay wallet backend
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core business entities (User, Wallet, Transaction, etc.)
//! - **ports**: Trait definitions for external collaborators (CodeDelivery)
//! - **services**: Business logic orchestration
//! - **adapters**: Concrete implementations (DuckDB, keyed locks, code delivery)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use rand::rngs::OsRng;
use rand::Rng;

use adapters::delivery::{ConsoleDelivery, HttpRelayDelivery};
use adapters::duckdb::DuckDbRepository;
use config::Config;
use ports::CodeDelivery;
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult, Result, SessionError};
pub use domain::{CodePurpose, Transaction, User, UserProfile, Wallet};

/// Main context for GatorPay operations
///
/// Every service shares the one repository handle built here.
pub struct GatorPayContext {
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub otp_service: Arc<OtpService>,
    pub token_service: Arc<TokenService>,
    pub auth_service: AuthService,
    pub wallet_service: WalletService,
    pub doctor_service: DoctorService,
}

impl GatorPayContext {
    /// Load config from `data_dir`, open the ledger database and apply
    /// pending migrations
    pub fn new(data_dir: &Path) -> Result<Self> {
        let config = Config::load(data_dir)?;
        let db_path = config.database_file(data_dir);
        let repository = Arc::new(DuckDbRepository::new(&db_path)?);
        repository.ensure_schema()?;
        Self::with_repository(config, repository)
    }

    /// Build the services over an already opened repository
    pub fn with_repository(config: Config, repository: Arc<DuckDbRepository>) -> Result<Self> {
        let delivery: Arc<dyn CodeDelivery> = match config.otp_relay_url.as_deref() {
            Some(url) => Arc::new(HttpRelayDelivery::new(url, config.otp_ttl_secs.max(0) as u64)?),
            None => Arc::new(ConsoleDelivery::new()),
        };
        tracing::debug!(transport = delivery.name(), "code delivery configured");

        // Without a configured secret, tokens are signed with a throwaway
        // key and never outlive the process
        let secret = match config.jwt_secret.clone() {
            Some(secret) if !secret.is_empty() => secret,
            _ => ephemeral_secret(),
        };

        let otp_service = Arc::new(OtpService::new(
            Arc::clone(&repository),
            delivery,
            config.otp_ttl_secs,
        ));
        let token_service = Arc::new(TokenService::new(&secret, config.session_lifetime_secs));
        let auth_service = AuthService::new(
            Arc::clone(&repository),
            Arc::clone(&otp_service),
            Arc::clone(&token_service),
            config.argon2,
        )?;
        let wallet_service = WalletService::new(Arc::clone(&repository));
        let doctor_service = DoctorService::new(Arc::clone(&repository));

        Ok(Self {
            config,
            repository,
            otp_service,
            token_service,
            auth_service,
            wallet_service,
            doctor_service,
        })
    }
}

fn ephemeral_secret() -> String {
    (0..48)
        .map(|_| char::from(OsRng.gen_range(b'!'..=b'~')))
        .collect()
}
