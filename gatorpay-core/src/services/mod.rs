//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

pub mod auth;
mod doctor;
pub mod logging;
pub mod migration;
pub mod otp;
pub mod token;
pub mod wallet;

pub use auth::{AuthService, AuthSession, FederatedInput, LoginInput, OtpSent, Profile, RegisterInput};
pub use doctor::{CheckResult, DoctorResult, DoctorService, DoctorSummary};
pub use logging::{EntryPoint, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService, Schema, ACTIVITY_LOG_SCHEMA, LEDGER_SCHEMA};
pub use otp::OtpService;
pub use token::TokenService;
pub use wallet::{DepositInput, TransactionPage, WalletService, WithdrawInput};
