//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

pub mod result;
pub mod session;
pub mod transaction;
pub mod user;
pub mod verification;
pub mod wallet;

pub use session::Claims;
pub use transaction::{Transaction, TransactionStatus, TransactionType};
pub use user::{AuthProvider, KycStatus, LifecycleState, User, UserProfile};
pub use verification::{CodePurpose, VerificationCode};
pub use wallet::Wallet;
