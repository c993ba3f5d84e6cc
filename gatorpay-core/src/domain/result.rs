//! Result and error types for the core library

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a presented session token was refused
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("malformed token claims")]
    MalformedClaims,
}

/// Core library error type
///
/// Display strings are user-facing. Variants carrying a `String` hold a
/// caller-safe message, except `Storage` which holds the underlying
/// database message and is only ever logged.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    DuplicateIdentity(String),

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("invalid verification code")]
    InvalidCode,

    #[error("verification code has expired, please request a new one")]
    CodeExpired,

    #[error("user not found")]
    UserNotFound,

    #[error("wallet not found")]
    WalletNotFound,

    #[error("wallet is not active")]
    WalletInactive,

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("failed to create account")]
    AccountCreationFailed,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Database error: {0}")]
    Storage(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a code delivery error
    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Stable machine-readable code for this failure
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::DuplicateIdentity(_) => "duplicate_identity",
            Error::InvalidCredentials => "invalid_credentials",
            Error::InvalidCode => "invalid_code",
            Error::CodeExpired => "code_expired",
            Error::UserNotFound => "user_not_found",
            Error::WalletNotFound => "wallet_not_found",
            Error::WalletInactive => "wallet_inactive",
            Error::InsufficientBalance => "insufficient_balance",
            Error::AccountCreationFailed => "account_creation_failed",
            Error::Session(SessionError::InvalidSignature) => "invalid_signature",
            Error::Session(SessionError::Expired) => "token_expired",
            Error::Session(SessionError::MalformedClaims) => "malformed_claims",
            Error::Storage(_) => "storage_failure",
            Error::Delivery(_) => "delivery_failure",
            Error::Config(_) => "config_error",
            Error::Io(_) => "io_error",
            Error::Json(_) => "json_error",
        }
    }

    /// True when the failure was caused by the caller's input or state,
    /// false for internal faults whose details must stay server-side
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Error::Storage(_)
                | Error::Delivery(_)
                | Error::Config(_)
                | Error::Io(_)
                | Error::Json(_)
                | Error::AccountCreationFailed
        )
    }
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Response envelope shared by every transport-facing operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Create a failed result
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok("ok", data),
            Err(e) if e.is_client_error() => Self::fail(e.to_string()),
            Err(_) => Self::fail("internal server error"),
        }
    }
}
