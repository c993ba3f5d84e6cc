//! One-time verification code model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::{Error, Result};

/// Number of digits in a verification code
pub const CODE_LENGTH: usize = 6;

/// Why a code was issued; part of its lookup key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodePurpose {
    Register,
    Login,
}

impl CodePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodePurpose::Register => "register",
            CodePurpose::Login => "login",
        }
    }
}

impl fmt::Display for CodePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodePurpose {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "register" => Ok(CodePurpose::Register),
            "login" => Ok(CodePurpose::Login),
            _ => Err(Error::validation("purpose must be 'register' or 'login'")),
        }
    }
}

/// Reject anything that is not exactly six ASCII digits
pub fn validate_code_format(code: &str) -> Result<()> {
    if code.len() != CODE_LENGTH || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::validation("verification code must be 6 digits"));
    }
    Ok(())
}

/// A persisted verification code. Records are only ever flipped to used.
#[derive(Clone, PartialEq)]
pub struct VerificationCode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code: String,
    pub purpose: CodePurpose,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for VerificationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationCode")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("purpose", &self.purpose)
            .field("expires_at", &self.expires_at)
            .field("used", &self.used)
            .finish_non_exhaustive()
    }
}

impl VerificationCode {
    /// Fresh, unused code expiring `ttl` from now
    pub fn issue(user_id: Uuid, purpose: CodePurpose, code: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            code: code.into(),
            purpose,
            expires_at: now + ttl,
            used: false,
            created_at: now,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Unused and strictly before expiry
    pub fn is_acceptable_at(&self, now: DateTime<Utc>) -> bool {
        !self.used && !self.is_expired_at(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purpose_parsing() {
        assert_eq!("register".parse::<CodePurpose>().unwrap(), CodePurpose::Register);
        assert_eq!("login".parse::<CodePurpose>().unwrap(), CodePurpose::Login);
        assert!("reset".parse::<CodePurpose>().is_err());
    }

    #[test]
    fn test_code_format() {
        assert!(validate_code_format("012345").is_ok());
        assert!(validate_code_format("12345").is_err());
        assert!(validate_code_format("12345a").is_err());
        assert!(validate_code_format("1234567").is_err());
    }

    #[test]
    fn test_expiry_boundary() {
        let code = VerificationCode::issue(Uuid::new_v4(), CodePurpose::Login, "123456", Duration::minutes(5));
        assert!(code.is_acceptable_at(code.created_at));
        assert!(!code.is_acceptable_at(code.expires_at));
        assert!(code.is_expired_at(code.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn test_debug_hides_code() {
        let code = VerificationCode::issue(Uuid::new_v4(), CodePurpose::Login, "987654", Duration::minutes(5));
        assert!(!format!("{:?}", code).contains("987654"));
    }
}
