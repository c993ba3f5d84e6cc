//! User domain model

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::{Error, Result};

/// Credit score assigned to every new account
pub const DEFAULT_CREDIT_SCORE: i32 = 650;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MIN_USERNAME_LEN: usize = 3;
const PHONE_DIGITS: usize = 10;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$")
            .expect("email pattern is valid")
    })
}

/// Know-your-customer review state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KycStatus {
    Pending,
    Verified,
    Rejected,
}

impl KycStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KycStatus::Pending => "pending",
            KycStatus::Verified => "verified",
            KycStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for KycStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(KycStatus::Pending),
            "verified" => Ok(KycStatus::Verified),
            "rejected" => Ok(KycStatus::Rejected),
            other => Err(Error::storage(format!("unknown kyc status '{}'", other))),
        }
    }
}

/// Where the user's identity is vouched for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Local,
    Google,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Local => "local",
            AuthProvider::Google => "google",
        }
    }
}

impl FromStr for AuthProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(AuthProvider::Local),
            "google" => Ok(AuthProvider::Google),
            other => Err(Error::storage(format!("unknown auth provider '{}'", other))),
        }
    }
}

/// Account lifecycle. Closed accounts keep their rows and carry a tombstone timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Active,
    Closed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Active => "active",
            LifecycleState::Closed => "closed",
        }
    }
}

impl FromStr for LifecycleState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(LifecycleState::Active),
            "closed" => Ok(LifecycleState::Closed),
            other => Err(Error::storage(format!("unknown lifecycle state '{}'", other))),
        }
    }
}

/// A persisted user record
///
/// Deliberately not `Serialize`: the password hash must never leave the
/// core. Use [`User::profile`] for anything caller-facing.
#[derive(Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    /// Ten normalized digits; federated accounts may have none
    pub phone: Option<String>,
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: Option<String>,
    pub auth_provider: AuthProvider,
    /// External identity key for federated logins
    pub google_id: Option<String>,
    pub email_verified: bool,
    pub kyc_status: KycStatus,
    pub credit_score: i32,
    pub lifecycle_state: LifecycleState,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("auth_provider", &self.auth_provider)
            .field("email_verified", &self.email_verified)
            .field("lifecycle_state", &self.lifecycle_state)
            .finish_non_exhaustive()
    }
}

impl User {
    /// Create an unverified local account from already-validated input
    pub fn new_local(
        email: impl Into<String>,
        username: impl Into<String>,
        phone: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            username: username.into(),
            phone: Some(phone.into()),
            password_hash: Some(password_hash.into()),
            first_name: first_name.into(),
            last_name: last_name.into(),
            avatar_url: None,
            auth_provider: AuthProvider::Local,
            google_id: None,
            email_verified: false,
            kyc_status: KycStatus::Pending,
            credit_score: DEFAULT_CREDIT_SCORE,
            lifecycle_state: LifecycleState::Active,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a verified account vouched for by an external identity provider
    pub fn new_federated(
        google_id: impl Into<String>,
        email: impl Into<String>,
        username: impl Into<String>,
        display_name: &str,
        avatar_url: Option<String>,
    ) -> Self {
        let (first_name, last_name) = split_display_name(display_name);
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            username: username.into(),
            phone: None,
            password_hash: None,
            first_name,
            last_name,
            avatar_url,
            auth_provider: AuthProvider::Google,
            google_id: Some(google_id.into()),
            email_verified: true,
            kyc_status: KycStatus::Pending,
            credit_score: DEFAULT_CREDIT_SCORE,
            lifecycle_state: LifecycleState::Active,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach an external identity to this account
    pub fn link_external_identity(&mut self, google_id: &str, avatar_url: Option<&str>) {
        self.google_id = Some(google_id.to_string());
        self.auth_provider = AuthProvider::Google;
        self.email_verified = true;
        if let Some(avatar) = avatar_url.filter(|a| !a.trim().is_empty()) {
            self.avatar_url = Some(avatar.to_string());
        }
        self.updated_at = Utc::now();
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle_state == LifecycleState::Active && self.deleted_at.is_none()
    }

    /// Sanitized view without credentials
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            phone: self.phone.clone().unwrap_or_default(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            avatar_url: self.avatar_url.clone().unwrap_or_default(),
            auth_provider: self.auth_provider,
            email_verified: self.email_verified,
            kyc_status: self.kyc_status,
            credit_score: self.credit_score,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// The user shape returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: String,
    pub auth_provider: AuthProvider,
    pub email_verified: bool,
    pub kyc_status: KycStatus,
    pub credit_score: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Check email shape and return its canonical (trimmed, lowercased) form
pub fn validate_email(email: &str) -> Result<String> {
    let email = email.trim();
    if !email_regex().is_match(email) {
        return Err(Error::validation("invalid email format"));
    }
    Ok(email.to_lowercase())
}

/// Strip everything but digits; exactly ten must remain
pub fn normalize_phone(phone: &str) -> Result<String> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != PHONE_DIGITS {
        return Err(Error::validation("phone number must contain exactly 10 digits"));
    }
    Ok(digits)
}

/// First character, a mask, then the domain: `alice@fla.edu` -> `a***@fla.edu`
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first: String = local.chars().take(1).collect();
            format!("{}***@{}", first, domain)
        }
        None => "***".to_string(),
    }
}

/// Split on the first space into (first, last)
pub fn split_display_name(name: &str) -> (String, String) {
    let name = name.trim();
    match name.split_once(' ') {
        Some((first, last)) => (first.to_string(), last.trim().to_string()),
        None => (name.to_string(), String::new()),
    }
}

/// Email local-part, used as a username until the user picks one
pub fn provisional_username(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert_eq!(validate_email(" A@Fla.edu ").unwrap(), "a@fla.edu");
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("").is_err());
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("352-555-0100").unwrap(), "3525550100");
        assert_eq!(normalize_phone("(352) 555 0100").unwrap(), "3525550100");
        assert!(normalize_phone("555-0100").is_err());
        assert!(normalize_phone("1-352-555-0100").is_err());
    }

    #[test]
    fn test_mask_email() {
        assert_eq!(mask_email("a@fla.edu"), "a***@fla.edu");
        assert_eq!(mask_email("albert@ufl.edu"), "a***@ufl.edu");
    }

    #[test]
    fn test_split_display_name() {
        assert_eq!(
            split_display_name("Albert Gator Jr"),
            ("Albert".to_string(), "Gator Jr".to_string())
        );
        assert_eq!(split_display_name("Albert"), ("Albert".to_string(), String::new()));
    }

    #[test]
    fn test_new_local_defaults() {
        let user = User::new_local("a@fla.edu", "auser", "3525550100", "A", "User", "hash");
        assert!(!user.email_verified);
        assert_eq!(user.kyc_status, KycStatus::Pending);
        assert_eq!(user.credit_score, DEFAULT_CREDIT_SCORE);
        assert_eq!(user.auth_provider, AuthProvider::Local);
        assert!(user.is_active());
    }

    #[test]
    fn test_link_external_identity() {
        let mut user = User::new_local("a@fla.edu", "auser", "3525550100", "A", "User", "hash");
        user.link_external_identity("g-123", Some("https://img/a.png"));
        assert!(user.email_verified);
        assert_eq!(user.auth_provider, AuthProvider::Google);
        assert_eq!(user.google_id.as_deref(), Some("g-123"));
        assert_eq!(user.avatar_url.as_deref(), Some("https://img/a.png"));

        user.link_external_identity("g-123", Some(""));
        assert_eq!(user.avatar_url.as_deref(), Some("https://img/a.png"));
    }

    #[test]
    fn test_debug_and_profile_hide_password_hash() {
        let user = User::new_local("a@fla.edu", "auser", "3525550100", "A", "User", "secret-hash");
        assert!(!format!("{:?}", user).contains("secret-hash"));
        let json = serde_json::to_string(&user.profile()).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(!json.contains("password"));
    }
}
