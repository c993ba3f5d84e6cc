//! Auth service - two-step (password + one-time code) authentication
//!
//! Local flows move an account through
//! `Unauthenticated -> CredentialChecked -> CodeSent -> Authenticated`.
//! Only `verify_code` and `federated` mint session tokens.

use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapters::duckdb::{DuckDbRepository, IdentityField, Store};
use crate::adapters::locks::federated_key;
use crate::config::Argon2Params;
use crate::domain::result::{Error, Result};
use crate::domain::user::{
    mask_email, normalize_phone, provisional_username, validate_email, MIN_PASSWORD_LEN,
    MIN_USERNAME_LEN,
};
use crate::domain::{CodePurpose, User, UserProfile, Wallet};
use crate::services::otp::OtpService;
use crate::services::token::TokenService;

/// Attempts at finding a free provisional username for federated sign-ups
const USERNAME_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub username: String,
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FederatedInput {
    pub google_id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Acknowledgment that a code was dispatched. Never carries the code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtpSent {
    pub user_id: Uuid,
    /// Display-masked email, e.g. `a***@fla.edu`
    pub email: String,
    pub purpose: CodePurpose,
}

/// An authenticated session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub user: UserProfile,
    pub wallet: Wallet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user: UserProfile,
    pub wallet: Wallet,
}

pub struct AuthService {
    repository: Arc<DuckDbRepository>,
    otp: Arc<OtpService>,
    tokens: Arc<TokenService>,
    hasher: Argon2<'static>,
    /// Hash verified against when the email is unknown, so both login
    /// failures cost the same
    dummy_hash: String,
}

impl AuthService {
    pub fn new(
        repository: Arc<DuckDbRepository>,
        otp: Arc<OtpService>,
        tokens: Arc<TokenService>,
        params: Argon2Params,
    ) -> Result<Self> {
        let argon_params = Params::new(params.memory_kib, params.iterations, params.parallelism, None)
            .map_err(|e| Error::config(format!("invalid argon2 parameters: {}", e)))?;
        let hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

        let filler: String = (0..24).map(|_| OsRng.gen_range(b'a'..=b'z') as char).collect();
        let dummy_hash = hash_with(&hasher, &filler)?;

        Ok(Self {
            repository,
            otp,
            tokens,
            hasher,
            dummy_hash,
        })
    }

    /// Create an unverified account plus its empty wallet, then send a
    /// registration code
    pub fn register(&self, input: &RegisterInput) -> Result<OtpSent> {
        let email = validate_email(&input.email)?;
        let phone = normalize_phone(&input.phone)?;
        let username = input.username.trim();
        let first_name = input.first_name.trim();
        let last_name = input.last_name.trim();

        if input.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if username.chars().count() < MIN_USERNAME_LEN {
            return Err(Error::validation(format!(
                "username must be at least {} characters",
                MIN_USERNAME_LEN
            )));
        }
        if first_name.is_empty() || last_name.is_empty() {
            return Err(Error::validation("first and last name are required"));
        }

        // Answered again under the identity locks in create_account; checked
        // here first to skip hashing for an obvious duplicate
        self.repository.read(|store| {
            ensure_unclaimed(
                store,
                &[
                    (IdentityField::Email, email.as_str()),
                    (IdentityField::Username, username),
                    (IdentityField::Phone, phone.as_str()),
                ],
            )
        })?;

        let password_hash = self.hash_password(&input.password)?;
        let user = User::new_local(email, username, phone, first_name, last_name, password_hash);
        self.create_account(&user)?;

        tracing::info!(user_id = %user.id, "account registered");

        self.otp.issue(&user.id, &user.email, CodePurpose::Register)?;
        Ok(OtpSent {
            user_id: user.id,
            email: mask_email(&user.email),
            purpose: CodePurpose::Register,
        })
    }

    /// Check the password and send a login code
    ///
    /// Unknown email and wrong password fail identically.
    pub fn login(&self, input: &LoginInput) -> Result<OtpSent> {
        let email = validate_email(&input.email)?;
        if input.password.is_empty() {
            return Err(Error::validation("password is required"));
        }

        let user = self.repository.read(|store| store.find_user_by_email(&email))?;
        let user = match user {
            Some(user) => match user.password_hash.as_deref() {
                Some(hash) if self.password_matches(&input.password, hash) => user,
                _ => return Err(Error::InvalidCredentials),
            },
            None => {
                self.password_matches(&input.password, &self.dummy_hash);
                return Err(Error::InvalidCredentials);
            }
        };

        self.otp.issue(&user.id, &user.email, CodePurpose::Login)?;
        Ok(OtpSent {
            user_id: user.id,
            email: mask_email(&user.email),
            purpose: CodePurpose::Login,
        })
    }

    /// Consume a code; on success mark registration complete and open a session
    pub fn verify_code(&self, user_id: &Uuid, code: &str, purpose: CodePurpose) -> Result<AuthSession> {
        self.otp.verify_then(user_id, code.trim(), purpose, |store| {
            if purpose == CodePurpose::Register {
                store.mark_email_verified(user_id)?;
            }
            Ok(())
        })?;

        let user = self
            .repository
            .read(|store| store.find_user(user_id))?
            .ok_or(Error::UserNotFound)?;

        tracing::info!(user_id = %user.id, purpose = purpose.as_str(), "code verified");
        self.open_session(user)
    }

    /// Send a fresh code for an existing account
    pub fn resend_code(&self, user_id: &Uuid, purpose: CodePurpose) -> Result<OtpSent> {
        let user = self
            .repository
            .read(|store| store.find_user(user_id))?
            .ok_or(Error::UserNotFound)?;

        self.otp.issue(&user.id, &user.email, purpose)?;
        Ok(OtpSent {
            user_id: user.id,
            email: mask_email(&user.email),
            purpose,
        })
    }

    /// Sign in through an external identity provider, skipping the code step
    ///
    /// Checked in order: linked identity, existing email (linked now), new
    /// account.
    pub fn federated(&self, input: &FederatedInput) -> Result<AuthSession> {
        let google_id = input.google_id.trim();
        if google_id.is_empty() {
            return Err(Error::validation("external identity is required"));
        }
        let email = validate_email(&input.email)?;
        let avatar = input.avatar.as_deref().map(str::trim).filter(|a| !a.is_empty());

        let user = self.repository.with_lock(&federated_key(google_id), || -> Result<User> {
            if let Some(user) = self.repository.read(|store| store.find_user_by_google_id(google_id))? {
                return Ok(user);
            }

            if let Some(mut user) = self.repository.read(|store| store.find_user_by_email(&email))? {
                user.link_external_identity(google_id, avatar);
                self.repository
                    .unit_of_work(|store| store.save_external_identity(&user))?;
                tracing::info!(user_id = %user.id, "external identity linked");
                return Ok(user);
            }

            let base = provisional_username(&email);
            let mut username = self.free_username(&base)?;
            let mut attempt = 0;
            loop {
                let user = User::new_federated(
                    google_id,
                    email.as_str(),
                    username,
                    &input.name,
                    avatar.map(str::to_string),
                );
                match self.create_account(&user) {
                    Ok(()) => {
                        tracing::info!(user_id = %user.id, "federated account created");
                        return Ok(user);
                    }
                    // Another sign-up claimed the username after free_username looked
                    Err(Error::DuplicateIdentity(ref msg))
                        if msg == IdentityField::Username.conflict_message()
                            && attempt < USERNAME_ATTEMPTS =>
                    {
                        attempt += 1;
                        username = fallback_username(&base);
                    }
                    Err(e) => return Err(e),
                }
            }
        })?;

        self.open_session(user)
    }

    /// Sanitized user plus wallet for the session subject
    pub fn get_profile(&self, user_id: &Uuid) -> Result<Profile> {
        self.repository.read(|store| {
            let user = store.find_user(user_id)?.ok_or(Error::UserNotFound)?;
            let wallet = store.find_wallet_by_user(user_id)?.ok_or(Error::WalletNotFound)?;
            Ok(Profile {
                user: user.profile(),
                wallet,
            })
        })
    }

    /// Soft-close an account. Its rows stay, but lookups no longer see it.
    pub fn close_account(&self, user_id: &Uuid) -> Result<()> {
        let closed = self
            .repository
            .unit_of_work(|store| store.close_user(user_id))?;
        if !closed {
            return Err(Error::UserNotFound);
        }
        tracing::info!(user_id = %user_id, "account closed");
        Ok(())
    }

    /// Resolve a presented bearer token to its subject
    pub fn authenticate(&self, token: &str) -> Result<Uuid> {
        self.tokens.validate(token)
    }

    /// Persist a user and its zero-balance wallet as one unit
    ///
    /// Holds the lock of every identity value the user claims across the
    /// uniqueness check and the insert, so competing claims on the same
    /// value never reach the constraint together.
    fn create_account(&self, user: &User) -> Result<()> {
        let mut claims = vec![
            (IdentityField::Email, user.email.as_str()),
            (IdentityField::Username, user.username.as_str()),
        ];
        if let Some(phone) = user.phone.as_deref() {
            claims.push((IdentityField::Phone, phone));
        }
        let keys: Vec<String> = claims
            .iter()
            .map(|(field, value)| field.lock_key(value))
            .collect();
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();

        let wallet = Wallet::for_user(user.id);
        self.repository
            .with_locks(&keys, || {
                self.repository.read(|store| ensure_unclaimed(store, &claims))?;
                self.repository.unit_of_work(|store| {
                    store.insert_user(user)?;
                    store.insert_wallet(&wallet)
                })
            })
            .map_err(|e| match e {
                Error::DuplicateIdentity(_) => e,
                other => {
                    tracing::error!(error = %other, "account creation failed");
                    Error::AccountCreationFailed
                }
            })
    }

    fn open_session(&self, user: User) -> Result<AuthSession> {
        let wallet = self
            .repository
            .read(|store| store.find_wallet_by_user(&user.id))?
            .ok_or(Error::WalletNotFound)?;
        let token = self.tokens.mint(&user.id)?;
        Ok(AuthSession {
            token,
            user: user.profile(),
            wallet,
        })
    }

    /// `base` if unused, otherwise `base` plus a short random suffix
    fn free_username(&self, base: &str) -> Result<String> {
        let mut candidate = base.to_string();
        for _ in 0..USERNAME_ATTEMPTS {
            let taken = self
                .repository
                .read(|store| store.identity_taken(IdentityField::Username, &candidate))?;
            if !taken {
                return Ok(candidate);
            }
            candidate = format!("{}{:04}", base, OsRng.gen_range(0..10_000u32));
        }
        Ok(fallback_username(base))
    }

    fn hash_password(&self, password: &str) -> Result<String> {
        hash_with(&self.hasher, password).map_err(|e| {
            tracing::error!(error = %e, "password hashing failed");
            Error::AccountCreationFailed
        })
    }

    fn password_matches(&self, password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self.hasher.verify_password(password.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }
}

/// `DuplicateIdentity` for the first value some account already holds
fn ensure_unclaimed(store: &Store<'_>, claims: &[(IdentityField, &str)]) -> Result<()> {
    for (field, value) in claims {
        if store.identity_taken(*field, value)? {
            return Err(Error::DuplicateIdentity(field.conflict_message().to_string()));
        }
    }
    Ok(())
}

/// Username with a suffix no other sign-up will pick
fn fallback_username(base: &str) -> String {
    format!("{}-{}", base, &Uuid::new_v4().simple().to_string()[..8])
}

fn hash_with(hasher: &Argon2<'_>, password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    hasher
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::config(format!("password hashing failed: {}", e)))
}
