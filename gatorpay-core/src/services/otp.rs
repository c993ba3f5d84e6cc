//! OTP service - issues and verifies one-time verification codes
//!
//! A code is bound to (user, purpose). Issuing invalidates every unused
//! predecessor for the pair in the same unit of work as the insert, and
//! both issue and verify run under the pair's exclusive lock.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use uuid::Uuid;

use crate::adapters::duckdb::{DuckDbRepository, Store};
use crate::adapters::locks::code_key;
use crate::domain::result::{Error, Result};
use crate::domain::verification::validate_code_format;
use crate::domain::{CodePurpose, VerificationCode};
use crate::ports::CodeDelivery;

/// Uniform six-digit code from the operating system CSPRNG
pub fn generate_code() -> String {
    let value: u32 = OsRng.gen_range(0..1_000_000);
    format!("{:06}", value)
}

/// Outcome of matching a presented code, decided inside the unit of work
enum CodeCheck {
    Accepted,
    Expired,
}

pub struct OtpService {
    repository: Arc<DuckDbRepository>,
    delivery: Arc<dyn CodeDelivery>,
    ttl: Duration,
}

impl OtpService {
    pub fn new(
        repository: Arc<DuckDbRepository>,
        delivery: Arc<dyn CodeDelivery>,
        ttl_secs: i64,
    ) -> Self {
        Self {
            repository,
            delivery,
            ttl: Duration::seconds(ttl_secs),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Invalidate live codes for (user, purpose), persist a fresh one and
    /// hand it to the delivery transport
    ///
    /// Delivery failures are logged and swallowed: the stored record is
    /// what verification checks against.
    pub fn issue(&self, user_id: &Uuid, destination: &str, purpose: CodePurpose) -> Result<()> {
        let code = generate_code();
        let record = VerificationCode::issue(*user_id, purpose, code.clone(), self.ttl);

        let invalidated = self.repository.with_lock(&code_key(user_id, purpose), || {
            self.repository.unit_of_work(|store| {
                let invalidated = store.invalidate_codes(user_id, purpose)?;
                store.insert_code(&record)?;
                Ok(invalidated)
            })
        })?;

        tracing::debug!(
            user_id = %user_id,
            purpose = purpose.as_str(),
            invalidated,
            "verification code issued"
        );

        if let Err(e) = self.delivery.send(destination, &code, purpose) {
            tracing::warn!(
                user_id = %user_id,
                purpose = purpose.as_str(),
                transport = self.delivery.name(),
                error = %e,
                "verification code delivery failed"
            );
        }

        Ok(())
    }

    /// Consume the newest unused code matching (user, code, purpose)
    ///
    /// A matched code is marked used whether it is live or expired, so an
    /// expired code answers `CodeExpired` once and `InvalidCode` afterwards.
    pub fn verify(&self, user_id: &Uuid, code: &str, purpose: CodePurpose) -> Result<()> {
        self.verify_then(user_id, code, purpose, |_| Ok(()))
    }

    /// Like `verify`, running `on_accept` in the same unit of work as the
    /// consumption of a live code. If `on_accept` fails the code stays unused.
    pub fn verify_then(
        &self,
        user_id: &Uuid,
        code: &str,
        purpose: CodePurpose,
        on_accept: impl FnOnce(&Store<'_>) -> Result<()>,
    ) -> Result<()> {
        validate_code_format(code)?;

        let check = self.repository.with_lock(&code_key(user_id, purpose), || {
            self.repository.unit_of_work(|store| {
                let record = store
                    .find_unused_code(user_id, code, purpose)?
                    .ok_or(Error::InvalidCode)?;
                store.mark_code_used(&record.id)?;

                if record.is_acceptable_at(Utc::now()) {
                    on_accept(store)?;
                    Ok(CodeCheck::Accepted)
                } else {
                    Ok(CodeCheck::Expired)
                }
            })
        })?;

        match check {
            CodeCheck::Accepted => Ok(()),
            CodeCheck::Expired => Err(Error::CodeExpired),
        }
    }
}
