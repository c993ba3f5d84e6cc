//! Token service - mints and validates session tokens (HS256 JWT)

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::domain::result::{Error, Result, SessionError};
use crate::domain::Claims;

/// Stateless session issuer. Tokens stay valid for their whole lifetime;
/// rotating the secret is the only way to revoke them.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetime_secs: i64,
}

impl TokenService {
    pub fn new(secret: &str, lifetime_secs: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            lifetime_secs,
        }
    }

    pub fn lifetime_secs(&self) -> i64 {
        self.lifetime_secs
    }

    pub fn mint(&self, user_id: &Uuid) -> Result<String> {
        let claims = Claims::new(*user_id, Utc::now().timestamp(), self.lifetime_secs);
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| Error::config(format!("failed to sign session token: {}", e)))
    }

    /// Verify signature and expiry, then return the subject
    pub fn validate(&self, token: &str) -> Result<Uuid> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            let reason = match e.kind() {
                ErrorKind::ExpiredSignature => SessionError::Expired,
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    SessionError::InvalidSignature
                }
                _ => SessionError::MalformedClaims,
            };
            Error::Session(reason)
        })?;
        Ok(data.claims.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "test-secret-with-enough-entropy-0123456789";

    #[test]
    fn test_round_trip() {
        let service = TokenService::new(SECRET, 3600);
        let user_id = Uuid::new_v4();
        let token = service.mint(&user_id).unwrap();
        assert_eq!(service.validate(&token).unwrap(), user_id);
    }

    #[test]
    fn test_expired_token() {
        let service = TokenService::new(SECRET, -60);
        let token = service.mint(&Uuid::new_v4()).unwrap();
        assert!(matches!(
            service.validate(&token),
            Err(Error::Session(SessionError::Expired))
        ));
    }

    #[test]
    fn test_wrong_secret_is_invalid_signature() {
        let token = TokenService::new("another-secret", 3600).mint(&Uuid::new_v4()).unwrap();
        let service = TokenService::new(SECRET, 3600);
        assert!(matches!(
            service.validate(&token),
            Err(Error::Session(SessionError::InvalidSignature))
        ));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let service = TokenService::new(SECRET, 3600);
        let token = service.mint(&Uuid::new_v4()).unwrap();
        let other = service.mint(&Uuid::new_v4()).unwrap();

        // Splice the second token's payload under the first token's signature
        let parts: Vec<&str> = token.split('.').collect();
        let other_parts: Vec<&str> = other.split('.').collect();
        let forged = format!("{}.{}.{}", parts[0], other_parts[1], parts[2]);
        if forged != token {
            assert!(matches!(
                service.validate(&forged),
                Err(Error::Session(SessionError::InvalidSignature))
            ));
        }
    }

    #[test]
    fn test_algorithm_substitution_is_rejected() {
        let claims = Claims::new(Uuid::new_v4(), Utc::now().timestamp(), 3600);
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let service = TokenService::new(SECRET, 3600);
        assert!(matches!(
            service.validate(&token),
            Err(Error::Session(SessionError::InvalidSignature))
        ));
    }

    #[test]
    fn test_missing_or_mistyped_subject_is_malformed() {
        let key = EncodingKey::from_secret(SECRET.as_bytes());
        let exp = Utc::now().timestamp() + 3600;
        let service = TokenService::new(SECRET, 3600);

        let missing = encode(&Header::default(), &json!({ "exp": exp, "iat": 0 }), &key).unwrap();
        assert!(matches!(
            service.validate(&missing),
            Err(Error::Session(SessionError::MalformedClaims))
        ));

        let mistyped =
            encode(&Header::default(), &json!({ "user_id": 42, "exp": exp, "iat": 0 }), &key).unwrap();
        assert!(matches!(
            service.validate(&mistyped),
            Err(Error::Session(SessionError::MalformedClaims))
        ));

        assert!(matches!(
            service.validate("not-a-token"),
            Err(Error::Session(SessionError::MalformedClaims))
        ));
    }
}
