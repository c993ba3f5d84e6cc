//! Session token claims

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Signed claim set carried by a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    /// Issued-at, seconds since the Unix epoch
    pub iat: i64,
    /// Expiry, seconds since the Unix epoch
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: Uuid, iat: i64, lifetime_secs: i64) -> Self {
        Self {
            user_id,
            iat,
            exp: iat + lifetime_secs,
        }
    }
}
