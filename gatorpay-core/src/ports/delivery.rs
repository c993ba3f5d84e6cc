//! Code delivery port
//!
//! Defines the interface for transmitting a verification code to its owner
//! out of band (email relay, console, ...).

use crate::domain::result::Result;
use crate::domain::CodePurpose;

/// Out-of-band transport for verification codes
///
/// Delivery is best-effort. `OtpService` logs and swallows any error
/// returned here; the persisted code stays the source of truth.
pub trait CodeDelivery: Send + Sync {
    /// Transport name (e.g., "console", "relay")
    fn name(&self) -> &str;

    /// Send `code` to `destination` (an email address)
    fn send(&self, destination: &str, code: &str, purpose: CodePurpose) -> Result<()>;
}
