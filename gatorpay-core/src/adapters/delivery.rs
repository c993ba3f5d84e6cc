//! Verification code transports
//!
//! - `ConsoleDelivery` writes the code to the diagnostic log (development)
//! - `HttpRelayDelivery` posts it to an email relay service

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Serialize;

use crate::domain::result::{Error, Result};
use crate::domain::CodePurpose;
use crate::ports::CodeDelivery;

/// Email subject for each purpose
pub fn subject_for(purpose: CodePurpose) -> &'static str {
    match purpose {
        CodePurpose::Register => "GatorPay - Verification Code",
        CodePurpose::Login => "GatorPay - Login Verification",
    }
}

/// Development transport: the code only ever reaches the local log
#[derive(Debug, Default)]
pub struct ConsoleDelivery;

impl ConsoleDelivery {
    pub fn new() -> Self {
        Self
    }
}

impl CodeDelivery for ConsoleDelivery {
    fn name(&self) -> &str {
        "console"
    }

    fn send(&self, destination: &str, code: &str, purpose: CodePurpose) -> Result<()> {
        tracing::info!(
            to = destination,
            purpose = purpose.as_str(),
            subject = subject_for(purpose),
            "verification code {}",
            code
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    to: &'a str,
    subject: &'a str,
    code: &'a str,
    purpose: &'a str,
    expires_in_secs: u64,
}

/// Posts codes as JSON to an HTTP email relay
pub struct HttpRelayDelivery {
    url: String,
    code_ttl_secs: u64,
    timeout: Duration,
    client: OnceLock<Client>,
}

impl HttpRelayDelivery {
    pub fn new(url: impl Into<String>, code_ttl_secs: u64) -> Result<Self> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::config(format!("relay URL must be http(s): {}", url)));
        }
        Ok(Self {
            url,
            code_ttl_secs,
            timeout: Duration::from_secs(10),
            client: OnceLock::new(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    // The blocking client owns a runtime, so it is built on first use from
    // a blocking thread rather than wherever the adapter is constructed.
    fn client(&self) -> Result<&Client> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to create HTTP client: {}", e)))?;
        Ok(self.client.get_or_init(|| client))
    }
}

impl CodeDelivery for HttpRelayDelivery {
    fn name(&self) -> &str {
        "relay"
    }

    fn send(&self, destination: &str, code: &str, purpose: CodePurpose) -> Result<()> {
        let message = RelayMessage {
            to: destination,
            subject: subject_for(purpose),
            code,
            purpose: purpose.as_str(),
            expires_in_secs: self.code_ttl_secs,
        };

        let response = self
            .client()?
            .post(&self.url)
            .json(&message)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    Error::delivery("relay request timed out")
                } else {
                    Error::delivery(format!("relay request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(Error::delivery(format!(
                "relay rejected message with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subjects() {
        assert_eq!(subject_for(CodePurpose::Register), "GatorPay - Verification Code");
        assert_eq!(subject_for(CodePurpose::Login), "GatorPay - Login Verification");
    }

    #[test]
    fn test_relay_rejects_non_http_url() {
        assert!(HttpRelayDelivery::new("smtp://mail.local", 300).is_err());
        assert!(HttpRelayDelivery::new("https://relay.local/send", 300).is_ok());
    }

    #[test]
    fn test_unreachable_relay_reports_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let relay = HttpRelayDelivery::new("http://127.0.0.1:9/send", 300).unwrap();
        assert!(relay.send("a@fla.edu", "123456", CodePurpose::Login).is_err());
    }

    #[test]
    fn test_relay_message_shape() {
        let message = RelayMessage {
            to: "a@fla.edu",
            subject: subject_for(CodePurpose::Login),
            code: "123456",
            purpose: "login",
            expires_in_secs: 300,
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["subject"], "GatorPay - Login Verification");
        assert_eq!(json["expires_in_secs"], 300);
    }
}
