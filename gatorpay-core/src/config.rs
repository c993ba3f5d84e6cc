//! Configuration management
//!
//! Settings come from an optional `<data_dir>/settings.json`:
//! ```json
//! {
//!   "server": { "port": 8080, "corsOrigins": ["http://localhost:3000"] },
//!   "auth": { "sessionLifetimeSecs": 604800, "otpTtlSecs": 300 },
//!   "delivery": { "relayUrl": "https://relay.example.com/send" }
//! }
//! ```
//! Environment variables override the file. The JWT secret is only ever
//! read from the environment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SESSION_LIFETIME_SECS: i64 = 7 * 24 * 60 * 60;
pub const DEFAULT_OTP_TTL_SECS: i64 = 5 * 60;

/// Default Argon2id parameters for password hashing
pub const DEFAULT_MEMORY_KIB: u32 = 19 * 1024;
pub const DEFAULT_ITERATIONS: u32 = 2;
pub const DEFAULT_PARALLELISM: u32 = 1;

/// Argon2id cost parameters for password hashing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_kib: DEFAULT_MEMORY_KIB,
            iterations: DEFAULT_ITERATIONS,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

/// Diagnostic log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::config(format!("unknown log format '{}'", other))),
        }
    }
}

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    server: ServerSettings,
    #[serde(default)]
    auth: AuthSettings,
    #[serde(default)]
    delivery: DeliverySettings,
    #[serde(default)]
    database_path: Option<PathBuf>,
    #[serde(default)]
    log_format: Option<LogFormat>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerSettings {
    port: Option<u16>,
    #[serde(default)]
    cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthSettings {
    session_lifetime_secs: Option<i64>,
    otp_ttl_secs: Option<i64>,
    argon2: Option<Argon2Params>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeliverySettings {
    relay_url: Option<String>,
}

/// GatorPay configuration
#[derive(Clone)]
pub struct Config {
    pub port: u16,
    /// Ledger database file; defaults to `<data_dir>/gatorpay.duckdb`
    pub database_path: Option<PathBuf>,
    /// HMAC secret for session tokens. Required to serve.
    pub jwt_secret: Option<String>,
    pub session_lifetime_secs: i64,
    pub otp_ttl_secs: i64,
    pub cors_origins: Vec<String>,
    /// Email relay endpoint; codes go to the console when unset
    pub otp_relay_url: Option<String>,
    pub log_format: LogFormat,
    pub argon2: Argon2Params,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("database_path", &self.database_path)
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("session_lifetime_secs", &self.session_lifetime_secs)
            .field("otp_ttl_secs", &self.otp_ttl_secs)
            .field("cors_origins", &self.cors_origins)
            .field("otp_relay_url", &self.otp_relay_url)
            .field("log_format", &self.log_format)
            .field("argon2", &self.argon2)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_path: None,
            jwt_secret: None,
            session_lifetime_secs: DEFAULT_SESSION_LIFETIME_SECS,
            otp_ttl_secs: DEFAULT_OTP_TTL_SECS,
            cors_origins: Vec::new(),
            otp_relay_url: None,
            log_format: LogFormat::Pretty,
            argon2: Argon2Params::default(),
        }
    }
}

impl Config {
    /// Load config from the data directory, then apply environment overrides
    pub fn load(data_dir: &Path) -> Result<Self> {
        let mut config = Self::from_file(data_dir)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Settings file only, no environment
    pub fn from_file(data_dir: &Path) -> Result<Self> {
        let settings_path = data_dir.join("settings.json");

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str(&content)
                .map_err(|e| Error::config(format!("invalid {}: {}", settings_path.display(), e)))?
        } else {
            SettingsFile::default()
        };

        let defaults = Self::default();
        Ok(Self {
            port: raw.server.port.unwrap_or(defaults.port),
            database_path: raw.database_path,
            jwt_secret: None,
            session_lifetime_secs: raw
                .auth
                .session_lifetime_secs
                .unwrap_or(defaults.session_lifetime_secs),
            otp_ttl_secs: raw.auth.otp_ttl_secs.unwrap_or(defaults.otp_ttl_secs),
            cors_origins: raw.server.cors_origins,
            otp_relay_url: raw.delivery.relay_url,
            log_format: raw.log_format.unwrap_or_default(),
            argon2: raw.auth.argon2.unwrap_or_default(),
        })
    }

    /// Apply environment-style overrides from `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("GATORPAY_PORT").or_else(|| get("PORT")) {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| Error::config(format!("invalid port '{}'", port)))?;
        }
        if let Some(path) = get("GATORPAY_DB_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(secret) = get("JWT_SECRET") {
            self.jwt_secret = Some(secret);
        }
        if let Some(origins) = get("CORS_ORIGINS") {
            self.cors_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        if let Some(url) = get("OTP_RELAY_URL") {
            self.otp_relay_url = Some(url);
        }
        if let Some(format) = get("GATORPAY_LOG_FORMAT") {
            self.log_format = format.parse()?;
        }
        Ok(())
    }

    /// Database file for this configuration
    pub fn database_file(&self, data_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| data_dir.join("gatorpay.duckdb"))
    }

    /// The signing secret, or a config error when absent
    pub fn require_jwt_secret(&self) -> Result<&str> {
        match self.jwt_secret.as_deref() {
            Some(secret) if !secret.is_empty() => Ok(secret),
            _ => Err(Error::config("JWT_SECRET must be set")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_settings_file() {
        let dir = tempdir().unwrap();
        let config = Config::from_file(dir.path()).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.otp_ttl_secs, 300);
        assert_eq!(config.session_lifetime_secs, 604_800);
        assert!(config.require_jwt_secret().is_err());
        assert_eq!(config.database_file(dir.path()), dir.path().join("gatorpay.duckdb"));
    }

    #[test]
    fn test_settings_file_is_read() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"server": {"port": 9000, "corsOrigins": ["http://localhost:3000"]},
                "auth": {"otpTtlSecs": 60, "argon2": {"memoryKib": 8, "iterations": 1, "parallelism": 1}},
                "logFormat": "json"}"#,
        )
        .unwrap();

        let config = Config::from_file(dir.path()).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.otp_ttl_secs, 60);
        assert_eq!(config.cors_origins, vec!["http://localhost:3000".to_string()]);
        assert_eq!(config.argon2.memory_kib, 8);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_settings_file_is_an_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("settings.json"), "{not json").unwrap();
        assert!(matches!(Config::from_file(dir.path()), Err(Error::Config(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("PORT", "7000"),
            ("JWT_SECRET", "s3cret"),
            ("CORS_ORIGINS", "http://a.test, http://b.test,"),
            ("OTP_RELAY_URL", "https://relay.test/send"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.port, 7000);
        assert_eq!(config.require_jwt_secret().unwrap(), "s3cret");
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(config.otp_relay_url.as_deref(), Some("https://relay.test/send"));
    }

    #[test]
    fn test_gatorpay_port_wins_and_bad_port_fails() {
        let mut config = Config::default();
        config
            .apply_overrides(|key| match key {
                "GATORPAY_PORT" => Some("8181".to_string()),
                "PORT" => Some("7000".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.port, 8181);

        let result = config.apply_overrides(|key| (key == "PORT").then(|| "eighty".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = Config {
            jwt_secret: Some("top-secret".to_string()),
            ..Config::default()
        };
        assert!(!format!("{:?}", config).contains("top-secret"));
    }
}
