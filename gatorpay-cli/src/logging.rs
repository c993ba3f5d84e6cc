//! Diagnostic logging
//!
//! Installs the `tracing` subscriber. Output goes to stderr so stdout stays
//! clean for `--json` command output. `RUST_LOG` overrides the default
//! filter.

use gatorpay_core::config::LogFormat;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "warn,gatorpay=info,gatorpay_core=info,gatorpay_cli=info,tower_http=info";

/// Initialize the global subscriber. Call once, early in `main()`.
pub fn init_tracing(format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let result = match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr).with_target(true))
            .try_init(),
    };

    if result.is_ok() {
        tracing::debug!(?format, "tracing initialized");
    }
}
