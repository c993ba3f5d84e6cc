//! Serve command - run the HTTP API

use std::sync::Arc;

use anyhow::{Context, Result};
use gatorpay_core::services::{EntryPoint, LogEvent};
use tokio::signal;

use super::{get_context, get_logger};
use crate::api::{self, AppState};

pub fn run(port: Option<u16>) -> Result<()> {
    let context = Arc::new(get_context()?);
    context
        .config
        .require_jwt_secret()
        .context("Refusing to serve without a signing secret")?;
    let port = port.unwrap_or(context.config.port);

    let logger = get_logger(EntryPoint::Server).map(Arc::new);
    if let Some(logger) = &logger {
        if let Err(e) = logger.log(LogEvent::new("server_started").with_operation(format!("port={}", port))) {
            tracing::debug!(error = %e, "activity log write failed");
        }
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let state = AppState::new(Arc::clone(&context), logger);
    let result = runtime.block_on(serve(state, port));

    // The relay client is blocking and must be dropped off the runtime
    drop(runtime);
    drop(context);
    result
}

async fn serve(state: AppState, port: u16) -> Result<()> {
    let router = api::create_router(state);
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind listener on {}", addr))?;
    tracing::info!(addr = %addr, "gatorpay API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    tracing::info!("server stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, draining connections");
}
