//! Tip Dispatcher - batch payable tip-contract calls from many wallets
//!
//! Reads private keys and recipient handles, then sends `tip(...)` transactions from
//! every wallet in turn with gas estimation, fee quoting and bounded retries.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

mod chain;
mod config;
mod dispatch;
mod error;
mod metrics;
mod recipients;
mod tx;
mod wallet;

use chain::ChainProvider;
use config::{LogFormat, Settings};
use dispatch::{DispatchContext, DispatchEngine};
use metrics::MetricsServer;
use recipients::RecipientCycler;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load()?;

    // Initialize logging
    init_logging(&settings.report.log_format);

    info!("Starting Tip Dispatcher v{}", env!("CARGO_PKG_VERSION"));
    if settings.dispatch.wallet_concurrency > 1 {
        warn!(
            "wallet_concurrency = {}: wallet logs will interleave",
            settings.dispatch.wallet_concurrency
        );
    }

    // Credentials come first so a missing or empty file fails before any network call
    let wallets = wallet::load_credentials(Path::new(&settings.inputs.wallets_file))
        .context("Cannot start without wallets")?;

    let recipients =
        recipients::load_recipients(&settings.inputs.recipients, &settings.dispatch.id_source);
    let recipients = RecipientCycler::new(recipients)?;
    info!(
        "Recipients ({}): {}",
        recipients.len(),
        recipients.handles().join(", ")
    );

    // Initialize chain connection
    let provider = ChainProvider::new(
        &settings.network,
        settings.dispatch.confirmations,
        std::time::Duration::from_millis(settings.dispatch.receipt_poll_interval_ms),
    )
    .await?;
    info!("Chain connection initialized");

    let ctx = DispatchContext::from_settings(&settings, Arc::new(provider), recipients)?;
    let engine = DispatchEngine::new(ctx);

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    let outcome = tokio::select! {
        summary = engine.run(&wallets) => Some(summary),
        _ = shutdown_signal() => None,
    };

    if let Some(h) = metrics_handle {
        h.abort();
    }

    let Some(summary) = outcome else {
        anyhow::bail!("Interrupted before all wallets were processed");
    };

    summary.log();
    if let Some(path) = &settings.report.path {
        if let Err(e) = summary.write_json(Path::new(path)) {
            error!("{}", e);
        }
    }

    info!("Tip Dispatcher finished");
    Ok(())
}

fn init_logging(format: &LogFormat) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,tip_dispatcher=debug,hyper=warn,reqwest=warn")
    });

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
