//! Prometheus metrics for monitoring a dispatch run
//!
//! Exposes metrics for:
//! - Transaction submissions, confirmations and failures
//! - Retries and skipped wallets
//! - Wallet balances and confirmation latency

use crate::error::{FailureClass, TipperError, TipperResult};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge_vec, register_histogram, Counter,
    CounterVec, Encoder, GaugeVec, Histogram, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Transaction metrics
    pub static ref TX_SUBMITTED: Counter = register_counter!(
        "tipper_tx_submitted_total",
        "Total tip transactions broadcast"
    ).unwrap();

    pub static ref TX_CONFIRMED: Counter = register_counter!(
        "tipper_tx_confirmed_total",
        "Total tip transactions confirmed"
    ).unwrap();

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "tipper_tx_failed_total",
        "Total failed attempts by classification",
        &["class"]
    ).unwrap();

    pub static ref TX_RETRIES: Counter = register_counter!(
        "tipper_tx_retries_total",
        "Total retried attempts"
    ).unwrap();

    pub static ref TX_LATENCY: Histogram = register_histogram!(
        "tipper_tx_latency_seconds",
        "Submission to confirmation latency",
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();

    // Wallet metrics
    pub static ref WALLETS_SKIPPED: Counter = register_counter!(
        "tipper_wallets_skipped_total",
        "Wallets skipped by the balance precheck"
    ).unwrap();

    pub static ref WALLET_BALANCE: GaugeVec = register_gauge_vec!(
        "tipper_wallet_balance",
        "Wallet balance in native units",
        &["address"]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> TipperResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| TipperError::Internal(format!("Metrics bind on {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| TipperError::Internal(format!("Metrics server: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    render().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Text exposition of every registered metric
pub fn render() -> TipperResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TipperError::Internal(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TipperError::Internal(e.to_string()))
}

// Helper functions to record metrics

pub fn record_tx_submitted() {
    TX_SUBMITTED.inc();
}

pub fn record_tx_confirmed(latency_secs: f64) {
    TX_CONFIRMED.inc();
    TX_LATENCY.observe(latency_secs);
}

pub fn record_tx_failed(class: FailureClass) {
    TX_FAILED.with_label_values(&[class.as_str()]).inc();
}

pub fn record_retry() {
    TX_RETRIES.inc();
}

pub fn record_wallet_skipped() {
    WALLETS_SKIPPED.inc();
}

pub fn record_wallet_balance(address: &str, balance: f64) {
    WALLET_BALANCE.with_label_values(&[address]).set(balance);
}
