//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Transfers by source chain and outcome
//! - Approvals and deployments
//! - Fee estimates
//! - Wallet network switches

use crate::error::{BridgeError, BridgeResult};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec, Encoder, TextEncoder};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Transfer metrics
    pub static ref TRANSFERS_SUBMITTED: CounterVec = register_counter_vec!(
        "nexus_bridge_transfers_submitted_total",
        "Total transfers submitted",
        &["chain_id"]
    ).unwrap();

    pub static ref TRANSFERS_COMPLETED: CounterVec = register_counter_vec!(
        "nexus_bridge_transfers_completed_total",
        "Total transfers confirmed on the source chain",
        &["chain_id"]
    ).unwrap();

    pub static ref TRANSFERS_FAILED: CounterVec = register_counter_vec!(
        "nexus_bridge_transfers_failed_total",
        "Total transfers failed",
        &["chain_id"]
    ).unwrap();

    pub static ref APPROVALS: CounterVec = register_counter_vec!(
        "nexus_bridge_approvals_total",
        "Token approvals by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref DEPLOYMENTS: CounterVec = register_counter_vec!(
        "nexus_bridge_deployments_total",
        "OFT deployments by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref ESTIMATES: CounterVec = register_counter_vec!(
        "nexus_bridge_fee_estimates_total",
        "Fee estimates by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref NETWORK_SWITCHES: CounterVec = register_counter_vec!(
        "nexus_bridge_network_switches_total",
        "Wallet network switch requests by outcome",
        &["outcome"]
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

    pub async fn run(&self) -> BridgeResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| BridgeError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| BridgeError::Internal(format!("Metrics server failed: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    render().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

fn render() -> BridgeResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| BridgeError::Internal(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| BridgeError::Internal(e.to_string()))
}

// Helper functions to record metrics

pub fn record_transfer_submitted(chain_id: u64) {
    TRANSFERS_SUBMITTED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_transfer_completed(chain_id: u64) {
    TRANSFERS_COMPLETED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_transfer_failed(chain_id: u64) {
    TRANSFERS_FAILED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_approval(outcome: &str) {
    APPROVALS.with_label_values(&[outcome]).inc();
}

pub fn record_deployment(outcome: &str) {
    DEPLOYMENTS.with_label_values(&[outcome]).inc();
}

pub fn record_estimate(outcome: &str) {
    ESTIMATES.with_label_values(&[outcome]).inc();
}

pub fn record_network_switch(outcome: &str) {
    NETWORK_SWITCHES.with_label_values(&[outcome]).inc();
}
