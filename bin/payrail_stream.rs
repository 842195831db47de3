//! Streams payment updates to the log
//!
//! Checks gateway health over REST, then keeps the payment stream open until
//! Ctrl-C.
//!
//! Usage:
//!   PAYRAIL_API_KEY=... cargo run --bin payrail-stream
//!
//! Set `PAYRAIL_ENV=sandbox` to run against the sandbox.

use anyhow::{Context, Result};
use payrail::{
    ClientConfig, ConnectionManager, PaymentsApi, StreamEvent, TungsteniteConnector,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let config = ClientConfig::from_env().context("Failed to load configuration")?;
    if config.callback_signer().is_some() {
        info!("Callback signature verification enabled");
    }

    // =================================================================
    // 1. Check gateway health
    // =================================================================

    let api = PaymentsApi::from_config(&config).context("Failed to build API client")?;
    match api.status().await {
        Ok(status) => info!(message = %status.message, "Gateway reachable"),
        Err(e) => warn!(error = %e, kind = ?e.kind(), "Gateway status check failed"),
    }

    // =================================================================
    // 2. Stream payment updates
    // =================================================================

    let manager = ConnectionManager::new(config.stream_config(), Arc::new(TungsteniteConnector::new()));
    let mut events = manager.subscribe();
    manager.connect();

    info!(endpoint = %config.stream.endpoint, "Streaming payment updates (Ctrl-C to stop)");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    StreamEvent::Connected => info!("Stream connected"),
                    StreamEvent::Disconnected { reason } => warn!(%reason, "Stream disconnected"),
                    StreamEvent::Reconnecting { attempt, delay } => {
                        info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting")
                    }
                    StreamEvent::PaymentUpdate(payment) => info!(
                        payment_id = %payment.payment_id,
                        status = ?payment.payment_status,
                        actually_paid = ?payment.actually_paid,
                        pay_currency = ?payment.pay_currency,
                        "Payment update"
                    ),
                    StreamEvent::Pong { latency } => {
                        info!(latency_ms = latency.as_millis() as u64, "Heartbeat")
                    }
                    StreamEvent::Error(e) => error!(error = %e, kind = ?e.kind(), "Stream error"),
                }
            }
        }
    }

    manager.close().await;
    let stats = manager.snapshot();
    info!(
        connections = stats.total_connections,
        disconnections = stats.total_disconnections,
        "Stream closed"
    );

    Ok(())
}
