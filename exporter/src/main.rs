// exporter/src/main.rs

//! Exporter binary.
//!
//! Wires up the exporter library:
//!
//! - configuration from defaults + environment overrides
//! - HTTP validator source against the configured chain endpoints
//! - Prometheus metrics exporter on /metrics
//! - fixed-interval poll driver running until shutdown.

use std::sync::Arc;

use tokio::signal;

use exporter::{
    ExporterConfig, HttpValidatorSource, MetricsRegistry, PollDriver, run_prometheus_http_server,
};

#[tokio::main]
async fn main() {
    // Basic tracing setup.
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "exporter=info".to_string()),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let cfg = ExporterConfig::from_env();

    // ---------------------------
    // Metrics registry + exporter
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new()
            .map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    if cfg.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                tracing::error!("metrics HTTP server error: {e}");
            }
        });
        tracing::info!("metrics exporter listening on http://{}/metrics", addr);
    }

    // ---------------------------
    // Validator source (HTTP)
    // ---------------------------

    let source = HttpValidatorSource::new(&cfg.endpoints)
        .map_err(|e| format!("failed to create HttpValidatorSource: {e}"))?;

    tracing::info!(
        rpc = %cfg.endpoints.rpc_url,
        rest = %cfg.endpoints.rest_url,
        interval_secs = cfg.poll.interval.as_secs(),
        target = cfg.reconcile.target_hint.as_deref(),
        "starting poll driver"
    );

    // ---------------------------
    // Poll driver
    // ---------------------------

    let driver = PollDriver::new(source, metrics, &cfg.poll, cfg.reconcile.clone());

    tokio::select! {
        _ = driver.run() => {}
        _ = shutdown_signal() => {}
    }

    Ok(())
}

/// Waits for Ctrl-C and returns, used for graceful shutdown.
async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
