//! Top-level configuration for the exporter.
//!
//! This module aggregates configuration for:
//!
//! - the two chain endpoints (Tendermint RPC + Cosmos REST),
//! - the poll loop (interval + per-cycle deadline),
//! - reconciliation (active-set size + target validator identity),
//! - the metrics exporter (enable flag + listen address).
//!
//! The goal is a single `ExporterConfig` struct that the binary can
//! construct from defaults and environment variable overrides.

use std::net::SocketAddr;
use std::time::Duration;

use crate::reconcile::ReconcileOptions;

/// Configuration for the two chain endpoints.
#[derive(Clone, Debug)]
pub struct EndpointsConfig {
    /// Base URL of the Tendermint RPC endpoint, e.g. `"http://127.0.0.1:26657"`.
    pub rpc_url: String,
    /// Base URL of the Cosmos SDK REST endpoint, e.g. `"http://127.0.0.1:1317"`.
    pub rest_url: String,
    /// Per-request timeout for fetch calls.
    pub request_timeout: Duration,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:26657".to_string(),
            rest_url: "http://127.0.0.1:1317".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Configuration for the poll loop.
#[derive(Clone, Debug)]
pub struct PollConfig {
    /// Wall-clock interval between poll cycles.
    pub interval: Duration,
    /// Deadline for one whole cycle; a cycle exceeding it is abandoned
    /// wholesale and nothing from it is published.
    pub cycle_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            cycle_timeout: Duration::from_secs(12),
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    pub enabled: bool,
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        // Safe to unwrap: this is a fixed, valid address literal.
        let addr: SocketAddr = "0.0.0.0:9300"
            .parse()
            .expect("hard-coded metrics listen address should parse");
        Self {
            enabled: true,
            listen_addr: addr,
        }
    }
}

/// Top-level configuration for the exporter.
#[derive(Clone, Debug, Default)]
pub struct ExporterConfig {
    pub endpoints: EndpointsConfig,
    pub poll: PollConfig,
    pub reconcile: ReconcileOptions,
    pub metrics: MetricsConfig,
}

impl ExporterConfig {
    /// Builds a configuration from defaults with environment overrides.
    ///
    /// Recognized variables:
    ///
    /// - `EXPORTER_RPC_URL`, `EXPORTER_REST_URL`
    /// - `EXPORTER_REQUEST_TIMEOUT_SECS`, `EXPORTER_POLL_INTERVAL_SECS`,
    ///   `EXPORTER_CYCLE_TIMEOUT_SECS`
    /// - `EXPORTER_TARGET` (operator address, consensus address, or moniker)
    /// - `EXPORTER_MAX_VALIDATORS` (active-set size)
    /// - `EXPORTER_METRICS_ADDR`
    ///
    /// Unparseable numeric/address values keep the default rather than
    /// failing startup.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("EXPORTER_RPC_URL") {
            cfg.endpoints.rpc_url = v;
        }
        if let Ok(v) = std::env::var("EXPORTER_REST_URL") {
            cfg.endpoints.rest_url = v;
        }
        if let Some(secs) = env_u64("EXPORTER_REQUEST_TIMEOUT_SECS") {
            cfg.endpoints.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("EXPORTER_POLL_INTERVAL_SECS") {
            cfg.poll.interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = env_u64("EXPORTER_CYCLE_TIMEOUT_SECS") {
            cfg.poll.cycle_timeout = Duration::from_secs(secs.max(1));
        }
        if let Ok(v) = std::env::var("EXPORTER_TARGET") {
            if !v.is_empty() {
                cfg.reconcile.target_hint = Some(v);
            }
        }
        if let Some(n) = env_u64("EXPORTER_MAX_VALIDATORS") {
            cfg.reconcile.active_set_size = u32::try_from(n).ok();
        }
        if let Ok(v) = std::env::var("EXPORTER_METRICS_ADDR") {
            if let Ok(addr) = v.parse::<SocketAddr>() {
                cfg.metrics.listen_addr = addr;
            }
        }

        cfg
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = ExporterConfig::default();
        assert_eq!(cfg.endpoints.rpc_url, "http://127.0.0.1:26657");
        assert_eq!(cfg.endpoints.rest_url, "http://127.0.0.1:1317");
        assert!(cfg.poll.cycle_timeout < cfg.poll.interval);
        assert!(cfg.metrics.enabled);
        assert_eq!(cfg.reconcile.active_set_size, None);
        assert_eq!(cfg.reconcile.target_hint, None);
    }
}
