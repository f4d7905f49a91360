//! Metrics encoding and exposition for the exporter.
//!
//! This module turns each poll's [`crate::types::PollResult`] into
//! Prometheus text exposition format, keeps a set of exporter
//! self-metrics across cycles, and exposes a small HTTP exporter that
//! serves `/metrics`.
//!
//! Typical usage in the binary:
//!
//! ```ignore
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//! use exporter::metrics::{MetricsRegistry, run_prometheus_http_server};
//!
//! let registry = Arc::new(MetricsRegistry::new()?);
//! let addr: SocketAddr = "127.0.0.1:9300".parse()?;
//!
//! // Spawn the HTTP exporter in the background:
//! tokio::spawn(run_prometheus_http_server(registry.clone(), addr));
//!
//! // After each completed poll cycle:
//! registry.publish(encoded_exposition);
//! ```

pub mod prometheus;

pub use prometheus::{ExporterMetrics, MetricsRegistry, encode_poll, run_prometheus_http_server};
