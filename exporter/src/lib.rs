//! Cosmos validator exporter library crate.
//!
//! This crate provides the building blocks for an exporter that observes
//! the health and standing of validators on a Cosmos-SDK/Tendermint chain
//! and republishes that state as Prometheus metrics:
//!
//! - strongly-typed domain types (`types`),
//! - cross-encoding identity correlation (`identity`),
//! - paginated fetchers for the two validator sets (`client`),
//! - the reconciliation engine (`reconcile`),
//! - Prometheus encoding and exposition (`metrics`),
//! - the fixed-interval poll driver (`poller`),
//! - and a top-level configuration (`config`).
//!
//! The binary composes these pieces into a standalone exporter process.

pub mod client;
pub mod config;
pub mod identity;
pub mod metrics;
pub mod poller;
pub mod reconcile;
pub mod types;

// Re-export top-level configuration types.
pub use config::{EndpointsConfig, ExporterConfig, MetricsConfig, PollConfig};

// Re-export the fetcher seam and its HTTP implementation.
pub use client::{FetchError, HttpValidatorSource, ValidatorSource};

// Re-export identity mapping.
pub use identity::{IdentityIndex, KeyError, build_identity_index, derive_consensus_address};

// Re-export the reconciliation engine.
pub use reconcile::{ReconcileOptions, reconcile};

// Re-export metrics encoding and exposition.
pub use metrics::{ExporterMetrics, MetricsRegistry, encode_poll, run_prometheus_http_server};

// Re-export the poll driver.
pub use poller::{CycleError, PollDriver};

// Re-export domain types at the crate root for convenience.
pub use types::*;

/// Type alias for the poll driver stack used by a "typical" exporter:
/// the HTTP validator source against live chain endpoints.
pub type DefaultPollDriver = PollDriver<HttpValidatorSource>;
