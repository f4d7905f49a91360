//! Prometheus-backed metrics encoding and HTTP exporter.
//!
//! Two registries are involved. A persistent one owned by
//! [`MetricsRegistry`] carries exporter self-metrics across cycles
//! (cycle counters, last-success timestamp, durations). Per-validator
//! samples are instead encoded freshly each cycle by [`encode_poll`]
//! into a standalone text exposition, which the poll driver publishes
//! with [`MetricsRegistry::publish`] only after the cycle completes.
//! `/metrics` serves the self-metrics followed by the most recently
//! published per-poll exposition, so readers never observe a partially
//! built cycle and never wait on network I/O.

use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, PoisonError, RwLock},
};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use prometheus::{
    self, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, IntCounter, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};

use crate::types::{BondStatus, PollResult, TargetLookup, ValidatorSnapshot};

/// Label value used for consensus-set entries with no staking match.
const UNKNOWN_OPERATOR: &str = "unknown";

/// Labels identifying a validator on every per-validator sample.
const VALIDATOR_LABELS: [&str; 3] = ["consensus_address", "operator_address", "moniker"];

/// Exporter self-metrics, registered into the persistent registry.
///
/// These survive across poll cycles so downstream alerting can detect
/// staleness: a rising failure counter with a stalled last-poll
/// timestamp means the published validator samples are outdated.
#[derive(Clone)]
pub struct ExporterMetrics {
    /// Poll cycles attempted, successful or not.
    pub polls_total: IntCounter,
    /// Poll cycles aborted by fetch failure, encoding failure, or timeout.
    pub poll_failures_total: IntCounter,
    /// Staking entries skipped because of a malformed or duplicate pubkey.
    pub skipped_keys_total: IntCounter,
    /// Unix timestamp of the last successfully published cycle.
    pub last_poll_timestamp_seconds: Gauge,
    /// Wall-clock duration of completed poll cycles, in seconds.
    pub poll_duration_seconds: Histogram,
}

impl ExporterMetrics {
    /// Registers the self-metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let polls_total = IntCounter::with_opts(Opts::new(
            "polls_total",
            "Total number of poll cycles attempted",
        ))?;
        registry.register(Box::new(polls_total.clone()))?;

        let poll_failures_total = IntCounter::with_opts(Opts::new(
            "poll_failures_total",
            "Total number of poll cycles that failed and published nothing",
        ))?;
        registry.register(Box::new(poll_failures_total.clone()))?;

        let skipped_keys_total = IntCounter::with_opts(Opts::new(
            "skipped_keys_total",
            "Total staking entries skipped due to malformed or duplicate consensus pubkeys",
        ))?;
        registry.register(Box::new(skipped_keys_total.clone()))?;

        let last_poll_timestamp_seconds = Gauge::with_opts(Opts::new(
            "last_poll_timestamp_seconds",
            "Unix timestamp of the last successfully published poll cycle",
        ))?;
        registry.register(Box::new(last_poll_timestamp_seconds.clone()))?;

        let poll_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "poll_duration_seconds",
                "Duration of completed poll cycles in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        registry.register(Box::new(poll_duration_seconds.clone()))?;

        Ok(Self {
            polls_total,
            poll_failures_total,
            skipped_keys_total,
            last_poll_timestamp_seconds,
            poll_duration_seconds,
        })
    }
}

/// Wrapper around the persistent registry, the self-metrics, and the
/// most recently published per-poll exposition.
///
/// This is the main handle passed around the exporter. Wrap it in an
/// [`Arc`] and share it between the poll driver (single writer) and the
/// HTTP exporter (many readers); the publish swap holds the lock only
/// for a pointer assignment, never across a fetch.
pub struct MetricsRegistry {
    registry: Registry,
    pub exporter: ExporterMetrics,
    published: RwLock<Option<Arc<String>>>,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying `Registry`
    /// and registers the exporter self-metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("exporter".to_string()), None)?;
        let exporter = ExporterMetrics::register(&registry)?;
        Ok(Self {
            registry,
            exporter,
            published: RwLock::new(None),
        })
    }

    /// Atomically replaces the published per-poll exposition.
    ///
    /// Called by the poll driver once a cycle has fully completed; an
    /// aborted cycle never reaches this point, so the previous cycle's
    /// exposition keeps being served.
    pub fn publish(&self, exposition: String) {
        let mut guard = self
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Some(Arc::new(exposition));
    }

    /// Returns the most recently published per-poll exposition, or `None`
    /// before the first successful cycle.
    pub fn published(&self) -> Option<Arc<String>> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Encodes the full `/metrics` payload: self-metrics followed by the
    /// latest published per-poll exposition.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("failed to encode Prometheus metrics: {e}");
            return String::new();
        }
        let mut text = String::from_utf8(buffer).unwrap_or_default();
        if let Some(poll_text) = self.published() {
            text.push_str(&poll_text);
        }
        text
    }
}

/// Encodes one poll's result into Prometheus text exposition format.
///
/// Pure and idempotent: the same `PollResult` always yields the same
/// samples. Absent fields produce no sample at all for that validator
/// rather than a sentinel value, preserving the absent/zero distinction.
/// The summary samples (validator counts, bonded tokens, skipped keys)
/// are always emitted, even for an empty validator list.
pub fn encode_poll(result: &PollResult) -> Result<String, prometheus::Error> {
    let registry = Registry::new_custom(Some("cosmos".to_string()), None)?;

    // ---------------------------
    // Summary samples
    // ---------------------------

    let validator_count = IntGauge::with_opts(Opts::new(
        "validator_count",
        "Total number of validators known to the last poll (union of both sources)",
    ))?;
    registry.register(Box::new(validator_count.clone()))?;
    validator_count.set(result.snapshots.len() as i64);

    let bonded_count = IntGauge::with_opts(Opts::new(
        "validator_bonded_count",
        "Number of validators currently in the bonded state",
    ))?;
    registry.register(Box::new(bonded_count.clone()))?;

    let bonded_tokens = Gauge::with_opts(Opts::new(
        "validator_bonded_tokens",
        "Sum of tokens across bonded validators",
    ))?;
    registry.register(Box::new(bonded_tokens.clone()))?;

    let skipped_keys = IntGauge::with_opts(Opts::new(
        "poll_skipped_keys",
        "Staking entries skipped this poll due to malformed or duplicate consensus pubkeys",
    ))?;
    registry.register(Box::new(skipped_keys.clone()))?;
    skipped_keys.set(saturating_gauge(result.skipped_keys));

    if let Some(height) = result.height {
        let set_height = IntGauge::with_opts(Opts::new(
            "validator_set_height",
            "Block height the consensus validator set was observed at",
        ))?;
        registry.register(Box::new(set_height.clone()))?;
        set_height.set(saturating_gauge(height));
    }

    // Omitted entirely when no target is configured; 0 is "configured
    // but not found", which downstream alerting must distinguish from
    // "no target to look for".
    if result.target != TargetLookup::Unset {
        let target_found = IntGauge::with_opts(Opts::new(
            "target_validator_found",
            "Whether the configured target validator was found in the last poll",
        ))?;
        registry.register(Box::new(target_found.clone()))?;
        target_found.set(match result.target {
            TargetLookup::Found(_) => 1,
            _ => 0,
        });
    }

    // ---------------------------
    // Per-validator samples
    // ---------------------------

    let voting_power = int_vec(&registry, "validator_voting_power", "Validator voting power")?;
    let proposer_priority = int_vec(
        &registry,
        "validator_proposer_priority",
        "Validator proposer priority",
    )?;
    let rank = int_vec(
        &registry,
        "validator_rank",
        "1-based rank by descending voting power among consensus-set members",
    )?;
    let active = int_vec(
        &registry,
        "validator_active",
        "Whether the validator is within the configured active-set size",
    )?;
    let jailed = int_vec(
        &registry,
        "validator_jailed",
        "Whether the validator is jailed",
    )?;
    let missed_signal = int_vec(
        &registry,
        "validator_missed_block_signal",
        "1 when the validator is bonded but jailed (downtime signal)",
    )?;
    let tokens = GaugeVec::new(
        Opts::new("validator_tokens", "Validator bonded tokens"),
        &VALIDATOR_LABELS,
    )?;
    registry.register(Box::new(tokens.clone()))?;
    let commission = GaugeVec::new(
        Opts::new("validator_commission_rate", "Validator commission rate"),
        &VALIDATOR_LABELS,
    )?;
    registry.register(Box::new(commission.clone()))?;
    let status = GaugeVec::new(
        Opts::new("validator_status", "Validator staking lifecycle state (one-hot)"),
        &["consensus_address", "operator_address", "moniker", "state"],
    )?;
    registry.register(Box::new(status.clone()))?;

    let mut bonded = 0i64;
    let mut bonded_token_sum = 0f64;

    for snap in &result.snapshots {
        let (addr, op, moniker) = label_values(snap);
        let labels = [addr.as_str(), op, moniker];

        if let Some(power) = snap.voting_power {
            voting_power
                .with_label_values(&labels)
                .set(saturating_gauge(power));
        }
        if let Some(priority) = snap.proposer_priority {
            proposer_priority.with_label_values(&labels).set(priority);
        }
        if let Some(r) = snap.rank {
            rank.with_label_values(&labels).set(r as i64);
        }
        if let Some(a) = snap.active {
            active.with_label_values(&labels).set(a as i64);
        }
        if let Some(j) = snap.jailed {
            jailed.with_label_values(&labels).set(j as i64);
        }
        if let Some(signal) = snap.missed_block_signal() {
            missed_signal.with_label_values(&labels).set(signal as i64);
        }
        if let Some(value) = snap.tokens.as_deref().and_then(parse_decimal) {
            tokens.with_label_values(&labels).set(value);
            if snap.status == Some(BondStatus::Bonded) {
                bonded_token_sum += value;
            }
        }
        if let Some(value) = snap.commission_rate.as_deref().and_then(parse_decimal) {
            commission.with_label_values(&labels).set(value);
        }
        if let Some(current) = snap.status {
            if current == BondStatus::Bonded {
                bonded += 1;
            }
            for state in BondStatus::ALL {
                status
                    .with_label_values(&[addr.as_str(), op, moniker, state.as_str()])
                    .set((state == current) as i64 as f64);
            }
        }
    }

    bonded_count.set(bonded);
    bonded_tokens.set(bonded_token_sum);

    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

fn int_vec(registry: &Registry, name: &str, help: &str) -> Result<IntGaugeVec, prometheus::Error> {
    let vec = IntGaugeVec::new(Opts::new(name, help), &VALIDATOR_LABELS)?;
    registry.register(Box::new(vec.clone()))?;
    Ok(vec)
}

fn label_values(snap: &ValidatorSnapshot) -> (String, &str, &str) {
    let addr = snap.identity.consensus_address.to_string();
    let op = snap
        .identity
        .operator_address
        .as_deref()
        .unwrap_or(UNKNOWN_OPERATOR);
    let moniker = snap.identity.moniker.as_deref().unwrap_or("");
    (addr, op, moniker)
}

/// Parses a chain decimal string for gauge encoding. A value that does
/// not parse yields no sample rather than a corrupt one.
fn parse_decimal(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Clamps a `u64` chain value to the `i64` range of an integer gauge.
/// Values above `i64::MAX` would otherwise wrap negative.
fn saturating_gauge(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Runs an HTTP server that exposes the exporter's metrics.
///
/// The server listens on `addr` and serves `GET /metrics` with the
/// Prometheus text exposition format. All other paths return 404.
///
/// This function is `async` and is intended to be spawned onto a Tokio
/// runtime, e.g.:
///
/// ```ignore
/// let registry = Arc::new(MetricsRegistry::new()?);
/// let addr: SocketAddr = "127.0.0.1:9300".parse()?;
/// tokio::spawn(run_prometheus_http_server(registry.clone(), addr));
/// ```
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                tracing::warn!("metrics HTTP server error: {err}");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = metrics.gather_text();
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
                .body(Full::new(Bytes::from(body)))
                .unwrap())
        }
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("not found")))
            .unwrap()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ADDR_LEN, ConsAddress, ValidatorIdentity};

    fn snapshot(byte: u8, moniker: &str) -> ValidatorSnapshot {
        ValidatorSnapshot::new(ValidatorIdentity {
            consensus_address: ConsAddress([byte; ADDR_LEN]),
            operator_address: Some(format!("cosmosvaloper1x{byte}")),
            moniker: Some(moniker.to_string()),
        })
    }

    fn empty_result() -> PollResult {
        PollResult {
            height: None,
            snapshots: Vec::new(),
            target: TargetLookup::Unset,
            skipped_keys: 0,
        }
    }

    fn sorted_lines(text: &str) -> Vec<&str> {
        let mut lines: Vec<&str> = text.lines().collect();
        lines.sort_unstable();
        lines
    }

    #[test]
    fn summary_samples_are_emitted_for_an_empty_poll() {
        let text = encode_poll(&empty_result()).expect("encode empty result");
        assert!(text.contains("cosmos_validator_count 0"));
        assert!(text.contains("cosmos_validator_bonded_count 0"));
        assert!(text.contains("cosmos_validator_bonded_tokens 0"));
        assert!(text.contains("cosmos_poll_skipped_keys 0"));
        // No height observed, no target configured: both omitted.
        assert!(!text.contains("cosmos_validator_set_height"));
        assert!(!text.contains("cosmos_target_validator_found"));
    }

    #[test]
    fn absent_fields_produce_no_samples() {
        // Staking-only validator: no consensus-set presence.
        let mut snap = snapshot(1, "Val1");
        snap.status = Some(BondStatus::Bonded);
        snap.jailed = Some(false);
        snap.tokens = Some("5000000".to_string());
        snap.commission_rate = Some("0.1".to_string());

        let result = PollResult {
            height: Some(77),
            snapshots: vec![snap],
            target: TargetLookup::Unset,
            skipped_keys: 0,
        };
        let text = encode_poll(&result).expect("encode result");

        assert!(!text.contains("cosmos_validator_voting_power{"));
        assert!(!text.contains("cosmos_validator_rank{"));
        assert!(!text.contains("cosmos_validator_active{"));

        assert!(text.contains("cosmos_validator_set_height 77"));
        assert!(text.contains("cosmos_validator_bonded_count 1"));
        assert!(text.contains("cosmos_validator_bonded_tokens 5000000"));
        assert!(text.contains(r#"moniker="Val1""#));
        assert!(text.contains(r#"state="bonded""#));
    }

    #[test]
    fn present_zero_power_is_encoded_as_zero() {
        let mut snap = snapshot(2, "Val2");
        snap.voting_power = Some(0);
        snap.rank = Some(1);

        let result = PollResult {
            height: None,
            snapshots: vec![snap],
            target: TargetLookup::Unset,
            skipped_keys: 0,
        };
        let text = encode_poll(&result).expect("encode result");
        let power_line = text
            .lines()
            .find(|l| l.starts_with("cosmos_validator_voting_power{"))
            .expect("power sample present");
        assert!(power_line.ends_with(" 0"));
    }

    #[test]
    fn oversized_chain_values_saturate_instead_of_wrapping() {
        let mut snap = snapshot(5, "Val5");
        snap.voting_power = Some(u64::MAX);

        let result = PollResult {
            height: Some(u64::MAX),
            snapshots: vec![snap],
            target: TargetLookup::Unset,
            skipped_keys: 0,
        };
        let text = encode_poll(&result).expect("encode result");

        let clamped = i64::MAX.to_string();
        assert!(text.contains(&format!("cosmos_validator_set_height {clamped}")));
        let power_line = text
            .lines()
            .find(|l| l.starts_with("cosmos_validator_voting_power{"))
            .expect("power sample present");
        assert!(power_line.ends_with(&clamped));
    }

    #[test]
    fn target_found_gauge_tracks_the_lookup() {
        let mut result = empty_result();
        result.target = TargetLookup::NotFound;
        let text = encode_poll(&result).expect("encode result");
        assert!(text.contains("cosmos_target_validator_found 0"));

        result.snapshots = vec![snapshot(3, "Val3")];
        result.target = TargetLookup::Found(0);
        let text = encode_poll(&result).expect("encode result");
        assert!(text.contains("cosmos_target_validator_found 1"));
    }

    #[test]
    fn encoding_is_idempotent() {
        let mut snap_a = snapshot(1, "Val1");
        snap_a.voting_power = Some(100);
        snap_a.rank = Some(1);
        snap_a.status = Some(BondStatus::Bonded);
        snap_a.jailed = Some(false);
        snap_a.tokens = Some("1000000".to_string());

        let mut snap_b = snapshot(2, "Val2");
        snap_b.voting_power = Some(50);
        snap_b.rank = Some(2);
        snap_b.status = Some(BondStatus::Unbonding);
        snap_b.jailed = Some(true);

        let result = PollResult {
            height: Some(10),
            snapshots: vec![snap_a, snap_b],
            target: TargetLookup::Found(0),
            skipped_keys: 1,
        };

        let first = encode_poll(&result).expect("first encode");
        let second = encode_poll(&result).expect("second encode");
        assert_eq!(sorted_lines(&first), sorted_lines(&second));
    }

    #[test]
    fn unparseable_tokens_yield_no_sample() {
        let mut snap = snapshot(4, "Val4");
        snap.status = Some(BondStatus::Bonded);
        snap.tokens = Some("not-a-number".to_string());

        let result = PollResult {
            height: None,
            snapshots: vec![snap],
            target: TargetLookup::Unset,
            skipped_keys: 0,
        };
        let text = encode_poll(&result).expect("encode result");
        assert!(!text.contains("cosmos_validator_tokens{"));
        // The bad value contributes nothing to the bonded total.
        assert!(text.contains("cosmos_validator_bonded_tokens 0"));
    }

    #[test]
    fn registry_serves_self_metrics_and_published_poll() {
        let registry = MetricsRegistry::new().expect("create metrics registry");
        registry.exporter.polls_total.inc();

        assert!(registry.published().is_none());
        let text = registry.gather_text();
        assert!(text.contains("exporter_polls_total 1"));
        assert!(!text.contains("cosmos_validator_count"));

        let poll_text = encode_poll(&empty_result()).expect("encode empty result");
        registry.publish(poll_text);

        let text = registry.gather_text();
        assert!(text.contains("exporter_polls_total 1"));
        assert!(text.contains("cosmos_validator_count 0"));
    }

    #[test]
    fn publish_swaps_the_served_exposition() {
        let registry = MetricsRegistry::new().expect("create metrics registry");
        registry.publish("first\n".to_string());
        assert_eq!(registry.published().as_deref().map(String::as_str), Some("first\n"));

        registry.publish("second\n".to_string());
        assert_eq!(
            registry.published().as_deref().map(String::as_str),
            Some("second\n")
        );
    }
}
