//! The poll driver: one fetch→reconcile→encode cycle on a fixed interval.
//!
//! Each cycle fetches both validator sets concurrently, reconciles them,
//! encodes the result, and publishes the encoded exposition. Failures are
//! isolated per cycle: a failed or timed-out cycle publishes nothing,
//! leaves the previous cycle's exposition in place, increments the
//! failure counter, and the driver schedules the next cycle regardless.
//! A transient endpoint outage must never take the exporter down.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::time::{self, MissedTickBehavior};

use crate::client::{FetchError, ValidatorSource};
use crate::config::PollConfig;
use crate::metrics::{MetricsRegistry, encode_poll};
use crate::reconcile::{ReconcileOptions, reconcile};
use crate::types::PollResult;

/// Errors that abort a single poll cycle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CycleError {
    /// One of the two fetches failed; the half-fetched pair is discarded
    /// wholesale, since reconciling a partial consensus set against a
    /// full staking set would corrupt rank computation.
    Fetch(FetchError),
    /// The cycle exceeded its configured deadline.
    Timeout,
    /// The reconciled result could not be encoded.
    Encode(String),
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleError::Fetch(e) => write!(f, "fetch failed: {e}"),
            CycleError::Timeout => write!(f, "poll cycle exceeded its deadline"),
            CycleError::Encode(msg) => write!(f, "failed to encode metrics: {msg}"),
        }
    }
}

impl std::error::Error for CycleError {}

impl From<FetchError> for CycleError {
    fn from(e: FetchError) -> Self {
        CycleError::Fetch(e)
    }
}

/// Drives poll cycles against a [`ValidatorSource`].
pub struct PollDriver<S> {
    source: S,
    metrics: Arc<MetricsRegistry>,
    opts: ReconcileOptions,
    interval: Duration,
    cycle_timeout: Duration,
}

impl<S: ValidatorSource> PollDriver<S> {
    pub fn new(
        source: S,
        metrics: Arc<MetricsRegistry>,
        poll: &PollConfig,
        opts: ReconcileOptions,
    ) -> Self {
        Self {
            source,
            metrics,
            opts,
            interval: poll.interval,
            cycle_timeout: poll.cycle_timeout,
        }
    }

    /// Runs poll cycles forever on the configured interval.
    ///
    /// Missed ticks are skipped, not bunched: if a cycle is still running
    /// when the next tick is due, the driver waits for the following tick
    /// rather than overlapping two cycles against inconsistent fetch
    /// pairs.
    pub async fn run(&self) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match self.poll_once().await {
                Ok(result) => {
                    tracing::info!(
                        validators = result.snapshots.len(),
                        height = result.height,
                        skipped_keys = result.skipped_keys,
                        "poll cycle completed"
                    );
                }
                Err(e) => {
                    tracing::warn!("poll cycle failed: {e}");
                }
            }
        }
    }

    /// Runs exactly one poll cycle, including metrics bookkeeping.
    ///
    /// On success the encoded exposition is published and the poll result
    /// returned; on failure nothing is published and the failure counter
    /// is incremented.
    pub async fn poll_once(&self) -> Result<PollResult, CycleError> {
        let start = Instant::now();
        self.metrics.exporter.polls_total.inc();

        let outcome = match time::timeout(self.cycle_timeout, self.run_cycle()).await {
            Ok(inner) => inner,
            Err(_) => Err(CycleError::Timeout),
        };

        match outcome {
            Ok(result) => {
                if result.skipped_keys > 0 {
                    self.metrics
                        .exporter
                        .skipped_keys_total
                        .inc_by(result.skipped_keys);
                }
                self.metrics
                    .exporter
                    .poll_duration_seconds
                    .observe(start.elapsed().as_secs_f64());
                self.metrics
                    .exporter
                    .last_poll_timestamp_seconds
                    .set(current_unix_timestamp() as f64);
                Ok(result)
            }
            Err(e) => {
                self.metrics.exporter.poll_failures_total.inc();
                Err(e)
            }
        }
    }

    /// The cycle body: concurrent fetches, reconcile, encode, publish.
    ///
    /// The two fetches are independent; the reconciler waits on both
    /// (a join point, not a race). Publishing happens last, so an
    /// abandoned cycle can never leave a partially visible result.
    async fn run_cycle(&self) -> Result<PollResult, CycleError> {
        let (consensus, staking) = tokio::try_join!(
            self.source.fetch_consensus_set(),
            self.source.fetch_staking_set()
        )?;

        let result = reconcile(&consensus, &staking, &self.opts);
        let exposition = encode_poll(&result).map_err(|e| CycleError::Encode(e.to_string()))?;
        self.metrics.publish(exposition);
        Ok(result)
    }
}

/// Returns the current wall-clock time as seconds since Unix epoch.
///
/// On error (system clock before epoch) this falls back to 0.
fn current_unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}
