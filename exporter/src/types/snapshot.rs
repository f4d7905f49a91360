//! Reconciled per-validator snapshots and the per-poll result.
//!
//! A [`PollResult`] is created once per poll cycle, handed to the metrics
//! encoder by reference, and then discarded; nothing retains it across
//! cycles. Every numeric field that can be missing is an `Option`:
//! `None` means "not observed this poll", which is semantically distinct
//! from a reported value of zero and must never collapse into one.

use serde::{Deserialize, Serialize};

use super::{BondStatus, ConsAddress};

/// Canonical identity record for one validator.
///
/// The consensus address is the join key between the two data sources.
/// The operator address and moniker come from the staking registry and
/// are `None` for validators seen only in the consensus set, e.g. when a
/// pagination race makes the staking record momentarily invisible.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ValidatorIdentity {
    pub consensus_address: ConsAddress,
    pub operator_address: Option<String>,
    pub moniker: Option<String>,
}

/// The reconciled state of one validator for one poll.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ValidatorSnapshot {
    pub identity: ValidatorIdentity,
    /// Voting power from the consensus set. `None` if the validator is
    /// not in the observed consensus set; `Some(0)` if the chain reported
    /// a power of exactly zero.
    pub voting_power: Option<u64>,
    /// Proposer priority from the consensus set.
    pub proposer_priority: Option<i64>,
    /// 1-based position by descending voting power. Defined and unique
    /// only among validators present in the consensus set.
    pub rank: Option<u32>,
    /// Whether the validator sits within the configured active-set size.
    /// `None` when no active-set size was configured (never guessed).
    pub active: Option<bool>,
    /// Jailed flag from the staking registry.
    pub jailed: Option<bool>,
    /// Staking lifecycle state from the staking registry.
    pub status: Option<BondStatus>,
    /// Bonded tokens, decimal string from the staking registry.
    pub tokens: Option<String>,
    /// Commission rate, decimal string from the staking registry.
    pub commission_rate: Option<String>,
}

impl ValidatorSnapshot {
    /// Creates a snapshot with only identity set; every derived field
    /// starts absent and is filled in by the reconciler.
    pub fn new(identity: ValidatorIdentity) -> Self {
        Self {
            identity,
            voting_power: None,
            proposer_priority: None,
            rank: None,
            active: None,
            jailed: None,
            status: None,
            tokens: None,
            commission_rate: None,
        }
    }

    /// True when the validator is bonded but jailed, the downtime signal
    /// surfaced as a missed-block indicator.
    pub fn missed_block_signal(&self) -> Option<bool> {
        match (self.status, self.jailed) {
            (Some(status), Some(jailed)) => Some(status == BondStatus::Bonded && jailed),
            _ => None,
        }
    }
}

/// Outcome of resolving the configured target validator.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TargetLookup {
    /// No target hint was configured for this run.
    Unset,
    /// A hint was configured but matched no known validator. This is an
    /// expected outcome, not an error.
    NotFound,
    /// Index of the matching snapshot in [`PollResult::snapshots`].
    Found(usize),
}

/// The complete output of one reconciliation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PollResult {
    /// Block height the consensus set was observed at, if reported.
    pub height: Option<u64>,
    /// One snapshot per identity present in either source set, ordered by
    /// ascending consensus address.
    pub snapshots: Vec<ValidatorSnapshot>,
    /// Pointer to the configured target validator's snapshot.
    pub target: TargetLookup,
    /// Staking entries skipped because their pubkey was malformed or
    /// duplicated another entry's derived consensus address.
    pub skipped_keys: u64,
}

impl PollResult {
    /// Returns the target validator's snapshot, if one was resolved.
    pub fn target_snapshot(&self) -> Option<&ValidatorSnapshot> {
        match self.target {
            TargetLookup::Found(idx) => self.snapshots.get(idx),
            TargetLookup::Unset | TargetLookup::NotFound => None,
        }
    }
}
