//! Validator records as reported by the two chain endpoints.
//!
//! These types are ephemeral: they exist only within a single poll cycle,
//! between the fetch and the reconciliation that folds them into
//! [`crate::types::snapshot::ValidatorSnapshot`]s. Numeric chain values
//! that are decimal strings on the wire (tokens, commission rate) stay
//! strings here so no precision is lost before encoding.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ConsAddress;

/// Staking lifecycle state of a validator.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum BondStatus {
    /// Stake currently backs consensus participation.
    Bonded,
    /// Stake is being withdrawn and no longer counts toward consensus.
    Unbonding,
    /// Stake is fully withdrawn.
    Unbonded,
}

impl BondStatus {
    /// Returns the lowercase state name used in metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            BondStatus::Bonded => "bonded",
            BondStatus::Unbonding => "unbonding",
            BondStatus::Unbonded => "unbonded",
        }
    }

    /// All states, in the order they are exported as a one-hot state set.
    pub const ALL: [BondStatus; 3] = [
        BondStatus::Bonded,
        BondStatus::Unbonding,
        BondStatus::Unbonded,
    ];
}

impl fmt::Display for BondStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the consensus-layer validator set.
///
/// Fetched from the Tendermint RPC `/validators` endpoint. The address is
/// already the derived consensus address; the staking registry is needed
/// to map it back to an operator.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConsensusValidator {
    /// Consensus address keying this validator in the active set.
    pub address: ConsAddress,
    /// Voting power derived from bonded stake. Zero is a legitimate
    /// reported value, distinct from the validator being absent.
    pub voting_power: u64,
    /// Tendermint proposer priority at the observed height.
    pub proposer_priority: i64,
}

/// The full consensus validator set as of one poll.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConsensusSet {
    /// Block height the set was read at, when the endpoint reports one.
    pub height: Option<u64>,
    /// All set members, concatenated across pages in source order.
    pub validators: Vec<ConsensusValidator>,
}

/// One entry of the staking-module validator registry.
///
/// Fetched from the Cosmos REST `/cosmos/staking/v1beta1/validators`
/// endpoint. The consensus pubkey is kept in its base64 wire form; the
/// identity mapper derives the consensus address from it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StakingValidator {
    /// Bech32 operator address (`...valoper...`) registering the validator.
    pub operator_address: String,
    /// Base64-encoded ed25519 consensus public key.
    pub consensus_pubkey: String,
    /// Current staking lifecycle state.
    pub status: BondStatus,
    /// Whether the validator is jailed (excluded for a fault).
    pub jailed: bool,
    /// Bonded tokens as an arbitrary-precision decimal string.
    pub tokens: String,
    /// Commission rate as a decimal string, e.g. `"0.100000000000000000"`.
    pub commission_rate: String,
    /// Human-readable display name.
    pub moniker: String,
}
