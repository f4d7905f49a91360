//! Cross-encoding identity correlation.
//!
//! A validator is known by up to three encodings: the consensus address
//! keying the active set, the bech32 operator address keying the staking
//! registry, and an optional human-readable moniker. This module derives
//! the first from the staking registry's declared consensus pubkey and
//! joins the two fetched sets into a single index keyed by consensus
//! address.
//!
//! The derivation is a pure transform isolated from I/O so it can be
//! tested against known vectors independent of network behavior.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};

use crate::types::{ADDR_LEN, ConsAddress, ConsensusValidator, StakingValidator, ValidatorIdentity};

/// Length in bytes of an ed25519 consensus public key.
pub const ED25519_KEY_LEN: usize = 32;

/// Error raised when a key or address cannot be decoded.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum KeyError {
    /// The input is not valid base64/hex.
    Encoding(String),
    /// The decoded input has the wrong length.
    Length { expected: usize, got: usize },
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::Encoding(msg) => write!(f, "malformed key encoding: {msg}"),
            KeyError::Length { expected, got } => {
                write!(f, "malformed key length: expected {expected} bytes, got {got}")
            }
        }
    }
}

impl std::error::Error for KeyError {}

/// Derives a consensus address from a base64-encoded ed25519 pubkey.
///
/// This is the chain's one-way key transform: SHA-256 over the raw key
/// bytes, truncated to the first [`ADDR_LEN`] bytes. Deterministic and
/// total for well-formed keys; fails with [`KeyError`] for inputs of the
/// wrong length or encoding.
pub fn derive_consensus_address(pubkey_base64: &str) -> Result<ConsAddress, KeyError> {
    let key = BASE64
        .decode(pubkey_base64.trim())
        .map_err(|e| KeyError::Encoding(e.to_string()))?;
    if key.len() != ED25519_KEY_LEN {
        return Err(KeyError::Length {
            expected: ED25519_KEY_LEN,
            got: key.len(),
        });
    }

    let digest = Sha256::digest(&key);
    let mut addr = [0u8; ADDR_LEN];
    addr.copy_from_slice(&digest[..ADDR_LEN]);
    Ok(ConsAddress(addr))
}

/// One identity index entry: the canonical identity plus back-references
/// into the source sets it was joined from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexedIdentity {
    pub identity: ValidatorIdentity,
    /// Position in the staking set, if this identity has a staking record.
    pub staking_idx: Option<usize>,
    /// Position in the consensus set, if currently a set member.
    pub consensus_idx: Option<usize>,
}

/// Join of the consensus set and the staking registry, keyed by consensus
/// address.
///
/// A `BTreeMap` keeps iteration in ascending address order, which gives
/// downstream consumers a deterministic snapshot ordering for free.
#[derive(Clone, Debug, Default)]
pub struct IdentityIndex {
    pub entries: BTreeMap<ConsAddress, IndexedIdentity>,
    /// Staking entries dropped because their declared pubkey could not be
    /// transformed into a consensus address, or because another entry
    /// already claimed the same derived address.
    pub skipped_keys: u64,
}

/// Builds the identity index from the two fetched sets.
///
/// Every staking validator with a well-formed pubkey contributes an
/// identity; malformed pubkeys skip that single entry and are counted,
/// never aborting the join. Two staking entries declaring the same
/// pubkey cannot map to one identity: the later entry is skipped and
/// counted too, so an anomalous registry is visible in the skip metric
/// instead of silently collapsing. Every consensus-set member is then attached
/// to its identity, or gets a synthesized identity with no operator when
/// the staking side has no match. Consensus entries are never dropped:
/// a validator can appear in consensus data before its staking metadata
/// is visible, and dropping it would under-report voting power totals
/// and corrupt rank computation.
pub fn build_identity_index(
    consensus_set: &[ConsensusValidator],
    staking_set: &[StakingValidator],
) -> IdentityIndex {
    let mut index = IdentityIndex::default();

    for (i, sv) in staking_set.iter().enumerate() {
        match derive_consensus_address(&sv.consensus_pubkey) {
            Ok(addr) => match index.entries.entry(addr) {
                // First declaration wins; a duplicate pubkey is counted
                // like a malformed one.
                Entry::Occupied(_) => index.skipped_keys += 1,
                Entry::Vacant(slot) => {
                    slot.insert(IndexedIdentity {
                        identity: ValidatorIdentity {
                            consensus_address: addr,
                            operator_address: Some(sv.operator_address.clone()),
                            moniker: Some(sv.moniker.clone()),
                        },
                        staking_idx: Some(i),
                        consensus_idx: None,
                    });
                }
            },
            Err(_) => index.skipped_keys += 1,
        }
    }

    for (i, cv) in consensus_set.iter().enumerate() {
        index
            .entries
            .entry(cv.address)
            .and_modify(|entry| entry.consensus_idx = Some(i))
            .or_insert_with(|| IndexedIdentity {
                identity: ValidatorIdentity {
                    consensus_address: cv.address,
                    operator_address: None,
                    moniker: None,
                },
                staking_idx: None,
                consensus_idx: Some(i),
            });
    }

    index
}
