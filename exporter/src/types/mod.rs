//! Core domain types used by the exporter
//!
//! This module defines the strongly-typed validator records fetched from
//! the two chain endpoints, together with the reconciled snapshot types
//! the metrics encoder consumes. The goal is to avoid "naked" strings and
//! numbers in public APIs and instead use domain-specific newtypes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::KeyError;

/// Per-poll snapshot types produced by reconciliation.
pub mod snapshot;
/// Validator records as fetched from the consensus and staking endpoints.
pub mod validator;

pub use snapshot::{PollResult, TargetLookup, ValidatorIdentity, ValidatorSnapshot};
pub use validator::{BondStatus, ConsensusSet, ConsensusValidator, StakingValidator};

/// Length in bytes of a Tendermint consensus address.
pub const ADDR_LEN: usize = 20;

/// Strongly-typed consensus address.
///
/// This is the short identifier keying the active validator set: the first
/// [`ADDR_LEN`] bytes of the SHA-256 digest of the validator's ed25519
/// consensus public key. It is rendered as 40 uppercase hex characters,
/// matching the `address` field of the Tendermint RPC `/validators`
/// response.
///
/// The derivation itself lives in [`crate::identity`]; this type only
/// carries the resulting bytes and their text encoding.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ConsAddress(pub [u8; ADDR_LEN]);

impl ConsAddress {
    /// Parses a consensus address from its hex text form.
    ///
    /// Accepts both upper- and lowercase hex. Fails with [`KeyError`] if
    /// the input is not valid hex or does not decode to exactly
    /// [`ADDR_LEN`] bytes.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|e| KeyError::Encoding(e.to_string()))?;
        if bytes.len() != ADDR_LEN {
            return Err(KeyError::Length {
                expected: ADDR_LEN,
                got: bytes.len(),
            });
        }
        let mut addr = [0u8; ADDR_LEN];
        addr.copy_from_slice(&bytes);
        Ok(ConsAddress(addr))
    }

    /// Returns the underlying address bytes as a borrowed array.
    pub fn as_bytes(&self) -> &[u8; ADDR_LEN] {
        &self.0
    }
}

impl fmt::Display for ConsAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}
