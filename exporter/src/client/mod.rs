//! Clients for the two chain data sources.
//!
//! This module defines the [`ValidatorSource`] seam the poll driver
//! consumes, and provides the HTTP implementation that talks to a
//! Tendermint RPC endpoint (consensus validator set) and a Cosmos SDK
//! REST endpoint (staking validator registry).
//!
//! Fetchers paginate transparently and return complete sets; they never
//! retry. Retry falls out of the fixed-interval poll loop, which simply
//! runs the fetch again on the next tick.

pub mod http;

use std::fmt;

use crate::types::{ConsensusSet, StakingValidator};

pub use http::HttpValidatorSource;

/// Errors that can occur while fetching a validator set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FetchError {
    /// The endpoint could not be reached, timed out, or returned a
    /// non-success status.
    Unavailable(String),
    /// The endpoint responded, but the payload violated the expected
    /// schema.
    Malformed(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Unavailable(msg) => write!(f, "endpoint unavailable: {msg}"),
            FetchError::Malformed(msg) => write!(f, "malformed response: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Abstract source of the two validator sets.
///
/// Implementations fetch the full consensus validator set and the full
/// staking validator registry as of the current poll, paginating until
/// the source reports no further pages and concatenating results in
/// source order. An empty set is a valid success, distinct from failure:
/// a chain may transiently report zero validators.
///
/// The two operations are independent and side-effect-free with respect
/// to one another, so callers may run them concurrently.
#[allow(async_fn_in_trait)]
pub trait ValidatorSource {
    /// Fetches the consensus-layer validator set.
    async fn fetch_consensus_set(&self) -> Result<ConsensusSet, FetchError>;

    /// Fetches the staking-module validator registry.
    async fn fetch_staking_set(&self) -> Result<Vec<StakingValidator>, FetchError>;
}
