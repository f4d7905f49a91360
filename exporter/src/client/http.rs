//! HTTP implementation of [`ValidatorSource`].
//!
//! The consensus set comes from the Tendermint RPC `/validators`
//! endpoint, which pages by 1-based page number:
//!
//! ```json
//! GET /validators?page=1&per_page=100
//! {
//!   "jsonrpc": "2.0",
//!   "id": -1,
//!   "result": {
//!     "block_height": "12345",
//!     "validators": [
//!       {
//!         "address": "9A2DB2E23F1504CD056606553AC049C5E718E8F9",
//!         "pub_key": { "type": "tendermint/PubKeyEd25519", "value": "..." },
//!         "voting_power": "100",
//!         "proposer_priority": "-50"
//!       }
//!     ],
//!     "count": "100",
//!     "total": "175"
//!   }
//! }
//! ```
//!
//! The staking registry comes from the Cosmos REST
//! `/cosmos/staking/v1beta1/validators` endpoint, which pages by an
//! opaque continuation key:
//!
//! ```json
//! GET /cosmos/staking/v1beta1/validators?pagination.limit=100
//! {
//!   "validators": [
//!     {
//!       "operator_address": "cosmosvaloper1...",
//!       "consensus_pubkey": { "@type": "/cosmos.crypto.ed25519.PubKey", "key": "..." },
//!       "jailed": false,
//!       "status": "BOND_STATUS_BONDED",
//!       "tokens": "1000000",
//!       "description": { "moniker": "Val1" },
//!       "commission": { "commission_rates": { "rate": "0.100000000000000000" } }
//!     }
//!   ],
//!   "pagination": { "next_key": null, "total": "175" }
//! }
//! ```
//!
//! All integer chain values arrive as JSON strings and are parsed here;
//! a value that does not parse is a schema violation and fails the fetch
//! with [`FetchError::Malformed`].

use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::EndpointsConfig;
use crate::types::{BondStatus, ConsAddress, ConsensusSet, ConsensusValidator, StakingValidator};

use super::{FetchError, ValidatorSource};

/// Page size for the Tendermint RPC `/validators` call (its maximum).
const RPC_PER_PAGE: u64 = 100;

/// Page size for the REST staking registry call.
const REST_PAGE_LIMIT: u64 = 100;

/// HTTP-based validator source.
///
/// Thread-safe and cheap to clone (the underlying `reqwest::Client` is an
/// `Arc` internally). Per-request timeouts are configured at construction
/// time; cycle-level deadlines belong to the poll driver.
#[derive(Clone)]
pub struct HttpValidatorSource {
    rpc_url: String,
    rest_url: String,
    client: Client,
}

impl HttpValidatorSource {
    /// Constructs a new source from the configured endpoint base URLs.
    ///
    /// `rpc_url`/`rest_url` should be endpoint roots, e.g.
    /// `"http://127.0.0.1:26657"`, without a trailing slash.
    pub fn new(cfg: &EndpointsConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| FetchError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            rpc_url: cfg.rpc_url.clone(),
            rest_url: cfg.rest_url.clone(),
            client,
        })
    }

    fn endpoint(base: &str, path: &str) -> String {
        // Avoid accidental double slashes.
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::Unavailable(format!("GET {url} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Unavailable(format!(
                "{url} returned HTTP status {status}"
            )));
        }

        resp.json::<T>()
            .await
            .map_err(|e| FetchError::Malformed(format!("failed to parse JSON from {url}: {e}")))
    }
}

impl ValidatorSource for HttpValidatorSource {
    async fn fetch_consensus_set(&self) -> Result<ConsensusSet, FetchError> {
        let url = Self::endpoint(&self.rpc_url, "/validators");

        let mut height = None;
        let mut validators: Vec<ConsensusValidator> = Vec::new();
        let mut page: u64 = 1;

        loop {
            let resp: RpcResponse<RpcValidatorsResult> = self
                .get_json(
                    &url,
                    &[
                        ("page", page.to_string()),
                        ("per_page", RPC_PER_PAGE.to_string()),
                    ],
                )
                .await?;

            if let Some(err) = resp.error {
                return Err(FetchError::Unavailable(format!(
                    "RPC error {}: {}",
                    err.code, err.message
                )));
            }
            let result = resp
                .result
                .ok_or_else(|| FetchError::Malformed("RPC response has no result".to_string()))?;

            if height.is_none() {
                height = Some(parse_u64("block_height", &result.block_height)?);
            }
            let total = parse_u64("total", &result.total)?;

            let batch_len = result.validators.len();
            for v in result.validators {
                validators.push(v.into_domain()?);
            }

            // An empty page means the source is done regardless of what
            // `total` claims; never loop on a disagreeing endpoint.
            if batch_len == 0 || validators.len() as u64 >= total {
                break;
            }
            page += 1;
        }

        Ok(ConsensusSet { height, validators })
    }

    async fn fetch_staking_set(&self) -> Result<Vec<StakingValidator>, FetchError> {
        let url = Self::endpoint(&self.rest_url, "/cosmos/staking/v1beta1/validators");

        let mut validators: Vec<StakingValidator> = Vec::new();
        let mut next_key: Option<String> = None;

        loop {
            let mut query = vec![("pagination.limit", REST_PAGE_LIMIT.to_string())];
            if let Some(key) = &next_key {
                query.push(("pagination.key", key.clone()));
            }

            let resp: StakingValidatorsResponse = self.get_json(&url, &query).await?;
            for v in resp.validators {
                validators.push(v.into_domain()?);
            }

            match resp
                .pagination
                .and_then(|p| p.next_key)
                .filter(|k| !k.is_empty())
            {
                Some(key) => next_key = Some(key),
                None => break,
            }
        }

        Ok(validators)
    }
}

fn parse_u64(field: &str, value: &str) -> Result<u64, FetchError> {
    value
        .parse::<u64>()
        .map_err(|_| FetchError::Malformed(format!("field `{field}` is not a u64: {value:?}")))
}

fn parse_i64(field: &str, value: &str) -> Result<i64, FetchError> {
    value
        .parse::<i64>()
        .map_err(|_| FetchError::Malformed(format!("field `{field}` is not an i64: {value:?}")))
}

// ---------------------------------------------------------------------
// Tendermint RPC wire types
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcValidatorsResult {
    block_height: String,
    #[serde(default)]
    validators: Vec<RpcValidator>,
    total: String,
}

#[derive(Debug, Deserialize)]
struct RpcValidator {
    address: String,
    voting_power: String,
    proposer_priority: String,
}

impl RpcValidator {
    fn into_domain(self) -> Result<ConsensusValidator, FetchError> {
        let address = ConsAddress::from_hex(&self.address)
            .map_err(|e| FetchError::Malformed(format!("bad validator address: {e}")))?;
        Ok(ConsensusValidator {
            address,
            voting_power: parse_u64("voting_power", &self.voting_power)?,
            proposer_priority: parse_i64("proposer_priority", &self.proposer_priority)?,
        })
    }
}

// ---------------------------------------------------------------------
// Cosmos REST wire types
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct StakingValidatorsResponse {
    #[serde(default)]
    validators: Vec<RestValidator>,
    pagination: Option<RestPagination>,
}

#[derive(Debug, Deserialize)]
struct RestPagination {
    next_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RestValidator {
    operator_address: String,
    consensus_pubkey: RestPubKey,
    #[serde(default)]
    jailed: bool,
    status: String,
    tokens: String,
    description: RestDescription,
    commission: RestCommission,
}

#[derive(Debug, Deserialize)]
struct RestPubKey {
    #[serde(default)]
    key: String,
}

#[derive(Debug, Deserialize)]
struct RestDescription {
    #[serde(default)]
    moniker: String,
}

#[derive(Debug, Deserialize)]
struct RestCommission {
    commission_rates: RestCommissionRates,
}

#[derive(Debug, Deserialize)]
struct RestCommissionRates {
    rate: String,
}

impl RestValidator {
    fn into_domain(self) -> Result<StakingValidator, FetchError> {
        let status = parse_bond_status(&self.status)?;
        Ok(StakingValidator {
            operator_address: self.operator_address,
            consensus_pubkey: self.consensus_pubkey.key,
            status,
            jailed: self.jailed,
            tokens: self.tokens,
            commission_rate: self.commission.commission_rates.rate,
            moniker: self.description.moniker,
        })
    }
}

fn parse_bond_status(status: &str) -> Result<BondStatus, FetchError> {
    match status {
        "BOND_STATUS_BONDED" => Ok(BondStatus::Bonded),
        "BOND_STATUS_UNBONDING" => Ok(BondStatus::Unbonding),
        "BOND_STATUS_UNBONDED" => Ok(BondStatus::Unbonded),
        other => Err(FetchError::Malformed(format!(
            "unknown bond status: {other:?}"
        ))),
    }
}
