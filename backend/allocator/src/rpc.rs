//! HTTP clients for the indexer and the price feed.
//!
//! ## Resilience
//!
//! * Exponential back-off is applied on transport errors, HTTP 429 and 5xx
//!   responses, up to [`MAX_BACKOFF_SECS`] seconds per wait and
//!   `max_retries` attempts.
//! * A 404 is an answer, not a failure: it maps to `NotFound` for rounds and
//!   to `ConversionUnavailable` for prices.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::amount::{u256_dec, Usd};
use crate::errors::{AllocatorError, Result};
use crate::sources::{ContributionSource, PriceSource, RoundSource};
use crate::types::{Address, ProjectId, RawContribution, RoundMetadata};

const MAX_BACKOFF_SECS: u64 = 60;
const INITIAL_BACKOFF_SECS: u64 = 2;

// ─────────────────────────────────────────────────────────
// Shared GET-with-retry
// ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new(client: Client, max_retries: u32) -> Self {
        HttpFetcher {
            client,
            max_retries,
        }
    }

    /// GET `url` and decode the JSON body. `Ok(None)` on 404.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        let mut backoff = INITIAL_BACKOFF_SECS;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let retry = attempt <= self.max_retries;

            match self.client.get(url).send().await {
                Err(e) if retry => {
                    warn!("GET {url} failed (will retry in {backoff}s): {e}");
                }
                Err(e) => return Err(e.into()),
                Ok(resp) => {
                    let status = resp.status();
                    if status == StatusCode::NOT_FOUND {
                        return Ok(None);
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        if !retry {
                            return Err(AllocatorError::Source(format!(
                                "GET {url} gave {status} after {attempt} attempts"
                            )));
                        }
                        warn!("GET {url} gave {status} (will retry in {backoff}s)");
                    } else if !status.is_success() {
                        return Err(AllocatorError::Source(format!("GET {url} gave {status}")));
                    } else {
                        let body = resp.json::<T>().await?;
                        debug!("GET {url} ok");
                        return Ok(Some(body));
                    }
                }
            }

            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
        }
    }
}

// ─────────────────────────────────────────────────────────
// Indexer: rounds and votes
// ─────────────────────────────────────────────────────────

/// A vote as the indexer serves it. Older dumps carry `createdAt` as an
/// ISO-8601 string instead of a unix `timestamp`. A vote with neither is
/// still passed on so the normalizer can count it as excluded.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexerVote {
    project_id: ProjectId,
    round_id: String,
    voter: Address,
    token: Address,
    #[serde(with = "u256_dec")]
    amount: primitive_types::U256,
    timestamp: Option<i64>,
    created_at: Option<String>,
}

impl IndexerVote {
    fn into_raw(self) -> RawContribution {
        let timestamp = self
            .timestamp
            .or_else(|| self.created_at.as_deref().and_then(parse_iso_to_unix));
        RawContribution {
            project_id: self.project_id,
            round_id: self.round_id,
            contributor_address: self.voter,
            token: self.token,
            raw_amount: self.amount,
            timestamp,
        }
    }
}

pub struct IndexerClient {
    http: HttpFetcher,
    base_url: String,
}

impl IndexerClient {
    pub fn new(http: HttpFetcher, base_url: &str) -> Self {
        IndexerClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl RoundSource for IndexerClient {
    async fn fetch_round_metadata(&self, chain_id: u64, round_id: &str) -> Result<RoundMetadata> {
        let url = format!("{}/data/{chain_id}/rounds/{round_id}.json", self.base_url);
        self.http
            .get_json::<RoundMetadata>(&url)
            .await?
            .ok_or_else(|| AllocatorError::NotFound(format!("round {round_id} on chain {chain_id}")))
    }
}

#[async_trait]
impl ContributionSource for IndexerClient {
    async fn fetch_contributions(
        &self,
        chain_id: u64,
        round_id: &str,
        project_id: Option<&ProjectId>,
    ) -> Result<Vec<RawContribution>> {
        let url = format!("{}/data/{chain_id}/rounds/{round_id}/votes.json", self.base_url);
        let votes = self
            .http
            .get_json::<Vec<IndexerVote>>(&url)
            .await?
            .unwrap_or_default();
        let fetched = votes.len();

        let raw: Vec<RawContribution> = votes
            .into_iter()
            .filter(|v| project_id.map_or(true, |p| &v.project_id == p))
            .map(IndexerVote::into_raw)
            .collect();

        debug!(
            "Fetched {fetched} votes for round {round_id} on chain {chain_id} ({} for this query)",
            raw.len()
        );
        Ok(raw)
    }
}

// ─────────────────────────────────────────────────────────
// Price feed
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PriceResponse {
    usd: String,
}

pub struct HttpPriceSource {
    http: HttpFetcher,
    base_url: String,
}

impl HttpPriceSource {
    pub fn new(http: HttpFetcher, base_url: &str) -> Self {
        HttpPriceSource {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    async fn usd_price(&self, chain_id: u64, token: &Address, timestamp: i64) -> Result<Usd> {
        let url = format!(
            "{}/prices/{chain_id}/{token}?at={timestamp}",
            self.base_url
        );
        let unavailable = || AllocatorError::ConversionUnavailable {
            token: token.to_string(),
            timestamp,
        };

        let body = self
            .http
            .get_json::<PriceResponse>(&url)
            .await?
            .ok_or_else(unavailable)?;
        Usd::parse(&body.usd).map_err(|e| {
            warn!("Price feed returned unusable value {:?}: {e}", body.usd);
            unavailable()
        })
    }
}

/// Parse an ISO-8601 timestamp string into a Unix epoch (seconds).
fn parse_iso_to_unix(s: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp())
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
