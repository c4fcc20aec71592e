//! Ports to the external collaborators the core consumes.
//!
//! Round metadata, raw votes and USD prices all come from outside the
//! allocator. They are modelled as async traits so the service can run
//! against the HTTP clients in [`crate::rpc`] in production and against
//! in-memory fixtures in tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::amount::Usd;
use crate::errors::{AllocatorError, Result};
use crate::types::{Address, ProjectId, RawContribution, RoundMetadata};

#[async_trait]
pub trait RoundSource: Send + Sync {
    async fn fetch_round_metadata(&self, chain_id: u64, round_id: &str) -> Result<RoundMetadata>;
}

#[async_trait]
pub trait ContributionSource: Send + Sync {
    /// Raw votes for a round, optionally narrowed to one project.
    async fn fetch_contributions(
        &self,
        chain_id: u64,
        round_id: &str,
        project_id: Option<&ProjectId>,
    ) -> Result<Vec<RawContribution>>;
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// USD price of one whole `token` at `timestamp` (unix seconds).
    ///
    /// Returns [`AllocatorError::ConversionUnavailable`] when no price is
    /// known; any other error is treated as a collaborator failure.
    async fn usd_price(&self, chain_id: u64, token: &Address, timestamp: i64) -> Result<Usd>;
}

/// Memoizing wrapper around a [`PriceSource`].
///
/// Meant to be created per request and dropped with it: entries are never
/// invalidated, so a cache must not outlive the computation it serves.
/// Misses (`ConversionUnavailable`) are remembered too; transport errors
/// are not.
pub struct PriceCache {
    inner: Arc<dyn PriceSource>,
    memo: Mutex<HashMap<(u64, Address, i64), Option<Usd>>>,
}

impl PriceCache {
    pub fn new(inner: Arc<dyn PriceSource>) -> Self {
        PriceCache {
            inner,
            memo: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, key: &(u64, Address, i64)) -> Option<Option<Usd>> {
        self.memo.lock().ok().and_then(|m| m.get(key).copied())
    }

    fn remember(&self, key: (u64, Address, i64), value: Option<Usd>) {
        if let Ok(mut m) = self.memo.lock() {
            m.insert(key, value);
        }
    }
}

#[async_trait]
impl PriceSource for PriceCache {
    async fn usd_price(&self, chain_id: u64, token: &Address, timestamp: i64) -> Result<Usd> {
        let key = (chain_id, *token, timestamp);
        let unavailable = || AllocatorError::ConversionUnavailable {
            token: token.to_string(),
            timestamp,
        };

        match self.cached(&key) {
            Some(Some(price)) => return Ok(price),
            Some(None) => return Err(unavailable()),
            None => {}
        }

        match self.inner.usd_price(chain_id, token, timestamp).await {
            Ok(price) => {
                self.remember(key, Some(price));
                Ok(price)
            }
            Err(AllocatorError::ConversionUnavailable { .. }) => {
                self.remember(key, None);
                Err(unavailable())
            }
            Err(e) => Err(e),
        }
    }
}
