//! Fixtures shared by the unit and scenario tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use primitive_types::U256;

use crate::amount::{parse_decimal, Usd};
use crate::errors::{AllocatorError, Result};
use crate::sources::{ContributionSource, PriceSource, RoundSource};
use crate::types::{
    Address, Application, Contribution, MatchingStatsData, ProjectId, RawContribution,
    RoundMetadata, VotingStrategyConfig,
};

pub const ROUND_ID: &str = "0x00000000000000000000000000000000000000aa";

pub fn project_id(n: u8) -> ProjectId {
    ProjectId([n; 32])
}

pub fn contributor(n: u8) -> Address {
    Address([n; 20])
}

pub fn payout(n: u8) -> Address {
    let mut bytes = [0x50u8; 20];
    bytes[19] = n;
    Address(bytes)
}

/// An already priced contribution of `usd` dollars.
pub fn contribution(project: u8, from: u8, usd: &str) -> Contribution {
    Contribution {
        project_id: project_id(project),
        round_id: ROUND_ID.to_string(),
        contributor_address: contributor(from),
        token: Address::default(),
        raw_amount: U256::zero(),
        amount_usd: Usd::parse(usd).expect("fixture amount"),
        timestamp: 1_700_000_000,
    }
}

/// A raw vote of `whole_tokens` of an 18-decimal token.
pub fn raw_vote(project: u8, from: u8, token: Address, whole_tokens: &str) -> RawContribution {
    RawContribution {
        project_id: project_id(project),
        round_id: ROUND_ID.to_string(),
        contributor_address: contributor(from),
        token,
        raw_amount: parse_decimal(whole_tokens, 18).expect("fixture amount"),
        timestamp: Some(1_700_000_000),
    }
}

pub fn round(projects: &[u8], pool: U256, parameters: serde_json::Value) -> RoundMetadata {
    RoundMetadata {
        round_id: ROUND_ID.to_string(),
        chain_id: crate::tokens::MAINNET,
        matching_pool_size_in_token: pool,
        token: Address::default(),
        voting_strategy: VotingStrategyConfig {
            strategy_name: "linearQuadraticFunding".to_string(),
            strategy_address: "0x00000000000000000000000000000000000000bb".to_string(),
            parameters,
        },
        applications: projects
            .iter()
            .map(|p| Application {
                project_id: project_id(*p),
                payout_address: payout(*p),
            })
            .collect(),
    }
}

pub fn stats(project: u8, amount: u64) -> MatchingStatsData {
    MatchingStatsData {
        project_id: project_id(project),
        project_payout_address: payout(project),
        contributions_count: 1,
        match_amount_in_token: U256::from(amount),
    }
}

/// Constant per-token prices; tokens without an entry are unpriceable.
#[derive(Default)]
pub struct FixedPrices {
    prices: HashMap<Address, Usd>,
}

impl FixedPrices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, token: Address, usd: &str) -> Self {
        self.prices.insert(token, Usd::parse(usd).expect("fixture price"));
        self
    }
}

#[async_trait]
impl PriceSource for FixedPrices {
    async fn usd_price(&self, _chain_id: u64, token: &Address, timestamp: i64) -> Result<Usd> {
        self.prices
            .get(token)
            .copied()
            .ok_or_else(|| AllocatorError::ConversionUnavailable {
                token: token.to_string(),
                timestamp,
            })
    }
}

/// In-memory round and vote store standing in for the indexer. Like the
/// indexer's votes file, it serves every stored vote as-is; records are
/// not filtered by their own `round_id`.
#[derive(Default)]
pub struct MemoryIndexer {
    pub rounds: Mutex<HashMap<(u64, String), RoundMetadata>>,
    pub votes: Mutex<Vec<RawContribution>>,
}

impl MemoryIndexer {
    pub fn new(round: RoundMetadata, votes: Vec<RawContribution>) -> Self {
        let indexer = MemoryIndexer::default();
        indexer
            .rounds
            .lock()
            .unwrap()
            .insert((round.chain_id, round.round_id.clone()), round);
        *indexer.votes.lock().unwrap() = votes;
        indexer
    }
}

#[async_trait]
impl RoundSource for MemoryIndexer {
    async fn fetch_round_metadata(&self, chain_id: u64, round_id: &str) -> Result<RoundMetadata> {
        self.rounds
            .lock()
            .unwrap()
            .get(&(chain_id, round_id.to_string()))
            .cloned()
            .ok_or_else(|| AllocatorError::NotFound(format!("round {round_id}")))
    }
}

#[async_trait]
impl ContributionSource for MemoryIndexer {
    async fn fetch_contributions(
        &self,
        _chain_id: u64,
        _round_id: &str,
        project_id: Option<&ProjectId>,
    ) -> Result<Vec<RawContribution>> {
        Ok(self
            .votes
            .lock()
            .unwrap()
            .iter()
            .filter(|v| project_id.map_or(true, |p| &v.project_id == p))
            .cloned()
            .collect())
    }
}
