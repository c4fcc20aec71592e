//! Orchestration of one request: fetch → normalize → summarize / match.
//!
//! The [`Allocator`] owns nothing but handles to its collaborators. Every
//! call builds its own [`PriceCache`], so no state survives between
//! requests.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::errors::Result;
use crate::normalizer::normalize;
use crate::sources::{ContributionSource, PriceCache, PriceSource, RoundSource};
use crate::strategy::{self, ProjectContributions};
use crate::types::{
    Contribution, MatchingStatsData, ProjectContributionSummary, ProjectId, RawContribution,
    RoundMetadata,
};

/// Summary plus the number of votes that could not be priced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummaryReport {
    #[serde(flatten)]
    pub summary: ProjectContributionSummary,
    #[serde(skip_serializing_if = "is_zero")]
    pub excluded_contributions: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Match amounts for a whole round.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundMatching {
    pub chain_id: u64,
    pub round_id: String,
    pub strategy: &'static str,
    pub results: Vec<MatchingStatsData>,
    pub excluded_contributions: usize,
}

#[derive(Clone)]
pub struct Allocator {
    rounds: Arc<dyn RoundSource>,
    contributions: Arc<dyn ContributionSource>,
    prices: Arc<dyn PriceSource>,
}

impl Allocator {
    pub fn new(
        rounds: Arc<dyn RoundSource>,
        contributions: Arc<dyn ContributionSource>,
        prices: Arc<dyn PriceSource>,
    ) -> Self {
        Allocator {
            rounds,
            contributions,
            prices,
        }
    }

    /// `getProjectSummary`: the strategy is resolved before any vote is
    /// fetched, so an unsupported round fails without further I/O.
    pub async fn project_summary(
        &self,
        chain_id: u64,
        round_id: &str,
        project_id: &ProjectId,
    ) -> Result<ProjectSummaryReport> {
        let round = self.rounds.fetch_round_metadata(chain_id, round_id).await?;
        let algorithm = strategy::resolve(&round.voting_strategy.strategy_name)?;

        let raw = self
            .contributions
            .fetch_contributions(chain_id, round_id, Some(project_id))
            .await?;
        let (raw, foreign) = retain_round(&round, raw);
        let prices = PriceCache::new(self.prices.clone());
        let normalized = normalize(chain_id, &raw, &prices).await?;

        Ok(ProjectSummaryReport {
            summary: algorithm.summarize(&normalized.contributions)?,
            excluded_contributions: normalized.excluded + foreign,
        })
    }

    /// Run the round's matching algorithm over all of its votes.
    pub async fn compute_matching(&self, chain_id: u64, round_id: &str) -> Result<RoundMatching> {
        let round = self.rounds.fetch_round_metadata(chain_id, round_id).await?;
        let algorithm = strategy::resolve(&round.voting_strategy.strategy_name)?;

        let raw = self
            .contributions
            .fetch_contributions(chain_id, round_id, None)
            .await?;
        let (raw, foreign) = retain_round(&round, raw);
        let prices = PriceCache::new(self.prices.clone());
        let normalized = normalize(chain_id, &raw, &prices).await?;
        let excluded = normalized.excluded + foreign;

        let per_project = group_by_project(normalized.contributions);
        let results =
            off_runtime(move || algorithm.compute_matching(&round, &per_project)).await??;

        info!(
            "Computed {} match amounts for round {round_id} ({excluded} votes excluded)",
            results.len()
        );

        Ok(RoundMatching {
            chain_id,
            round_id: round_id.to_string(),
            strategy: algorithm.name(),
            results,
            excluded_contributions: excluded,
        })
    }
}

/// Run CPU-bound work on the blocking pool so large rounds do not stall
/// the async workers.
async fn off_runtime<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await?)
}

/// Keep the votes recorded against `round`; the rest are counted.
fn retain_round(
    round: &RoundMetadata,
    raw: Vec<RawContribution>,
) -> (Vec<RawContribution>, usize) {
    let total = raw.len();
    let kept: Vec<RawContribution> = raw
        .into_iter()
        .filter(|v| v.round_id.eq_ignore_ascii_case(&round.round_id))
        .collect();
    let foreign = total - kept.len();
    if foreign > 0 {
        warn!(
            "Excluded {foreign} of {total} votes recorded against a round other than {}",
            round.round_id
        );
    }
    (kept, foreign)
}

fn group_by_project(contributions: Vec<Contribution>) -> ProjectContributions {
    let mut per_project: ProjectContributions = BTreeMap::new();
    for c in contributions {
        per_project.entry(c.project_id).or_default().push(c);
    }
    per_project
}
