//! Voting-strategy registry.
//!
//! A round names the algorithm that turns its contributions into matching
//! amounts. The set of algorithms is closed: every supported strategy is a
//! [`VotingStrategy`] variant with one [`MatchingAlgorithm`] implementation,
//! and resolving any other name is an
//! [`AllocatorError::UnsupportedStrategy`] error, never a fallback.

pub mod linear_qf;

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::errors::{AllocatorError, Result};
use crate::summary;
use crate::types::{Contribution, MatchingStatsData, ProjectContributionSummary, ProjectId, RoundMetadata};

pub use linear_qf::LinearQuadraticFunding;

/// Contributions of a round grouped by project.
pub type ProjectContributions = BTreeMap<ProjectId, Vec<Contribution>>;

pub trait MatchingAlgorithm: Send + Sync {
    /// Registry name, as it appears in round metadata.
    fn name(&self) -> &'static str;

    /// Allocate the round's matching pool across `contributions`.
    ///
    /// Either returns a result for every eligible project or fails as a
    /// whole; a partial allocation is never produced.
    fn compute_matching(
        &self,
        round: &RoundMetadata,
        contributions: &ProjectContributions,
    ) -> Result<Vec<MatchingStatsData>>;

    fn summarize(&self, contributions: &[Contribution]) -> Result<ProjectContributionSummary> {
        summary::summarize(contributions)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VotingStrategy {
    LinearQuadraticFunding,
}

impl VotingStrategy {
    pub const ALL: &'static [VotingStrategy] = &[VotingStrategy::LinearQuadraticFunding];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LinearQuadraticFunding => "linearQuadraticFunding",
        }
    }

    pub fn algorithm(&self) -> &'static dyn MatchingAlgorithm {
        match self {
            Self::LinearQuadraticFunding => &LinearQuadraticFunding,
        }
    }
}

impl FromStr for VotingStrategy {
    type Err = AllocatorError;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|s| s.as_str() == name)
            .ok_or_else(|| AllocatorError::UnsupportedStrategy(name.to_string()))
    }
}

/// Look up the matching algorithm registered under `strategy_name`.
pub fn resolve(strategy_name: &str) -> Result<&'static dyn MatchingAlgorithm> {
    strategy_name.parse::<VotingStrategy>().map(|s| s.algorithm())
}
