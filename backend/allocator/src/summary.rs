//! Per-project contribution summaries.

use std::collections::HashSet;

use crate::amount::{Usd, USD_DISPLAY_DECIMALS};
use crate::errors::Result;
use crate::types::{Contribution, ProjectContributionSummary};

/// Aggregate a project's contributions.
///
/// Independent of input order. The total is an exact decimal sum; the
/// average is rounded half-up to two decimal places. An empty slice yields
/// [`ProjectContributionSummary::default`].
pub fn summarize(contributions: &[Contribution]) -> Result<ProjectContributionSummary> {
    if contributions.is_empty() {
        return Ok(ProjectContributionSummary::default());
    }

    let total = contributions
        .iter()
        .try_fold(Usd::zero(), |acc, c| acc.checked_add(c.amount_usd))?;

    let unique: HashSet<_> = contributions.iter().map(|c| c.contributor_address).collect();

    let count = contributions.len() as u64;
    let average = total.div_round_half_up(count, USD_DISPLAY_DECIMALS);

    Ok(ProjectContributionSummary {
        contribution_count: count,
        unique_contributors: unique.len() as u64,
        total_contributions_in_usd: total.to_decimal_string(),
        average_usd_contribution: average.to_decimal_string(),
    })
}
