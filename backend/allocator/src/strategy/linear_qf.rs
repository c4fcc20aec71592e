//! Linear quadratic funding.
//!
//! For a project with USD contributions `c_1..c_n`:
//!
//! ```text
//! S_p = (Σ sqrt(c_i))^2
//! W_p = max(0, S_p - Σ c_i)
//! match_p = pool × W_p / Σ_q W_q
//! ```
//!
//! Everything runs on `U256` at the USD scale (18 fractional digits).
//! `sqrt(c)` is the floor integer square root of `c × 10^18`, so it carries
//! 18 fractional digits as well. Because a floored root squared never
//! exceeds its radicand, a single contributor always yields `W_p == 0`
//! exactly.
//!
//! Optional `matchingCapPercent` in the strategy parameters bounds each
//! project's share of the pool; the excess is redistributed over the
//! projects still under the cap.

use primitive_types::U256;
use rayon::prelude::*;
use tracing::{info, warn};

use super::{MatchingAlgorithm, ProjectContributions};
use crate::amount::{isqrt, parse_decimal, pow10, USD_DECIMALS};
use crate::errors::{AllocatorError, Result};
use crate::types::{Address, Contribution, MatchingStatsData, ProjectId, RoundMetadata};

/// Cap percentages carry two decimal places (`12.5` → 1250).
const CAP_DECIMALS: u32 = 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct LinearQuadraticFunding;

/// Unmatched quadratic-funding weight `W_p` of one project.
pub fn project_weight(contributions: &[Contribution]) -> Result<U256> {
    let scale = pow10(USD_DECIMALS);
    let mut sum_sqrt = U256::zero();
    let mut sum = U256::zero();

    for c in contributions {
        let units = c.amount_usd.units();
        let radicand = units
            .checked_mul(scale)
            .ok_or(AllocatorError::Overflow("square root radicand"))?;
        sum_sqrt = sum_sqrt
            .checked_add(isqrt(radicand))
            .ok_or(AllocatorError::Overflow("sum of square roots"))?;
        sum = sum
            .checked_add(units)
            .ok_or(AllocatorError::Overflow("contribution sum"))?;
    }

    let squared = sum_sqrt
        .checked_mul(sum_sqrt)
        .ok_or(AllocatorError::Overflow("squared sum of roots"))?
        / scale;

    Ok(if squared > sum { squared - sum } else { U256::zero() })
}

/// Read `matchingCapPercent` from the strategy parameters, as hundredths of
/// a percent.
fn cap_basis_points(round: &RoundMetadata) -> Result<Option<U256>> {
    let raw = match round.voting_strategy.parameters.get("matchingCapPercent") {
        None | Some(serde_json::Value::Null) => return Ok(None),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(other) => {
            return Err(AllocatorError::Validation(format!(
                "matchingCapPercent must be a number, got {other}"
            )))
        }
    };

    let bps = parse_decimal(&raw, CAP_DECIMALS)
        .map_err(|_| AllocatorError::Validation(format!("invalid matchingCapPercent {raw:?}")))?;
    if bps.is_zero() || bps > U256::from(100u64) * pow10(CAP_DECIMALS) {
        return Err(AllocatorError::Validation(format!(
            "matchingCapPercent must be in (0, 100], got {raw}"
        )));
    }
    Ok(Some(bps))
}

fn share(pool: U256, weight: U256, total_weight: U256) -> Result<U256> {
    Ok(pool
        .checked_mul(weight)
        .ok_or(AllocatorError::Overflow("match amount"))?
        / total_weight)
}

/// Split `pool` proportionally to `weights`, holding every share at or
/// below `cap` when one is given. Shares are floored; the sum never exceeds
/// `pool`.
pub fn allocate(pool: U256, weights: &[U256], cap: Option<U256>) -> Result<Vec<U256>> {
    let mut amounts = vec![U256::zero(); weights.len()];
    let mut capped = vec![false; weights.len()];
    let mut remaining = pool;

    loop {
        let active_weight = weights
            .iter()
            .zip(&capped)
            .filter(|(_, c)| !**c)
            .try_fold(U256::zero(), |acc, (w, _)| acc.checked_add(*w))
            .ok_or(AllocatorError::Overflow("total weight"))?;
        if active_weight.is_zero() || remaining.is_zero() {
            return Ok(amounts);
        }

        let mut shares = Vec::with_capacity(weights.len());
        for (w, c) in weights.iter().zip(&capped) {
            shares.push(if *c { U256::zero() } else { share(remaining, *w, active_weight)? });
        }

        let over: Vec<usize> = match cap {
            Some(cap) => (0..weights.len())
                .filter(|&i| !capped[i] && shares[i] > cap)
                .collect(),
            None => Vec::new(),
        };

        if over.is_empty() {
            for i in (0..weights.len()).filter(|&i| !capped[i]) {
                amounts[i] = shares[i];
            }
            return Ok(amounts);
        }

        // Each pass caps at least one more project, so this terminates.
        let cap = cap.unwrap_or_default();
        for i in over {
            amounts[i] = cap;
            capped[i] = true;
            remaining = remaining
                .checked_sub(cap)
                .ok_or(AllocatorError::Overflow("remaining pool"))?;
        }
    }
}

struct Weighted {
    project_id: ProjectId,
    payout: Address,
    count: u64,
    weight: U256,
}

impl MatchingAlgorithm for LinearQuadraticFunding {
    fn name(&self) -> &'static str {
        "linearQuadraticFunding"
    }

    fn compute_matching(
        &self,
        round: &RoundMetadata,
        contributions: &ProjectContributions,
    ) -> Result<Vec<MatchingStatsData>> {
        if contributions.is_empty() {
            return Err(AllocatorError::NoEligibleProjects);
        }

        let eligible: Vec<(&ProjectId, &Vec<Contribution>, Address)> = contributions
            .iter()
            .filter_map(|(id, cs)| match round.payout_address(id) {
                Some(payout) => Some((id, cs, payout)),
                None => {
                    warn!("Project {id} has contributions but no approved application; skipping");
                    None
                }
            })
            .collect();
        if eligible.is_empty() {
            return Err(AllocatorError::NoEligibleProjects);
        }

        // Fan out per project; every weight must be known before normalizing.
        let weighted = eligible
            .par_iter()
            .map(|(id, cs, payout)| {
                Ok(Weighted {
                    project_id: **id,
                    payout: *payout,
                    count: cs.len() as u64,
                    weight: project_weight(cs)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let pool = round.matching_pool_size_in_token;
        let cap = cap_basis_points(round)?
            .map(|bps| share(pool, bps, U256::from(100u64) * pow10(CAP_DECIMALS)))
            .transpose()?;

        let weights: Vec<U256> = weighted.iter().map(|w| w.weight).collect();
        let amounts = allocate(pool, &weights, cap)?;

        let total_weight = weights
            .iter()
            .try_fold(U256::zero(), |acc, w| acc.checked_add(*w))
            .ok_or(AllocatorError::Overflow("total weight"))?;
        info!(
            "Matched round {} on chain {}: {} projects, pool {}, total weight {}",
            round.round_id,
            round.chain_id,
            weighted.len(),
            pool,
            total_weight
        );

        Ok(weighted
            .into_iter()
            .zip(amounts)
            .map(|(w, amount)| MatchingStatsData {
                project_id: w.project_id,
                project_payout_address: w.payout,
                contributions_count: w.count,
                match_amount_in_token: amount,
            })
            .collect())
    }
}
