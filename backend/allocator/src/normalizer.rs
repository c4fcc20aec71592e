//! Raw vote → [`Contribution`] conversion.
//!
//! The USD value of a vote is `raw_amount × price / 10^decimals`, computed
//! on 256-bit integers; the only rounding is the final floor to 18 USD
//! fractional digits.

use primitive_types::U256;
use tracing::{debug, warn};

use crate::amount::{pow10, Usd};
use crate::errors::{AllocatorError, Result};
use crate::sources::PriceSource;
use crate::tokens;
use crate::types::{Contribution, RawContribution};

/// Output of [`normalize`]: the priced contributions plus how many records
/// had to be left out because no price was available.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedContributions {
    pub contributions: Vec<Contribution>,
    pub excluded: usize,
}

/// Convert a base-unit token amount into USD.
pub fn convert_to_usd(raw_amount: U256, token_decimals: u8, price: Usd) -> Result<Usd> {
    let scaled = raw_amount
        .checked_mul(price.units())
        .ok_or(AllocatorError::Overflow("USD conversion"))?;
    Ok(Usd::from_units(scaled / pow10(token_decimals as u32)))
}

/// Price every raw record of a round on `chain_id`.
///
/// Records whose token is unknown, that carry no timestamp, or that have no
/// price at their timestamp are excluded and counted. Any other collaborator error aborts.
pub async fn normalize(
    chain_id: u64,
    raw: &[RawContribution],
    prices: &dyn PriceSource,
) -> Result<NormalizedContributions> {
    let mut out = NormalizedContributions {
        contributions: Vec::with_capacity(raw.len()),
        excluded: 0,
    };

    for record in raw {
        let Some(token) = tokens::lookup(chain_id, &record.token) else {
            debug!("Unknown token {} on chain {chain_id}", record.token);
            out.excluded += 1;
            continue;
        };

        let Some(timestamp) = record.timestamp else {
            debug!("Vote from {} has no timestamp", record.contributor_address);
            out.excluded += 1;
            continue;
        };

        let price = match prices
            .usd_price(chain_id, &record.token, timestamp)
            .await
        {
            Ok(p) => p,
            Err(AllocatorError::ConversionUnavailable { token, timestamp }) => {
                debug!("No price for {token} at {timestamp}");
                out.excluded += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        out.contributions.push(Contribution {
            project_id: record.project_id,
            round_id: record.round_id.clone(),
            contributor_address: record.contributor_address,
            token: record.token,
            raw_amount: record.raw_amount,
            amount_usd: convert_to_usd(record.raw_amount, token.decimals, price)?,
            timestamp,
        });
    }

    if out.excluded > 0 {
        warn!(
            "Excluded {} of {} contributions with no USD conversion",
            out.excluded,
            raw.len()
        );
    }

    Ok(out)
}
