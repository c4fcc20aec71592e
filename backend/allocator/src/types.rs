//! Canonical data model shared by the normalizer, summarizer, matching
//! engine and distribution builder.
//!
//! Identifiers that end up in the committed distribution (`Address`,
//! `ProjectId`, `Hash`) are fixed-size byte arrays so that the leaf encoding
//! is exact; they travel over JSON as `0x`-prefixed hex.

use std::fmt;
use std::str::FromStr;

use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::amount::{u256_dec, Usd};
use crate::errors::AllocatorError;

macro_rules! fixed_hex_type {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = AllocatorError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let digits = s.trim().trim_start_matches("0x").trim_start_matches("0X");
                let mut out = [0u8; $len];
                hex::decode_to_slice(digits, &mut out).map_err(|e| {
                    AllocatorError::Validation(format!(
                        "invalid {} {s:?}: {e}",
                        stringify!($name)
                    ))
                })?;
                Ok($name(out))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({self})", stringify!($name))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_hex_type!(
    /// 20-byte EVM account address.
    Address,
    20
);

fixed_hex_type!(
    /// 32-byte project identifier.
    ProjectId,
    32
);

fixed_hex_type!(
    /// 32-byte Keccak-256 digest.
    Hash,
    32
);

/// A vote/donation as delivered by the indexer, before USD conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContribution {
    pub project_id: ProjectId,
    pub round_id: String,
    #[serde(alias = "voter")]
    pub contributor_address: Address,
    pub token: Address,
    /// Amount in the token's base units.
    #[serde(with = "u256_dec", alias = "amount")]
    pub raw_amount: U256,
    /// Unix seconds. `None` when the indexer gave no usable time; such a
    /// vote cannot be priced and is excluded during normalization.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// A contribution with its USD value resolved. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    pub project_id: ProjectId,
    pub round_id: String,
    pub contributor_address: Address,
    pub token: Address,
    #[serde(with = "u256_dec")]
    pub raw_amount: U256,
    #[serde(rename = "amountUSD")]
    pub amount_usd: Usd,
    pub timestamp: i64,
}

/// Report-level aggregate of one project's contributions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectContributionSummary {
    pub contribution_count: u64,
    pub unique_contributors: u64,
    #[serde(rename = "totalContributionsInUSD")]
    pub total_contributions_in_usd: String,
    #[serde(rename = "averageUSDContribution")]
    pub average_usd_contribution: String,
}

impl Default for ProjectContributionSummary {
    fn default() -> Self {
        ProjectContributionSummary {
            contribution_count: 0,
            unique_contributors: 0,
            total_contributions_in_usd: "0".to_string(),
            average_usd_contribution: "0".to_string(),
        }
    }
}

/// Strategy declaration carried by the round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingStrategyConfig {
    pub strategy_name: String,
    #[serde(default)]
    pub strategy_address: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// An approved application: the project and where its match is paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub project_id: ProjectId,
    pub payout_address: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundMetadata {
    pub round_id: String,
    pub chain_id: u64,
    /// Matching pool in the payout token's base units.
    #[serde(with = "u256_dec")]
    pub matching_pool_size_in_token: U256,
    pub token: Address,
    pub voting_strategy: VotingStrategyConfig,
    #[serde(default)]
    pub applications: Vec<Application>,
}

impl RoundMetadata {
    pub fn payout_address(&self, project_id: &ProjectId) -> Option<Address> {
        self.applications
            .iter()
            .find(|a| &a.project_id == project_id)
            .map(|a| a.payout_address)
    }
}

/// Matching engine output for one project. Carries no index: the position
/// in the committed distribution is assigned by the tree builder, which
/// turns this into a [`DistributionEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingStatsData {
    pub project_id: ProjectId,
    pub project_payout_address: Address,
    pub contributions_count: u64,
    #[serde(with = "u256_dec")]
    pub match_amount_in_token: U256,
}

/// The exact 4-tuple committed as a Merkle leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionEntry {
    pub index: u64,
    pub payout_address: Address,
    #[serde(with = "u256_dec")]
    pub match_amount_in_token: U256,
    pub project_id: ProjectId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_parses_mixed_case_hex() {
        let a: Address = "0x6B175474E89094C44Da98b954EedeAC495271d0F".parse().unwrap();
        assert_eq!(a.to_string(), "0x6b175474e89094c44da98b954eedeac495271d0f");
        assert!("0x1234".parse::<Address>().is_err());
        assert!("not-hex".parse::<ProjectId>().is_err());
    }

    #[test]
    fn raw_contribution_accepts_indexer_field_names() {
        let json = serde_json::json!({
            "projectId": format!("0x{}", "11".repeat(32)),
            "roundId": "0xround",
            "voter": format!("0x{}", "22".repeat(20)),
            "token": format!("0x{}", "00".repeat(20)),
            "amount": "1500000000000000000",
            "timestamp": 1_700_000_000
        });
        let raw: RawContribution = serde_json::from_value(json).unwrap();
        assert_eq!(raw.raw_amount, U256::from(1_500_000_000_000_000_000u64));
        assert_eq!(raw.contributor_address, Address([0x22; 20]));
        assert_eq!(raw.timestamp, Some(1_700_000_000));
    }

    #[test]
    fn default_summary_is_all_zero() {
        let json = serde_json::to_value(ProjectContributionSummary::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "contributionCount": 0,
                "uniqueContributors": 0,
                "totalContributionsInUSD": "0",
                "averageUSDContribution": "0"
            })
        );
    }
}
