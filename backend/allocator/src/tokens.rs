//! Static registry of the tokens rounds accept, keyed by chain.
//!
//! Normalization needs each token's decimal count to scale base units into
//! whole tokens before pricing; an unknown token cannot be priced.

use primitive_types::U256;

use crate::amount::{format_decimal, pow10};
use crate::types::Address;

pub const MAINNET: u64 = 1;
pub const OPTIMISM: u64 = 10;
pub const POLYGON: u64 = 137;
pub const FANTOM: u64 = 250;
pub const ZKSYNC_ERA: u64 = 324;
pub const ARBITRUM: u64 = 42161;
pub const AVALANCHE: u64 = 43114;

/// A token accepted for contributions or payouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenInfo {
    pub chain_id: u64,
    pub symbol: &'static str,
    /// `0x`-prefixed address; the zero address denotes the native coin.
    pub address: &'static str,
    pub decimals: u8,
}

const NATIVE: &str = "0x0000000000000000000000000000000000000000";

static TOKENS: &[TokenInfo] = &[
    TokenInfo { chain_id: MAINNET, symbol: "ETH", address: NATIVE, decimals: 18 },
    TokenInfo { chain_id: MAINNET, symbol: "DAI", address: "0x6B175474E89094C44Da98b954EedeAC495271d0F", decimals: 18 },
    TokenInfo { chain_id: MAINNET, symbol: "CVP", address: "0x38e4adB44ef08F22F5B5b76A8f0c2d0dCbE7DcA1", decimals: 18 },
    TokenInfo { chain_id: OPTIMISM, symbol: "ETH", address: NATIVE, decimals: 18 },
    TokenInfo { chain_id: OPTIMISM, symbol: "DAI", address: "0xDA10009cBd5D07dd0CeCc66161FC93D7c9000da1", decimals: 18 },
    TokenInfo { chain_id: FANTOM, symbol: "FTM", address: NATIVE, decimals: 18 },
    TokenInfo { chain_id: FANTOM, symbol: "WFTM", address: "0x21be370D5312f44cB42ce377BC9b8a0cEF1A4C83", decimals: 18 },
    TokenInfo { chain_id: FANTOM, symbol: "BUSD", address: "0xC931f61B1534EB21D8c11B24f3f5Ab2471d4aB50", decimals: 18 },
    TokenInfo { chain_id: FANTOM, symbol: "DAI", address: "0x8d11ec38a3eb5e956b052f67da8bdc9bef8abf3e", decimals: 18 },
    TokenInfo { chain_id: ZKSYNC_ERA, symbol: "ETH", address: NATIVE, decimals: 18 },
    TokenInfo { chain_id: ZKSYNC_ERA, symbol: "DAI", address: "0x4B9eb6c0b6ea15176BBF62841C6B2A8a398cb656", decimals: 18 },
    TokenInfo { chain_id: ZKSYNC_ERA, symbol: "USDC", address: "0x3355df6D4c9C3035724Fd0e3914dE96A5a83aaf4", decimals: 6 },
    TokenInfo { chain_id: ZKSYNC_ERA, symbol: "USDT", address: "0x493257fD37EDB34451f62EDf8D2a0C418852bA4C", decimals: 6 },
    TokenInfo { chain_id: ARBITRUM, symbol: "ETH", address: NATIVE, decimals: 18 },
    TokenInfo { chain_id: ARBITRUM, symbol: "USDC", address: "0xaf88d065e77c8cc2239327c5edb3a432268e5831", decimals: 6 },
    TokenInfo { chain_id: ARBITRUM, symbol: "ARB", address: "0x912CE59144191C1204E64559FE8253a0e49E6548", decimals: 18 },
    TokenInfo { chain_id: AVALANCHE, symbol: "AVAX", address: NATIVE, decimals: 18 },
    TokenInfo { chain_id: AVALANCHE, symbol: "USDC", address: "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E", decimals: 6 },
    TokenInfo { chain_id: POLYGON, symbol: "MATIC", address: NATIVE, decimals: 18 },
    TokenInfo { chain_id: POLYGON, symbol: "USDC", address: "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359", decimals: 6 },
];

/// Look up a token by chain and address.
pub fn lookup(chain_id: u64, token: &Address) -> Option<&'static TokenInfo> {
    TOKENS.iter().find(|t| {
        t.chain_id == chain_id
            && t
                .address
                .parse::<Address>()
                .map(|a| &a == token)
                .unwrap_or(false)
    })
}

/// Render a base-unit amount as whole tokens, keeping at most
/// `fraction_digits` fractional digits (truncated, trailing zeros dropped).
pub fn format_units(amount: U256, decimals: u8, fraction_digits: u32) -> String {
    let decimals = decimals as u32;
    let drop = decimals.saturating_sub(fraction_digits);
    let kept = amount / pow10(drop);
    format_decimal(kept, decimals - drop)
}
