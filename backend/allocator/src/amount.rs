//! Fixed-point monetary arithmetic.
//!
//! Every amount in the allocator is an unsigned 256-bit integer counting the
//! smallest unit of its denomination:
//!
//! * token amounts count base units (`value × 10^token_decimals`),
//! * USD amounts count `10^-18` dollars (see [`USD_DECIMALS`]).
//!
//! Decimal strings only appear at the boundary ([`parse_decimal`],
//! [`format_decimal`]). All accumulation goes through the `checked_*`
//! helpers which turn overflow into [`AllocatorError::Overflow`] instead of
//! wrapping or saturating.

use std::fmt;

use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{AllocatorError, Result};

/// Fractional digits carried by [`Usd`]. Square roots in the matching engine
/// are taken at this same width.
pub const USD_DECIMALS: u32 = 18;

/// Decimal places used when a USD amount is rounded for reporting.
pub const USD_DISPLAY_DECIMALS: u32 = 2;

/// `10^exp` as a [`U256`].
pub fn pow10(exp: u32) -> U256 {
    U256::exp10(exp as usize)
}

/// A non-negative USD amount with 18 fractional digits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Usd(U256);

impl Usd {
    pub fn zero() -> Self {
        Usd(U256::zero())
    }

    /// Wrap a raw count of `10^-18` dollars.
    pub fn from_units(units: U256) -> Self {
        Usd(units)
    }

    pub fn from_dollars(dollars: u64) -> Self {
        Usd(U256::from(dollars) * pow10(USD_DECIMALS))
    }

    pub fn units(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn parse(s: &str) -> Result<Self> {
        parse_decimal(s, USD_DECIMALS).map(Usd)
    }

    pub fn checked_add(self, other: Usd) -> Result<Usd> {
        self.0
            .checked_add(other.0)
            .map(Usd)
            .ok_or(AllocatorError::Overflow("USD sum"))
    }

    /// `self / count`, rounded half-up to `decimals` fractional digits.
    pub fn div_round_half_up(self, count: u64, decimals: u32) -> Usd {
        if count == 0 {
            return Usd::zero();
        }
        let step = pow10(USD_DECIMALS.saturating_sub(decimals));
        let divisor = U256::from(count) * step;
        let (mut quotient, remainder) = self.0.div_mod(divisor);
        // remainder < divisor, so doubling it cannot overflow for any u64 count.
        if remainder << 1 >= divisor {
            quotient += U256::one();
        }
        Usd(quotient * step)
    }

    /// Canonical decimal rendering: no trailing zeros, `"0"` for zero.
    pub fn to_decimal_string(&self) -> String {
        format_decimal(self.0, USD_DECIMALS)
    }
}

impl fmt::Display for Usd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal_string())
    }
}

impl Serialize for Usd {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_decimal_string())
    }
}

impl<'de> Deserialize<'de> for Usd {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Usd::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Parse a non-negative decimal string into an integer scaled by
/// `10^decimals`. More fractional digits than `decimals` is an error rather
/// than a silent truncation.
pub fn parse_decimal(s: &str, decimals: u32) -> Result<U256> {
    let s = s.trim();
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };

    let valid = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !valid(int_part) || !valid(frac_part) {
        return Err(AllocatorError::InvalidAmount(format!("not a decimal: {s:?}")));
    }
    if frac_part.len() > decimals as usize {
        return Err(AllocatorError::InvalidAmount(format!(
            "{s:?} has more than {decimals} fractional digits"
        )));
    }

    let mut digits = String::with_capacity(int_part.len() + decimals as usize);
    digits.push_str(if int_part.is_empty() { "0" } else { int_part });
    digits.push_str(frac_part);
    for _ in frac_part.len()..decimals as usize {
        digits.push('0');
    }

    U256::from_dec_str(&digits)
        .map_err(|_| AllocatorError::InvalidAmount(format!("{s:?} does not fit in 256 bits")))
}

/// Render `value / 10^decimals` without trailing fractional zeros.
pub fn format_decimal(value: U256, decimals: u32) -> String {
    let (whole, frac) = value.div_mod(pow10(decimals));
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

/// Floor integer square root.
pub fn isqrt(n: U256) -> U256 {
    if n.is_zero() {
        return U256::zero();
    }
    // Start from a power of two that is >= sqrt(n) and descend (Newton).
    let mut x = U256::one() << ((n.bits() + 1) / 2);
    loop {
        let y = (x + n / x) >> 1;
        if y >= x {
            return x;
        }
        x = y;
    }
}

/// Serde adapter rendering a [`U256`] as a base-10 string.
pub mod u256_dec {
    use primitive_types::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(u64),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(U256::from(n)),
            Repr::Text(s) => U256::from_dec_str(s.trim()).map_err(|_| {
                serde::de::Error::custom(format!("invalid unsigned integer: {s:?}"))
            }),
        }
    }
}
