//! [`AmountValue`] represents a token or native amount in smallest units.
//!
//! This module holds its type definition and implementations.

use std::fmt::Display;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// Represents a monetary amount in the smallest units of an asset.
///
/// Uses a `u128` internally, which covers any realistic stablecoin balance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AmountValue(pub u128);

impl AmountValue {
    pub const ZERO: AmountValue = AmountValue(0);

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Render the amount as a decimal string for an asset with `decimals` places.
    ///
    /// Trailing fractional zeros are trimmed, so `1_500_000` with 6 decimals
    /// renders as `"1.5"`.
    pub fn format_units(&self, decimals: u8) -> String {
        let Some(scale) = 10u128.checked_pow(decimals as u32) else {
            return self.0.to_string();
        };
        let whole = self.0 / scale;
        let frac = self.0 % scale;
        if frac == 0 {
            return whole.to_string();
        }
        let frac = format!("{frac:0width$}", width = decimals as usize);
        format!("{whole}.{}", frac.trim_end_matches('0'))
    }
}

impl From<u8> for AmountValue {
    fn from(value: u8) -> Self {
        AmountValue(value as u128)
    }
}

impl From<u16> for AmountValue {
    fn from(value: u16) -> Self {
        AmountValue(value as u128)
    }
}

impl From<u32> for AmountValue {
    fn from(value: u32) -> Self {
        AmountValue(value as u128)
    }
}

impl From<u64> for AmountValue {
    fn from(value: u64) -> Self {
        AmountValue(value as u128)
    }
}

impl From<u128> for AmountValue {
    fn from(value: u128) -> Self {
        AmountValue(value)
    }
}

impl From<AmountValue> for U256 {
    fn from(value: AmountValue) -> Self {
        U256::from(value.0)
    }
}

impl Display for AmountValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for AmountValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AmountValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let value = s.parse::<u128>().map_err(serde::de::Error::custom)?;
        Ok(AmountValue(value))
    }
}
