use ethers::types::{Address, U256};
use std::str::FromStr;

/// Divide a U256 by 10^decimals and return f64 without intermediate u128 casts.
///
/// Goes through the decimal string so the result is the correctly rounded
/// nearest double, identical to parsing the same literal.
pub fn u256_div_10_pow(value: U256, decimals: u32) -> f64 {
    if value.is_zero() {
        return 0.0;
    }
    let s = value.to_string();
    let len = s.len();
    let d = decimals as usize;
    let dec_str = if d == 0 {
        s
    } else if len <= d {
        let mut out = String::with_capacity(2 + d);
        out.push_str("0.");
        out.push_str(&"0".repeat(d - len));
        out.push_str(&s);
        out
    } else {
        let mut out = String::with_capacity(len + 1);
        out.push_str(&s[..len - d]);
        out.push('.');
        out.push_str(&s[len - d..]);
        out
    };
    dec_str.parse::<f64>().unwrap_or(0.0)
}

/// Unscaled conversion, used where the caller applies its own 1e18 factors.
pub fn u256_to_f64(value: U256) -> f64 {
    u256_div_10_pow(value, 0)
}

pub fn string_to_address(s: &str) -> Result<Address, ConversionError> {
    Address::from_str(s.trim()).map_err(|e| ConversionError::InvalidAddress(format!("{s}: {e}")))
}

/// Serializes raw on-chain integers as decimal strings. Reads back decimal or
/// `0x` hex.
pub mod u256_decimal {
    use ethers::types::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.strip_prefix("0x") {
            Some(hex) => U256::from_str_radix(hex, 16).map_err(serde::de::Error::custom),
            None => U256::from_dec_str(&s).map_err(serde::de::Error::custom),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Invalid chain id: {0}")]
    InvalidChainId(String),
}
