use config::{Config, ConfigError, File};
use ethers::types::Address;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::Path;

use crate::price::{CurveQuoteSource, DerivationTable, DerivedRule};
use crate::types::{string_to_address, ConversionError};

/// Address provider deployed at the same address on every Curve network.
pub const CURVE_ADDRESS_PROVIDER: &str = "0x0000000022D53366457F9d5E68Ec105046FC4383";

#[derive(Debug, Deserialize, Clone)]
pub struct Rpc {
    pub url: String,
    #[serde(default = "default_block_time_seconds")]
    pub block_time_seconds: u64,
}

fn default_block_time_seconds() -> u64 {
    12
}

#[derive(Debug, Deserialize, Clone)]
pub struct Curve {
    #[serde(default = "default_address_provider")]
    pub address_provider: String,
    /// Address-provider slot of the legacy pool-info contract.
    #[serde(default = "default_pool_info_provider_id")]
    pub pool_info_provider_id: u64,
    #[serde(default = "default_max_coin_slots")]
    pub max_coin_slots: u64,
    #[serde(default = "default_max_minter_depth")]
    pub max_minter_depth: usize,
    #[serde(default = "default_max_gauges")]
    pub max_gauges: u64,
}

fn default_address_provider() -> String {
    CURVE_ADDRESS_PROVIDER.to_string()
}
fn default_pool_info_provider_id() -> u64 {
    1
}
fn default_max_coin_slots() -> u64 {
    8
}
fn default_max_minter_depth() -> usize {
    4
}
fn default_max_gauges() -> u64 {
    1000
}

impl Default for Curve {
    fn default() -> Self {
        Self {
            address_provider: default_address_provider(),
            pool_info_provider_id: default_pool_info_provider_id(),
            max_coin_slots: default_max_coin_slots(),
            max_minter_depth: default_max_minter_depth(),
            max_gauges: default_max_gauges(),
        }
    }
}

impl Curve {
    pub fn address_provider(&self) -> Result<Address, ConversionError> {
        string_to_address(&self.address_provider)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct YieldEstimator {
    /// Reference USD price of the reward token (CRV).
    #[serde(default = "default_reward_token_price_usd")]
    pub reward_token_price_usd: f64,
    #[serde(default = "default_window")]
    pub window: String,
    #[serde(default = "default_interval")]
    pub interval: String,
}

fn default_reward_token_price_usd() -> f64 {
    3.0
}
fn default_window() -> String {
    "60 days".to_string()
}
fn default_interval() -> String {
    "7 days".to_string()
}

impl Default for YieldEstimator {
    fn default() -> Self {
        Self {
            reward_token_price_usd: default_reward_token_price_usd(),
            window: default_window(),
            interval: default_interval(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Ledger {
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CurveOracleEntry {
    pub pool: String,
    pub base: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DerivedEntry {
    pub base: String,
    #[serde(default = "default_factor")]
    pub factor: f64,
}

fn default_factor() -> f64 {
    1.0
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Prices {
    /// token → USD
    #[serde(default)]
    pub fixed: HashMap<String, f64>,
    /// token → Chainlink aggregator
    #[serde(default)]
    pub chainlink_oracles: HashMap<String, String>,
    /// token → crypto pool pricing it against `base`
    #[serde(default)]
    pub curve_oracles: HashMap<String, CurveOracleEntry>,
    /// chain id → token → rule
    #[serde(default)]
    pub derived: HashMap<String, HashMap<String, DerivedEntry>>,
}

impl Prices {
    pub fn fixed_prices(&self) -> Result<HashMap<Address, f64>, ConversionError> {
        self.fixed
            .iter()
            .map(|(token, price)| Ok((string_to_address(token)?, *price)))
            .collect()
    }

    pub fn chainlink_feeds(&self) -> Result<HashMap<Address, Address>, ConversionError> {
        self.chainlink_oracles
            .iter()
            .map(|(token, feed)| Ok((string_to_address(token)?, string_to_address(feed)?)))
            .collect()
    }

    pub fn curve_sources(&self) -> Result<HashMap<Address, CurveQuoteSource>, ConversionError> {
        self.curve_oracles
            .iter()
            .map(|(token, entry)| {
                Ok((
                    string_to_address(token)?,
                    CurveQuoteSource {
                        pool: string_to_address(&entry.pool)?,
                        base: string_to_address(&entry.base)?,
                    },
                ))
            })
            .collect()
    }

    pub fn derivation_table(&self) -> Result<DerivationTable, ConversionError> {
        let mut table = DerivationTable::new();
        for (chain, rules) in &self.derived {
            let chain_id: u64 = chain
                .trim()
                .parse()
                .map_err(|_| ConversionError::InvalidChainId(chain.clone()))?;
            let entry = table.entry(chain_id).or_default();
            for (token, rule) in rules {
                entry.insert(
                    string_to_address(token)?,
                    DerivedRule {
                        base: string_to_address(&rule.base)?,
                        factor: rule.factor,
                    },
                );
            }
        }
        Ok(table)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub rpc: Rpc,
    #[serde(default)]
    pub curve: Curve,
    #[serde(default)]
    pub yield_estimator: YieldEstimator,
    #[serde(default)]
    pub ledger: Ledger,
    #[serde(default)]
    pub prices: Prices,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_file("Config.toml")
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("CURVE_RPC_URL") {
            let trimmed = url.trim();
            if !trimmed.is_empty() {
                self.rpc.url = trimmed.to_string();
            }
        }

        // DATABASE_URL is honoured as well so a shared .env keeps working.
        let database_url = env::var("CURVE_LEDGER_DATABASE_URL").or_else(|_| env::var("DATABASE_URL"));
        if let Ok(url) = database_url {
            let trimmed = url.trim();
            if !trimmed.is_empty() {
                self.ledger.database_url = Some(trimmed.to_string());
            }
        }

        if let Ok(raw) = env::var("CURVE_REWARD_TOKEN_PRICE_USD") {
            match raw.trim().parse::<f64>() {
                Ok(price) if price.is_finite() && price >= 0.0 => {
                    self.yield_estimator.reward_token_price_usd = price;
                }
                _ => log::warn!("Ignoring CURVE_REWARD_TOKEN_PRICE_USD={:?}: not a price", raw),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_table_parses_chain_keys() {
        let mut rules = HashMap::new();
        rules.insert(
            "0xae7ab96520de3a18e5e111b5eaab095312d7fe84".to_string(),
            DerivedEntry {
                base: "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee".to_string(),
                factor: 1.0,
            },
        );
        let mut prices = Prices::default();
        prices.derived.insert("1".to_string(), rules);

        let table = prices.derivation_table().unwrap();
        let rule = table[&1].values().next().unwrap();
        assert_eq!(rule.base, Address::repeat_byte(0xee));

        prices.derived.insert("mainnet".to_string(), HashMap::new());
        assert!(prices.derivation_table().is_err());
    }

    #[test]
    fn bad_addresses_are_configuration_errors() {
        let mut prices = Prices::default();
        prices.fixed.insert("not-an-address".to_string(), 1.0);
        assert!(prices.fixed_prices().is_err());
    }
}
