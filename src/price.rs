//! # Price Sources
//!
//! USD unit prices for pool constituents. Three layers, consulted by
//! [`PriceResolver::pool_token_price`] in this order:
//!
//! 1. **Derived** prices for tokens listed in a per-chain derivation table
//!    (e.g. wrapped or rebasing assets priced off a base asset).
//! 2. **Protocol** quotes for coins Curve itself prices (crypto pools with an
//!    internal `price_oracle()`).
//! 3. **Generic** quotes from Chainlink feeds, then a static table.
//!
//! TVL always uses the generic layer directly ([`PriceResolver::quote`]).

use async_trait::async_trait;
use dashmap::DashMap;
use ethers::abi::Detokenize;
use ethers::contract::{ContractCall, ContractError};
use ethers::prelude::{Address, Middleware, I256};
use ethers::types::BlockId;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::contracts::{AggregatorV3Interface, ICurveCryptoPool};
use crate::settings::Prices as PriceSettings;
use crate::token::Token;
use crate::types::{u256_div_10_pow, ConversionError};

/// USD price of one whole token, tagged with the source that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub price: f64,
    pub src: String,
}

impl Price {
    pub fn new(price: f64, src: impl Into<String>) -> Self {
        Self {
            price,
            src: src.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    #[error("no price source for {0:?}")]
    NotFound(Address),
    #[error("{source_name} returned an unusable price for {token:?}: {reason}")]
    Invalid {
        source_name: &'static str,
        token: Address,
        reason: String,
    },
    #[error("{source_name} unreachable: {reason}")]
    Transport {
        source_name: &'static str,
        reason: String,
    },
}

impl PriceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PriceError::Transport { .. })
    }
}

#[async_trait]
pub trait PriceOracle: Send + Sync {
    fn name(&self) -> &'static str;

    async fn quote(&self, token: Address) -> Result<Price, PriceError>;
}

/// Static USD prices, typically from configuration.
#[derive(Debug, Clone, Default)]
pub struct FixedPriceOracle {
    prices: HashMap<Address, f64>,
}

impl FixedPriceOracle {
    pub fn new(prices: HashMap<Address, f64>) -> Self {
        Self { prices }
    }

    pub fn with(mut self, token: Address, price: f64) -> Self {
        self.prices.insert(token, price);
        self
    }
}

#[async_trait]
impl PriceOracle for FixedPriceOracle {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn quote(&self, token: Address) -> Result<Price, PriceError> {
        self.prices
            .get(&token)
            .map(|&p| Price::new(p, self.name()))
            .ok_or(PriceError::NotFound(token))
    }
}

/// Maps a failed oracle read onto [`PriceError`]. A revert or an undecodable
/// answer means the source has nothing usable for `token` and the next source
/// may be tried; anything else is the node failing.
fn read_failure<M: Middleware>(
    source_name: &'static str,
    token: Address,
    err: ContractError<M>,
) -> PriceError {
    let reason = err.to_string();
    let unusable = err.is_revert()
        || reason.to_lowercase().contains("revert")
        || matches!(
            err,
            ContractError::AbiError(_)
                | ContractError::DecodingError(_)
                | ContractError::DetokenizationError(_)
        );
    if unusable {
        PriceError::Invalid {
            source_name,
            token,
            reason,
        }
    } else {
        PriceError::Transport {
            source_name,
            reason,
        }
    }
}

fn pinned<M: Middleware, D: Detokenize>(
    call: ContractCall<M, D>,
    block: Option<BlockId>,
) -> ContractCall<M, D> {
    match block {
        Some(block) => call.block(block),
        None => call,
    }
}

/// Asks each oracle in turn. A transport failure stops the chain; any other
/// error moves on to the next oracle.
#[derive(Clone, Default)]
pub struct OracleChain {
    oracles: Vec<Arc<dyn PriceOracle>>,
}

impl OracleChain {
    pub fn new(oracles: Vec<Arc<dyn PriceOracle>>) -> Self {
        Self { oracles }
    }
}

#[async_trait]
impl PriceOracle for OracleChain {
    fn name(&self) -> &'static str {
        "chain"
    }

    async fn quote(&self, token: Address) -> Result<Price, PriceError> {
        for oracle in &self.oracles {
            match oracle.quote(token).await {
                Ok(price) => return Ok(price),
                Err(err @ PriceError::Transport { .. }) => return Err(err),
                Err(err) => debug!("{} has no price for {:?}: {}", oracle.name(), token, err),
            }
        }
        Err(PriceError::NotFound(token))
    }
}

/// Chainlink aggregator feeds keyed by token.
pub struct ChainlinkOracle<M: Middleware> {
    provider: Arc<M>,
    feeds: HashMap<Address, Address>,
    feed_decimals: DashMap<Address, u8>,
    block: Option<BlockId>,
}

impl<M: Middleware + 'static> ChainlinkOracle<M> {
    pub fn new(provider: Arc<M>, feeds: HashMap<Address, Address>) -> Self {
        Self {
            provider,
            feeds,
            feed_decimals: DashMap::new(),
            block: None,
        }
    }

    /// Read feeds as of `block` instead of the latest one.
    pub fn at_block(mut self, block: u64) -> Self {
        self.block = Some(BlockId::from(block));
        self
    }

    async fn decimals(&self, token: Address, feed: Address) -> Result<u8, PriceError> {
        if let Some(d) = self.feed_decimals.get(&feed) {
            return Ok(*d.value());
        }
        let aggregator = AggregatorV3Interface::new(feed, Arc::clone(&self.provider));
        let decimals = pinned(aggregator.decimals(), self.block)
            .call()
            .await
            .map_err(|e| read_failure(self.name(), token, e))?;
        self.feed_decimals.insert(feed, decimals);
        Ok(decimals)
    }
}

#[async_trait]
impl<M: Middleware + 'static> PriceOracle for ChainlinkOracle<M> {
    fn name(&self) -> &'static str {
        "chainlink"
    }

    async fn quote(&self, token: Address) -> Result<Price, PriceError> {
        let feed = *self.feeds.get(&token).ok_or(PriceError::NotFound(token))?;
        let decimals = self.decimals(token, feed).await?;
        let aggregator = AggregatorV3Interface::new(feed, Arc::clone(&self.provider));
        let (_, answer, _, _, _) = pinned(aggregator.latest_round_data(), self.block)
            .call()
            .await
            .map_err(|e| read_failure(self.name(), token, e))?;
        if answer <= I256::zero() {
            return Err(PriceError::Invalid {
                source_name: self.name(),
                token,
                reason: format!("non-positive answer {answer}"),
            });
        }
        Ok(Price::new(
            u256_div_10_pow(answer.into_raw(), decimals as u32),
            self.name(),
        ))
    }
}

/// Where Curve's own quote for a coin comes from: a crypto pool whose
/// `price_oracle()` prices the coin in units of `base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurveQuoteSource {
    pub pool: Address,
    pub base: Address,
}

/// Protocol quote for Curve-supported coins.
pub struct CurveOracle<M: Middleware> {
    provider: Arc<M>,
    sources: HashMap<Address, CurveQuoteSource>,
    base_oracle: Arc<dyn PriceOracle>,
    block: Option<BlockId>,
}

impl<M: Middleware + 'static> CurveOracle<M> {
    pub fn new(
        provider: Arc<M>,
        sources: HashMap<Address, CurveQuoteSource>,
        base_oracle: Arc<dyn PriceOracle>,
    ) -> Self {
        Self {
            provider,
            sources,
            base_oracle,
            block: None,
        }
    }

    /// Read pool oracles as of `block`. The base oracle is pinned separately.
    pub fn at_block(mut self, block: u64) -> Self {
        self.block = Some(BlockId::from(block));
        self
    }

    pub fn supported_coins(&self) -> HashSet<Address> {
        self.sources.keys().copied().collect()
    }
}

#[async_trait]
impl<M: Middleware + 'static> PriceOracle for CurveOracle<M> {
    fn name(&self) -> &'static str {
        "curve"
    }

    async fn quote(&self, token: Address) -> Result<Price, PriceError> {
        let source = *self.sources.get(&token).ok_or(PriceError::NotFound(token))?;
        let pool = ICurveCryptoPool::new(source.pool, Arc::clone(&self.provider));
        let ratio = pinned(pool.price_oracle(), self.block)
            .call()
            .await
            .map_err(|e| read_failure(self.name(), token, e))?;
        let base = self.base_oracle.quote(source.base).await?;
        Ok(Price::new(u256_div_10_pow(ratio, 18) * base.price, self.name()))
    }
}

/// Entry of the derivation table: the token is worth `factor` units of `base`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedRule {
    pub base: Address,
    pub factor: f64,
}

/// Price procedure for tokens in the derivation table. Receives the pool
/// context so implementations can price off sibling constituents.
#[async_trait]
pub trait DerivedPricing: Send + Sync {
    async fn price_for_derived(
        &self,
        rule: &DerivedRule,
        token: &Token,
        pool: Address,
        tokens: &[Token],
        symbols: &[String],
    ) -> Result<Price, PriceError>;
}

/// Prices a derived token as a fixed multiple of its base asset's quote.
pub struct PeggedDerivation {
    oracle: Arc<dyn PriceOracle>,
}

impl PeggedDerivation {
    pub fn new(oracle: Arc<dyn PriceOracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl DerivedPricing for PeggedDerivation {
    async fn price_for_derived(
        &self,
        rule: &DerivedRule,
        token: &Token,
        pool: Address,
        tokens: &[Token],
        _symbols: &[String],
    ) -> Result<Price, PriceError> {
        let in_pool = tokens.iter().any(|t| t.address == rule.base);
        debug!(
            "deriving {} in {:?} from {:?} (base in pool: {})",
            token.symbol, pool, rule.base, in_pool
        );
        let base = self.oracle.quote(rule.base).await?;
        Ok(Price::new(base.price * rule.factor, format!("derived:{}", base.src)))
    }
}

/// Chain id → token → rule.
pub type DerivationTable = HashMap<u64, HashMap<Address, DerivedRule>>;

struct ProtocolQuote {
    supported: HashSet<Address>,
    oracle: Arc<dyn PriceOracle>,
}

struct Derivation {
    table: DerivationTable,
    pricing: Arc<dyn DerivedPricing>,
}

/// Chooses the price source for each token.
pub struct PriceResolver {
    chain_id: u64,
    generic: Arc<dyn PriceOracle>,
    protocol: Option<ProtocolQuote>,
    derivation: Option<Derivation>,
}

impl PriceResolver {
    pub fn new(chain_id: u64, generic: Arc<dyn PriceOracle>) -> Self {
        Self {
            chain_id,
            generic,
            protocol: None,
            derivation: None,
        }
    }

    pub fn with_protocol(mut self, supported: HashSet<Address>, oracle: Arc<dyn PriceOracle>) -> Self {
        self.protocol = Some(ProtocolQuote { supported, oracle });
        self
    }

    pub fn with_derivation(mut self, table: DerivationTable, pricing: Arc<dyn DerivedPricing>) -> Self {
        self.derivation = Some(Derivation { table, pricing });
        self
    }

    /// Wires Chainlink, the static table, Curve's oracles and the pegged
    /// derivation from configuration. With `block` set every on-chain source
    /// reads at that height.
    pub fn from_settings<M: Middleware + 'static>(
        settings: &PriceSettings,
        chain_id: u64,
        provider: Arc<M>,
        block: Option<u64>,
    ) -> Result<Self, ConversionError> {
        let mut chainlink = ChainlinkOracle::new(Arc::clone(&provider), settings.chainlink_feeds()?);
        if let Some(block) = block {
            chainlink = chainlink.at_block(block);
        }
        let fixed = FixedPriceOracle::new(settings.fixed_prices()?);
        let generic: Arc<dyn PriceOracle> =
            Arc::new(OracleChain::new(vec![Arc::new(chainlink), Arc::new(fixed)]));

        let mut curve = CurveOracle::new(provider, settings.curve_sources()?, Arc::clone(&generic));
        if let Some(block) = block {
            curve = curve.at_block(block);
        }
        let supported = curve.supported_coins();

        Ok(Self::new(chain_id, Arc::clone(&generic))
            .with_protocol(supported, Arc::new(curve))
            .with_derivation(
                settings.derivation_table()?,
                Arc::new(PeggedDerivation::new(generic)),
            ))
    }

    /// Generic quote; the only source TVL uses.
    pub async fn quote(&self, token: Address) -> Result<Price, PriceError> {
        self.generic.quote(token).await
    }

    /// Unit price of a pool constituent: derived, then protocol, then generic.
    pub async fn pool_token_price(
        &self,
        token: &Token,
        pool: Address,
        tokens: &[Token],
        symbols: &[String],
    ) -> Result<Price, PriceError> {
        if let Some(derivation) = &self.derivation {
            let rule = derivation
                .table
                .get(&self.chain_id)
                .and_then(|rules| rules.get(&token.address));
            if let Some(rule) = rule {
                return derivation
                    .pricing
                    .price_for_derived(rule, token, pool, tokens, symbols)
                    .await;
            }
        }
        if let Some(protocol) = &self.protocol {
            if protocol.supported.contains(&token.address) {
                return protocol.oracle.quote(token.address).await;
            }
        }
        self.generic.quote(token.address).await
    }
}
