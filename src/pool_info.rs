//! # Pool Composition Resolver
//!
//! Builds a [`PoolInfo`] snapshot for a Curve pool. Pools differ widely in
//! what they expose, so composition is resolved through a chain of paths:
//!
//! 1. **Registry**: `get_balances` / `get_coins` / `get_underlying_coins`
//!    from the main registry.
//! 2. **Minter redirection**: when the registry rejects the pool, a `minter()`
//!    reference means the real state lives elsewhere and the whole resolution
//!    restarts there (bounded by `max_minter_depth`).
//! 3. **Direct probing**: `coins(i)` / `balances(i)` slot by slot until the
//!    first rejected slot, never past `max_coin_slots`.
//!
//! Fee-inclusive balances, prices, peg metrics and the optional fields are
//! then read independently of the path taken.

use ethers::types::{Address, U256};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::chain::{CallResult, CurveChain};
use crate::discovery::Discovery;
use crate::error::{ModelError, ModelResult};
use crate::peg::peg_metrics;
use crate::price::PriceResolver;
use crate::settings::Curve as CurveSettings;
use crate::token::{Token, TokenResolver};
use crate::types::{u256_decimal, u256_to_f64};

/// Snapshot of a pool's composition and peg state at one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolInfo {
    pub address: Address,
    pub tokens: Vec<Token>,
    pub tokens_symbol: Vec<String>,
    /// Swappable balances, accrued admin fees excluded.
    pub balances: Vec<f64>,
    /// Balances actually held by the pool contract.
    pub balances_token: Vec<f64>,
    pub admin_fees: Vec<f64>,
    pub underlying_tokens: Vec<Token>,
    pub underlying_tokens_symbol: Vec<String>,
    #[serde(rename = "virtualPrice", with = "u256_decimal")]
    pub virtual_price: U256,
    #[serde(rename = "A", with = "u256_decimal")]
    pub a: U256,
    pub chi: f64,
    pub ratio: f64,
    pub is_meta: bool,
    pub name: String,
    pub lp_token_addr: Option<Address>,
    pub lp_token_name: String,
    pub pool_token_addr: Option<Address>,
    pub pool_token_name: String,
}

/// Constituents and fee-excluded balances, however they were obtained.
struct Composition {
    tokens: Vec<Token>,
    symbols: Vec<String>,
    balances: Vec<f64>,
    underlying: Vec<Token>,
    underlying_symbols: Vec<String>,
    from_registry: bool,
}

pub struct PoolInfoResolver<'a, C: CurveChain> {
    chain: &'a C,
    prices: &'a PriceResolver,
    tokens: TokenResolver<'a, C>,
    registry: Address,
    address_provider: Address,
    pool_info_slot: u64,
    max_coin_slots: u64,
    max_minter_depth: usize,
}

impl<'a, C: CurveChain> PoolInfoResolver<'a, C> {
    pub fn new(
        chain: &'a C,
        prices: &'a PriceResolver,
        registry: Address,
        address_provider: Address,
        limits: &CurveSettings,
    ) -> Self {
        Self {
            chain,
            prices,
            tokens: TokenResolver::new(chain),
            registry,
            address_provider,
            pool_info_slot: limits.pool_info_provider_id,
            max_coin_slots: limits.max_coin_slots,
            max_minter_depth: limits.max_minter_depth,
        }
    }

    pub async fn resolve(&self, pool: Address) -> ModelResult<PoolInfo> {
        let mut target = pool;
        let mut hops = 0usize;
        let composition = loop {
            if let Some(found) = self.registry_composition(target).await? {
                break found;
            }
            match self.chain.minter(target).await {
                Ok(minter) if !minter.is_zero() => {
                    hops += 1;
                    if hops > self.max_minter_depth {
                        return Err(ModelError::MinterDepthExceeded {
                            origin: pool,
                            max_depth: self.max_minter_depth,
                        });
                    }
                    info!("{:?} is not registered, following minter {:?}", target, minter);
                    target = minter;
                    continue;
                }
                Ok(_) => debug!("{:?} has a zero minter", target),
                Err(err) if err.is_branch_signal() => {
                    debug!("{:?} has no usable minter: {}", target, err)
                }
                Err(err) => return Err(err.into()),
            }
            break self.probe_composition(target).await?;
        };

        self.complete(target, composition).await
    }

    async fn registry_composition(&self, pool: Address) -> ModelResult<Option<Composition>> {
        let raw_balances = match self.chain.registry_balances(self.registry, pool).await {
            Ok(balances) => balances,
            Err(err) if err.is_branch_signal() => {
                debug!("registry has no balances for {:?}: {}", pool, err);
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let coins = self.chain.registry_coins(self.registry, pool).await?;
        let (tokens, symbols) = self.tokens.tokens(&coins).await?;
        if raw_balances.len() < tokens.len() {
            return Err(ModelError::PoolData {
                pool,
                reason: format!(
                    "registry returned {} balances for {} coins",
                    raw_balances.len(),
                    tokens.len()
                ),
            });
        }

        let underlying_coins = self.chain.registry_underlying_coins(self.registry, pool).await?;
        let (underlying, underlying_symbols) = self.tokens.tokens(&underlying_coins).await?;

        let balances = tokens
            .iter()
            .zip(raw_balances.iter())
            .map(|(token, &raw)| token.scaled(raw))
            .collect();

        Ok(Some(Composition {
            tokens,
            symbols,
            balances,
            underlying,
            underlying_symbols,
            from_registry: true,
        }))
    }

    async fn probe_composition(&self, pool: Address) -> ModelResult<Composition> {
        let mut composition = Composition {
            tokens: Vec::new(),
            symbols: Vec::new(),
            balances: Vec::new(),
            underlying: Vec::new(),
            underlying_symbols: Vec::new(),
            from_registry: false,
        };

        for i in 0..self.max_coin_slots {
            let coin = match self.chain.coins(pool, i).await {
                Ok(coin) if !coin.is_zero() => coin,
                Ok(_) => break,
                Err(err) if err.is_branch_signal() => break,
                Err(err) => return Err(err.into()),
            };
            let raw = match self.chain.balances(pool, i).await {
                Ok(raw) => raw,
                Err(err) if err.is_branch_signal() => break,
                Err(err) => return Err(err.into()),
            };

            let token = self.tokens.token(coin).await?;
            composition.balances.push(token.scaled(raw));
            composition.symbols.push(token.symbol.clone());
            composition.tokens.push(token);

            match self.underlying_slot(pool, i).await {
                Ok(Some(underlying)) => {
                    composition.underlying_symbols.push(underlying.symbol.clone());
                    composition.underlying.push(underlying);
                }
                Ok(None) => {}
                Err(err) => debug!("skipping underlying slot {} of {:?}: {}", i, pool, err),
            }
        }

        if composition.tokens.is_empty() {
            return Err(ModelError::PoolData {
                pool,
                reason: "no registry entry and no readable coin slots".to_string(),
            });
        }
        debug!(
            "probed {} coin slots directly on {:?}",
            composition.tokens.len(),
            pool
        );
        Ok(composition)
    }

    async fn underlying_slot(&self, pool: Address, i: u64) -> ModelResult<Option<Token>> {
        let coin = self.chain.underlying_coins(pool, i).await?;
        if coin.is_zero() {
            return Ok(None);
        }
        Ok(Some(self.tokens.token(coin).await?))
    }

    async fn complete(&self, pool: Address, composition: Composition) -> ModelResult<PoolInfo> {
        let Composition {
            tokens,
            symbols,
            balances,
            underlying,
            underlying_symbols,
            from_registry,
        } = composition;

        let mut balances_token = Vec::with_capacity(tokens.len());
        for token in &tokens {
            balances_token.push(self.tokens.held_balance(token, pool).await?);
        }
        let admin_fees = balances_token
            .iter()
            .zip(balances.iter())
            .map(|(held, swappable)| held - swappable)
            .collect();

        let mut usd_balances = Vec::with_capacity(tokens.len());
        for (token, held) in tokens.iter().zip(balances_token.iter()) {
            let price = self
                .prices
                .pool_token_price(token, pool, &tokens, &symbols)
                .await?;
            usd_balances.push(held * price.price);
        }

        let virtual_price = best_effort(
            "get_virtual_price",
            pool,
            self.chain.get_virtual_price(pool).await,
            U256::exp10(18),
        );
        let a = best_effort("A", pool, self.chain.amplification(pool).await, U256::zero());
        let metrics = peg_metrics(&usd_balances, u256_to_f64(a));

        let is_meta = if from_registry {
            best_effort(
                "is_meta",
                pool,
                self.chain.registry_is_meta(self.registry, pool).await,
                false,
            )
        } else {
            false
        };

        let name = self.tokens.name(pool).await;

        let lp_token_addr = self.lp_token(pool).await;
        let lp_token_name = match lp_token_addr {
            Some(lp) => self.tokens.name(lp).await,
            None => String::new(),
        };

        let pool_token_addr = match self.chain.token(pool).await {
            Ok(token) if !token.is_zero() => Some(token),
            Ok(_) => None,
            Err(err) => {
                debug!("token() unavailable on {:?}: {}", pool, err);
                None
            }
        };
        let pool_token_name = match pool_token_addr {
            Some(token) => self.tokens.name(token).await,
            None => String::new(),
        };

        Ok(PoolInfo {
            address: pool,
            tokens,
            tokens_symbol: symbols,
            balances,
            balances_token,
            admin_fees,
            underlying_tokens: underlying,
            underlying_tokens_symbol: underlying_symbols,
            virtual_price,
            a,
            chi: metrics.chi,
            ratio: metrics.ratio,
            is_meta,
            name,
            lp_token_addr,
            lp_token_name,
            pool_token_addr,
            pool_token_name,
        })
    }

    /// Registry, then the pool's own `lp_token()`, then the legacy pool-info
    /// contract. The first source that answers is authoritative.
    async fn lp_token(&self, pool: Address) -> Option<Address> {
        match self.chain.registry_lp_token(self.registry, pool).await {
            Ok(lp) => return non_zero(lp),
            Err(err) => debug!("registry lp token lookup failed for {:?}: {}", pool, err),
        }
        match self.chain.lp_token(pool).await {
            Ok(lp) => return non_zero(lp),
            Err(err) => debug!("lp_token() unavailable on {:?}: {}", pool, err),
        }
        match self.legacy_lp_token(pool).await {
            Ok(lp) => non_zero(lp),
            Err(err) => {
                debug!("pool-info lookup failed for {:?}: {}", pool, err);
                None
            }
        }
    }

    async fn legacy_lp_token(&self, pool: Address) -> ModelResult<Address> {
        let pool_info = Discovery::new(self.chain, self.address_provider)
            .provider_slot(self.pool_info_slot)
            .await?;
        Ok(self.chain.pool_info_lp_token(pool_info, pool).await?)
    }
}

fn non_zero(address: Address) -> Option<Address> {
    (!address.is_zero()).then_some(address)
}

fn best_effort<T>(field: &str, pool: Address, read: CallResult<T>, default: T) -> T {
    match read {
        Ok(value) => value,
        Err(err) => {
            debug!("{} unavailable on {:?}, using default: {}", field, pool, err);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{addr, reverted, transport, MockChain, Reply};
    use crate::price::FixedPriceOracle;
    use crate::token::NATIVE_TOKEN;
    use std::sync::Arc;

    const PROVIDER: u8 = 0xa0;
    const REGISTRY: u8 = 0xa1;
    const POOL: u8 = 0x50;
    const USDC: u8 = 0x0c;
    const DAI: u8 = 0x0d;

    fn wei(whole: u64, decimals: usize) -> U256 {
        U256::from(whole) * U256::exp10(decimals)
    }

    fn key(method: &str, arg: Address) -> String {
        format!("{method}({arg:?})")
    }

    fn stable_tokens(chain: MockChain) -> MockChain {
        chain
            .on(addr(USDC), "symbol()", Reply::Text("USDC".into()))
            .on(addr(USDC), "decimals()", Reply::Small(6))
            .on(addr(DAI), "symbol()", Reply::Text("DAI".into()))
            .on(addr(DAI), "decimals()", Reply::Small(18))
    }

    fn registered_pool() -> MockChain {
        let (registry, pool) = (addr(REGISTRY), addr(POOL));
        let mut balances = vec![wei(100, 6), wei(200, 18)];
        balances.resize(8, U256::zero());
        let mut coins = vec![addr(USDC), addr(DAI)];
        coins.resize(8, Address::zero());

        stable_tokens(MockChain::new(1))
            .on(registry, &key("get_balances", pool), Reply::Uints(balances))
            .on(registry, &key("get_coins", pool), Reply::Addrs(coins))
            .on(
                registry,
                &key("get_underlying_coins", pool),
                Reply::Addrs(vec![Address::zero(); 8]),
            )
            .on(registry, &key("is_meta", pool), Reply::Flag(false))
            .on(registry, &key("get_lp_token", pool), Reply::Addr(addr(0x1b)))
            .on(addr(USDC), &key("balanceOf", pool), Reply::Uint(wei(101, 6)))
            .on(addr(DAI), &key("balanceOf", pool), Reply::Uint(wei(200, 18)))
            .on(pool, "get_virtual_price()", Reply::Uint(wei(102, 16)))
            .on(pool, "A()", Reply::Uint(U256::from(100u64)))
            .on(pool, "name()", Reply::Text("Curve.fi USDC/DAI".into()))
            .on(pool, "lp_token()", Reply::Addr(addr(0x2b)))
            .on(addr(0x1b), "name()", Reply::Text("Curve.fi LP".into()))
    }

    fn unit_prices() -> PriceResolver {
        PriceResolver::new(
            1,
            Arc::new(
                FixedPriceOracle::default()
                    .with(addr(USDC), 1.0)
                    .with(addr(DAI), 1.0)
                    .with(NATIVE_TOKEN, 2000.0),
            ),
        )
    }

    fn resolver<'a>(chain: &'a MockChain, prices: &'a PriceResolver) -> PoolInfoResolver<'a, MockChain> {
        PoolInfoResolver::new(
            chain,
            prices,
            addr(REGISTRY),
            addr(PROVIDER),
            &CurveSettings::default(),
        )
    }

    #[tokio::test]
    async fn registry_path_fills_parallel_vectors() {
        let chain = registered_pool();
        let prices = unit_prices();
        let info = resolver(&chain, &prices).resolve(addr(POOL)).await.unwrap();

        assert_eq!(info.tokens_symbol, vec!["USDC", "DAI"]);
        assert_eq!(info.balances, vec![100.0, 200.0]);
        assert_eq!(info.balances_token, vec![101.0, 200.0]);
        assert_eq!(info.admin_fees.len(), info.tokens.len());
        for i in 0..info.tokens.len() {
            assert_eq!(info.admin_fees[i], info.balances_token[i] - info.balances[i]);
        }
        assert!(info.underlying_tokens.is_empty());
        assert_eq!(info.virtual_price, wei(102, 16));
        assert_eq!(info.a, U256::from(100u64));
        assert_eq!(info.chi, 100.0 * info.ratio);
        assert!(info.ratio < 1.0);
        assert!(!info.is_meta);
        assert_eq!(info.name, "Curve.fi USDC/DAI");

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["virtualPrice"], "1020000000000000000");
        assert_eq!(json["A"], "100");
    }

    #[tokio::test]
    async fn registry_lp_token_wins_over_other_sources() {
        let chain = registered_pool();
        let prices = unit_prices();
        let info = resolver(&chain, &prices).resolve(addr(POOL)).await.unwrap();
        assert_eq!(info.lp_token_addr, Some(addr(0x1b)));
        assert_eq!(info.lp_token_name, "Curve.fi LP");
        assert!(!chain.calls().iter().any(|c| c.ends_with("lp_token()")));
    }

    #[tokio::test]
    async fn native_coin_is_valued_from_native_balance() {
        let (registry, pool) = (addr(REGISTRY), addr(POOL));
        let mut coins = vec![NATIVE_TOKEN, addr(DAI)];
        coins.resize(8, Address::zero());
        let mut balances = vec![wei(1, 18), wei(2000, 18)];
        balances.resize(8, U256::zero());
        let chain = stable_tokens(MockChain::new(1))
            .on(registry, &key("get_balances", pool), Reply::Uints(balances))
            .on(registry, &key("get_coins", pool), Reply::Addrs(coins))
            .on(registry, &key("get_underlying_coins", pool), Reply::Addrs(vec![]))
            .on(addr(DAI), &key("balanceOf", pool), Reply::Uint(wei(2000, 18)))
            .with_native(pool, wei(1, 18));
        let prices = unit_prices();

        let info = resolver(&chain, &prices).resolve(pool).await.unwrap();
        assert_eq!(info.tokens_symbol, vec!["ETH", "DAI"]);
        assert_eq!(info.balances_token, vec![1.0, 2000.0]);
        assert!((info.ratio - 1.0).abs() < 1e-9);
        // Everything optional missing: documented defaults.
        assert_eq!(info.virtual_price, U256::exp10(18));
        assert_eq!(info.a, U256::zero());
        assert_eq!(info.chi, 0.0);
        assert_eq!(info.name, "");
        assert_eq!(info.lp_token_addr, None);
        assert_eq!(info.pool_token_addr, None);
    }

    #[tokio::test]
    async fn rejected_pool_follows_its_minter() {
        let proxy = addr(0x60);
        let chain = registered_pool()
            .on(addr(REGISTRY), &key("get_balances", proxy), reverted(addr(REGISTRY), "get_balances"))
            .on(proxy, "minter()", Reply::Addr(addr(POOL)));
        let prices = unit_prices();

        let info = resolver(&chain, &prices).resolve(proxy).await.unwrap();
        assert_eq!(info.address, addr(POOL));
        assert_eq!(info.tokens.len(), 2);
    }

    #[tokio::test]
    async fn minter_cycles_are_cut_off() {
        let (a, b) = (addr(0x61), addr(0x62));
        let registry = addr(REGISTRY);
        let chain = MockChain::new(1)
            .on(registry, &key("get_balances", a), reverted(registry, "get_balances"))
            .on(registry, &key("get_balances", b), reverted(registry, "get_balances"))
            .on(a, "minter()", Reply::Addr(b))
            .on(b, "minter()", Reply::Addr(a));
        let prices = unit_prices();

        let err = resolver(&chain, &prices).resolve(a).await.unwrap_err();
        assert!(matches!(err, ModelError::MinterDepthExceeded { max_depth: 4, .. }));
    }

    fn unregistered_pool(slots: u64) -> MockChain {
        let (registry, pool) = (addr(REGISTRY), addr(POOL));
        let mut chain = MockChain::new(1)
            .on(registry, &key("get_balances", pool), reverted(registry, "get_balances"));
        for i in 0..slots {
            let coin = addr(0x10 + i as u8);
            chain = chain
                .on(pool, &format!("coins({i})"), Reply::Addr(coin))
                .on(pool, &format!("balances({i})"), Reply::Uint(wei(10, 18)))
                .on(coin, "symbol()", Reply::Text(format!("T{i}")))
                .on(coin, "decimals()", Reply::Small(18))
                .on(coin, &key("balanceOf", pool), Reply::Uint(wei(10, 18)));
        }
        chain.on(pool, &format!("coins({slots})"), reverted(pool, "coins"))
    }

    fn flat_prices(slots: u64) -> PriceResolver {
        let mut oracle = FixedPriceOracle::default();
        for i in 0..slots {
            oracle = oracle.with(addr(0x10 + i as u8), 1.0);
        }
        PriceResolver::new(1, Arc::new(oracle))
    }

    #[tokio::test]
    async fn direct_probing_stops_at_first_rejected_slot() {
        let chain = unregistered_pool(3)
            .on(addr(POOL), "underlying_coins(1)", Reply::Addr(addr(0x0d)))
            .on(addr(0x0d), "symbol()", Reply::Text("DAI".into()))
            .on(addr(0x0d), "decimals()", Reply::Small(18));
        let prices = flat_prices(3);

        let info = resolver(&chain, &prices).resolve(addr(POOL)).await.unwrap();
        assert_eq!(info.tokens_symbol, vec!["T0", "T1", "T2"]);
        assert_eq!(info.balances, vec![10.0; 3]);
        assert_eq!(info.underlying_tokens_symbol, vec!["DAI"]);
        assert!(!info.is_meta);
        assert!(!chain.calls().iter().any(|c| c.ends_with("coins(4)")));
    }

    #[tokio::test]
    async fn direct_probing_never_exceeds_slot_cap() {
        let chain = unregistered_pool(9);
        let prices = flat_prices(9);

        let info = resolver(&chain, &prices).resolve(addr(POOL)).await.unwrap();
        assert_eq!(info.tokens.len(), 8);
        assert!(!chain.calls().iter().any(|c| c.ends_with(".coins(8)")));
    }

    #[tokio::test]
    async fn no_viable_path_is_a_pool_data_error() {
        let chain = unregistered_pool(0);
        let prices = flat_prices(0);
        let err = resolver(&chain, &prices).resolve(addr(POOL)).await.unwrap_err();
        assert!(matches!(err, ModelError::PoolData { .. }));
    }

    #[tokio::test]
    async fn transport_failures_are_not_fallback_signals() {
        let chain = registered_pool().on(
            addr(REGISTRY),
            &key("get_balances", addr(POOL)),
            transport("get_balances"),
        );
        let prices = unit_prices();
        let err = resolver(&chain, &prices).resolve(addr(POOL)).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(!chain.calls().iter().any(|c| c.ends_with("minter()")));
    }

    #[tokio::test]
    async fn legacy_pool_info_is_the_last_lp_source() {
        let info_contract = addr(0xa2);
        let chain = unregistered_pool(2)
            .on(addr(PROVIDER), "get_address(1)", Reply::Addr(info_contract))
            .on(info_contract, &key("get_pool_info", addr(POOL)), Reply::Addr(addr(0x3b)))
            .on(addr(POOL), "token()", Reply::Addr(addr(0x4b)))
            .on(addr(0x4b), "name()", Reply::Text("Pool Token".into()));
        let prices = flat_prices(2);

        let info = resolver(&chain, &prices).resolve(addr(POOL)).await.unwrap();
        assert_eq!(info.lp_token_addr, Some(addr(0x3b)));
        assert_eq!(info.lp_token_name, "");
        assert_eq!(info.pool_token_addr, Some(addr(0x4b)));
        assert_eq!(info.pool_token_name, "Pool Token");
    }

    #[tokio::test]
    async fn holdings_below_swappable_balance_give_negative_admin_fee() {
        let chain = registered_pool().on(
            addr(USDC),
            &key("balanceOf", addr(POOL)),
            Reply::Uint(wei(99, 6)),
        );
        let prices = unit_prices();
        let info = resolver(&chain, &prices).resolve(addr(POOL)).await.unwrap();

        assert_eq!(info.balances, vec![100.0, 200.0]);
        assert_eq!(info.balances_token, vec![99.0, 200.0]);
        assert_eq!(info.admin_fees, vec![-1.0, 0.0]);
    }

    #[tokio::test]
    async fn short_registry_balances_are_a_pool_data_error() {
        let chain = registered_pool().on(
            addr(REGISTRY),
            &key("get_balances", addr(POOL)),
            Reply::Uints(vec![wei(100, 6)]),
        );
        let prices = unit_prices();
        let err = resolver(&chain, &prices).resolve(addr(POOL)).await.unwrap_err();
        assert!(matches!(err, ModelError::PoolData { pool, .. } if pool == addr(POOL)));
    }
}
