//! # Time-Series Yield Estimator
//!
//! Estimates a gauge's annualised reward yield from a historical series of
//! staker samples. For each pair of consecutive snapshots, stakers whose
//! position is active in both and whose staked balance did not change are
//! valued at both points:
//!
//! ```text
//! reward    = claimable_tokens × reward_price / 1e18
//! liquidity = staked × (virtual_price / 1e18 / 1e18)
//! value     = reward + liquidity
//! ```
//!
//! and contribute the growth `(new − old) / old`. A staker whose value did
//! not grow closes the whole pair. The mean growth is scaled by 365/10 days
//! regardless of the sampling window.

use ethers::types::{Address, U256};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::chain::CurveChain;
use crate::error::ModelResult;
use crate::gauges::GaugeSample;
use crate::history::{GaugeSnapshot, HistoricalSource, Window};
use crate::pool_info::PoolInfoResolver;
use crate::settings::YieldEstimator as YieldSettings;
use crate::types::u256_to_f64;

const SECONDS_PER_DAY: f64 = 86400.0;
const ANNUALIZATION_DAYS: f64 = 365.0;
const ACCRUAL_PERIOD_DAYS: f64 = 10.0;

/// `{"crv_yield": x}`, or `{}` when no sample pair qualified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GaugeYield {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv_yield: Option<f64>,
}

impl GaugeYield {
    pub fn is_estimate(&self) -> bool {
        self.crv_yield.is_some()
    }
}

/// Outcome of pairing one staker across a snapshot pair.
enum Pairing {
    Growth(f64),
    NoMatch,
    /// Value did not grow; no further stakers of this pair are examined.
    ClosePair,
}

fn portfolio_value(sample: &GaugeSample, virtual_price: f64, reward_price: f64) -> f64 {
    let reward = u256_to_f64(sample.claimable_tokens) * reward_price / 1e18;
    let liquidity = u256_to_f64(sample.balance_of) * virtual_price;
    reward + liquidity
}

fn pair_staker(
    before: &GaugeSample,
    after: &[GaugeSample],
    virtual_price: f64,
    reward_price: f64,
) -> Pairing {
    let matched = after.iter().find(|candidate| {
        candidate.account == before.account
            && candidate.is_active()
            && candidate.balance_of == before.balance_of
    });
    let Some(after) = matched else {
        return Pairing::NoMatch;
    };

    let old = portfolio_value(before, virtual_price, reward_price);
    let new = portfolio_value(after, virtual_price, reward_price);
    if new <= old {
        return Pairing::ClosePair;
    }
    Pairing::Growth((new - old) / old)
}

/// Pure estimate over an already materialised series.
pub fn estimate_from_series(
    series: &[GaugeSnapshot],
    virtual_price: U256,
    reward_price: f64,
) -> GaugeYield {
    let virtual_price = u256_to_f64(virtual_price) / 1e18 / 1e18;
    let mut growth = Vec::new();

    for pair in series.windows(2) {
        let (before, after) = (&pair[0], &pair[1]);
        let mut open = true;
        let mut stakers = before.samples.iter().filter(|s| s.is_active());
        while open {
            let Some(staker) = stakers.next() else {
                break;
            };
            match pair_staker(staker, &after.samples, virtual_price, reward_price) {
                Pairing::Growth(g) => growth.push(g),
                Pairing::NoMatch => {}
                Pairing::ClosePair => {
                    debug!(
                        "{:?} lost value between blocks {} and {}, closing pair",
                        staker.account, before.block_number, after.block_number
                    );
                    open = false;
                }
            }
        }
    }

    if growth.is_empty() {
        return GaugeYield::default();
    }
    let mean = growth.iter().sum::<f64>() / growth.len() as f64;
    GaugeYield {
        crv_yield: Some(
            mean * (ANNUALIZATION_DAYS * SECONDS_PER_DAY) / (ACCRUAL_PERIOD_DAYS * SECONDS_PER_DAY),
        ),
    }
}

/// Resolves the gauge's virtual price and historical series, then estimates.
pub struct GaugeYieldEstimator<'a, C: CurveChain> {
    chain: &'a C,
    registry: Address,
    pools: &'a PoolInfoResolver<'a, C>,
    history: &'a dyn HistoricalSource,
    reward_token_price: f64,
    window: Window,
    interval: Window,
}

impl<'a, C: CurveChain> GaugeYieldEstimator<'a, C> {
    pub fn new(
        chain: &'a C,
        registry: Address,
        pools: &'a PoolInfoResolver<'a, C>,
        history: &'a dyn HistoricalSource,
        settings: &YieldSettings,
    ) -> ModelResult<Self> {
        Ok(Self {
            chain,
            registry,
            pools,
            history,
            reward_token_price: settings.reward_token_price_usd,
            window: settings.window.parse::<Window>()?,
            interval: settings.interval.parse::<Window>()?,
        })
    }

    /// Virtual price of the pool behind the gauge's LP token. Falls back to
    /// the LP token's own `get_virtual_price()` when the registry does not
    /// know the token.
    pub async fn virtual_price(&self, gauge: Address) -> ModelResult<U256> {
        let lp_token = self.chain.lp_token(gauge).await?;
        let pool = self
            .chain
            .registry_pool_from_lp_token(self.registry, lp_token)
            .await?;
        if !pool.is_zero() {
            return Ok(self.pools.resolve(pool).await?.virtual_price);
        }
        debug!("{:?} is not a registry LP token, reading it directly", lp_token);
        Ok(self.chain.get_virtual_price(lp_token).await?)
    }

    pub async fn estimate(&self, gauge: Address) -> ModelResult<GaugeYield> {
        let virtual_price = self.virtual_price(gauge).await?;
        let series = self
            .history
            .gauge_snapshots(gauge, self.window, self.interval)
            .await?;
        Ok(estimate_from_series(&series, virtual_price, self.reward_token_price))
    }
}
