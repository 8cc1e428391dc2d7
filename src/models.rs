//! # Curve Finance models
//!
//! [`CurveFinance`] is the entry point: one method per model, each reading
//! through the [`CurveChain`] it was built with. Pin the chain with
//! [`CurveChain::at_block`] before building the facade to evaluate a model at
//! a historical block.

use ethers::types::Address;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::chain::CurveChain;
use crate::discovery::Discovery;
use crate::error::{ModelError, ModelResult};
use crate::gauges::{GaugeEnumerator, GaugeRewards, RewardSampler};
use crate::history::{BlockSampler, GaugeSnapshot, HistoricalSource, Window};
use crate::ledger::{LedgerError, TransactionLedger};
use crate::pool_info::{PoolInfo, PoolInfoResolver};
use crate::price::PriceResolver;
use crate::settings::{Curve as CurveSettings, Settings, YieldEstimator as YieldSettings};
use crate::tvl::{pool_tvl, TVLInfo};
use crate::yield_estimator::{GaugeYield, GaugeYieldEstimator};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolInfos {
    pub pool_infos: Vec<PoolInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllYield {
    pub results: Vec<GaugeYield>,
}

pub struct CurveFinance<C: CurveChain> {
    chain: C,
    prices: PriceResolver,
    ledger: Option<Arc<dyn TransactionLedger>>,
    ledger_bound: Option<u64>,
    address_provider: Address,
    curve: CurveSettings,
    yield_settings: YieldSettings,
    block_time_seconds: u64,
}

impl<C: CurveChain> CurveFinance<C> {
    pub fn new(chain: C, prices: PriceResolver, settings: &Settings) -> ModelResult<Self> {
        let address_provider = settings
            .curve
            .address_provider()
            .map_err(|e| ModelError::InvalidInput(e.to_string()))?;
        Ok(Self {
            chain,
            prices,
            ledger: None,
            ledger_bound: None,
            address_provider,
            curve: settings.curve.clone(),
            yield_settings: settings.yield_estimator.clone(),
            block_time_seconds: settings.rpc.block_time_seconds,
        })
    }

    /// Transaction ledger used to find gauge stakers. Gauge reward and yield
    /// models fail without one.
    pub fn with_ledger(mut self, ledger: Arc<dyn TransactionLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Ignore ledger entries after `block`. Use together with a chain pinned
    /// at the same block.
    pub fn with_ledger_bound(mut self, block: u64) -> Self {
        self.ledger_bound = Some(block);
        self
    }

    fn discovery(&self) -> Discovery<'_, C> {
        Discovery::new(&self.chain, self.address_provider)
    }

    fn ledger(&self) -> ModelResult<&dyn TransactionLedger> {
        self.ledger
            .as_deref()
            .ok_or(ModelError::Ledger(LedgerError::NotConfigured))
    }

    fn reward_sampler(&self) -> ModelResult<RewardSampler<'_, C>> {
        let sampler = RewardSampler::new(&self.chain, self.ledger()?);
        Ok(match self.ledger_bound {
            Some(block) => sampler.bounded_at(block),
            None => sampler,
        })
    }

    fn pool_resolver(&self, registry: Address) -> PoolInfoResolver<'_, C> {
        PoolInfoResolver::new(
            &self.chain,
            &self.prices,
            registry,
            self.address_provider,
            &self.curve,
        )
    }

    pub fn get_provider(&self) -> Address {
        self.discovery().get_provider()
    }

    pub async fn get_registry(&self) -> ModelResult<Address> {
        self.discovery().get_registry().await
    }

    pub async fn get_gauge_controller(&self) -> ModelResult<Address> {
        self.discovery().get_gauge_controller().await
    }

    pub async fn all_pools(&self) -> ModelResult<Vec<Address>> {
        self.discovery().all_pools().await
    }

    pub async fn pool_info(&self, pool: Address) -> ModelResult<PoolInfo> {
        let registry = self.get_registry().await?;
        self.pool_resolver(registry).resolve(pool).await
    }

    pub async fn all_pools_info(&self) -> ModelResult<PoolInfos> {
        let registry = self.get_registry().await?;
        let pools = self.all_pools().await?;
        let resolver = self.pool_resolver(registry);

        let mut pool_infos = Vec::with_capacity(pools.len());
        for pool in pools {
            pool_infos.push(resolver.resolve(pool).await?);
        }
        Ok(PoolInfos { pool_infos })
    }

    pub async fn pool_tvl(&self, pool: Address) -> ModelResult<TVLInfo> {
        let info = self.pool_info(pool).await?;
        pool_tvl(&info, &self.prices).await
    }

    pub async fn all_gauges(&self) -> ModelResult<Vec<Address>> {
        let controller = self.get_gauge_controller().await?;
        GaugeEnumerator::new(&self.chain, self.curve.max_gauges)
            .list_gauges(controller)
            .await
    }

    pub async fn gauge_claim_addresses(&self, gauge: Address) -> ModelResult<Vec<Address>> {
        self.reward_sampler()?.claim_addresses(gauge).await
    }

    pub async fn gauge_rewards(&self, gauge: Address) -> ModelResult<GaugeRewards> {
        self.reward_sampler()?.sample(gauge).await
    }

    /// Gauge rewards sampled over `window` at `interval`, oldest first.
    pub async fn gauge_rewards_history(
        &self,
        gauge: Address,
        window: &str,
        interval: &str,
    ) -> ModelResult<Vec<GaugeSnapshot>> {
        let sampler = BlockSampler::new(&self.chain, self.ledger()?, self.block_time_seconds);
        sampler
            .gauge_snapshots(gauge, window.parse::<Window>()?, interval.parse::<Window>()?)
            .await
    }

    pub async fn gauge_yield(&self, gauge: Address) -> ModelResult<GaugeYield> {
        let registry = self.get_registry().await?;
        let pools = self.pool_resolver(registry);
        let history = BlockSampler::new(&self.chain, self.ledger()?, self.block_time_seconds);
        GaugeYieldEstimator::new(&self.chain, registry, &pools, &history, &self.yield_settings)?
            .estimate(gauge)
            .await
    }

    pub async fn all_yield(&self) -> ModelResult<AllYield> {
        let gauges = self.all_gauges().await?;
        info!("There are {} gauges.", gauges.len());

        let mut results = Vec::with_capacity(gauges.len());
        for gauge in gauges {
            let estimate = self.gauge_yield(gauge).await?;
            info!("{:?}: {:?}", gauge, estimate);
            results.push(estimate);
        }
        Ok(AllYield { results })
    }
}
