//! Gauge discovery and per-staker reward sampling.

use ethers::types::{Address, U256};
use indexmap::IndexSet;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::chain::CurveChain;
use crate::error::{ModelError, ModelResult};
use crate::ledger::TransactionLedger;
use crate::types::{string_to_address, u256_decimal};

/// Walks `gauges(i)` on the gauge controller. The controller has no length
/// field, so the first zero address ends the list.
pub struct GaugeEnumerator<'a, C: CurveChain> {
    chain: &'a C,
    max_gauges: u64,
}

impl<'a, C: CurveChain> GaugeEnumerator<'a, C> {
    pub fn new(chain: &'a C, max_gauges: u64) -> Self {
        Self { chain, max_gauges }
    }

    pub async fn list_gauges(&self, controller: Address) -> ModelResult<Vec<Address>> {
        let mut gauges = Vec::new();
        for i in 0..self.max_gauges {
            let gauge = self.chain.gauges(controller, i).await?;
            if gauge.is_zero() {
                debug!("gauge controller {:?} lists {} gauges", controller, i);
                return Ok(gauges);
            }
            gauges.push(gauge);
        }
        warn!(
            "gauge controller {:?} still listing gauges after {} slots, stopping",
            controller, self.max_gauges
        );
        Ok(gauges)
    }
}

/// One staker's position in a gauge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaugeSample {
    pub gauge: Address,
    #[serde(rename = "address")]
    pub account: Address,
    #[serde(with = "u256_decimal")]
    pub claimable_tokens: U256,
    #[serde(rename = "balanceOf", with = "u256_decimal")]
    pub balance_of: U256,
    #[serde(with = "u256_decimal")]
    pub working_balances: U256,
}

impl GaugeSample {
    /// Staked, reward-weighted and accrued-reward figures are all nonzero.
    pub fn is_active(&self) -> bool {
        !self.working_balances.is_zero()
            && !self.balance_of.is_zero()
            && !self.claimable_tokens.is_zero()
    }
}

/// Output of the reward sampler for one gauge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GaugeRewards {
    pub yields: Vec<GaugeSample>,
}

/// Reads every known staker's gauge position. Stakers are the distinct
/// senders of transactions to the gauge, in first-seen order.
pub struct RewardSampler<'a, C: CurveChain> {
    chain: &'a C,
    ledger: &'a dyn TransactionLedger,
    up_to_block: Option<u64>,
}

impl<'a, C: CurveChain> RewardSampler<'a, C> {
    pub fn new(chain: &'a C, ledger: &'a dyn TransactionLedger) -> Self {
        Self {
            chain,
            ledger,
            up_to_block: None,
        }
    }

    /// Only consider ledger entries up to and including `block`.
    pub fn bounded_at(mut self, block: u64) -> Self {
        self.up_to_block = Some(block);
        self
    }

    pub async fn claim_addresses(&self, gauge: Address) -> ModelResult<Vec<Address>> {
        let senders: IndexSet<String> = self
            .ledger
            .senders_to(gauge, self.up_to_block)
            .await?
            .into_iter()
            .collect();

        senders
            .iter()
            .map(|sender| {
                if sender.trim().is_empty() {
                    return Err(ModelError::InvalidInput(format!(
                        "empty staker address in ledger for gauge {gauge:?}"
                    )));
                }
                string_to_address(sender).map_err(|e| ModelError::InvalidInput(e.to_string()))
            })
            .collect()
    }

    pub async fn sample(&self, gauge: Address) -> ModelResult<GaugeRewards> {
        let accounts = self.claim_addresses(gauge).await?;
        debug!("sampling {} stakers of gauge {:?}", accounts.len(), gauge);

        let mut yields = Vec::with_capacity(accounts.len());
        for account in accounts {
            let claimable_tokens = self.chain.claimable_tokens(gauge, account).await?;
            let balance_of = self.chain.balance_of(gauge, account).await?;
            let working_balances = self.chain.working_balances(gauge, account).await?;
            yields.push(GaugeSample {
                gauge,
                account,
                claimable_tokens,
                balance_of,
                working_balances,
            });
        }
        Ok(GaugeRewards { yields })
    }
}
