//! Historical series of gauge reward samples.
//!
//! A series is a chronologically ordered list of [`GaugeSnapshot`]s covering a
//! window (e.g. `"60 days"`) at a fixed interval (e.g. `"7 days"`). The
//! [`BlockSampler`] materialises one by converting the interval into a block
//! spacing, pinning a reader at each scheduled block and sampling the gauge
//! with the ledger bounded at that block.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use ethers::types::Address;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::chain::CurveChain;
use crate::error::ModelResult;
use crate::gauges::{GaugeSample, RewardSampler};
use crate::ledger::TransactionLedger;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("invalid window {0:?}, expected e.g. \"60 days\"")]
    InvalidWindow(String),
    #[error("interval {interval} is longer than window {window}")]
    IntervalExceedsWindow { window: Window, interval: Window },
    #[error("block time must be positive")]
    ZeroBlockTime,
}

/// A span of time written as `<count> <unit>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window(Duration);

impl Window {
    pub fn seconds(&self) -> u64 {
        self.0.num_seconds().max(0) as u64
    }
}

impl FromStr for Window {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || HistoryError::InvalidWindow(s.to_string());
        let mut parts = s.split_whitespace();
        let (count, unit) = match (parts.next(), parts.next(), parts.next()) {
            (Some(count), Some(unit), None) => (count, unit),
            _ => return Err(invalid()),
        };
        let count: i64 = count.parse().map_err(|_| invalid())?;
        if count <= 0 {
            return Err(invalid());
        }
        let duration = match unit.to_ascii_lowercase().trim_end_matches('s') {
            "second" => Duration::seconds(count),
            "minute" => Duration::minutes(count),
            "hour" => Duration::hours(count),
            "day" => Duration::days(count),
            "week" => Duration::weeks(count),
            _ => return Err(invalid()),
        };
        Ok(Window(duration))
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0.num_seconds())
    }
}

/// Reward samples of one gauge at one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaugeSnapshot {
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
    pub samples: Vec<GaugeSample>,
}

#[async_trait]
pub trait HistoricalSource: Send + Sync {
    /// Snapshots over `window` at `interval` spacing, oldest first.
    async fn gauge_snapshots(
        &self,
        gauge: Address,
        window: Window,
        interval: Window,
    ) -> ModelResult<Vec<GaugeSnapshot>>;
}

/// Blocks to sample, oldest first: `floor(window / interval) + 1` heights
/// ending at `head`, spaced by the interval's worth of blocks. Heights that
/// would fall before genesis are dropped.
pub fn sample_blocks(
    head: u64,
    window: Window,
    interval: Window,
    block_time_seconds: u64,
) -> Result<Vec<u64>, HistoryError> {
    if block_time_seconds == 0 {
        return Err(HistoryError::ZeroBlockTime);
    }
    if interval.seconds() > window.seconds() {
        return Err(HistoryError::IntervalExceedsWindow { window, interval });
    }
    let steps = window.seconds() / interval.seconds();
    let spacing = (interval.seconds() / block_time_seconds).max(1);

    Ok((0..=steps)
        .rev()
        .filter_map(|k| k.checked_mul(spacing).and_then(|back| head.checked_sub(back)))
        .collect())
}

/// Samples gauges at historical blocks through a [`CurveChain`] reader.
pub struct BlockSampler<'a, C: CurveChain> {
    chain: &'a C,
    ledger: &'a dyn TransactionLedger,
    block_time_seconds: u64,
}

impl<'a, C: CurveChain> BlockSampler<'a, C> {
    pub fn new(chain: &'a C, ledger: &'a dyn TransactionLedger, block_time_seconds: u64) -> Self {
        Self {
            chain,
            ledger,
            block_time_seconds,
        }
    }
}

#[async_trait]
impl<'a, C: CurveChain> HistoricalSource for BlockSampler<'a, C> {
    async fn gauge_snapshots(
        &self,
        gauge: Address,
        window: Window,
        interval: Window,
    ) -> ModelResult<Vec<GaugeSnapshot>> {
        let head = self.chain.head().await?;
        let blocks = sample_blocks(head.number, window, interval, self.block_time_seconds)?;
        info!(
            "sampling gauge {:?} at {} blocks up to {}",
            gauge,
            blocks.len(),
            head.number
        );

        let mut snapshots = Vec::with_capacity(blocks.len());
        for block in blocks {
            let reader = self.chain.at_block(block);
            let timestamp = reader.head().await?.timestamp;
            let rewards = RewardSampler::new(&reader, self.ledger)
                .bounded_at(block)
                .sample(gauge)
                .await?;
            debug!("block {}: {} stakers", block, rewards.yields.len());
            snapshots.push(GaugeSnapshot {
                block_number: block,
                timestamp: Utc
                    .timestamp_opt(timestamp as i64, 0)
                    .single()
                    .unwrap_or_default(),
                samples: rewards.yields,
            });
        }
        Ok(snapshots)
    }
}
