//! Peg metrics over a pool's USD-valued balances.
//!
//! The concentration ratio is Π(xᵢ) / mean(x)ⁿ. By AM-GM it is exactly 1.0
//! when every constituent holds the same USD value and falls towards 0 as the
//! balances diverge. It is evaluated as Π(xᵢ / mean) so that large pools do
//! not overflow the product.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PegMetrics {
    pub ratio: f64,
    pub chi: f64,
}

/// Concentration ratio of USD-valued balances.
///
/// Returns 0.0 for an empty vector or when the mean is not a positive finite
/// number (all-zero prices, NaN inputs).
pub fn concentration_ratio(usd_balances: &[f64]) -> f64 {
    if usd_balances.is_empty() {
        return 0.0;
    }
    let n = usd_balances.len() as f64;
    let mean = usd_balances.iter().sum::<f64>() / n;
    if !mean.is_finite() || mean <= 0.0 {
        return 0.0;
    }
    usd_balances.iter().map(|x| x / mean).product()
}

/// chi = A × ratio.
pub fn chi(amplification: f64, ratio: f64) -> f64 {
    amplification * ratio
}

pub fn peg_metrics(usd_balances: &[f64], amplification: f64) -> PegMetrics {
    let ratio = concentration_ratio(usd_balances);
    PegMetrics {
        ratio,
        chi: chi(amplification, ratio),
    }
}
