//! # Curve Finance Models
//!
//! Analytics over Curve Finance pools and gauges, derived directly from
//! on-chain state: pool composition, peg deviation, TVL, staker rewards and
//! an annualised gauge yield estimate.
//!
//! ## Overview
//!
//! Every model reads the chain through the [`chain::CurveChain`] capability
//! layer, which tags each failed read so the models can tell "this contract
//! does not do that" apart from "the node did not answer":
//!
//! - **Discovery**: address provider → registry → gauge controller, pool list
//! - **Pool composition**: registry, minter redirection and direct probing
//! - **Peg metrics**: concentration ratio and chi over USD-valued balances
//! - **TVL**: fee-excluded balances at generic price quotes
//! - **Gauges**: enumeration and per-staker reward sampling
//! - **Yield**: growth of staker positions across a historical series
//!
//! [`models::CurveFinance`] ties them together.

// Capability layer
/// Chain reads with tagged failures
pub mod chain;
/// Contract ABIs (read-only)
pub mod contracts;
/// Common conversions
pub mod types;

// Models
/// Address provider, registry and pool list
pub mod discovery;
/// Gauge enumeration and reward sampling
pub mod gauges;
/// Historical gauge series
pub mod history;
/// Model facade
pub mod models;
/// Concentration ratio and chi
pub mod peg;
/// Pool composition resolution
pub mod pool_info;
/// Total value locked
pub mod tvl;
/// Gauge yield estimation
pub mod yield_estimator;

// Collaborators
/// Transaction ledger
pub mod ledger;
/// Price sources
pub mod price;
/// Token metadata and balances
pub mod token;

// Settings & Configuration
/// Configuration management
pub mod settings;

/// Model error taxonomy
pub mod error;

// Re-exports for convenience
pub use chain::{CallError, CurveChain, EthersChain};
pub use error::{ModelError, ModelResult};
pub use models::CurveFinance;
pub use pool_info::PoolInfo;
pub use settings::Settings;
pub use tvl::TVLInfo;
pub use yield_estimator::{estimate_from_series, GaugeYield};
