// Contracts Module - Public ABIs Only

pub mod aggregator_v3_interface;
pub mod erc20;
pub mod i_curve_address_provider;
pub mod i_curve_pool;
pub mod i_curve_pool_info;
pub mod i_curve_registry;
pub mod i_gauge_controller;
pub mod i_liquidity_gauge;

// Public exports
pub use aggregator_v3_interface::AggregatorV3Interface;
pub use erc20::Erc20;
pub use i_curve_address_provider::ICurveAddressProvider;
pub use i_curve_pool::{ICurveCryptoPool, ICurveLegacyPool, ICurvePool};
pub use i_curve_pool_info::ICurvePoolInfo;
pub use i_curve_registry::ICurveRegistry;
pub use i_gauge_controller::IGaugeController;
pub use i_liquidity_gauge::ILiquidityGauge;
