//! # Chain Capability Layer
//!
//! Every on-chain read the models perform goes through [`CurveChain`]. Curve
//! contracts are heterogeneous: registries, pools of several generations,
//! gauges and plain ERC-20s each expose a different subset of functions, so
//! the models probe capabilities and branch on the outcome.
//!
//! A read either succeeds or fails with a tagged [`CallError`]:
//!
//! - `Reverted`: the function exists but rejected this input (a logic-level
//!   rejection, e.g. `coins(i)` past the last slot).
//! - `Unsupported`: the contract does not expose the function at all.
//! - `Transport`: the provider could not answer; retryable by the caller.
//! - `Decode`: the contract answered with something that is not the ABI type.
//!
//! Only the first two are branch signals. Resolution code matches on
//! [`CallError::is_branch_signal`] rather than on error identity.

pub mod ethers_chain;
#[cfg(test)]
pub(crate) mod mock;

pub use ethers_chain::EthersChain;

use async_trait::async_trait;
use ethers::types::{Address, U256};

/// Result of a single contract read.
pub type CallResult<T> = Result<T, CallError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    #[error("{method} reverted on {target:?}: {reason}")]
    Reverted {
        target: Address,
        method: &'static str,
        reason: String,
    },
    #[error("{target:?} does not expose {method}")]
    Unsupported {
        target: Address,
        method: &'static str,
    },
    #[error("transport failure during {method}: {reason}")]
    Transport {
        method: &'static str,
        reason: String,
    },
    #[error("malformed response from {method} on {target:?}: {reason}")]
    Decode {
        target: Address,
        method: &'static str,
        reason: String,
    },
}

impl CallError {
    /// Logic rejections and absent capabilities steer fallback paths.
    /// Transport and decode failures never do.
    pub fn is_branch_signal(&self) -> bool {
        matches!(self, CallError::Reverted { .. } | CallError::Unsupported { .. })
    }
}

/// Latest block observed by a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHead {
    pub number: u64,
    pub timestamp: u64,
}

/// Read-only view of the Curve contract surface.
///
/// Method names follow the on-chain function they wrap. The first argument is
/// always the contract being called.
#[async_trait]
pub trait CurveChain: Send + Sync {
    fn chain_id(&self) -> u64;

    /// Reader pinned to a historical block height.
    fn at_block(&self, block: u64) -> Self
    where
        Self: Sized;

    async fn head(&self) -> CallResult<BlockHead>;

    async fn native_balance(&self, account: Address) -> CallResult<U256>;

    // Address provider
    async fn get_registry(&self, provider: Address) -> CallResult<Address>;
    async fn get_address(&self, provider: Address, id: u64) -> CallResult<Address>;

    // Registry
    async fn gauge_controller(&self, registry: Address) -> CallResult<Address>;
    async fn pool_count(&self, registry: Address) -> CallResult<U256>;
    async fn pool_list(&self, registry: Address, index: U256) -> CallResult<Address>;
    async fn registry_balances(&self, registry: Address, pool: Address) -> CallResult<Vec<U256>>;
    async fn registry_coins(&self, registry: Address, pool: Address) -> CallResult<Vec<Address>>;
    async fn registry_underlying_coins(
        &self,
        registry: Address,
        pool: Address,
    ) -> CallResult<Vec<Address>>;
    async fn registry_is_meta(&self, registry: Address, pool: Address) -> CallResult<bool>;
    async fn registry_lp_token(&self, registry: Address, pool: Address) -> CallResult<Address>;
    async fn registry_pool_from_lp_token(
        &self,
        registry: Address,
        lp_token: Address,
    ) -> CallResult<Address>;

    /// LP token reported by the legacy pool-info contract.
    async fn pool_info_lp_token(&self, pool_info: Address, pool: Address) -> CallResult<Address>;

    // Pool
    async fn minter(&self, pool: Address) -> CallResult<Address>;
    async fn coins(&self, pool: Address, index: u64) -> CallResult<Address>;
    async fn balances(&self, pool: Address, index: u64) -> CallResult<U256>;
    async fn underlying_coins(&self, pool: Address, index: u64) -> CallResult<Address>;
    async fn get_virtual_price(&self, contract: Address) -> CallResult<U256>;
    async fn amplification(&self, pool: Address) -> CallResult<U256>;
    async fn lp_token(&self, contract: Address) -> CallResult<Address>;
    async fn token(&self, pool: Address) -> CallResult<Address>;

    // Gauge controller / gauges
    async fn gauges(&self, controller: Address, index: u64) -> CallResult<Address>;
    async fn claimable_tokens(&self, gauge: Address, account: Address) -> CallResult<U256>;
    async fn working_balances(&self, gauge: Address, account: Address) -> CallResult<U256>;

    // ERC-20 (gauges answer balanceOf as well)
    async fn balance_of(&self, token: Address, account: Address) -> CallResult<U256>;
    async fn symbol(&self, token: Address) -> CallResult<String>;
    async fn name(&self, contract: Address) -> CallResult<String>;
    async fn decimals(&self, token: Address) -> CallResult<u8>;
}
