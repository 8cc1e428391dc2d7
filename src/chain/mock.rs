//! Scripted in-memory chain for unit tests.
//!
//! Replies are keyed by `(contract, "method(args)")`, with address arguments
//! rendered in full lower-case hex (`{:?}`). Unscripted calls answer
//! `Unsupported`, which is what a contract without the function looks like.

use async_trait::async_trait;
use ethers::types::{Address, U256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{BlockHead, CallError, CallResult, CurveChain};

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Addr(Address),
    Uint(U256),
    Uints(Vec<U256>),
    Addrs(Vec<Address>),
    Flag(bool),
    Text(String),
    Small(u8),
    Fail(CallError),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockChain {
    chain_id: u64,
    replies: HashMap<(Address, String), Reply>,
    native: HashMap<Address, U256>,
    head: Option<BlockHead>,
    pinned: Option<u64>,
    calls: Arc<Mutex<Vec<String>>>,
}

pub(crate) fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub(crate) fn reverted(target: Address, method: &'static str) -> Reply {
    Reply::Fail(CallError::Reverted {
        target,
        method,
        reason: "execution reverted".into(),
    })
}

pub(crate) fn transport(method: &'static str) -> Reply {
    Reply::Fail(CallError::Transport {
        method,
        reason: "connection reset by peer".into(),
    })
}

impl MockChain {
    pub(crate) fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            ..Self::default()
        }
    }

    pub(crate) fn on(mut self, target: Address, call: &str, reply: Reply) -> Self {
        self.replies.insert((target, call.to_string()), reply);
        self
    }

    pub(crate) fn with_native(mut self, account: Address, balance: U256) -> Self {
        self.native.insert(account, balance);
        self
    }

    pub(crate) fn with_head(mut self, number: u64, timestamp: u64) -> Self {
        self.head = Some(BlockHead { number, timestamp });
        self
    }

    /// Every call made so far, as `0x..target.method(args)`.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn lookup(&self, target: Address, method: &'static str, args: String) -> CallResult<Reply> {
        let key = format!("{method}({args})");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(format!("{target:?}.{key}"));
        }
        match self.replies.get(&(target, key)) {
            Some(Reply::Fail(err)) => Err(err.clone()),
            Some(reply) => Ok(reply.clone()),
            None => Err(CallError::Unsupported { target, method }),
        }
    }

    fn address(&self, target: Address, method: &'static str, args: String) -> CallResult<Address> {
        match self.lookup(target, method, args)? {
            Reply::Addr(a) => Ok(a),
            other => Err(mismatch(target, method, other)),
        }
    }

    fn uint(&self, target: Address, method: &'static str, args: String) -> CallResult<U256> {
        match self.lookup(target, method, args)? {
            Reply::Uint(v) => Ok(v),
            other => Err(mismatch(target, method, other)),
        }
    }

    fn addresses(
        &self,
        target: Address,
        method: &'static str,
        args: String,
    ) -> CallResult<Vec<Address>> {
        match self.lookup(target, method, args)? {
            Reply::Addrs(v) => Ok(v),
            other => Err(mismatch(target, method, other)),
        }
    }

    fn text(&self, target: Address, method: &'static str) -> CallResult<String> {
        match self.lookup(target, method, String::new())? {
            Reply::Text(v) => Ok(v),
            other => Err(mismatch(target, method, other)),
        }
    }
}

fn mismatch(target: Address, method: &'static str, reply: Reply) -> CallError {
    CallError::Decode {
        target,
        method,
        reason: format!("unexpected scripted reply {reply:?}"),
    }
}

#[async_trait]
impl CurveChain for MockChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn at_block(&self, block: u64) -> Self {
        Self {
            pinned: Some(block),
            ..self.clone()
        }
    }

    /// Pinned readers report the pinned block, timestamped as if every block
    /// since took 12 seconds.
    async fn head(&self) -> CallResult<BlockHead> {
        let head = self.head.ok_or(CallError::Transport {
            method: "eth_getBlockByNumber",
            reason: "no head scripted".into(),
        })?;
        Ok(match self.pinned {
            Some(number) => BlockHead {
                number,
                timestamp: head
                    .timestamp
                    .saturating_sub(head.number.saturating_sub(number) * 12),
            },
            None => head,
        })
    }

    async fn native_balance(&self, account: Address) -> CallResult<U256> {
        Ok(self.native.get(&account).copied().unwrap_or_default())
    }

    async fn get_registry(&self, provider: Address) -> CallResult<Address> {
        self.address(provider, "get_registry", String::new())
    }

    async fn get_address(&self, provider: Address, id: u64) -> CallResult<Address> {
        self.address(provider, "get_address", id.to_string())
    }

    async fn gauge_controller(&self, registry: Address) -> CallResult<Address> {
        self.address(registry, "gauge_controller", String::new())
    }

    async fn pool_count(&self, registry: Address) -> CallResult<U256> {
        self.uint(registry, "pool_count", String::new())
    }

    async fn pool_list(&self, registry: Address, index: U256) -> CallResult<Address> {
        self.address(registry, "pool_list", index.to_string())
    }

    async fn registry_balances(&self, registry: Address, pool: Address) -> CallResult<Vec<U256>> {
        match self.lookup(registry, "get_balances", format!("{pool:?}"))? {
            Reply::Uints(v) => Ok(v),
            other => Err(mismatch(registry, "get_balances", other)),
        }
    }

    async fn registry_coins(&self, registry: Address, pool: Address) -> CallResult<Vec<Address>> {
        self.addresses(registry, "get_coins", format!("{pool:?}"))
    }

    async fn registry_underlying_coins(
        &self,
        registry: Address,
        pool: Address,
    ) -> CallResult<Vec<Address>> {
        self.addresses(registry, "get_underlying_coins", format!("{pool:?}"))
    }

    async fn registry_is_meta(&self, registry: Address, pool: Address) -> CallResult<bool> {
        match self.lookup(registry, "is_meta", format!("{pool:?}"))? {
            Reply::Flag(v) => Ok(v),
            other => Err(mismatch(registry, "is_meta", other)),
        }
    }

    async fn registry_lp_token(&self, registry: Address, pool: Address) -> CallResult<Address> {
        self.address(registry, "get_lp_token", format!("{pool:?}"))
    }

    async fn registry_pool_from_lp_token(
        &self,
        registry: Address,
        lp_token: Address,
    ) -> CallResult<Address> {
        self.address(registry, "get_pool_from_lp_token", format!("{lp_token:?}"))
    }

    async fn pool_info_lp_token(&self, pool_info: Address, pool: Address) -> CallResult<Address> {
        self.address(pool_info, "get_pool_info", format!("{pool:?}"))
    }

    async fn minter(&self, pool: Address) -> CallResult<Address> {
        self.address(pool, "minter", String::new())
    }

    async fn coins(&self, pool: Address, index: u64) -> CallResult<Address> {
        self.address(pool, "coins", index.to_string())
    }

    async fn balances(&self, pool: Address, index: u64) -> CallResult<U256> {
        self.uint(pool, "balances", index.to_string())
    }

    async fn underlying_coins(&self, pool: Address, index: u64) -> CallResult<Address> {
        self.address(pool, "underlying_coins", index.to_string())
    }

    async fn get_virtual_price(&self, contract: Address) -> CallResult<U256> {
        self.uint(contract, "get_virtual_price", String::new())
    }

    async fn amplification(&self, pool: Address) -> CallResult<U256> {
        self.uint(pool, "A", String::new())
    }

    async fn lp_token(&self, contract: Address) -> CallResult<Address> {
        self.address(contract, "lp_token", String::new())
    }

    async fn token(&self, pool: Address) -> CallResult<Address> {
        self.address(pool, "token", String::new())
    }

    async fn gauges(&self, controller: Address, index: u64) -> CallResult<Address> {
        self.address(controller, "gauges", index.to_string())
    }

    async fn claimable_tokens(&self, gauge: Address, account: Address) -> CallResult<U256> {
        self.uint(gauge, "claimable_tokens", format!("{account:?}"))
    }

    async fn working_balances(&self, gauge: Address, account: Address) -> CallResult<U256> {
        self.uint(gauge, "working_balances", format!("{account:?}"))
    }

    async fn balance_of(&self, token: Address, account: Address) -> CallResult<U256> {
        self.uint(token, "balanceOf", format!("{account:?}"))
    }

    async fn symbol(&self, token: Address) -> CallResult<String> {
        self.text(token, "symbol")
    }

    async fn name(&self, contract: Address) -> CallResult<String> {
        self.text(contract, "name")
    }

    async fn decimals(&self, token: Address) -> CallResult<u8> {
        match self.lookup(token, "decimals", String::new())? {
            Reply::Small(v) => Ok(v),
            other => Err(mismatch(token, "decimals", other)),
        }
    }
}
