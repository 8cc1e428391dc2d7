use async_trait::async_trait;
use dashmap::DashMap;
use ethers::abi::Detokenize;
use ethers::contract::{ContractCall, ContractError};
use ethers::prelude::{Address, Middleware, U256};
use ethers::types::{BlockId, BlockNumber, Bytes};
use log::debug;
use std::fmt;
use std::sync::Arc;

use super::{BlockHead, CallError, CallResult, CurveChain};
use crate::contracts::{
    Erc20, ICurveAddressProvider, ICurveLegacyPool, ICurvePool, ICurvePoolInfo, ICurveRegistry,
    IGaugeController, ILiquidityGauge,
};

/// [`CurveChain`] over an ethers middleware.
///
/// Failed reads are classified by looking at the callee's deployed bytecode:
/// if the 4-byte selector of the called function occurs in the code, the
/// function exists and the failure is a logic rejection; otherwise the
/// capability is absent. Deployed code is fetched once per address.
pub struct EthersChain<M: Middleware> {
    provider: Arc<M>,
    chain_id: u64,
    block: Option<BlockId>,
    code_cache: Arc<DashMap<Address, Bytes>>,
}

impl<M: Middleware> Clone for EthersChain<M> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            chain_id: self.chain_id,
            block: self.block,
            code_cache: Arc::clone(&self.code_cache),
        }
    }
}

impl<M: Middleware> fmt::Debug for EthersChain<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EthersChain")
            .field("chain_id", &self.chain_id)
            .field("block", &self.block)
            .field("cached_code", &self.code_cache.len())
            .finish()
    }
}

impl<M: Middleware + 'static> EthersChain<M> {
    pub fn new(provider: Arc<M>, chain_id: u64) -> Self {
        Self {
            provider,
            chain_id,
            block: None,
            code_cache: Arc::new(DashMap::new()),
        }
    }

    /// Builds a reader after asking the node for its chain id.
    pub async fn connect(provider: Arc<M>) -> CallResult<Self> {
        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| transport("eth_chainId", e))?;
        Ok(Self::new(provider, chain_id.as_u64()))
    }

    pub fn provider(&self) -> Arc<M> {
        Arc::clone(&self.provider)
    }

    async fn read<D>(&self, method: &'static str, call: ContractCall<M, D>) -> CallResult<D>
    where
        D: Detokenize + Send + Sync,
    {
        let target = call.tx.to().and_then(|to| to.as_address()).copied().unwrap_or_default();
        let selector = call.function.short_signature();
        let call = match self.block {
            Some(block) => call.block(block),
            None => call,
        };
        match call.call().await {
            Ok(value) => Ok(value),
            Err(err) => Err(self.classify(target, method, selector, err).await),
        }
    }

    async fn classify(
        &self,
        target: Address,
        method: &'static str,
        selector: [u8; 4],
        err: ContractError<M>,
    ) -> CallError {
        let reason = err.to_string();
        let reverted = err.is_revert() || reason.to_lowercase().contains("revert");
        let undecodable = matches!(
            err,
            ContractError::AbiError(_)
                | ContractError::DecodingError(_)
                | ContractError::DetokenizationError(_)
        );
        if !reverted && !undecodable {
            return CallError::Transport { method, reason };
        }

        match self.exposes(target, selector).await {
            Ok(true) if reverted => CallError::Reverted {
                target,
                method,
                reason,
            },
            Ok(true) => CallError::Decode {
                target,
                method,
                reason,
            },
            Ok(false) => {
                debug!("{:?} has no {} selector, treating as absent", target, method);
                CallError::Unsupported { target, method }
            }
            Err(err) => err,
        }
    }

    async fn exposes(&self, target: Address, selector: [u8; 4]) -> CallResult<bool> {
        let code = match self.code_cache.get(&target) {
            Some(code) => code.value().clone(),
            None => {
                let code = self
                    .provider
                    .get_code(target, self.block)
                    .await
                    .map_err(|e| transport("eth_getCode", e))?;
                self.code_cache.insert(target, code.clone());
                code
            }
        };
        Ok(code_has_selector(&code, selector))
    }
}

fn transport<E: fmt::Display>(method: &'static str, err: E) -> CallError {
    CallError::Transport {
        method,
        reason: err.to_string(),
    }
}

/// Plain byte search instead of PUSH4 matching: newer Vyper dispatchers keep
/// selectors in data tables rather than behind PUSH4 opcodes.
pub(crate) fn code_has_selector(code: &[u8], selector: [u8; 4]) -> bool {
    !code.is_empty() && code.windows(4).any(|w| w == selector)
}

#[async_trait]
impl<M: Middleware + 'static> CurveChain for EthersChain<M> {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Deployed code can differ between blocks, so the pinned reader starts
    /// with its own code cache.
    fn at_block(&self, block: u64) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            chain_id: self.chain_id,
            block: Some(BlockId::Number(BlockNumber::Number(block.into()))),
            code_cache: Arc::new(DashMap::new()),
        }
    }

    async fn head(&self) -> CallResult<BlockHead> {
        let id = self.block.unwrap_or(BlockId::Number(BlockNumber::Latest));
        let block = self
            .provider
            .get_block(id)
            .await
            .map_err(|e| transport("eth_getBlockByNumber", e))?
            .ok_or_else(|| CallError::Transport {
                method: "eth_getBlockByNumber",
                reason: format!("block {:?} not found", id),
            })?;
        Ok(BlockHead {
            number: block.number.map(|n| n.as_u64()).unwrap_or_default(),
            timestamp: block.timestamp.low_u64(),
        })
    }

    async fn native_balance(&self, account: Address) -> CallResult<U256> {
        self.provider
            .get_balance(account, self.block)
            .await
            .map_err(|e| transport("eth_getBalance", e))
    }

    async fn get_registry(&self, provider: Address) -> CallResult<Address> {
        let call = ICurveAddressProvider::new(provider, self.provider()).get_registry();
        self.read("get_registry", call).await
    }

    async fn get_address(&self, provider: Address, id: u64) -> CallResult<Address> {
        let call = ICurveAddressProvider::new(provider, self.provider()).get_address(U256::from(id));
        self.read("get_address", call).await
    }

    async fn gauge_controller(&self, registry: Address) -> CallResult<Address> {
        let call = ICurveRegistry::new(registry, self.provider()).gauge_controller();
        self.read("gauge_controller", call).await
    }

    async fn pool_count(&self, registry: Address) -> CallResult<U256> {
        let call = ICurveRegistry::new(registry, self.provider()).pool_count();
        self.read("pool_count", call).await
    }

    async fn pool_list(&self, registry: Address, index: U256) -> CallResult<Address> {
        let call = ICurveRegistry::new(registry, self.provider()).pool_list(index);
        self.read("pool_list", call).await
    }

    async fn registry_balances(&self, registry: Address, pool: Address) -> CallResult<Vec<U256>> {
        let call = ICurveRegistry::new(registry, self.provider()).get_balances(pool);
        self.read("get_balances", call).await.map(|b| b.to_vec())
    }

    async fn registry_coins(&self, registry: Address, pool: Address) -> CallResult<Vec<Address>> {
        let call = ICurveRegistry::new(registry, self.provider()).get_coins(pool);
        self.read("get_coins", call).await.map(|c| c.to_vec())
    }

    async fn registry_underlying_coins(
        &self,
        registry: Address,
        pool: Address,
    ) -> CallResult<Vec<Address>> {
        let call = ICurveRegistry::new(registry, self.provider()).get_underlying_coins(pool);
        self.read("get_underlying_coins", call).await.map(|c| c.to_vec())
    }

    async fn registry_is_meta(&self, registry: Address, pool: Address) -> CallResult<bool> {
        let call = ICurveRegistry::new(registry, self.provider()).is_meta(pool);
        self.read("is_meta", call).await
    }

    async fn registry_lp_token(&self, registry: Address, pool: Address) -> CallResult<Address> {
        let call = ICurveRegistry::new(registry, self.provider()).get_lp_token(pool);
        self.read("get_lp_token", call).await
    }

    async fn registry_pool_from_lp_token(
        &self,
        registry: Address,
        lp_token: Address,
    ) -> CallResult<Address> {
        let call = ICurveRegistry::new(registry, self.provider()).get_pool_from_lp_token(lp_token);
        self.read("get_pool_from_lp_token", call).await
    }

    async fn pool_info_lp_token(&self, pool_info: Address, pool: Address) -> CallResult<Address> {
        let call = ICurvePoolInfo::new(pool_info, self.provider()).get_pool_info(pool);
        self.read("get_pool_info", call).await.map(|info| info.5)
    }

    async fn minter(&self, pool: Address) -> CallResult<Address> {
        let call = ICurvePool::new(pool, self.provider()).minter();
        self.read("minter", call).await
    }

    async fn coins(&self, pool: Address, index: u64) -> CallResult<Address> {
        let call = ICurvePool::new(pool, self.provider()).coins(U256::from(index));
        match self.read("coins", call).await {
            Err(CallError::Unsupported { .. }) => {
                let call = ICurveLegacyPool::new(pool, self.provider()).coins(index as i128);
                self.read("coins", call).await
            }
            read => read,
        }
    }

    async fn balances(&self, pool: Address, index: u64) -> CallResult<U256> {
        let call = ICurvePool::new(pool, self.provider()).balances(U256::from(index));
        match self.read("balances", call).await {
            Err(CallError::Unsupported { .. }) => {
                let call = ICurveLegacyPool::new(pool, self.provider()).balances(index as i128);
                self.read("balances", call).await
            }
            read => read,
        }
    }

    async fn underlying_coins(&self, pool: Address, index: u64) -> CallResult<Address> {
        let call = ICurvePool::new(pool, self.provider()).underlying_coins(U256::from(index));
        match self.read("underlying_coins", call).await {
            Err(CallError::Unsupported { .. }) => {
                let call =
                    ICurveLegacyPool::new(pool, self.provider()).underlying_coins(index as i128);
                self.read("underlying_coins", call).await
            }
            read => read,
        }
    }

    async fn get_virtual_price(&self, contract: Address) -> CallResult<U256> {
        let call = ICurvePool::new(contract, self.provider()).get_virtual_price();
        self.read("get_virtual_price", call).await
    }

    async fn amplification(&self, pool: Address) -> CallResult<U256> {
        let call = ICurvePool::new(pool, self.provider()).a();
        self.read("A", call).await
    }

    async fn lp_token(&self, contract: Address) -> CallResult<Address> {
        let call = ICurvePool::new(contract, self.provider()).lp_token();
        self.read("lp_token", call).await
    }

    async fn token(&self, pool: Address) -> CallResult<Address> {
        let call = ICurvePool::new(pool, self.provider()).token();
        self.read("token", call).await
    }

    async fn gauges(&self, controller: Address, index: u64) -> CallResult<Address> {
        let call = IGaugeController::new(controller, self.provider()).gauges(U256::from(index));
        self.read("gauges", call).await
    }

    async fn claimable_tokens(&self, gauge: Address, account: Address) -> CallResult<U256> {
        let call = ILiquidityGauge::new(gauge, self.provider()).claimable_tokens(account);
        self.read("claimable_tokens", call).await
    }

    async fn working_balances(&self, gauge: Address, account: Address) -> CallResult<U256> {
        let call = ILiquidityGauge::new(gauge, self.provider()).working_balances(account);
        self.read("working_balances", call).await
    }

    async fn balance_of(&self, token: Address, account: Address) -> CallResult<U256> {
        let call = Erc20::new(token, self.provider()).balance_of(account);
        self.read("balanceOf", call).await
    }

    async fn symbol(&self, token: Address) -> CallResult<String> {
        let call = Erc20::new(token, self.provider()).symbol();
        self.read("symbol", call).await
    }

    async fn name(&self, contract: Address) -> CallResult<String> {
        let call = Erc20::new(contract, self.provider()).name();
        self.read("name", call).await
    }

    async fn decimals(&self, token: Address) -> CallResult<u8> {
        let call = Erc20::new(token, self.provider()).decimals();
        self.read("decimals", call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::{JsonRpcError, MockProvider, MockResponse, Provider};
    use ethers::utils::id;

    #[test]
    fn selector_search_finds_dispatch_entries() {
        // keccak("coins(uint256)")[..4] = c6610657
        let selector = [0xc6, 0x61, 0x06, 0x57];
        let code = [0x60, 0x00, 0x63, 0xc6, 0x61, 0x06, 0x57, 0x14, 0x61];
        assert!(code_has_selector(&code, selector));
        assert!(!code_has_selector(&code[..5], selector));
        assert!(!code_has_selector(&[], selector));
    }

    fn int128_pool() -> (EthersChain<Provider<MockProvider>>, MockProvider) {
        let (provider, mock) = Provider::mocked();
        (EthersChain::new(Arc::new(provider), 1), mock)
    }

    #[tokio::test]
    async fn int128_pools_are_read_through_legacy_selectors() {
        let (chain, mock) = int128_pool();
        let coin = Address::repeat_byte(0x0c);
        let legacy = id("coins(int128)");
        let code = [&[0x63u8][..], &legacy[..], &[0x14, 0x61][..]].concat();

        // Replies are served last-pushed first.
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(coin.as_bytes());
        mock.push::<Bytes, _>(Bytes::from(word.to_vec())).unwrap();
        mock.push::<Bytes, _>(Bytes::from(code)).unwrap();
        mock.push_response(MockResponse::Error(JsonRpcError {
            code: 3,
            message: "execution reverted".into(),
            data: None,
        }));

        let pool = Address::repeat_byte(0x50);
        assert_eq!(chain.coins(pool, 0).await.unwrap(), coin);
    }

    #[tokio::test]
    async fn missing_legacy_selector_stays_unsupported() {
        let (chain, mock) = int128_pool();
        mock.push_response(MockResponse::Error(JsonRpcError {
            code: 3,
            message: "execution reverted".into(),
            data: None,
        }));
        mock.push::<Bytes, _>(Bytes::from(vec![0x60, 0x00])).unwrap();
        mock.push_response(MockResponse::Error(JsonRpcError {
            code: 3,
            message: "execution reverted".into(),
            data: None,
        }));

        let err = chain.balances(Address::repeat_byte(0x50), 0).await.unwrap_err();
        assert!(matches!(err, CallError::Unsupported { method: "balances", .. }));
    }
}
