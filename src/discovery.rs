use ethers::types::{Address, U256};
use log::debug;

use crate::chain::CurveChain;
use crate::error::ModelResult;

/// Singleton lookups rooted at the Curve address provider.
pub struct Discovery<'a, C: CurveChain> {
    chain: &'a C,
    address_provider: Address,
}

impl<'a, C: CurveChain> Discovery<'a, C> {
    pub fn new(chain: &'a C, address_provider: Address) -> Self {
        Self {
            chain,
            address_provider,
        }
    }

    pub fn get_provider(&self) -> Address {
        self.address_provider
    }

    pub async fn get_registry(&self) -> ModelResult<Address> {
        Ok(self.chain.get_registry(self.address_provider).await?)
    }

    pub async fn get_gauge_controller(&self) -> ModelResult<Address> {
        let registry = self.get_registry().await?;
        Ok(self.chain.gauge_controller(registry).await?)
    }

    /// Contract registered under `id` in the address provider.
    pub async fn provider_slot(&self, id: u64) -> ModelResult<Address> {
        Ok(self.chain.get_address(self.address_provider, id).await?)
    }

    /// Every pool in the main registry, in registry order.
    pub async fn all_pools(&self) -> ModelResult<Vec<Address>> {
        let registry = self.get_registry().await?;
        let count = self.chain.pool_count(registry).await?;
        debug!("registry {:?} lists {} pools", registry, count);

        let mut pools = Vec::with_capacity(count.low_u64() as usize);
        let mut i = U256::zero();
        while i < count {
            pools.push(self.chain.pool_list(registry, i).await?);
            i += U256::one();
        }
        Ok(pools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{addr, MockChain, Reply};

    #[tokio::test]
    async fn walks_provider_registry_and_pool_list() {
        let provider = addr(0xaa);
        let registry = addr(0xbb);
        let controller = addr(0xcc);
        let chain = MockChain::new(1)
            .on(provider, "get_registry()", Reply::Addr(registry))
            .on(registry, "gauge_controller()", Reply::Addr(controller))
            .on(registry, "pool_count()", Reply::Uint(U256::from(2u64)))
            .on(registry, "pool_list(0)", Reply::Addr(addr(0x01)))
            .on(registry, "pool_list(1)", Reply::Addr(addr(0x02)));

        let discovery = Discovery::new(&chain, provider);
        assert_eq!(discovery.get_provider(), provider);
        assert_eq!(discovery.get_gauge_controller().await.unwrap(), controller);
        assert_eq!(
            discovery.all_pools().await.unwrap(),
            vec![addr(0x01), addr(0x02)]
        );
    }
}
