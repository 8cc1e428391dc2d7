use dashmap::DashMap;
use ethers::types::{Address, U256};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::chain::{CallError, CurveChain};
use crate::error::ModelResult;
use crate::types::u256_div_10_pow;

/// Placeholder Curve uses for the chain's native asset in coin lists.
pub const NATIVE_TOKEN: Address = Address::repeat_byte(0xee);

const NATIVE_SYMBOL: &str = "ETH";
const NATIVE_DECIMALS: u8 = 18;
const FALLBACK_DECIMALS: u8 = 18;

/// ERC-20 metadata snapshot. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

impl Token {
    pub fn native() -> Self {
        Self {
            address: NATIVE_TOKEN,
            symbol: NATIVE_SYMBOL.to_string(),
            decimals: NATIVE_DECIMALS,
        }
    }

    pub fn is_native(&self) -> bool {
        self.address == NATIVE_TOKEN
    }

    /// Raw on-chain amount in whole-token units.
    pub fn scaled(&self, raw: U256) -> f64 {
        u256_div_10_pow(raw, self.decimals as u32)
    }
}

/// Fetches token metadata and balances, caching metadata per address for the
/// lifetime of the resolver.
pub struct TokenResolver<'a, C: CurveChain> {
    chain: &'a C,
    cache: DashMap<Address, Token>,
}

impl<'a, C: CurveChain> TokenResolver<'a, C> {
    pub fn new(chain: &'a C) -> Self {
        Self {
            chain,
            cache: DashMap::new(),
        }
    }

    pub async fn token(&self, address: Address) -> ModelResult<Token> {
        if address == NATIVE_TOKEN {
            return Ok(Token::native());
        }
        if let Some(token) = self.cache.get(&address) {
            return Ok(token.value().clone());
        }

        let symbol = match self.chain.symbol(address).await {
            Ok(symbol) => symbol,
            Err(err) if !matches!(err, CallError::Transport { .. }) => {
                debug!("symbol() unavailable on {:?}: {}", address, err);
                String::new()
            }
            Err(err) => return Err(err.into()),
        };
        let decimals = match self.chain.decimals(address).await {
            Ok(decimals) => decimals,
            Err(err) if err.is_branch_signal() => {
                warn!(
                    "decimals() unavailable on {:?}, assuming {}: {}",
                    address, FALLBACK_DECIMALS, err
                );
                FALLBACK_DECIMALS
            }
            Err(err) => return Err(err.into()),
        };

        let token = Token {
            address,
            symbol,
            decimals,
        };
        self.cache.insert(address, token.clone());
        Ok(token)
    }

    /// Resolves a coin list, dropping zero-address padding. Returns the tokens
    /// and their symbols as parallel vectors.
    pub async fn tokens(&self, addresses: &[Address]) -> ModelResult<(Vec<Token>, Vec<String>)> {
        let mut tokens = Vec::with_capacity(addresses.len());
        let mut symbols = Vec::with_capacity(addresses.len());
        for &address in addresses {
            if address.is_zero() {
                continue;
            }
            let token = self.token(address).await?;
            symbols.push(token.symbol.clone());
            tokens.push(token);
        }
        Ok((tokens, symbols))
    }

    /// Balance of `token` actually held by `holder`, fees included.
    pub async fn held_balance(&self, token: &Token, holder: Address) -> ModelResult<f64> {
        let raw = if token.is_native() {
            self.chain.native_balance(holder).await?
        } else {
            self.chain.balance_of(token.address, holder).await?
        };
        Ok(token.scaled(raw))
    }

    /// `name()` of any contract, empty when unreadable.
    pub async fn name(&self, contract: Address) -> String {
        match self.chain.name(contract).await {
            Ok(name) => name,
            Err(err) => {
                debug!("name() unavailable on {:?}: {}", contract, err);
                String::new()
            }
        }
    }
}
