use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::error::ModelResult;
use crate::pool_info::PoolInfo;
use crate::price::{Price, PriceResolver};
use crate::token::Token;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub amount: f64,
    pub asset: Token,
}

/// Total value locked in a pool, in USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TVLInfo {
    pub address: Address,
    pub name: String,
    pub portfolio: Vec<Position>,
    pub tokens_symbol: Vec<String>,
    pub prices: Vec<Price>,
    pub tvl: f64,
}

/// Values fee-excluded balances at the generic quote. Derived and protocol
/// prices used by the peg metrics are deliberately not consulted here.
pub async fn pool_tvl(info: &PoolInfo, prices: &PriceResolver) -> ModelResult<TVLInfo> {
    let mut portfolio = Vec::with_capacity(info.tokens.len());
    let mut quotes = Vec::with_capacity(info.tokens.len());
    let mut tvl = 0.0;

    for (token, &balance) in info.tokens.iter().zip(info.balances.iter()) {
        let price = prices.quote(token.address).await?;
        tvl += balance * price.price;
        portfolio.push(Position {
            amount: balance,
            asset: token.clone(),
        });
        quotes.push(price);
    }

    Ok(TVLInfo {
        address: info.address,
        name: display_name(info),
        portfolio,
        tokens_symbol: info.tokens_symbol.clone(),
        prices: quotes,
        tvl,
    })
}

/// Pool name, else LP-token name, else pool-token name.
fn display_name(info: &PoolInfo) -> String {
    [&info.name, &info.lp_token_name, &info.pool_token_name]
        .into_iter()
        .find(|name| !name.is_empty())
        .cloned()
        .unwrap_or_default()
}
