use ethers::types::Address;

use crate::chain::CallError;
use crate::history::HistoryError;
use crate::ledger::LedgerError;
use crate::price::PriceError;

/// Errors surfaced by a model invocation.
///
/// Optional fields never produce one of these: they fall back to documented
/// defaults. Only structural reads and bad upstream data fail a model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// No resolution path produced the pool's constituent tokens.
    #[error("no pool data for {pool:?}: {reason}")]
    PoolData { pool: Address, reason: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("minter redirection from {origin:?} exceeded {max_depth} hops")]
    MinterDepthExceeded { origin: Address, max_depth: usize },

    #[error(transparent)]
    Call(#[from] CallError),

    #[error(transparent)]
    Price(#[from] PriceError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    History(#[from] HistoryError),
}

impl ModelError {
    /// Transport failures are worth retrying; everything else is deterministic
    /// for a given block.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Call(CallError::Transport { .. }) => true,
            ModelError::Price(err) => err.is_retryable(),
            ModelError::Ledger(LedgerError::Database(_)) => true,
            _ => false,
        }
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
