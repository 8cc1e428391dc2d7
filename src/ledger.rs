use async_trait::async_trait;
use ethers::types::Address;
use log::{debug, info};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres, Row};
use std::time::Duration;

use crate::settings::Ledger as LedgerSettings;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("no ledger database configured")]
    NotConfigured,
    #[error("block {0} is out of range for the ledger")]
    BlockOutOfRange(u64),
}

/// Transaction history indexed by recipient.
#[async_trait]
pub trait TransactionLedger: Send + Sync {
    /// Sender of every transaction sent to `address`, oldest first, optionally
    /// limited to blocks up to and including `up_to_block`.
    async fn senders_to(
        &self,
        address: Address,
        up_to_block: Option<u64>,
    ) -> Result<Vec<String>, LedgerError>;
}

/// Ledger backed by an indexed `transactions` table in PostgreSQL.
#[derive(Clone)]
pub struct PgLedger {
    pool: Pool<Postgres>,
}

impl PgLedger {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn connect(settings: &LedgerSettings) -> Result<Self, LedgerError> {
        let url = settings
            .database_url
            .as_deref()
            .ok_or(LedgerError::NotConfigured)?;
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;
        info!("Connected to transaction ledger");
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl TransactionLedger for PgLedger {
    async fn senders_to(
        &self,
        address: Address,
        up_to_block: Option<u64>,
    ) -> Result<Vec<String>, LedgerError> {
        let to_address = format!("{address:?}");
        let rows = match up_to_block {
            Some(block) => {
                let block = i64::try_from(block).map_err(|_| LedgerError::BlockOutOfRange(block))?;
                sqlx::query(
                    "SELECT from_address FROM transactions \
                     WHERE to_address = $1 AND block_number <= $2 \
                     ORDER BY block_number, transaction_index",
                )
                .bind(&to_address)
                .bind(block)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT from_address FROM transactions \
                     WHERE to_address = $1 \
                     ORDER BY block_number, transaction_index",
                )
                .bind(&to_address)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let senders = rows
            .iter()
            .map(|row| row.try_get::<String, _>("from_address"))
            .collect::<Result<Vec<_>, _>>()?;
        debug!("{} transactions sent to {}", senders.len(), to_address);
        Ok(senders)
    }
}
