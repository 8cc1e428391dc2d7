//! # Curve Models CLI
//!
//! Runs a single Curve Finance model against an RPC endpoint and prints the
//! result as JSON.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin curve_models -- pool-info 0xbEbc44782C7dB0a1A60Cb6fe97d0b483032FF1C7
//! cargo run --bin curve_models -- --block 17000000 pool-tvl 0xbEbc44782C7dB0a1A60Cb6fe97d0b483032FF1C7
//! cargo run --bin curve_models -- gauge-rewards-history 0xbFcF63294aD7105dEa65aA58F8AE5BE2D9d0952A --window "60 days" --interval "7 days"
//! ```
//!
//! Gauge reward and yield commands read stakers from the transaction ledger
//! configured under `[ledger]` (or `DATABASE_URL`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use curve_fi_models::{
    ledger::PgLedger, price::PriceResolver, settings::Settings, types::string_to_address,
    CurveChain, CurveFinance, EthersChain,
};
use ethers::prelude::{Address, Http, Provider};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "curve_models", about = "Curve Finance analytics from on-chain state")]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "Config.toml")]
    config: PathBuf,

    /// Evaluate at this block instead of the latest one
    #[arg(long)]
    block: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Curve address provider
    GetProvider,
    /// Main registry
    GetRegistry,
    /// Gauge controller
    GetGaugeController,
    /// Every registry pool
    AllPools,
    /// Composition and peg metrics of one pool
    PoolInfo {
        #[arg(value_parser = parse_address)]
        pool: Address,
    },
    /// Composition of every registry pool
    AllPoolsInfo,
    /// Total value locked in one pool
    PoolTvl {
        #[arg(value_parser = parse_address)]
        pool: Address,
    },
    /// Every gauge listed by the gauge controller
    AllGauges,
    /// Distinct stakers of a gauge
    GaugeClaimAddresses {
        #[arg(value_parser = parse_address)]
        gauge: Address,
    },
    /// Claimable rewards and balances of every staker
    GaugeRewards {
        #[arg(value_parser = parse_address)]
        gauge: Address,
    },
    /// Gauge rewards sampled over a historical window
    GaugeRewardsHistory {
        #[arg(value_parser = parse_address)]
        gauge: Address,
        #[arg(long, default_value = "60 days")]
        window: String,
        #[arg(long, default_value = "7 days")]
        interval: String,
    },
    /// Annualised reward yield of one gauge
    GaugeYield {
        #[arg(value_parser = parse_address)]
        gauge: Address,
    },
    /// Yield of every gauge
    AllYield,
}

impl Command {
    fn needs_ledger(&self) -> bool {
        matches!(
            self,
            Command::GaugeClaimAddresses { .. }
                | Command::GaugeRewards { .. }
                | Command::GaugeRewardsHistory { .. }
                | Command::GaugeYield { .. }
                | Command::AllYield
        )
    }
}

fn parse_address(s: &str) -> Result<Address, String> {
    string_to_address(s).map_err(|e| e.to_string())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();

    let settings = Settings::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    log::info!("Settings loaded from {}", cli.config.display());

    let provider = Arc::new(Provider::<Http>::try_from(settings.rpc.url.as_str())?);
    let mut chain = EthersChain::connect(Arc::clone(&provider)).await?;
    if let Some(block) = cli.block {
        chain = chain.at_block(block);
    }
    log::info!("Connected to chain {}", chain.chain_id());

    let prices =
        PriceResolver::from_settings(&settings.prices, chain.chain_id(), provider, cli.block)?;
    let mut models = CurveFinance::new(chain, prices, &settings)?;
    if cli.command.needs_ledger() {
        let ledger = PgLedger::connect(&settings.ledger).await?;
        models = models.with_ledger(Arc::new(ledger));
        if let Some(block) = cli.block {
            models = models.with_ledger_bound(block);
        }
    }

    match cli.command {
        Command::GetProvider => print_json(&models.get_provider()),
        Command::GetRegistry => print_json(&models.get_registry().await?),
        Command::GetGaugeController => print_json(&models.get_gauge_controller().await?),
        Command::AllPools => print_json(&models.all_pools().await?),
        Command::PoolInfo { pool } => print_json(&models.pool_info(pool).await?),
        Command::AllPoolsInfo => print_json(&models.all_pools_info().await?),
        Command::PoolTvl { pool } => print_json(&models.pool_tvl(pool).await?),
        Command::AllGauges => print_json(&models.all_gauges().await?),
        Command::GaugeClaimAddresses { gauge } => {
            print_json(&models.gauge_claim_addresses(gauge).await?)
        }
        Command::GaugeRewards { gauge } => print_json(&models.gauge_rewards(gauge).await?),
        Command::GaugeRewardsHistory {
            gauge,
            window,
            interval,
        } => print_json(
            &models
                .gauge_rewards_history(gauge, &window, &interval)
                .await?,
        ),
        Command::GaugeYield { gauge } => print_json(&models.gauge_yield(gauge).await?),
        Command::AllYield => print_json(&models.all_yield().await?),
    }
}
