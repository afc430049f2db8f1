//! sol-swap
//!
//! Command-line swap client for Solana:
//! - Buys an asset with native SOL or sells it back
//! - Routes through the Jupiter aggregator
//! - Waits for finalized commitment before reporting success

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signer::Signer;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

use sol_swap_exec::config::AppConfig;
use sol_swap_exec::execution::{TradeEngine, TradeIntent};
use sol_swap_exec::telemetry::{init_logging, init_metrics};
use sol_swap_exec::utils::helpers::{load_keypair_from_env_or_file, ui_amount_to_raw, NATIVE_DECIMALS};
use sol_swap_exec::FeeTier;

/// Solana swap execution client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override log level
    #[arg(long)]
    log_level: Option<String>,

    /// Override the fee tier (low, medium, high, custom)
    #[arg(long)]
    tier: Option<FeeTier>,

    /// Override slippage tolerance in basis points
    #[arg(long)]
    slippage_bps: Option<u16>,

    /// Skip preflight simulation
    #[arg(long)]
    anti_mev: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Buy an asset with SOL
    Buy {
        /// Asset mint address
        mint: Pubkey,
        /// Amount of SOL to spend
        amount: Decimal,
    },
    /// Sell an asset for SOL
    Sell {
        /// Asset mint address
        mint: Pubkey,
        /// Raw token amount to sell
        amount_raw: u64,
        /// Share of current holdings this sale represents, in (0, 1]
        #[arg(long)]
        fraction: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let mut config = AppConfig::load(&args.config)?;

    // Apply CLI overrides
    if let Some(level) = &args.log_level {
        config.telemetry.log_level = level.clone();
    }
    if let Some(tier) = args.tier {
        config.trading.default_fee_tier = tier;
    }
    if let Some(slippage) = args.slippage_bps {
        config.trading.slippage_bps = slippage;
    }
    if args.anti_mev {
        config.trading.anti_mev = true;
    }
    config.validate()?;

    let _log_guard = init_logging(&config.telemetry)?;
    info!("Starting sol-swap v{}", env!("CARGO_PKG_VERSION"));

    if config.telemetry.enable_metrics {
        init_metrics(config.telemetry.metrics_port)?;
        info!("Metrics server started on port {}", config.telemetry.metrics_port);
    }

    let keypair = load_keypair_from_env_or_file(
        config.wallet.keypair_env.as_deref(),
        Path::new(&config.wallet.keypair_path),
    )?;
    info!("Wallet: {}", keypair.pubkey());

    let intent = match args.command {
        Command::Buy { mint, amount } => {
            let lamports = ui_amount_to_raw(amount, NATIVE_DECIMALS)
                .with_context(|| format!("Invalid SOL amount: {}", amount))?;
            TradeIntent::buy(mint, lamports, &config.trading)
        }
        Command::Sell { mint, amount_raw, fraction } => {
            TradeIntent::sell(mint, amount_raw, fraction, &config.trading)
        }
    };

    let engine = TradeEngine::from_config(&config)?;
    let result = engine.execute_trade(&intent, &keypair).await;

    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
