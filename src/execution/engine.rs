//! Trade Engine
//!
//! Runs one trade intent through quote, fee estimate, swap build,
//! submission and finality verification. Buys and sells share the same
//! pipeline; only the input/output mints swap places.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

use super::errors::TradeError;
use super::fees::{FeeEstimator, FeePolicy, FeeProfile};
use super::finality::{ConfirmationResult, ConfirmationStatus, FinalityVerifier, RetryPolicy};
use super::jupiter::{AggregatorTransport, HttpTransport, QuoteClient, SwapBuilder, WireFormat};
use super::submitter::TransactionSubmitter;
use crate::config::{AppConfig, TradingConfig};
use crate::network::ConnectionProvider;
use crate::telemetry::metrics;
use crate::utils::helpers::{elapsed_ms, serialize_display, serialize_display_opt};
use crate::utils::{FeeTier, TradeDirection};

/// One buy or sell request
#[derive(Debug, Clone, PartialEq)]
pub struct TradeIntent {
    pub direction: TradeDirection,
    /// Mint of the non-native side
    pub asset_mint: Pubkey,
    /// Raw base units of the input side
    pub amount_raw: u64,
    /// Share of holdings being sold, when known
    pub quantity_fraction: Option<f64>,
    /// Slippage tolerance passed to the quote
    pub slippage_bps: u16,
    /// Requested tier, before urgency upgrades
    pub fee_tier: FeeTier,
    /// Skip preflight and use processed preflight commitment
    pub anti_mev: bool,
}

impl TradeIntent {
    /// Buy `asset_mint` with `amount_raw` lamports, using configured defaults
    pub fn buy(asset_mint: Pubkey, amount_raw: u64, trading: &TradingConfig) -> Self {
        Self {
            direction: TradeDirection::Buy,
            asset_mint,
            amount_raw,
            quantity_fraction: None,
            slippage_bps: trading.slippage_bps,
            fee_tier: trading.default_fee_tier,
            anti_mev: trading.anti_mev,
        }
    }

    /// Sell `amount_raw` base units of `asset_mint`, using configured defaults
    pub fn sell(
        asset_mint: Pubkey,
        amount_raw: u64,
        quantity_fraction: Option<f64>,
        trading: &TradingConfig,
    ) -> Self {
        Self {
            direction: TradeDirection::Sell,
            quantity_fraction,
            ..Self::buy(asset_mint, amount_raw, trading)
        }
    }

    pub fn validate(&self) -> Result<(), TradeError> {
        let invalid = |detail: String| Err(TradeError::InvalidIntent { detail });

        if self.amount_raw == 0 {
            return invalid("amount must be positive".to_string());
        }
        if self.slippage_bps > 10_000 {
            return invalid(format!("slippage {} bps exceeds 10000", self.slippage_bps));
        }
        if let Some(fraction) = self.quantity_fraction {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return invalid(format!("quantity fraction {} outside (0, 1]", fraction));
            }
        }
        Ok(())
    }

    /// (input, output) mints
    pub fn route(&self, native_mint: &Pubkey) -> (Pubkey, Pubkey) {
        match self.direction {
            TradeDirection::Buy => (*native_mint, self.asset_mint),
            TradeDirection::Sell => (self.asset_mint, *native_mint),
        }
    }
}

/// Outcome of one `execute_trade` call
#[derive(Debug, Clone, Serialize)]
pub struct TradeResult {
    /// Fresh per call, for correlating logs
    pub trade_id: Uuid,
    pub direction: TradeDirection,
    #[serde(serialize_with = "serialize_display")]
    pub asset_mint: Pubkey,
    /// True iff the transaction reached finalized commitment without error
    pub success: bool,
    /// Quoted input amount, raw units
    pub in_amount: Option<u64>,
    /// Quoted output amount, raw units
    pub out_amount: Option<u64>,
    /// Compute budget computed for this trade
    pub fee_profile: Option<FeeProfile>,
    /// Wire format the payload was submitted in
    pub format: Option<WireFormat>,
    /// Set once the node accepted the transaction
    #[serde(serialize_with = "serialize_display_opt")]
    pub signature: Option<Signature>,
    /// Verifier verdict, present after submission
    pub confirmation: Option<ConfirmationResult>,
    /// Failure, if the trade did not finalize
    pub error: Option<TradeError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration of the whole pipeline
    pub elapsed_ms: u64,
}

impl TradeResult {
    fn started(intent: &TradeIntent) -> Self {
        let now = Utc::now();
        Self {
            trade_id: Uuid::new_v4(),
            direction: intent.direction,
            asset_mint: intent.asset_mint,
            success: false,
            in_amount: None,
            out_amount: None,
            fee_profile: None,
            format: None,
            signature: None,
            confirmation: None,
            error: None,
            started_at: now,
            finished_at: now,
            elapsed_ms: 0,
        }
    }
}

pub struct TradeEngine {
    native_mint: Pubkey,
    wrap_native: bool,
    quotes: QuoteClient,
    swaps: SwapBuilder,
    fees: FeeEstimator,
    submitter: TransactionSubmitter,
    verifier: FinalityVerifier,
}

impl TradeEngine {
    pub fn new(
        config: &AppConfig,
        provider: Arc<ConnectionProvider>,
        transport: Arc<dyn AggregatorTransport>,
    ) -> anyhow::Result<Self> {
        let native_mint = Pubkey::from_str(&config.aggregator.native_mint)
            .with_context(|| format!("Invalid aggregator.native_mint: {}", config.aggregator.native_mint))?;

        let policy = FeePolicy::new(&config.fees, config.trading.default_fee_tier);

        Ok(Self {
            native_mint,
            wrap_native: config.trading.wrap_native,
            quotes: QuoteClient::new(transport.clone()),
            swaps: SwapBuilder::new(transport),
            fees: FeeEstimator::new(policy, provider.clone()),
            submitter: TransactionSubmitter::new(
                provider.clone(),
                config.rpc.send_max_retries,
                config.fees.priority_fee_multiplier,
            ),
            verifier: FinalityVerifier::new(provider, RetryPolicy::from(&config.confirmation)),
        })
    }

    /// Engine wired to the configured RPC endpoint and HTTP aggregator
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let provider = Arc::new(ConnectionProvider::new(&config.rpc));
        let transport = Arc::new(HttpTransport::new(&config.aggregator)?);
        Self::new(config, provider, transport)
    }

    /// Run the full pipeline. Never fails; every outcome lands in the result.
    pub async fn execute_trade(&self, intent: &TradeIntent, keypair: &Keypair) -> TradeResult {
        let start = Instant::now();
        let mut result = TradeResult::started(intent);

        info!(
            "Trade {}: {} {} amount={} tier={} anti_mev={}",
            result.trade_id, intent.direction, intent.asset_mint, intent.amount_raw, intent.fee_tier, intent.anti_mev
        );

        let outcome = self.run(intent, keypair, &mut result).await;

        result.finished_at = Utc::now();
        result.elapsed_ms = elapsed_ms(start);
        metrics::record_execution_latency(result.elapsed_ms as f64);

        match outcome {
            Ok(()) => {
                result.success = true;
                metrics::record_trade_success();
                info!("Trade {} finalized in {}ms", result.trade_id, result.elapsed_ms);
            }
            Err(e) => {
                metrics::record_trade_failure(e.kind());
                error!("Trade {} failed: {}", result.trade_id, e);
                result.error = Some(e);
            }
        }

        result
    }

    async fn run(&self, intent: &TradeIntent, keypair: &Keypair, result: &mut TradeResult) -> Result<(), TradeError> {
        intent.validate()?;
        let (input_mint, output_mint) = intent.route(&self.native_mint);

        let quote = self
            .quotes
            .quote(&input_mint, &output_mint, intent.amount_raw, intent.slippage_bps)
            .await?;
        result.in_amount = Some(quote.in_amount);
        result.out_amount = Some(quote.out_amount);

        let fees = self
            .fees
            .estimate(intent.fee_tier, intent.direction, intent.quantity_fraction)
            .await;
        result.fee_profile = Some(fees);

        let payload = self.swaps.build(quote, &keypair.pubkey(), self.wrap_native).await?;

        let submission = self.submitter.submit(&payload, keypair, intent.anti_mev, &fees).await?;
        result.signature = Some(submission.signature);
        result.format = Some(submission.format);

        let confirmation = self.verifier.verify(submission.signature).await;
        let verdict = confirmation_outcome(&confirmation);
        result.confirmation = Some(confirmation);
        verdict
    }
}

fn confirmation_outcome(confirmation: &ConfirmationResult) -> Result<(), TradeError> {
    let signature = confirmation.signature;
    match confirmation.status {
        ConfirmationStatus::Finalized => Ok(()),
        ConfirmationStatus::Failed => Err(TradeError::OnChainExecution {
            signature: Some(signature),
            error: confirmation.on_chain_error.clone().unwrap_or_default(),
        }),
        ConfirmationStatus::NotFinalized => Err(TradeError::VerificationTimeout {
            signature,
            detail: format!("confirmed but not finalized after {} polls", confirmation.polls),
        }),
        ConfirmationStatus::NotFound => Err(TradeError::NotFound { signature }),
        ConfirmationStatus::VerificationError => Err(TradeError::VerificationTimeout {
            signature,
            detail: confirmation
                .on_chain_error
                .clone()
                .unwrap_or_else(|| "transaction lookup failed".to_string()),
        }),
    }
}
