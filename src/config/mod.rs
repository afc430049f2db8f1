//! Configuration module
//!
//! Handles loading and validation of the application configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::utils::FeeTier;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub rpc: RpcConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub fees: FeeConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    pub wallet: WalletConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_yaml(&content)?;
        info!("Configuration loaded from {:?}", path);
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.rpc.url)
            .with_context(|| format!("Invalid rpc.url: {}", self.rpc.url))?;
        url::Url::parse(&self.aggregator.api_url)
            .with_context(|| format!("Invalid aggregator.api_url: {}", self.aggregator.api_url))?;
        anyhow::ensure!(
            self.trading.slippage_bps <= 10_000,
            "slippage_bps must be between 0 and 10000"
        );
        for (tier, fees) in self.fees.tiers.iter() {
            anyhow::ensure!(
                fees.compute_unit_limit > 0,
                "fees.tiers.{}.compute_unit_limit must be positive",
                tier
            );
        }
        anyhow::ensure!(
            self.fees.priority_fee_multiplier >= 1.0,
            "priority_fee_multiplier must be at least 1.0"
        );
        anyhow::ensure!(self.fees.sample_size > 0, "fees.sample_size must be positive");
        anyhow::ensure!(
            self.fees.reference_fee_micro_lamports > 0,
            "fees.reference_fee_micro_lamports must be positive"
        );
        anyhow::ensure!(
            self.confirmation.poll_interval_ms > 0,
            "confirmation.poll_interval_ms must be positive"
        );
        Ok(())
    }

    /// Create a default config for testing
    pub fn default_for_test() -> Self {
        Self {
            rpc: RpcConfig {
                url: "https://api.mainnet-beta.solana.com".to_string(),
                request_timeout_ms: 10000,
                send_max_retries: 3,
            },
            aggregator: AggregatorConfig::default(),
            trading: TradingConfig::default(),
            fees: FeeConfig::default(),
            confirmation: ConfirmationConfig {
                max_retries: 3,
                poll_interval_ms: 1,
            },
            wallet: WalletConfig {
                keypair_path: "./wallet.json".to_string(),
                keypair_env: None,
            },
            telemetry: TelemetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Node-side rebroadcast budget passed with `sendTransaction`
    #[serde(default = "default_send_max_retries")]
    pub send_max_retries: usize,
}

fn default_request_timeout() -> u64 { 10000 }
fn default_send_max_retries() -> usize { 3 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_aggregator_url")]
    pub api_url: String,
    #[serde(default = "default_native_mint")]
    pub native_mint: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_aggregator_url() -> String { "https://quote-api.jup.ag/v6".to_string() }
fn default_native_mint() -> String { "So11111111111111111111111111111111111111112".to_string() }

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            api_url: default_aggregator_url(),
            native_mint: default_native_mint(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u16,
    /// Skip preflight and use processed preflight commitment
    #[serde(default)]
    pub anti_mev: bool,
    #[serde(default = "default_true")]
    pub wrap_native: bool,
    #[serde(default = "default_fee_tier")]
    pub default_fee_tier: FeeTier,
}

fn default_slippage_bps() -> u16 { 50 }
fn default_true() -> bool { true }
fn default_fee_tier() -> FeeTier { FeeTier::Medium }

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            slippage_bps: default_slippage_bps(),
            anti_mev: false,
            wrap_native: true,
            default_fee_tier: default_fee_tier(),
        }
    }
}

/// Static budget for one fee tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierFees {
    pub compute_unit_limit: u32,
    #[serde(default)]
    pub priority_fee_micro_lamports: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeTiersConfig {
    pub low: TierFees,
    pub medium: TierFees,
    pub high: TierFees,
    pub custom: TierFees,
}

impl FeeTiersConfig {
    pub fn get(&self, tier: FeeTier) -> TierFees {
        match tier {
            FeeTier::Low => self.low,
            FeeTier::Medium => self.medium,
            FeeTier::High => self.high,
            FeeTier::Custom => self.custom,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (FeeTier, TierFees)> + '_ {
        [FeeTier::Low, FeeTier::Medium, FeeTier::High, FeeTier::Custom]
            .into_iter()
            .map(move |tier| (tier, self.get(tier)))
    }
}

impl Default for FeeTiersConfig {
    fn default() -> Self {
        Self {
            low: TierFees { compute_unit_limit: 200_000, priority_fee_micro_lamports: 1_000 },
            medium: TierFees { compute_unit_limit: 300_000, priority_fee_micro_lamports: 10_000 },
            high: TierFees { compute_unit_limit: 400_000, priority_fee_micro_lamports: 50_000 },
            custom: TierFees { compute_unit_limit: 400_000, priority_fee_micro_lamports: 0 },
        }
    }
}

/// Empirical urgency heuristics, kept as named values so they can be tuned
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeHeuristics {
    #[serde(default = "default_sell_urgency_boost")]
    pub sell_urgency_boost: f64,
    #[serde(default = "default_base_urgency_boost")]
    pub base_urgency_boost: f64,
    #[serde(default = "default_urgent_sell_fraction")]
    pub urgent_sell_fraction: f64,
    #[serde(default = "default_tier_upgrade_sell_fraction")]
    pub tier_upgrade_sell_fraction: f64,
    #[serde(default = "default_ceiling_headroom")]
    pub ceiling_headroom: f64,
}

pub const SELL_URGENCY_BOOST: f64 = 1.5;
pub const BASE_URGENCY_BOOST: f64 = 1.2;
pub const URGENT_SELL_FRACTION: f64 = 0.75;
pub const TIER_UPGRADE_SELL_FRACTION: f64 = 0.5;
pub const CEILING_HEADROOM: f64 = 1.5;

fn default_sell_urgency_boost() -> f64 { SELL_URGENCY_BOOST }
fn default_base_urgency_boost() -> f64 { BASE_URGENCY_BOOST }
fn default_urgent_sell_fraction() -> f64 { URGENT_SELL_FRACTION }
fn default_tier_upgrade_sell_fraction() -> f64 { TIER_UPGRADE_SELL_FRACTION }
fn default_ceiling_headroom() -> f64 { CEILING_HEADROOM }

impl Default for FeeHeuristics {
    fn default() -> Self {
        Self {
            sell_urgency_boost: SELL_URGENCY_BOOST,
            base_urgency_boost: BASE_URGENCY_BOOST,
            urgent_sell_fraction: URGENT_SELL_FRACTION,
            tier_upgrade_sell_fraction: TIER_UPGRADE_SELL_FRACTION,
            ceiling_headroom: CEILING_HEADROOM,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    #[serde(default)]
    pub tiers: FeeTiersConfig,
    #[serde(default)]
    pub dynamic_fees: bool,
    /// Ceiling multiplier over a tier's base fee
    #[serde(default = "default_priority_fee_multiplier")]
    pub priority_fee_multiplier: f64,
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    #[serde(default = "default_reference_fee")]
    pub reference_fee_micro_lamports: u64,
    #[serde(default)]
    pub heuristics: FeeHeuristics,
}

fn default_priority_fee_multiplier() -> f64 { 2.0 }
fn default_sample_size() -> usize { 20 }
fn default_reference_fee() -> u64 { 10_000 }

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            tiers: FeeTiersConfig::default(),
            dynamic_fees: false,
            priority_fee_multiplier: default_priority_fee_multiplier(),
            sample_size: default_sample_size(),
            reference_fee_micro_lamports: default_reference_fee(),
            heuristics: FeeHeuristics::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    #[serde(default = "default_confirmation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_confirmation_retries() -> u32 { 30 }
fn default_poll_interval() -> u64 { 1000 }

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            max_retries: default_confirmation_retries(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    pub keypair_path: String,
    /// Environment variable that may hold the secret key instead of the file
    #[serde(default)]
    pub keypair_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default)]
    pub enable_metrics: bool,
}

fn default_log_level() -> String { "info".to_string() }
fn default_metrics_port() -> u16 { 9090 }

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            log_file: None,
            metrics_port: default_metrics_port(),
            enable_metrics: false,
        }
    }
}
