//! Common types used throughout the application

use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use std::fmt;
use std::str::FromStr;

/// Trade direction relative to the native currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    /// Spend native currency, receive the asset
    Buy,
    /// Spend the asset, receive native currency
    Sell,
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeDirection::Buy => write!(f, "BUY"),
            TradeDirection::Sell => write!(f, "SELL"),
        }
    }
}

/// Priority fee tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeTier {
    Low,
    Medium,
    High,
    Custom,
}

impl FeeTier {
    /// Next tier up the urgency ladder. `High` and `Custom` stay put.
    pub fn upgraded(self) -> FeeTier {
        match self {
            FeeTier::Low => FeeTier::Medium,
            FeeTier::Medium => FeeTier::High,
            other => other,
        }
    }
}

impl fmt::Display for FeeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeeTier::Low => write!(f, "low"),
            FeeTier::Medium => write!(f, "medium"),
            FeeTier::High => write!(f, "high"),
            FeeTier::Custom => write!(f, "custom"),
        }
    }
}

impl FromStr for FeeTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(FeeTier::Low),
            "medium" | "mid" => Ok(FeeTier::Medium),
            "high" => Ok(FeeTier::High),
            "custom" => Ok(FeeTier::Custom),
            other => Err(format!("unknown fee tier: {}", other)),
        }
    }
}

/// Ledger consistency level, ordered processed < confirmed < finalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn level(self) -> CommitmentLevel {
        match self {
            Commitment::Processed => CommitmentLevel::Processed,
            Commitment::Confirmed => CommitmentLevel::Confirmed,
            Commitment::Finalized => CommitmentLevel::Finalized,
        }
    }

    pub fn config(self) -> CommitmentConfig {
        CommitmentConfig {
            commitment: self.level(),
        }
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Commitment::Processed => write!(f, "processed"),
            Commitment::Confirmed => write!(f, "confirmed"),
            Commitment::Finalized => write!(f, "finalized"),
        }
    }
}
