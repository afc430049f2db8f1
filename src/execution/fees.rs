//! Priority Fee Estimation
//!
//! Turns a fee tier plus trade urgency into a compute budget:
//! - Custom tier overrides everything when configured
//! - Dynamic mode scales the tier fee by recent network fees
//! - Static mode uses the tier table as-is
//!
//! Sampling failures never surface; they degrade to a fixed multiple of the
//! tier fee.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{FeeConfig, FeeHeuristics, FeeTiersConfig};
use crate::network::{ConnectionProvider, PrioritizationSample, RpcFailure};
use crate::telemetry::metrics;
use crate::utils::{Commitment, FeeTier, TradeDirection};

/// Where a fee figure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeSource {
    Custom,
    Static,
    Dynamic,
    /// Dynamic mode with an unusable network sample
    Fallback,
}

/// Compute budget for one trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeProfile {
    /// Tier after urgency upgrades
    pub tier: FeeTier,
    /// Compute unit ceiling for the transaction
    pub compute_unit_limit: u32,
    /// Price per compute unit, in micro-lamports
    pub priority_fee_micro_lamports: u64,
    /// How the fee was derived
    pub source: FeeSource,
}

/// Pure fee policy; all network input arrives as an argument
#[derive(Debug, Clone)]
pub struct FeePolicy {
    tiers: FeeTiersConfig,
    default_tier: FeeTier,
    dynamic: bool,
    ceiling: f64,
    sample_size: usize,
    reference_fee: u64,
    heuristics: FeeHeuristics,
}

impl FeePolicy {
    pub fn new(config: &FeeConfig, default_tier: FeeTier) -> Self {
        Self {
            tiers: config.tiers.clone(),
            default_tier,
            dynamic: config.dynamic_fees,
            ceiling: config.priority_fee_multiplier,
            sample_size: config.sample_size,
            reference_fee: config.reference_fee_micro_lamports,
            heuristics: config.heuristics,
        }
    }

    /// Large sells from the middle tier are bumped one tier up
    pub fn resolve_tier(
        &self,
        tier: FeeTier,
        direction: TradeDirection,
        quantity_fraction: Option<f64>,
    ) -> FeeTier {
        let large_sell = direction == TradeDirection::Sell
            && quantity_fraction.is_some_and(|f| f >= self.heuristics.tier_upgrade_sell_fraction);

        if large_sell && tier == FeeTier::Medium {
            tier.upgraded()
        } else {
            tier
        }
    }

    fn custom_override(&self, tier: FeeTier) -> bool {
        tier == FeeTier::Custom && self.tiers.custom.priority_fee_micro_lamports > 0
    }

    /// Whether `estimate` should ask the network for fee observations
    pub fn wants_sample(&self, resolved: FeeTier) -> bool {
        self.dynamic && !self.custom_override(resolved)
    }

    /// Fee profile for a trade. `sample` is `None` when the network was not
    /// consulted.
    pub fn profile(
        &self,
        tier: FeeTier,
        direction: TradeDirection,
        quantity_fraction: Option<f64>,
        sample: Option<Result<Vec<PrioritizationSample>, RpcFailure>>,
    ) -> FeeProfile {
        let tier = self.resolve_tier(tier, direction, quantity_fraction);

        if self.custom_override(tier) {
            let custom = self.tiers.custom;
            return FeeProfile {
                tier,
                compute_unit_limit: custom.compute_unit_limit,
                priority_fee_micro_lamports: custom.priority_fee_micro_lamports,
                source: FeeSource::Custom,
            };
        }

        // An unset custom tier borrows the default tier's budget
        let base_tier = match (tier, self.default_tier) {
            (FeeTier::Custom, FeeTier::Custom) => FeeTier::Medium,
            (FeeTier::Custom, default) => default,
            (tier, _) => tier,
        };
        let base = self.tiers.get(base_tier);
        let base_fee = base.priority_fee_micro_lamports as f64;

        let (fee, source) = if !self.dynamic {
            (base_fee, FeeSource::Static)
        } else {
            match sample.as_ref().and_then(|s| s.as_ref().ok()).and_then(|obs| self.recent_mean(obs)) {
                Some(avg) => {
                    let multiplier = (avg / self.reference_fee as f64).max(1.0);
                    let boost = self.urgency_boost(direction, quantity_fraction);
                    let cap = base_fee * self.ceiling * self.heuristics.ceiling_headroom;
                    (
                        (base_fee * multiplier * boost).min(cap),
                        FeeSource::Dynamic,
                    )
                }
                None => (base_fee * self.ceiling, FeeSource::Fallback),
            }
        };

        FeeProfile {
            tier,
            compute_unit_limit: base.compute_unit_limit,
            priority_fee_micro_lamports: fee.round() as u64,
            source,
        }
    }

    fn urgency_boost(&self, direction: TradeDirection, quantity_fraction: Option<f64>) -> f64 {
        let urgent_sell = direction == TradeDirection::Sell
            && quantity_fraction.is_some_and(|f| f >= self.heuristics.urgent_sell_fraction);
        if urgent_sell {
            self.heuristics.sell_urgency_boost
        } else {
            self.heuristics.base_urgency_boost
        }
    }

    /// Mean of the newest `sample_size` observations by slot
    fn recent_mean(&self, observations: &[PrioritizationSample]) -> Option<f64> {
        if observations.is_empty() {
            return None;
        }
        let mut sorted = observations.to_vec();
        sorted.sort_by(|a, b| b.slot.cmp(&a.slot));
        sorted.truncate(self.sample_size);

        let total: u128 = sorted.iter().map(|s| s.fee_micro_lamports as u128).sum();
        Some(total as f64 / sorted.len() as f64)
    }
}

/// Fee estimator backed by live prioritization fee samples
pub struct FeeEstimator {
    policy: FeePolicy,
    provider: Arc<ConnectionProvider>,
}

impl FeeEstimator {
    pub fn new(policy: FeePolicy, provider: Arc<ConnectionProvider>) -> Self {
        Self { policy, provider }
    }

    pub fn policy(&self) -> &FeePolicy {
        &self.policy
    }

    pub async fn estimate(
        &self,
        tier: FeeTier,
        direction: TradeDirection,
        quantity_fraction: Option<f64>,
    ) -> FeeProfile {
        let resolved = self.policy.resolve_tier(tier, direction, quantity_fraction);
        if resolved != tier {
            info!("Fee tier upgraded {} -> {} for {} of {:?}", tier, resolved, direction, quantity_fraction);
        }

        let sample = if self.policy.wants_sample(resolved) {
            let ledger = self.provider.get(Commitment::Confirmed);
            let sample = ledger.get_recent_prioritization_fees().await;
            match &sample {
                Ok(obs) if obs.is_empty() => {
                    warn!("No prioritization fee observations, using fallback fee");
                    metrics::record_fee_fallback();
                }
                Ok(obs) => debug!("Sampled {} prioritization fee observations", obs.len()),
                Err(e) => {
                    warn!("Prioritization fee sampling failed, using fallback fee: {}", e);
                    metrics::record_fee_fallback();
                }
            }
            Some(sample)
        } else {
            None
        };

        let profile = self.policy.profile(tier, direction, quantity_fraction, sample);
        info!(
            "Fee profile: tier={}, cu_limit={}, priority_fee={} ({:?})",
            profile.tier, profile.compute_unit_limit, profile.priority_fee_micro_lamports, profile.source
        );
        profile
    }
}
