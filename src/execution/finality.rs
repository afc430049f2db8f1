//! Finality Verification
//!
//! Two tiers: cheap signature-status polls on a fixed interval, then one
//! direct transaction lookup once the poll budget is spent. Status entries
//! can be evicted from node memory before settlement while the full
//! transaction record stays retrievable, hence the second tier.

use serde::Serialize;
use solana_sdk::signature::Signature;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ConfirmationConfig;
use crate::network::{ConnectionProvider, RpcFailure, SignatureStatus};
use crate::telemetry::metrics;
use crate::utils::helpers::serialize_display;
use crate::utils::Commitment;

/// Bounded fixed-interval retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before giving up; zero means none
    pub max_attempts: u32,
    /// Pause between attempts
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self { max_attempts, interval }
    }
}

impl From<&ConfirmationConfig> for RetryPolicy {
    fn from(config: &ConfirmationConfig) -> Self {
        Self::new(config.max_retries, Duration::from_millis(config.poll_interval_ms))
    }
}

/// Outcome of `poll_until`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// `done` accepted this observation
    Satisfied { value: T, attempts: u32 },
    /// Budget spent; carries the last observation
    Exhausted { last: Option<T>, attempts: u32 },
}

/// Call `fetch` until `done` accepts an observation or the budget runs out.
/// Sleeps `interval` between attempts, never after the last one.
pub async fn poll_until<T, F, Fut, P>(policy: &RetryPolicy, mut fetch: F, mut done: P) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
    P: FnMut(&T) -> bool,
{
    let mut last = None;
    for attempt in 1..=policy.max_attempts {
        let observation = fetch().await;
        if done(&observation) {
            return PollOutcome::Satisfied {
                value: observation,
                attempts: attempt,
            };
        }
        last = Some(observation);
        if attempt < policy.max_attempts {
            sleep(policy.interval).await;
        }
    }
    PollOutcome::Exhausted {
        last,
        attempts: policy.max_attempts,
    }
}

/// Verifier state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalityState {
    Pending,
    ConfirmedNotFinal,
    Finalized,
    Failed(String),
    NotFound,
    VerificationError(String),
}

impl FinalityState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FinalityState::Finalized
                | FinalityState::Failed(_)
                | FinalityState::NotFound
                | FinalityState::VerificationError(_)
        )
    }

    /// Apply one status poll. Failed lookups leave the state unchanged.
    pub fn advance(self, observation: &Result<Option<SignatureStatus>, RpcFailure>) -> FinalityState {
        if self.is_terminal() {
            return self;
        }
        match observation {
            Ok(Some(status)) => {
                if let Some(err) = &status.err {
                    return FinalityState::Failed(err.clone());
                }
                match status.commitment {
                    Some(Commitment::Finalized) => FinalityState::Finalized,
                    Some(Commitment::Confirmed) => FinalityState::ConfirmedNotFinal,
                    _ => self,
                }
            }
            Ok(None) | Err(_) => self,
        }
    }
}

/// Terminal verification status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Finalized,
    Failed,
    /// Seen at confirmed, never at finalized
    NotFinalized,
    NotFound,
    VerificationError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationResult {
    pub status: ConfirmationStatus,
    #[serde(serialize_with = "serialize_display")]
    pub signature: Signature,
    /// On-chain error, or the lookup failure for `VerificationError`
    pub on_chain_error: Option<String>,
    /// Status polls issued
    pub polls: u32,
    /// Whether the result came from the direct transaction lookup
    pub used_direct_lookup: bool,
}

impl ConfirmationResult {
    pub fn is_finalized(&self) -> bool {
        self.status == ConfirmationStatus::Finalized
    }
}

pub struct FinalityVerifier {
    provider: Arc<ConnectionProvider>,
    policy: RetryPolicy,
}

impl FinalityVerifier {
    pub fn new(provider: Arc<ConnectionProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    /// Runs at most `max_attempts` status polls plus one direct lookup
    pub async fn verify(&self, signature: Signature) -> ConfirmationResult {
        let ledger = self.provider.get(Commitment::Finalized);
        let mut state = FinalityState::Pending;

        let fetch = || {
            let ledger = ledger.clone();
            async move {
                metrics::record_confirmation_poll();
                ledger.get_signature_status(&signature).await
            }
        };
        let outcome = poll_until(&self.policy, fetch, |observation| {
            if let Err(e) = observation {
                warn!("Status poll for {} inconclusive: {}", signature, e);
            }
            let next = std::mem::replace(&mut state, FinalityState::Pending).advance(observation);
            if next == FinalityState::ConfirmedNotFinal {
                debug!("{} confirmed, waiting for finality", signature);
            }
            state = next;
            state.is_terminal()
        })
        .await;

        let polls = match outcome {
            PollOutcome::Satisfied { attempts, .. } | PollOutcome::Exhausted { attempts, .. } => attempts,
        };

        if state.is_terminal() {
            return self.finish(signature, state, polls, false);
        }

        debug!("Status polls exhausted for {}, looking up transaction directly", signature);
        let resolved = match ledger.get_transaction(&signature).await {
            Ok(Some(record)) => match record.err {
                None => FinalityState::Finalized,
                Some(err) => FinalityState::Failed(err),
            },
            Ok(None) if state == FinalityState::ConfirmedNotFinal => FinalityState::ConfirmedNotFinal,
            Ok(None) => FinalityState::NotFound,
            Err(e) => FinalityState::VerificationError(e.to_string()),
        };

        self.finish(signature, resolved, polls, true)
    }

    fn finish(&self, signature: Signature, state: FinalityState, polls: u32, used_direct_lookup: bool) -> ConfirmationResult {
        let (status, on_chain_error) = match state {
            FinalityState::Finalized => (ConfirmationStatus::Finalized, None),
            FinalityState::Failed(err) => (ConfirmationStatus::Failed, Some(err)),
            FinalityState::NotFound => (ConfirmationStatus::NotFound, None),
            FinalityState::VerificationError(err) => (ConfirmationStatus::VerificationError, Some(err)),
            FinalityState::Pending => (ConfirmationStatus::NotFound, None),
            FinalityState::ConfirmedNotFinal => (ConfirmationStatus::NotFinalized, None),
        };

        match status {
            ConfirmationStatus::Finalized => info!("Transaction {} finalized after {} polls", signature, polls),
            ConfirmationStatus::Failed => warn!("Transaction {} failed on chain: {:?}", signature, on_chain_error),
            _ => warn!("Transaction {} unresolved: {:?} after {} polls", signature, status, polls),
        }

        ConfirmationResult {
            status,
            signature,
            on_chain_error,
            polls,
            used_direct_lookup,
        }
    }
}
