//! Trade failure taxonomy

use serde::Serialize;
use solana_sdk::signature::Signature;
use thiserror::Error;

use crate::network::RpcFailure;
use crate::utils::helpers::{serialize_display, serialize_display_opt};

/// Every way a trade can end without finalizing
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TradeError {
    #[error("invalid trade intent: {detail}")]
    InvalidIntent { detail: String },

    #[error("endpoint unreachable: {detail}")]
    Connectivity { detail: String },

    #[error("no usable quote: {detail}")]
    QuoteUnavailable { detail: String },

    #[error("swap build failed: {detail}")]
    SwapBuildFailure { detail: String },

    #[error("submission failed: {detail}")]
    SubmissionFailure { detail: String },

    #[error("transaction {signature} not finalized: {detail}")]
    VerificationTimeout {
        #[serde(serialize_with = "serialize_display")]
        signature: Signature,
        detail: String,
    },

    #[error("transaction {signature} not found on chain")]
    NotFound {
        #[serde(serialize_with = "serialize_display")]
        signature: Signature,
    },

    #[error("transaction rejected on chain: {error}")]
    OnChainExecution {
        #[serde(serialize_with = "serialize_display_opt")]
        signature: Option<Signature>,
        error: String,
    },
}

impl TradeError {
    /// Stable label for metrics and output
    pub fn kind(&self) -> &'static str {
        match self {
            TradeError::InvalidIntent { .. } => "invalid_intent",
            TradeError::Connectivity { .. } => "connectivity",
            TradeError::QuoteUnavailable { .. } => "quote_unavailable",
            TradeError::SwapBuildFailure { .. } => "swap_build_failure",
            TradeError::SubmissionFailure { .. } => "submission_failure",
            TradeError::VerificationTimeout { .. } => "verification_timeout",
            TradeError::NotFound { .. } => "not_found",
            TradeError::OnChainExecution { .. } => "on_chain_execution",
        }
    }

    /// Signature to investigate out-of-band, if the transaction was sent
    pub fn signature(&self) -> Option<Signature> {
        match self {
            TradeError::VerificationTimeout { signature, .. } | TradeError::NotFound { signature } => {
                Some(*signature)
            }
            TradeError::OnChainExecution { signature, .. } => *signature,
            _ => None,
        }
    }

    pub(crate) fn from_send_failure(failure: RpcFailure) -> Self {
        match failure {
            RpcFailure::Unreachable(detail) => TradeError::Connectivity { detail },
            RpcFailure::Rejected(error) => TradeError::OnChainExecution {
                signature: None,
                error,
            },
        }
    }
}
