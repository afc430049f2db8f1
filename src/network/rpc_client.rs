//! Solana RPC Client
//!
//! `LedgerRpc` is the narrow set of ledger calls the execution pipeline
//! needs. `RpcLedger` implements it over the nonblocking `solana-client`
//! RPC client, bound to a single consistency level.

use async_trait::async_trait;
use serde_json::json;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::{
    client_error::{Error as ClientError, ErrorKind as ClientErrorKind},
    config::{RpcSendTransactionConfig, RpcTransactionConfig},
    request::RpcRequest,
};
use solana_sdk::{signature::Signature, transaction::VersionedTransaction};
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, TransactionConfirmationStatus,
    UiTransactionEncoding,
};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use crate::utils::Commitment;

/// Ledger call failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RpcFailure {
    /// Transport-level failure: the endpoint could not be reached
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
    /// The node answered with an error
    #[error("rpc rejected request: {0}")]
    Rejected(String),
}

impl From<ClientError> for RpcFailure {
    fn from(err: ClientError) -> Self {
        match err.kind() {
            ClientErrorKind::Io(_) | ClientErrorKind::Reqwest(_) => {
                RpcFailure::Unreachable(err.to_string())
            }
            _ => RpcFailure::Rejected(err.to_string()),
        }
    }
}

/// Result of one `getSignatureStatuses` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStatus {
    pub slot: u64,
    /// On-chain execution error, rendered
    pub err: Option<String>,
    /// Highest commitment the node reports for the signature
    pub commitment: Option<Commitment>,
}

/// Result of a direct `getTransaction` lookup that found the transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub slot: u64,
    /// On-chain execution error, rendered
    pub err: Option<String>,
}

/// One `getRecentPrioritizationFees` observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrioritizationSample {
    pub slot: u64,
    /// Lowest fee that landed a transaction in this slot
    pub fee_micro_lamports: u64,
}

/// Options for `sendTransaction`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    /// Skip the node's simulation before forwarding
    pub skip_preflight: bool,
    /// Commitment the preflight simulation runs against
    pub preflight: Commitment,
    /// Node-side rebroadcast attempts
    pub max_retries: usize,
}

/// Ledger operations used by the trade pipeline
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Consistency level every call on this handle is made at
    fn commitment(&self) -> Commitment;

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, RpcFailure>;

    /// `Ok(None)` means the node has no record of the transaction
    async fn get_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<TransactionRecord>, RpcFailure>;

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
        options: SendOptions,
    ) -> Result<Signature, RpcFailure>;

    async fn get_recent_prioritization_fees(
        &self,
    ) -> Result<Vec<PrioritizationSample>, RpcFailure>;
}

/// `LedgerRpc` over a JSON-RPC endpoint
pub struct RpcLedger {
    client: RpcClient,
    commitment: Commitment,
}

impl RpcLedger {
    pub fn new(url: &str, commitment: Commitment, timeout: Duration) -> Self {
        let client =
            RpcClient::new_with_timeout_and_commitment(url.to_string(), timeout, commitment.config());
        Self { client, commitment }
    }
}

fn confirmation_to_commitment(status: TransactionConfirmationStatus) -> Commitment {
    match status {
        TransactionConfirmationStatus::Processed => Commitment::Processed,
        TransactionConfirmationStatus::Confirmed => Commitment::Confirmed,
        TransactionConfirmationStatus::Finalized => Commitment::Finalized,
    }
}

/// Nodes that predate `confirmationStatus` report a rooted slot as
/// `confirmations: null`.
fn status_commitment(
    confirmation_status: Option<TransactionConfirmationStatus>,
    confirmations: Option<usize>,
) -> Option<Commitment> {
    match (confirmation_status, confirmations) {
        (Some(status), _) => Some(confirmation_to_commitment(status)),
        (None, None) => Some(Commitment::Finalized),
        (None, Some(_)) => None,
    }
}

#[async_trait]
impl LedgerRpc for RpcLedger {
    fn commitment(&self) -> Commitment {
        self.commitment
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, RpcFailure> {
        let start = Instant::now();
        let response = self.client.get_signature_statuses(&[*signature]).await?;
        debug!("getSignatureStatuses took {:?}", start.elapsed());

        Ok(response.value.into_iter().next().flatten().map(|status| SignatureStatus {
            slot: status.slot,
            err: status.err.as_ref().map(|e| format!("{:?}", e)),
            commitment: status_commitment(status.confirmation_status, status.confirmations),
        }))
    }

    async fn get_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<TransactionRecord>, RpcFailure> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(self.commitment.config()),
            max_supported_transaction_version: Some(0),
        };

        // Raw request so a null result is distinguishable from a failed call
        let found: Option<EncodedConfirmedTransactionWithStatusMeta> = self
            .client
            .send(RpcRequest::GetTransaction, json!([signature.to_string(), config]))
            .await?;

        Ok(found.map(|tx| TransactionRecord {
            slot: tx.slot,
            err: tx
                .transaction
                .meta
                .and_then(|meta| meta.err)
                .map(|e| format!("{:?}", e)),
        }))
    }

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
        options: SendOptions,
    ) -> Result<Signature, RpcFailure> {
        let config = RpcSendTransactionConfig {
            skip_preflight: options.skip_preflight,
            preflight_commitment: Some(options.preflight.level()),
            max_retries: Some(options.max_retries),
            ..RpcSendTransactionConfig::default()
        };

        let start = Instant::now();
        let signature = self
            .client
            .send_transaction_with_config(transaction, config)
            .await?;
        debug!("sendTransaction took {:?}", start.elapsed());
        Ok(signature)
    }

    async fn get_recent_prioritization_fees(
        &self,
    ) -> Result<Vec<PrioritizationSample>, RpcFailure> {
        let fees = self.client.get_recent_prioritization_fees(&[]).await?;
        Ok(fees
            .into_iter()
            .map(|f| PrioritizationSample {
                slot: f.slot,
                fee_micro_lamports: f.prioritization_fee,
            })
            .collect())
    }
}
