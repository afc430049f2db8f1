//! Transaction Submitter
//!
//! Handles transaction submission with:
//! - Versioned decoding first, legacy decoding as the fallback
//! - Compute budget injection for legacy payloads
//! - Anti-MEV send options (skip preflight, processed preflight level)
//!
//! Submission returns as soon as the node accepts the transaction; finality
//! is the verifier's job.

use solana_sdk::{
    compute_budget::{self, ComputeBudgetInstruction},
    instruction::{AccountMeta, Instruction},
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    transaction::{Transaction, VersionedTransaction},
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::errors::TradeError;
use super::fees::FeeProfile;
use super::jupiter::{SwapPayload, WireFormat};
use crate::network::{ConnectionProvider, SendOptions};
use crate::telemetry::metrics;
use crate::utils::Commitment;

/// Accepted submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub signature: Signature,
    /// Format the payload actually decoded as
    pub format: WireFormat,
}

/// Decode as a v0 transaction. Legacy-layout messages are refused so they
/// take the legacy path and receive explicit budget instructions.
pub fn decode_versioned(bytes: &[u8]) -> Result<VersionedTransaction, String> {
    let tx: VersionedTransaction = bincode::deserialize(bytes).map_err(|e| e.to_string())?;
    match tx.message {
        VersionedMessage::V0(_) => Ok(tx),
        VersionedMessage::Legacy(_) => Err("message uses the legacy layout".to_string()),
    }
}

pub fn decode_legacy(bytes: &[u8]) -> Result<Transaction, String> {
    bincode::deserialize(bytes).map_err(|e| e.to_string())
}

fn account_flags(message: &Message, index: usize) -> (bool, bool) {
    let header = &message.header;
    let signers = header.num_required_signatures as usize;
    let is_signer = index < signers;
    let is_writable = if is_signer {
        index < signers.saturating_sub(header.num_readonly_signed_accounts as usize)
    } else {
        index
            < message
                .account_keys
                .len()
                .saturating_sub(header.num_readonly_unsigned_accounts as usize)
    };
    (is_signer, is_writable)
}

/// Expand compiled instructions back into full account metas
pub fn decompile_instructions(message: &Message) -> Result<Vec<Instruction>, String> {
    let key = |index: u8| {
        message
            .account_keys
            .get(index as usize)
            .copied()
            .ok_or_else(|| format!("account index {} out of range", index))
    };

    message
        .instructions
        .iter()
        .map(|compiled| {
            let program_id = key(compiled.program_id_index)?;
            let accounts = compiled
                .accounts
                .iter()
                .map(|&index| {
                    let pubkey = key(index)?;
                    let (is_signer, is_writable) = account_flags(message, index as usize);
                    Ok(AccountMeta {
                        pubkey,
                        is_signer,
                        is_writable,
                    })
                })
                .collect::<Result<Vec<_>, String>>()?;
            Ok(Instruction {
                program_id,
                accounts,
                data: compiled.data.clone(),
            })
        })
        .collect()
}

/// The trader must be the only required signer of a legacy payload: the
/// rebuilt message can carry no signature but the trader's.
pub fn ensure_sole_signer(message: &Message, trader: &Pubkey) -> Result<(), String> {
    let required = message.header.num_required_signatures as usize;
    let signers = &message.account_keys[..required.min(message.account_keys.len())];
    if !signers.contains(trader) {
        return Err(format!("{} is not a required signer", trader));
    }
    match signers.iter().find(|key| *key != trader) {
        Some(other) => Err(format!(
            "legacy payload also requires {} to sign; its signature cannot survive the compute budget rebuild",
            other
        )),
        None => Ok(()),
    }
}

/// Budget instructions in execution order: price (optional) then limit
pub fn budget_instructions(fees: &FeeProfile, include_price: bool) -> Vec<Instruction> {
    let mut instructions = Vec::with_capacity(2);
    if include_price {
        instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
            fees.priority_fee_micro_lamports,
        ));
    }
    instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(
        fees.compute_unit_limit,
    ));
    instructions
}

/// Rebuild a legacy message with our budget instructions ahead of every
/// swap instruction. Budget instructions already in the payload are dropped.
pub fn with_compute_budget(
    transaction: &Transaction,
    fees: &FeeProfile,
    include_price: bool,
) -> Result<Message, String> {
    let message = &transaction.message;
    let payer = message
        .account_keys
        .first()
        .ok_or_else(|| "legacy message has no fee payer".to_string())?;

    let swap_instructions = decompile_instructions(message)?
        .into_iter()
        .filter(|ix| ix.program_id != compute_budget::id());

    let mut instructions = budget_instructions(fees, include_price);
    instructions.extend(swap_instructions);

    Ok(Message::new_with_blockhash(
        &instructions,
        Some(payer),
        &message.recent_blockhash,
    ))
}

/// Sign a versioned transaction in place, in the trader's signer slot
pub fn sign_versioned(transaction: &mut VersionedTransaction, keypair: &Keypair) -> Result<(), String> {
    let required = transaction.message.header().num_required_signatures as usize;
    let trader = keypair.pubkey();
    let slot = transaction
        .message
        .static_account_keys()
        .iter()
        .take(required)
        .position(|key| *key == trader)
        .ok_or_else(|| format!("{} is not a required signer", trader))?;

    if transaction.signatures.len() < required {
        transaction.signatures.resize(required, Signature::default());
    }
    transaction.signatures[slot] = keypair.sign_message(&transaction.message.serialize());
    Ok(())
}

/// Send options for the anti-MEV toggle
pub fn send_options(anti_mev: bool, max_retries: usize) -> SendOptions {
    SendOptions {
        skip_preflight: anti_mev,
        preflight: if anti_mev {
            Commitment::Processed
        } else {
            Commitment::Confirmed
        },
        max_retries,
    }
}

/// Transaction submitter
pub struct TransactionSubmitter {
    provider: Arc<ConnectionProvider>,
    send_max_retries: usize,
    priority_fee_multiplier: f64,
}

impl TransactionSubmitter {
    pub fn new(provider: Arc<ConnectionProvider>, send_max_retries: usize, priority_fee_multiplier: f64) -> Self {
        Self {
            provider,
            send_max_retries,
            priority_fee_multiplier,
        }
    }

    /// Decode and sign. Versioned decoding is always tried first.
    pub fn prepare(
        &self,
        payload: &SwapPayload,
        keypair: &Keypair,
        fees: &FeeProfile,
    ) -> Result<(VersionedTransaction, WireFormat), TradeError> {
        let versioned_err = match decode_versioned(&payload.raw_bytes) {
            Ok(mut tx) => {
                sign_versioned(&mut tx, keypair)
                    .map_err(|detail| TradeError::SubmissionFailure { detail })?;
                return Ok((tx, WireFormat::Versioned));
            }
            Err(e) => e,
        };

        warn!("Versioned decode failed ({}), trying legacy format", versioned_err);
        let legacy = decode_legacy(&payload.raw_bytes).map_err(|legacy_err| {
            TradeError::SubmissionFailure {
                detail: format!("versioned decode: {}; legacy decode: {}", versioned_err, legacy_err),
            }
        })?;

        ensure_sole_signer(&legacy.message, &keypair.pubkey())
            .map_err(|detail| TradeError::SubmissionFailure { detail })?;

        let include_price = self.priority_fee_multiplier > 1.0;
        let message = with_compute_budget(&legacy, fees, include_price)
            .map_err(|detail| TradeError::SubmissionFailure { detail })?;
        let blockhash = message.recent_blockhash;

        let mut tx = Transaction::new_unsigned(message);
        tx.try_partial_sign(&[keypair], blockhash)
            .map_err(|e| TradeError::SubmissionFailure {
                detail: format!("legacy signing failed: {}", e),
            })?;

        metrics::record_legacy_fallback();
        debug!(
            "Legacy payload rebuilt with {} instructions (price instruction: {})",
            tx.message.instructions.len(),
            include_price
        );
        Ok((VersionedTransaction::from(tx), WireFormat::Legacy))
    }

    pub async fn submit(
        &self,
        payload: &SwapPayload,
        keypair: &Keypair,
        anti_mev: bool,
        fees: &FeeProfile,
    ) -> Result<Submission, TradeError> {
        let (transaction, format) = self.prepare(payload, keypair, fees)?;

        let options = send_options(anti_mev, self.send_max_retries);
        let ledger = self.provider.get(options.preflight);
        let signature = ledger
            .send_transaction(&transaction, options)
            .await
            .map_err(TradeError::from_send_failure)?;

        info!(
            "Transaction submitted: {} ({:?}, skip_preflight={})",
            signature, format, options.skip_preflight
        );
        Ok(Submission { signature, format })
    }
}
