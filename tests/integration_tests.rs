//! Integration Tests for the swap execution pipeline
//!
//! Drives `TradeEngine::execute_trade` end to end against an in-memory
//! ledger and a scripted aggregator.

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use solana_sdk::{
    compute_budget::{self, ComputeBudgetInstruction},
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    message::{v0, Message, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::{Transaction, VersionedTransaction},
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use sol_swap_exec::config::AppConfig;
use sol_swap_exec::execution::{
    AggregatorTransport, ConfirmationStatus, FeeSource, TradeEngine, TradeError, TradeIntent, TransportError,
    WireFormat,
};
use sol_swap_exec::network::{
    ConnectionHandle, ConnectionProvider, LedgerRpc, PrioritizationSample, RpcFailure, SendOptions,
    SignatureStatus, TransactionRecord,
};
use sol_swap_exec::{Commitment, FeeTier, TradeDirection};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LedgerScript {
    statuses: VecDeque<Result<Option<SignatureStatus>, RpcFailure>>,
    lookup: Option<Result<Option<TransactionRecord>, RpcFailure>>,
    send_failure: Option<RpcFailure>,
    sent: Vec<(VersionedTransaction, SendOptions)>,
    status_polls: u32,
    lookups: u32,
}

/// In-memory ledger shared by every commitment level
#[derive(Default)]
struct FakeLedger {
    script: Mutex<LedgerScript>,
}

impl FakeLedger {
    fn with_statuses(statuses: Vec<Result<Option<SignatureStatus>, RpcFailure>>) -> Arc<Self> {
        let ledger = Self::default();
        ledger.script.lock().unwrap().statuses = statuses.into();
        Arc::new(ledger)
    }

    fn set_lookup(&self, lookup: Result<Option<TransactionRecord>, RpcFailure>) {
        self.script.lock().unwrap().lookup = Some(lookup);
    }

    fn fail_send(&self, failure: RpcFailure) {
        self.script.lock().unwrap().send_failure = Some(failure);
    }

    fn sent(&self) -> Vec<(VersionedTransaction, SendOptions)> {
        self.script.lock().unwrap().sent.clone()
    }

    fn status_polls(&self) -> u32 {
        self.script.lock().unwrap().status_polls
    }

    fn lookups(&self) -> u32 {
        self.script.lock().unwrap().lookups
    }
}

#[async_trait]
impl LedgerRpc for FakeLedger {
    fn commitment(&self) -> Commitment {
        Commitment::Finalized
    }

    async fn get_signature_status(&self, _signature: &Signature) -> Result<Option<SignatureStatus>, RpcFailure> {
        let mut script = self.script.lock().unwrap();
        script.status_polls += 1;
        script.statuses.pop_front().unwrap_or(Ok(None))
    }

    async fn get_transaction(&self, _signature: &Signature) -> Result<Option<TransactionRecord>, RpcFailure> {
        let mut script = self.script.lock().unwrap();
        script.lookups += 1;
        script.lookup.clone().unwrap_or(Ok(None))
    }

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
        options: SendOptions,
    ) -> Result<Signature, RpcFailure> {
        let mut script = self.script.lock().unwrap();
        if let Some(failure) = script.send_failure.clone() {
            return Err(failure);
        }
        script.sent.push((transaction.clone(), options));
        Ok(transaction.signatures[0])
    }

    async fn get_recent_prioritization_fees(&self) -> Result<Vec<PrioritizationSample>, RpcFailure> {
        Ok(vec![
            PrioritizationSample { slot: 10, fee_micro_lamports: 40_000 },
            PrioritizationSample { slot: 11, fee_micro_lamports: 60_000 },
        ])
    }
}

/// Aggregator that answers one quote and one swap response
struct ScriptedAggregator {
    quote: Value,
    swap: Value,
    quote_requests: Mutex<Vec<Vec<(String, String)>>>,
    swap_requests: Mutex<u32>,
}

impl ScriptedAggregator {
    fn new(quote: Value, swap_bytes: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            quote,
            swap: json!({
                "swapTransaction": base64::engine::general_purpose::STANDARD.encode(swap_bytes),
                "lastValidBlockHeight": 250_000_000u64,
            }),
            quote_requests: Mutex::new(Vec::new()),
            swap_requests: Mutex::new(0),
        })
    }

    fn quote_requests(&self) -> Vec<Vec<(String, String)>> {
        self.quote_requests.lock().unwrap().clone()
    }

    fn swap_requests(&self) -> u32 {
        *self.swap_requests.lock().unwrap()
    }
}

#[async_trait]
impl AggregatorTransport for ScriptedAggregator {
    async fn get_json(&self, _path: &str, query: &[(&str, String)]) -> Result<Value, TransportError> {
        self.quote_requests
            .lock()
            .unwrap()
            .push(query.iter().map(|(k, v)| (k.to_string(), v.clone())).collect());
        Ok(self.quote.clone())
    }

    async fn post_json(&self, _path: &str, _body: &Value) -> Result<Value, TransportError> {
        *self.swap_requests.lock().unwrap() += 1;
        Ok(self.swap.clone())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn quote_json() -> Value {
    json!({
        "inputMint": "So11111111111111111111111111111111111111112",
        "inAmount": "500000000",
        "outputMint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
        "outAmount": "75000000",
        "slippageBps": 50,
        "routePlan": [{ "swapInfo": { "label": "Whirlpool" }, "percent": 100 }]
    })
}

fn swap_instruction(trader: &Pubkey) -> Instruction {
    Instruction::new_with_bytes(
        Pubkey::new_unique(),
        &[9, 9, 9],
        vec![
            AccountMeta::new(*trader, true),
            AccountMeta::new(Pubkey::new_unique(), false),
        ],
    )
}

fn v0_swap_bytes(trader: &Pubkey) -> Vec<u8> {
    let message = v0::Message::try_compile(trader, &[swap_instruction(trader)], &[], Hash::new_unique()).unwrap();
    let message = VersionedMessage::V0(message);
    let tx = VersionedTransaction {
        signatures: vec![Signature::default(); message.header().num_required_signatures as usize],
        message,
    };
    bincode::serialize(&tx).unwrap()
}

fn legacy_swap_bytes(trader: &Pubkey) -> Vec<u8> {
    let message = Message::new_with_blockhash(&[swap_instruction(trader)], Some(trader), &Hash::new_unique());
    bincode::serialize(&Transaction::new_unsigned(message)).unwrap()
}

fn status(commitment: Commitment, err: Option<&str>) -> Result<Option<SignatureStatus>, RpcFailure> {
    Ok(Some(SignatureStatus {
        slot: 1_000,
        err: err.map(str::to_string),
        commitment: Some(commitment),
    }))
}

fn engine(config: &AppConfig, ledger: &Arc<FakeLedger>, aggregator: &Arc<ScriptedAggregator>) -> TradeEngine {
    let handle: ConnectionHandle = ledger.clone();
    let provider = Arc::new(ConnectionProvider::with_connector(&config.rpc.url, move |_, _| handle.clone()));
    TradeEngine::new(config, provider, aggregator.clone()).unwrap()
}

fn buy_intent(config: &AppConfig) -> TradeIntent {
    TradeIntent::buy(Pubkey::new_unique(), 500_000_000, &config.trading)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_buy_finalizes_through_versioned_path() {
    let config = AppConfig::default_for_test();
    let trader = Keypair::new();
    let ledger = FakeLedger::with_statuses(vec![
        Ok(None),
        status(Commitment::Confirmed, None),
        status(Commitment::Finalized, None),
    ]);
    let aggregator = ScriptedAggregator::new(quote_json(), &v0_swap_bytes(&trader.pubkey()));
    let intent = buy_intent(&config);

    let result = engine(&config, &ledger, &aggregator).execute_trade(&intent, &trader).await;

    assert!(result.success, "trade failed: {:?}", result.error);
    assert!(result.error.is_none());
    assert_eq!(result.format, Some(WireFormat::Versioned));
    assert_eq!(result.in_amount, Some(500_000_000));
    assert_eq!(result.out_amount, Some(75_000_000));

    let confirmation = result.confirmation.as_ref().unwrap();
    assert_eq!(confirmation.status, ConfirmationStatus::Finalized);
    assert_eq!(confirmation.polls, 3);
    assert_eq!(ledger.lookups(), 0);

    // Buy routes native -> asset
    let query = &aggregator.quote_requests()[0];
    assert!(query.contains(&("inputMint".to_string(), config.aggregator.native_mint.clone())));
    assert!(query.contains(&("outputMint".to_string(), intent.asset_mint.to_string())));
    assert!(query.contains(&("amount".to_string(), "500000000".to_string())));

    let sent = ledger.sent();
    assert_eq!(sent.len(), 1);
    let (tx, options) = &sent[0];
    assert_eq!(result.signature, Some(tx.signatures[0]));
    assert!(tx.signatures[0].verify(trader.pubkey().as_ref(), &tx.message.serialize()));
    assert_eq!(
        *options,
        SendOptions {
            skip_preflight: false,
            preflight: Commitment::Confirmed,
            max_retries: config.rpc.send_max_retries,
        }
    );
}

#[tokio::test]
async fn test_success_flag_matches_finalized_status() {
    let config = AppConfig::default_for_test();
    let trader = Keypair::new();
    let ledger = FakeLedger::with_statuses(vec![status(Commitment::Finalized, None)]);
    let aggregator = ScriptedAggregator::new(quote_json(), &v0_swap_bytes(&trader.pubkey()));

    let result = engine(&config, &ledger, &aggregator)
        .execute_trade(&buy_intent(&config), &trader)
        .await;

    let finalized = result
        .confirmation
        .as_ref()
        .is_some_and(|c| c.status == ConfirmationStatus::Finalized);
    assert_eq!(result.success, finalized);
    assert!(result.finished_at >= result.started_at);
}

#[tokio::test]
async fn test_unusable_quote_short_circuits() {
    let config = AppConfig::default_for_test();
    let trader = Keypair::new();
    let ledger = FakeLedger::with_statuses(vec![]);
    let aggregator = ScriptedAggregator::new(json!({ "error": "Could not find any route" }), &[]);

    let result = engine(&config, &ledger, &aggregator)
        .execute_trade(&buy_intent(&config), &trader)
        .await;

    assert!(!result.success);
    assert_eq!(result.error.as_ref().map(TradeError::kind), Some("quote_unavailable"));
    assert_eq!(aggregator.swap_requests(), 0);
    assert!(ledger.sent().is_empty());
    assert_eq!(ledger.status_polls(), 0);
    assert!(result.signature.is_none());
}

#[tokio::test]
async fn test_invalid_intent_makes_no_requests() {
    let config = AppConfig::default_for_test();
    let trader = Keypair::new();
    let ledger = FakeLedger::with_statuses(vec![]);
    let aggregator = ScriptedAggregator::new(quote_json(), &v0_swap_bytes(&trader.pubkey()));
    let intent = TradeIntent {
        amount_raw: 0,
        ..buy_intent(&config)
    };

    let result = engine(&config, &ledger, &aggregator).execute_trade(&intent, &trader).await;

    assert_eq!(result.error.as_ref().map(TradeError::kind), Some("invalid_intent"));
    assert!(aggregator.quote_requests().is_empty());
}

#[tokio::test]
async fn test_legacy_payload_gets_budget_instructions_first() {
    let config = AppConfig::default_for_test();
    assert!(config.fees.priority_fee_multiplier > 1.0);
    let trader = Keypair::new();
    let ledger = FakeLedger::with_statuses(vec![status(Commitment::Finalized, None)]);
    let aggregator = ScriptedAggregator::new(quote_json(), &legacy_swap_bytes(&trader.pubkey()));

    let result = engine(&config, &ledger, &aggregator)
        .execute_trade(&buy_intent(&config), &trader)
        .await;

    assert!(result.success, "trade failed: {:?}", result.error);
    assert_eq!(result.format, Some(WireFormat::Legacy));
    let fees = result.fee_profile.unwrap();

    let (tx, _) = &ledger.sent()[0];
    let keys = tx.message.static_account_keys();
    let instructions = tx.message.instructions();
    assert_eq!(instructions.len(), 3);

    let price = &instructions[0];
    let limit = &instructions[1];
    assert_eq!(keys[price.program_id_index as usize], compute_budget::id());
    assert_eq!(
        price.data,
        ComputeBudgetInstruction::set_compute_unit_price(fees.priority_fee_micro_lamports).data
    );
    assert_eq!(keys[limit.program_id_index as usize], compute_budget::id());
    assert_eq!(
        limit.data,
        ComputeBudgetInstruction::set_compute_unit_limit(fees.compute_unit_limit).data
    );
    assert_ne!(keys[instructions[2].program_id_index as usize], compute_budget::id());
    assert!(tx.signatures[0].verify(trader.pubkey().as_ref(), &tx.message.serialize()));
}

#[tokio::test]
async fn test_large_sell_upgrades_to_static_high_tier() {
    let config = AppConfig::default_for_test();
    assert!(!config.fees.dynamic_fees);
    assert_eq!(config.trading.default_fee_tier, FeeTier::Medium);
    let trader = Keypair::new();
    let ledger = FakeLedger::with_statuses(vec![status(Commitment::Finalized, None)]);
    let aggregator = ScriptedAggregator::new(quote_json(), &v0_swap_bytes(&trader.pubkey()));
    let intent = TradeIntent::sell(Pubkey::new_unique(), 1_000_000, Some(0.8), &config.trading);

    let result = engine(&config, &ledger, &aggregator).execute_trade(&intent, &trader).await;

    assert_eq!(result.direction, TradeDirection::Sell);
    let fees = result.fee_profile.unwrap();
    let high = config.fees.tiers.get(FeeTier::High);
    assert_eq!(fees.tier, FeeTier::High);
    assert_eq!(fees.source, FeeSource::Static);
    assert_eq!(fees.compute_unit_limit, high.compute_unit_limit);
    assert_eq!(fees.priority_fee_micro_lamports, high.priority_fee_micro_lamports);

    // Sell routes asset -> native
    let query = &aggregator.quote_requests()[0];
    assert!(query.contains(&("inputMint".to_string(), intent.asset_mint.to_string())));
}

#[tokio::test]
async fn test_dynamic_fees_sampled_from_ledger() {
    let mut config = AppConfig::default_for_test();
    config.fees.dynamic_fees = true;
    let trader = Keypair::new();
    let ledger = FakeLedger::with_statuses(vec![status(Commitment::Finalized, None)]);
    let aggregator = ScriptedAggregator::new(quote_json(), &v0_swap_bytes(&trader.pubkey()));

    let result = engine(&config, &ledger, &aggregator)
        .execute_trade(&buy_intent(&config), &trader)
        .await;

    // mean 50_000 / reference 10_000 = 5x, boosted 1.2x, capped at base * 2.0 * 1.5
    let fees = result.fee_profile.unwrap();
    let base = config.fees.tiers.get(FeeTier::Medium).priority_fee_micro_lamports;
    assert_eq!(fees.source, FeeSource::Dynamic);
    assert_eq!(fees.priority_fee_micro_lamports, base * 3);
}

#[tokio::test]
async fn test_anti_mev_skips_preflight() {
    let mut config = AppConfig::default_for_test();
    config.trading.anti_mev = true;
    let trader = Keypair::new();
    let ledger = FakeLedger::with_statuses(vec![status(Commitment::Finalized, None)]);
    let aggregator = ScriptedAggregator::new(quote_json(), &v0_swap_bytes(&trader.pubkey()));

    engine(&config, &ledger, &aggregator)
        .execute_trade(&buy_intent(&config), &trader)
        .await;

    let (_, options) = &ledger.sent()[0];
    assert!(options.skip_preflight);
    assert_eq!(options.preflight, Commitment::Processed);
}

#[tokio::test]
async fn test_on_chain_error_reported_with_signature() {
    let config = AppConfig::default_for_test();
    let trader = Keypair::new();
    let ledger = FakeLedger::with_statuses(vec![status(
        Commitment::Confirmed,
        Some("InstructionError(2, Custom(6001))"),
    )]);
    let aggregator = ScriptedAggregator::new(quote_json(), &v0_swap_bytes(&trader.pubkey()));

    let result = engine(&config, &ledger, &aggregator)
        .execute_trade(&buy_intent(&config), &trader)
        .await;

    assert!(!result.success);
    assert_eq!(ledger.status_polls(), 1);
    assert_eq!(ledger.lookups(), 0);
    match result.error {
        Some(TradeError::OnChainExecution { signature, error }) => {
            assert_eq!(signature, result.signature);
            assert!(signature.is_some());
            assert_eq!(error, "InstructionError(2, Custom(6001))");
        }
        other => panic!("expected on-chain failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unresolved_transaction_not_found() {
    let config = AppConfig::default_for_test();
    let trader = Keypair::new();
    let ledger = FakeLedger::with_statuses(vec![
        Ok(None),
        Err(RpcFailure::Unreachable("connection reset".into())),
        Ok(None),
    ]);
    let aggregator = ScriptedAggregator::new(quote_json(), &v0_swap_bytes(&trader.pubkey()));

    let result = engine(&config, &ledger, &aggregator)
        .execute_trade(&buy_intent(&config), &trader)
        .await;

    assert_eq!(ledger.status_polls(), config.confirmation.max_retries);
    assert_eq!(ledger.lookups(), 1);
    assert_eq!(
        result.confirmation.as_ref().map(|c| c.status),
        Some(ConfirmationStatus::NotFound)
    );
    let error = result.error.unwrap();
    assert_eq!(error.kind(), "not_found");
    assert_eq!(error.signature(), result.signature);
}

#[tokio::test]
async fn test_evicted_status_resolved_by_lookup() {
    let config = AppConfig::default_for_test();
    let trader = Keypair::new();
    let ledger = FakeLedger::with_statuses(vec![]);
    ledger.set_lookup(Ok(Some(TransactionRecord { slot: 1_234, err: None })));
    let aggregator = ScriptedAggregator::new(quote_json(), &v0_swap_bytes(&trader.pubkey()));

    let result = engine(&config, &ledger, &aggregator)
        .execute_trade(&buy_intent(&config), &trader)
        .await;

    assert!(result.success);
    assert!(result.confirmation.unwrap().used_direct_lookup);
}

#[tokio::test]
async fn test_confirmed_only_is_verification_timeout() {
    let config = AppConfig::default_for_test();
    let trader = Keypair::new();
    let ledger = FakeLedger::with_statuses(vec![
        status(Commitment::Confirmed, None),
        status(Commitment::Confirmed, None),
        status(Commitment::Confirmed, None),
    ]);
    let aggregator = ScriptedAggregator::new(quote_json(), &v0_swap_bytes(&trader.pubkey()));

    let result = engine(&config, &ledger, &aggregator)
        .execute_trade(&buy_intent(&config), &trader)
        .await;

    assert_eq!(
        result.confirmation.as_ref().map(|c| c.status),
        Some(ConfirmationStatus::NotFinalized)
    );
    assert_eq!(result.error.as_ref().map(TradeError::kind), Some("verification_timeout"));
}

#[tokio::test]
async fn test_undecodable_payload_is_submission_failure() {
    let config = AppConfig::default_for_test();
    let trader = Keypair::new();
    let ledger = FakeLedger::with_statuses(vec![]);
    let aggregator = ScriptedAggregator::new(quote_json(), &[0xde, 0xad, 0xbe, 0xef]);

    let result = engine(&config, &ledger, &aggregator)
        .execute_trade(&buy_intent(&config), &trader)
        .await;

    assert_eq!(result.error.as_ref().map(TradeError::kind), Some("submission_failure"));
    assert!(ledger.sent().is_empty());
    assert_eq!(ledger.status_polls(), 0);
}

#[tokio::test]
async fn test_preflight_rejection_is_on_chain_error() {
    let config = AppConfig::default_for_test();
    let trader = Keypair::new();
    let ledger = FakeLedger::with_statuses(vec![]);
    ledger.fail_send(RpcFailure::Rejected("Transaction simulation failed".into()));
    let aggregator = ScriptedAggregator::new(quote_json(), &v0_swap_bytes(&trader.pubkey()));

    let result = engine(&config, &ledger, &aggregator)
        .execute_trade(&buy_intent(&config), &trader)
        .await;

    assert_eq!(
        result.error,
        Some(TradeError::OnChainExecution {
            signature: None,
            error: "Transaction simulation failed".into(),
        })
    );
    assert_eq!(ledger.status_polls(), 0);
}

#[tokio::test]
async fn test_result_serializes_as_json() {
    let config = AppConfig::default_for_test();
    let trader = Keypair::new();
    let ledger = FakeLedger::with_statuses(vec![status(Commitment::Finalized, None)]);
    let aggregator = ScriptedAggregator::new(quote_json(), &v0_swap_bytes(&trader.pubkey()));
    let intent = buy_intent(&config);

    let result = engine(&config, &ledger, &aggregator).execute_trade(&intent, &trader).await;
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["success"], true);
    assert_eq!(json["direction"], "buy");
    assert_eq!(json["asset_mint"], intent.asset_mint.to_string());
    assert_eq!(json["signature"], result.signature.unwrap().to_string());
    assert_eq!(json["confirmation"]["status"], "finalized");
    assert_eq!(json["format"], "versioned");
    assert!(json["error"].is_null());
}

#[test]
fn test_config_from_yaml() {
    let yaml = r#"
rpc:
  url: "https://api.devnet.solana.com"
trading:
  slippage_bps: 100
  anti_mev: true
  default_fee_tier: high
fees:
  dynamic_fees: true
  priority_fee_multiplier: 3.0
  tiers:
    low: { compute_unit_limit: 150000, priority_fee_micro_lamports: 500 }
    medium: { compute_unit_limit: 300000, priority_fee_micro_lamports: 10000 }
    high: { compute_unit_limit: 400000, priority_fee_micro_lamports: 50000 }
    custom: { compute_unit_limit: 600000, priority_fee_micro_lamports: 250000 }
confirmation:
  max_retries: 10
  poll_interval_ms: 500
wallet:
  keypair_path: "~/.config/solana/id.json"
"#;

    let config = AppConfig::from_yaml(yaml).unwrap();
    assert_eq!(config.trading.slippage_bps, 100);
    assert_eq!(config.trading.default_fee_tier, FeeTier::High);
    assert!(config.fees.dynamic_fees);
    assert_eq!(config.fees.tiers.get(FeeTier::Custom).priority_fee_micro_lamports, 250_000);
    assert_eq!(config.confirmation.max_retries, 10);
    assert!(TradeEngine::from_config(&config).is_ok());
}
