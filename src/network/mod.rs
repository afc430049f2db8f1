//! Network module
//!
//! Ledger RPC access and the per-commitment connection cache.

pub mod provider;
pub mod rpc_client;

pub use provider::{ConnectionHandle, ConnectionProvider};
pub use rpc_client::{
    LedgerRpc, PrioritizationSample, RpcFailure, RpcLedger, SendOptions, SignatureStatus,
    TransactionRecord,
};
