//! Solana Swap Execution Library
//!
//! Turns a buy or sell intent into a finalized on-chain swap routed through
//! the Jupiter aggregator.

pub mod config;
pub mod execution;
pub mod network;
pub mod telemetry;
pub mod utils;

// Re-export main types
pub use config::AppConfig;
pub use execution::{TradeEngine, TradeError, TradeIntent, TradeResult};
pub use network::ConnectionProvider;
pub use utils::{Commitment, FeeTier, TradeDirection};
