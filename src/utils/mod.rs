//! Shared types and helpers

pub mod helpers;
pub mod types;

pub use types::{Commitment, FeeTier, TradeDirection};
