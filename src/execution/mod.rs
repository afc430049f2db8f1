//! Execution Module
//!
//! Provides the swap execution pipeline:
//! - Priority fee estimation
//! - Jupiter quote and swap building
//! - Signing and submission across both wire formats
//! - Finality verification

pub mod engine;
pub mod errors;
pub mod fees;
pub mod finality;
pub mod jupiter;
pub mod submitter;

pub use engine::{TradeEngine, TradeIntent, TradeResult};
pub use errors::TradeError;
pub use fees::{FeeEstimator, FeePolicy, FeeProfile, FeeSource};
pub use finality::{ConfirmationResult, ConfirmationStatus, FinalityVerifier, RetryPolicy};
pub use jupiter::{
    AggregatorTransport, HttpTransport, Quote, QuoteClient, SwapBuilder, SwapPayload, TransportError, WireFormat,
};
pub use submitter::{Submission, TransactionSubmitter};
