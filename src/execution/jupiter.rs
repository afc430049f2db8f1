//! Jupiter Client
//!
//! Handles aggregator integration for swaps:
//! - Quote fetching (single round trip, no internal retry)
//! - Swap transaction building across the request shapes the API has used
//!
//! Response parsing is kept in pure functions so the shape probing can be
//! tested without HTTP.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::errors::TradeError;
use crate::config::AggregatorConfig;

/// Aggregator transport failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("aggregator unreachable: {0}")]
    Unreachable(String),
    #[error("aggregator returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("aggregator response not JSON: {0}")]
    Decode(String),
}

/// JSON-over-HTTP access to the aggregator
#[async_trait]
pub trait AggregatorTransport: Send + Sync {
    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, TransportError>;

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, TransportError>;
}

/// `reqwest` transport
pub struct HttpTransport {
    client: Client,
    api_url: String,
}

impl HttpTransport {
    pub fn new(config: &AggregatorConfig) -> anyhow::Result<Self> {
        use anyhow::Context;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    async fn read(response: reqwest::Response) -> Result<Value, TransportError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status: status.as_u16(), body });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_connect() || err.is_timeout() || err.is_request() {
        TransportError::Unreachable(err.to_string())
    } else {
        TransportError::Decode(err.to_string())
    }
}

#[async_trait]
impl AggregatorTransport for HttpTransport {
    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, TransportError> {
        let url = format!("{}/{}", self.api_url, path);
        debug!("GET {}", url);
        let response = self.client.get(&url).query(query).send().await.map_err(classify)?;
        Self::read(response).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, TransportError> {
        let url = format!("{}/{}", self.api_url, path);
        debug!("POST {}", url);
        let response = self.client.post(&url).json(body).send().await.map_err(classify)?;
        Self::read(response).await
    }
}

/// Priced route from the aggregator. Moved into `SwapBuilder::build`.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub in_amount: u64,
    pub out_amount: u64,
    /// Opaque route plan
    pub route_plan: Value,
    /// Full response, echoed back when building the swap
    raw: Value,
}

impl Quote {
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

/// Fields of a quote response the pipeline reads
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteFields {
    in_amount: String,
    out_amount: String,
    route_plan: Vec<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Parse a quote response; anything unusable is `None`
pub fn parse_quote(value: Value) -> Option<Quote> {
    let fields = QuoteFields::deserialize(&value).ok()?;
    if fields.error.is_some_and(|e| !e.is_null()) {
        return None;
    }
    let in_amount: u64 = fields.in_amount.parse().ok()?;
    let out_amount: u64 = fields.out_amount.parse().ok()?;
    if out_amount == 0 || fields.route_plan.is_empty() {
        return None;
    }

    Some(Quote {
        in_amount,
        out_amount,
        route_plan: Value::Array(fields.route_plan),
        raw: value,
    })
}

pub struct QuoteClient {
    transport: Arc<dyn AggregatorTransport>,
}

impl QuoteClient {
    pub fn new(transport: Arc<dyn AggregatorTransport>) -> Self {
        Self { transport }
    }

    pub async fn quote(
        &self,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        amount_raw: u64,
        slippage_bps: u16,
    ) -> Result<Quote, TradeError> {
        let query = [
            ("inputMint", input_mint.to_string()),
            ("outputMint", output_mint.to_string()),
            ("amount", amount_raw.to_string()),
            ("slippageBps", slippage_bps.to_string()),
        ];

        let response = match self.transport.get_json("quote", &query).await {
            Ok(value) => value,
            Err(TransportError::Unreachable(detail)) => {
                return Err(TradeError::Connectivity { detail });
            }
            Err(e) => {
                return Err(TradeError::QuoteUnavailable { detail: e.to_string() });
            }
        };

        let quote = parse_quote(response).ok_or_else(|| TradeError::QuoteUnavailable {
            detail: format!("no usable route for {} -> {}", input_mint, output_mint),
        })?;

        info!(
            "Quote: {} {} -> {} {} ({} hops)",
            quote.in_amount,
            input_mint,
            quote.out_amount,
            output_mint,
            quote.route_plan.as_array().map_or(0, |r| r.len())
        );
        Ok(quote)
    }
}

/// Transaction wire format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    Versioned,
    Legacy,
}

/// Unsigned transaction bytes from the aggregator.
///
/// Built as `Versioned`; the submitter decides the real format when it
/// decodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPayload {
    pub format: WireFormat,
    pub raw_bytes: Vec<u8>,
}

/// Request layouts the swap endpoint has accepted, in probe order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestShape {
    /// Quote embedded at top level
    Combined,
    /// `swapRequest.quoteResponse`
    NestedQuoteResponse,
    /// `swapRequest.route`
    NestedRoute,
}

pub const SHAPE_ORDER: [RequestShape; 3] = [
    RequestShape::Combined,
    RequestShape::NestedQuoteResponse,
    RequestShape::NestedRoute,
];

/// Swap request for the current API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequest<'a> {
    quote_response: &'a Value,
    user_public_key: String,
    wrap_and_unwrap_sol: bool,
}

/// Inner body of the older `swapRequest` envelope
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct LegacySwapRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    quote_response: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    route: Option<&'a Value>,
    user_public_key: String,
    #[serde(rename = "wrapUnwrapSOL")]
    wrap_unwrap_sol: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequestEnvelope<'a> {
    swap_request: LegacySwapRequest<'a>,
}

impl<'a> SwapRequestEnvelope<'a> {
    fn new(quote_response: Option<&'a Value>, route: Option<&'a Value>, user: String, wrap_native: bool) -> Self {
        Self {
            swap_request: LegacySwapRequest {
                quote_response,
                route,
                user_public_key: user,
                wrap_unwrap_sol: wrap_native,
            },
        }
    }
}

impl RequestShape {
    pub fn body(self, quote: &Value, user: &Pubkey, wrap_native: bool) -> Result<Value, serde_json::Error> {
        let user = user.to_string();
        match self {
            RequestShape::Combined => serde_json::to_value(SwapRequest {
                quote_response: quote,
                user_public_key: user,
                wrap_and_unwrap_sol: wrap_native,
            }),
            RequestShape::NestedQuoteResponse => {
                serde_json::to_value(SwapRequestEnvelope::new(Some(quote), None, user, wrap_native))
            }
            RequestShape::NestedRoute => {
                serde_json::to_value(SwapRequestEnvelope::new(None, Some(quote), user, wrap_native))
            }
        }
    }
}

/// Places a swap response may carry the base64 transaction
const TRANSACTION_PATHS: [&str; 4] = [
    "/swapTransaction",
    "/swapResponse/swapTransaction",
    "/transaction",
    "/data/swapTransaction",
];

/// First decodable transaction in `response`
pub fn extract_transaction(response: &Value) -> Option<Vec<u8>> {
    TRANSACTION_PATHS.iter().find_map(|path| {
        let encoded = response.pointer(path)?.as_str()?;
        if encoded.is_empty() {
            return None;
        }
        base64::engine::general_purpose::STANDARD.decode(encoded).ok()
    })
}

pub struct SwapBuilder {
    transport: Arc<dyn AggregatorTransport>,
}

impl SwapBuilder {
    pub fn new(transport: Arc<dyn AggregatorTransport>) -> Self {
        Self { transport }
    }

    pub async fn build(
        &self,
        quote: Quote,
        trader: &Pubkey,
        wrap_native: bool,
    ) -> Result<SwapPayload, TradeError> {
        let mut attempts = Vec::with_capacity(SHAPE_ORDER.len());

        for shape in SHAPE_ORDER {
            let body = match shape.body(quote.raw(), trader, wrap_native) {
                Ok(body) => body,
                Err(e) => {
                    attempts.push(format!("{:?}: request encoding failed: {}", shape, e));
                    continue;
                }
            };
            match self.transport.post_json("swap", &body).await {
                Ok(response) => match extract_transaction(&response) {
                    Some(raw_bytes) => {
                        info!("Swap transaction built via {:?} ({} bytes)", shape, raw_bytes.len());
                        return Ok(SwapPayload {
                            format: WireFormat::Versioned,
                            raw_bytes,
                        });
                    }
                    None => {
                        debug!("{:?} response carried no transaction", shape);
                        attempts.push(format!("{:?}: no transaction in response", shape));
                    }
                },
                Err(TransportError::Unreachable(detail)) => {
                    warn!("Aggregator unreachable while building swap via {:?}", shape);
                    return Err(TradeError::Connectivity { detail });
                }
                Err(e) => {
                    debug!("{:?} request failed: {}", shape, e);
                    attempts.push(format!("{:?}: {}", shape, e));
                }
            }
        }

        warn!("All swap request shapes exhausted");
        Err(TradeError::SwapBuildFailure {
            detail: attempts.join("; "),
        })
    }
}
