//! Helper functions

use anyhow::{Context, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serializer;
use solana_sdk::signature::Keypair;
use std::fmt::Display;
use std::path::Path;
use std::time::Instant;

/// Base-unit decimals of the native currency
pub const NATIVE_DECIMALS: u32 = 9;

pub fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

pub fn load_keypair(path: &Path) -> Result<Keypair> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read keypair file: {:?}", path))?;

    let bytes: Vec<u8> = serde_json::from_str(&content)
        .with_context(|| "Failed to parse keypair JSON")?;

    Keypair::from_bytes(&bytes)
        .map_err(|e| anyhow::anyhow!("Invalid keypair: {}", e))
}

pub fn load_keypair_from_env_or_file(env_var: Option<&str>, file_path: &Path) -> Result<Keypair> {
    if let Some(key_str) = env_var.and_then(|name| std::env::var(name).ok()) {
        if let Ok(bytes) = serde_json::from_str::<Vec<u8>>(&key_str) {
            return Keypair::from_bytes(&bytes)
                .map_err(|e| anyhow::anyhow!("Invalid keypair from env: {}", e));
        }
        if let Ok(bytes) = bs58::decode(key_str.trim()).into_vec() {
            return Keypair::from_bytes(&bytes)
                .map_err(|e| anyhow::anyhow!("Invalid keypair from env: {}", e));
        }
    }
    load_keypair(file_path)
}

/// Convert a UI amount into raw base units without floating point.
///
/// Returns `None` for negative amounts, amounts with more precision than
/// `decimals`, or values that overflow `u64`.
pub fn ui_amount_to_raw(amount: Decimal, decimals: u32) -> Option<u64> {
    if amount.is_sign_negative() {
        return None;
    }
    let scaled = amount.checked_mul(Decimal::from(10u64.checked_pow(decimals)?))?;
    if scaled.fract() != Decimal::ZERO {
        return None;
    }
    scaled.to_u64()
}

/// Serialize through `Display`, e.g. base58 keys and signatures
pub fn serialize_display<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

pub fn serialize_display_opt<T: Display, S: Serializer>(
    value: &Option<T>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.collect_str(v),
        None => serializer.serialize_none(),
    }
}
