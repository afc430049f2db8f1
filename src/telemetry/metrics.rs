//! Prometheus metrics export

use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

pub fn init_metrics(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    register_metrics();
    info!("Prometheus metrics server started on {}", addr);
    Ok(())
}

fn register_metrics() {
    // Trade metrics
    describe_counter!("sol_swap_trades_total", "Total number of trades attempted");
    describe_counter!("sol_swap_trades_success", "Trades that reached finalized commitment");
    describe_counter!("sol_swap_trades_failed", "Trades that ended in any failure, labelled by kind");

    // Pipeline degradation
    describe_counter!("sol_swap_fee_fallbacks_total", "Priority fee samples that failed and fell back to static fees");
    describe_counter!("sol_swap_legacy_fallbacks_total", "Payloads submitted through the legacy wire format");
    describe_counter!("sol_swap_confirmation_polls_total", "Signature status polls issued");

    // Latency
    describe_histogram!("sol_swap_execution_latency_ms", "End-to-end trade latency");
}

pub fn record_trade_success() {
    counter!("sol_swap_trades_total").increment(1);
    counter!("sol_swap_trades_success").increment(1);
}

pub fn record_trade_failure(kind: &'static str) {
    counter!("sol_swap_trades_total").increment(1);
    counter!("sol_swap_trades_failed", "kind" => kind).increment(1);
}

pub fn record_fee_fallback() {
    counter!("sol_swap_fee_fallbacks_total").increment(1);
}

pub fn record_legacy_fallback() {
    counter!("sol_swap_legacy_fallbacks_total").increment(1);
}

pub fn record_confirmation_poll() {
    counter!("sol_swap_confirmation_polls_total").increment(1);
}

pub fn record_execution_latency(latency_ms: f64) {
    histogram!("sol_swap_execution_latency_ms").record(latency_ms);
}
