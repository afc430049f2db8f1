//! Connection Provider
//!
//! One ledger handle per consistency level, built lazily from the current
//! endpoint and shared read-only across concurrent trades.

use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::rpc_client::{LedgerRpc, RpcLedger};
use crate::config::RpcConfig;
use crate::utils::Commitment;

/// Shared, immutable ledger handle
pub type ConnectionHandle = Arc<dyn LedgerRpc>;

/// Builds a handle for an endpoint at a consistency level
pub type Connector = dyn Fn(&str, Commitment) -> ConnectionHandle + Send + Sync;

pub struct ConnectionProvider {
    endpoint: ArcSwap<String>,
    connector: Box<Connector>,
    cache: DashMap<Commitment, ConnectionHandle>,
}

impl ConnectionProvider {
    /// Provider backed by `RpcLedger` handles
    pub fn new(config: &RpcConfig) -> Self {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        Self::with_connector(&config.url, move |url, commitment| {
            Arc::new(RpcLedger::new(url, commitment, timeout)) as ConnectionHandle
        })
    }

    pub fn with_connector<F>(endpoint: &str, connector: F) -> Self
    where
        F: Fn(&str, Commitment) -> ConnectionHandle + Send + Sync + 'static,
    {
        Self {
            endpoint: ArcSwap::from_pointee(endpoint.to_string()),
            connector: Box::new(connector),
            cache: DashMap::new(),
        }
    }

    /// Cached handle for `level`, built on first use.
    ///
    /// Two trades racing on an empty slot may both build a handle; the first
    /// insert wins and the loser's handle is equivalent, so no lock is held
    /// across construction.
    pub fn get(&self, level: Commitment) -> ConnectionHandle {
        if let Some(handle) = self.cache.get(&level) {
            return handle.clone();
        }

        let endpoint = self.endpoint.load();
        debug!("Building {} connection to {}", level, endpoint.as_str());
        let handle = (self.connector)(endpoint.as_str(), level);

        self.cache.entry(level).or_insert(handle).clone()
    }

    /// Drop every cached handle
    pub fn reset(&self) {
        self.cache.clear();
        info!("Connection cache reset");
    }

    /// Point at a new endpoint and invalidate existing handles
    pub fn set_endpoint(&self, endpoint: &str) {
        self.endpoint.store(Arc::new(endpoint.to_string()));
        self.reset();
        info!("Ledger endpoint switched to {}", endpoint);
    }

    pub fn endpoint(&self) -> String {
        self.endpoint.load().as_ref().clone()
    }

    pub fn cached_levels(&self) -> usize {
        self.cache.len()
    }
}
