//! Wallet forensics.
//!
//! Builds a best-effort [`WalletIntelProfile`] for wallets that reach the
//! forensic path. Three lookups run one after the other, each under its own
//! timeout:
//!
//! 1. profile: account creation time (Gamma user profile)
//! 2. portfolio: current portfolio value (Data API), with a positions
//!    fallback; the guard covers both requests
//! 3. on-chain: first funding transaction (Polygonscan), after a pacing delay
//!
//! A failed or timed-out lookup only leaves its fields at their defaults.
//! [`WalletIntel::profile_for`] is infallible.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::EnrichmentConfig;
use crate::platforms::polygonscan::PolygonscanClient;
use crate::platforms::polymarket::PolymarketClient;
use crate::types::{WalletIntelProfile, PRIVATE_WALLET_SOURCE, UNKNOWN_SOURCE};

// ---------------------------------------------------------------------------
// Known entities
// ---------------------------------------------------------------------------

/// Hot wallets and contracts with a known owner (lowercase addresses).
const KNOWN_WALLETS: &[(&str, &str)] = &[
    ("0xa9d1e08c7793af67e9d92fe3028ac693eb80b7d0", "Coinbase"),
    ("0x503828976d22510aad0201ac7ec88293211d23da", "Coinbase"),
    ("0x28c6c06298d514db089934071355e5743bf21d60", "Binance"),
    ("0x21a31ee1afc51d94c2efccaa2092ad1028285549", "Binance Hot Wallet"),
    ("0x12d66f87a04a9e220743712ce6d9bb1b5616b438", "Tornado Cash"),
    ("0x88a14b5da995328831f2479e0004e57879102c48", "Uniswap"),
    ("0x4a14347083b80e5216ca31350a2d21702ac3650d", "Wintermute"),
];

/// Exchange names searched for anywhere in the raw funding transaction.
const EXCHANGE_HINTS: &[(&str, &str)] = &[("binance", "Binance"), ("coinbase", "Coinbase")];

/// Built-in allow-list merged with configured extras. Extras win.
pub fn known_wallets(extra: &HashMap<String, String>) -> HashMap<String, String> {
    let mut map: HashMap<String, String> = KNOWN_WALLETS
        .iter()
        .map(|(addr, label)| (addr.to_string(), label.to_string()))
        .collect();
    for (addr, label) in extra {
        map.insert(addr.to_lowercase(), label.clone());
    }
    map
}

/// Attribute a funding source from the wallet's first transaction.
///
/// Exact allow-list match on the sender first, then exchange names anywhere
/// in the payload, then the generic private-wallet label.
pub fn attribute_funding(tx: &Value, known: &HashMap<String, String>) -> String {
    if let Some(from) = tx.get("from").and_then(Value::as_str) {
        if let Some(label) = known.get(&from.to_lowercase()) {
            return label.clone();
        }
    }

    let raw = tx.to_string().to_lowercase();
    EXCHANGE_HINTS
        .iter()
        .find(|(needle, _)| raw.contains(needle))
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| PRIVATE_WALLET_SOURCE.to_string())
}

/// The `timeStamp` of a Polygonscan transaction, quoted or not.
fn tx_timestamp(tx: &Value) -> Option<i64> {
    match tx.get("timeStamp")? {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Produces a wallet profile. Never fails.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletIntel: Send + Sync {
    async fn profile_for(&self, wallet: &str) -> WalletIntelProfile;
}

/// The three raw lookups the enricher combines. Each may fail independently.
#[async_trait]
pub trait IntelSources: Send + Sync {
    async fn account_created(&self, wallet: &str) -> Result<Option<i64>>;

    async fn portfolio_value(&self, wallet: &str) -> Result<f64>;

    async fn first_funding_tx(&self, wallet: &str) -> Result<Option<Value>>;
}

/// Live lookups against Polymarket and Polygonscan.
pub struct LiveIntelSources {
    polymarket: PolymarketClient,
    polygonscan: PolygonscanClient,
}

impl LiveIntelSources {
    pub fn new(polymarket: PolymarketClient, polygonscan: PolygonscanClient) -> Self {
        Self { polymarket, polygonscan }
    }
}

#[async_trait]
impl IntelSources for LiveIntelSources {
    async fn account_created(&self, wallet: &str) -> Result<Option<i64>> {
        self.polymarket.fetch_account_created(wallet).await
    }

    async fn portfolio_value(&self, wallet: &str) -> Result<f64> {
        self.polymarket.fetch_portfolio_value(wallet).await
    }

    async fn first_funding_tx(&self, wallet: &str) -> Result<Option<Value>> {
        self.polygonscan.first_transaction(wallet).await
    }
}

// ---------------------------------------------------------------------------
// Reducer
// ---------------------------------------------------------------------------

/// Whatever the individual lookups managed to return.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntelParts {
    pub account_created: Option<i64>,
    pub portfolio_value: Option<f64>,
    pub funding_source: Option<String>,
    pub first_tx_ts: Option<i64>,
}

impl IntelParts {
    /// Merge into a profile, taking the first non-default value per field.
    pub fn reduce(self) -> WalletIntelProfile {
        let account_created_ts = self
            .account_created
            .filter(|ts| *ts > 0)
            .or(self.first_tx_ts.filter(|ts| *ts > 0))
            .unwrap_or(0);

        WalletIntelProfile {
            funding_source: self
                .funding_source
                .unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
            account_created_ts,
            portfolio_value: self.portfolio_value.unwrap_or(0.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Enricher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct EnricherTimings {
    pub profile_timeout: Duration,
    pub portfolio_timeout: Duration,
    pub onchain_timeout: Duration,
    pub onchain_pacing: Duration,
}

impl From<&EnrichmentConfig> for EnricherTimings {
    fn from(cfg: &EnrichmentConfig) -> Self {
        Self {
            profile_timeout: cfg.profile_timeout(),
            portfolio_timeout: cfg.portfolio_timeout(),
            onchain_timeout: cfg.onchain_timeout(),
            onchain_pacing: cfg.onchain_pacing(),
        }
    }
}

/// Sequential, independently guarded wallet forensics.
pub struct ForensicEnricher {
    sources: Box<dyn IntelSources>,
    known_wallets: HashMap<String, String>,
    timings: EnricherTimings,
}

impl ForensicEnricher {
    pub fn new(
        sources: Box<dyn IntelSources>,
        known_wallets: HashMap<String, String>,
        timings: EnricherTimings,
    ) -> Self {
        Self {
            sources,
            known_wallets,
            timings,
        }
    }

    /// Run every lookup and collect what succeeded.
    pub async fn gather(&self, wallet: &str) -> IntelParts {
        let mut parts = IntelParts::default();

        parts.account_created = guarded(
            "profile",
            wallet,
            self.timings.profile_timeout,
            self.sources.account_created(wallet),
        )
        .await
        .flatten();

        // The client bounds each request; this bounds value plus fallback.
        parts.portfolio_value = guarded(
            "portfolio",
            wallet,
            self.timings.portfolio_timeout * 2,
            self.sources.portfolio_value(wallet),
        )
        .await;

        tokio::time::sleep(self.timings.onchain_pacing).await;

        if let Some(tx) = guarded(
            "onchain",
            wallet,
            self.timings.onchain_timeout,
            self.sources.first_funding_tx(wallet),
        )
        .await
        .flatten()
        {
            parts.first_tx_ts = tx_timestamp(&tx);
            parts.funding_source = Some(attribute_funding(&tx, &self.known_wallets));
        }

        parts
    }
}

#[async_trait]
impl WalletIntel for ForensicEnricher {
    async fn profile_for(&self, wallet: &str) -> WalletIntelProfile {
        let profile = self.gather(wallet).await.reduce();
        info!(
            wallet,
            source = %profile.funding_source,
            created = profile.account_created_ts,
            portfolio = format!("${:.0}", profile.portfolio_value),
            "Wallet profiled"
        );
        profile
    }
}

/// Await a lookup under a timeout, absorbing both failure modes.
async fn guarded<T, F>(lookup: &str, wallet: &str, limit: Duration, fut: F) -> Option<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => {
            debug!(lookup, wallet, "Lookup succeeded");
            Some(value)
        }
        Ok(Err(e)) => {
            warn!(lookup, wallet, error = %e, "Lookup failed, using defaults");
            None
        }
        Err(_) => {
            warn!(lookup, wallet, timeout_ms = limit.as_millis() as u64, "Lookup timed out, using defaults");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
