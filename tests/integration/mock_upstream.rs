//! Mock upstreams for integration testing.
//!
//! Deterministic, in-memory stand-ins for the trade feed, the market
//! catalog source and wallet enrichment. Every mock hands out a cloneable
//! handle so tests can script it after it has been boxed into the engine.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use whale_sentinel::engine::enricher::WalletIntel;
use whale_sentinel::platforms::{MarketSource, TradeFeed};
use whale_sentinel::types::{MarketDescriptor, TradeEvent, WalletIntelProfile};

pub const ELECTION_MARKET: &str = "0xelection";
pub const SPORTS_MARKET: &str = "0xsports";

/// A trade on `market` worth exactly `usd` (price 1.0).
pub fn trade_on(market: &str, wallet: &str, side: &str, usd: f64, ts: i64) -> TradeEvent {
    TradeEvent {
        wallet: wallet.to_string(),
        condition_id: market.to_string(),
        side: side.to_string(),
        size: usd,
        price: 1.0,
        timestamp: ts,
    }
}

/// A BUY Yes trade on the tracked election market.
pub fn trade(wallet: &str, usd: f64, ts: i64) -> TradeEvent {
    trade_on(ELECTION_MARKET, wallet, "BUY Yes", usd, ts)
}

pub fn election_descriptor() -> MarketDescriptor {
    MarketDescriptor {
        condition_id: ELECTION_MARKET.to_string(),
        question: "Will the incumbent win the presidential election?".to_string(),
        category: "presidential-election".to_string(),
        link: "https://polymarket.com/event/presidential-election".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

/// Feed serving queued batches, one per fetch. An empty queue serves the
/// last batch again, like a quiet market.
#[derive(Clone, Default)]
pub struct MockFeed {
    queue: Arc<Mutex<VecDeque<Vec<TradeEvent>>>>,
    last: Arc<Mutex<Vec<TradeEvent>>>,
    force_error: Arc<Mutex<Option<String>>>,
    fetches: Arc<Mutex<usize>>,
}

impl MockFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a batch. Trades may be given in any order; they are served
    /// newest first.
    pub fn push_batch(&self, mut trades: Vec<TradeEvent>) {
        trades.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        self.queue.lock().unwrap().push_back(trades);
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn fetches(&self) -> usize {
        *self.fetches.lock().unwrap()
    }
}

#[async_trait]
impl TradeFeed for MockFeed {
    async fn fetch_recent(&self, limit: u32) -> Result<Vec<TradeEvent>> {
        *self.fetches.lock().unwrap() += 1;
        if let Some(msg) = self.force_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", msg));
        }

        let mut last = self.last.lock().unwrap();
        if let Some(batch) = self.queue.lock().unwrap().pop_front() {
            *last = batch;
        }
        Ok(last.iter().take(limit as usize).cloned().collect())
    }

    fn name(&self) -> &str {
        "mock-feed"
    }
}

// ---------------------------------------------------------------------------
// Market source
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MockMarkets {
    markets: Arc<Mutex<Vec<MarketDescriptor>>>,
    force_error: Arc<Mutex<Option<String>>>,
    refreshes: Arc<Mutex<usize>>,
}

impl MockMarkets {
    pub fn with_markets(markets: Vec<MarketDescriptor>) -> Self {
        Self {
            markets: Arc::new(Mutex::new(markets)),
            ..Self::default()
        }
    }

    pub fn set_markets(&self, markets: Vec<MarketDescriptor>) {
        *self.markets.lock().unwrap() = markets;
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn refreshes(&self) -> usize {
        *self.refreshes.lock().unwrap()
    }
}

#[async_trait]
impl MarketSource for MockMarkets {
    async fn fetch_tracked_markets(&self, _tags: &[String]) -> Result<Vec<MarketDescriptor>> {
        *self.refreshes.lock().unwrap() += 1;
        if let Some(msg) = self.force_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", msg));
        }
        Ok(self.markets.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// Wallet intel
// ---------------------------------------------------------------------------

/// Returns a fixed profile per wallet (default profile otherwise) and
/// records every wallet it was asked about.
#[derive(Clone, Default)]
pub struct MockIntel {
    profiles: Arc<Mutex<HashMap<String, WalletIntelProfile>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockIntel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_profile(&self, wallet: &str, profile: WalletIntelProfile) {
        self.profiles.lock().unwrap().insert(wallet.to_string(), profile);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletIntel for MockIntel {
    async fn profile_for(&self, wallet: &str) -> WalletIntelProfile {
        self.calls.lock().unwrap().push(wallet.to_string());
        self.profiles
            .lock()
            .unwrap()
            .get(wallet)
            .cloned()
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Self-tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_feed_serves_newest_first() {
        let feed = MockFeed::new();
        feed.push_batch(vec![trade("0xa", 10.0, 1), trade("0xa", 10.0, 3), trade("0xa", 10.0, 2)]);
        let got = feed.fetch_recent(50).await.unwrap();
        let ts: Vec<i64> = got.iter().map(|t| t.timestamp).collect();
        assert_eq!(ts, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_mock_feed_repeats_last_batch_and_limits() {
        let feed = MockFeed::new();
        feed.push_batch(vec![trade("0xa", 10.0, 1), trade("0xa", 10.0, 2)]);
        feed.fetch_recent(50).await.unwrap();
        let again = feed.fetch_recent(1).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].timestamp, 2);
        assert_eq!(feed.fetches(), 2);
    }

    #[tokio::test]
    async fn test_mock_feed_forced_error() {
        let feed = MockFeed::new();
        feed.set_error("HTTP 503");
        assert!(feed.fetch_recent(50).await.is_err());
        feed.clear_error();
        assert!(feed.fetch_recent(50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mock_markets_forced_error() {
        let markets = MockMarkets::with_markets(vec![election_descriptor()]);
        markets.set_error("gamma down");
        assert!(markets.fetch_tracked_markets(&[]).await.is_err());
        markets.clear_error();
        assert_eq!(markets.fetch_tracked_markets(&[]).await.unwrap().len(), 1);
        assert_eq!(markets.refreshes(), 2);
    }

    #[tokio::test]
    async fn test_mock_intel_defaults_unknown_wallets() {
        let intel = MockIntel::new();
        assert_eq!(intel.profile_for("0xnobody").await, WalletIntelProfile::default());
        assert_eq!(intel.calls(), vec!["0xnobody".to_string()]);
    }
}
