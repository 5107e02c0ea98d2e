//! Upstream integrations.
//!
//! Defines the seams the engine pulls data through and provides
//! implementations for:
//! - Polymarket Data API: public trade feed, portfolio valuation
//! - Polymarket Gamma API: market catalog, user profiles
//! - Polygonscan: first-transaction funding trace

pub mod polygonscan;
pub mod polymarket;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{MarketDescriptor, TradeEvent};

/// Pull-style source of recent trades.
#[async_trait]
pub trait TradeFeed: Send + Sync {
    /// Fetch up to `limit` of the most recent trades, newest first.
    async fn fetch_recent(&self, limit: u32) -> Result<Vec<TradeEvent>>;

    /// Feed name for logging.
    fn name(&self) -> &str;
}

/// Source the market catalog is refreshed from.
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Fetch descriptors for every active market carrying one of `tags`.
    async fn fetch_tracked_markets(&self, tags: &[String]) -> Result<Vec<MarketDescriptor>>;
}
