//! Shared types for the SENTINEL engine.
//!
//! These types form the data model passed between the poller, classifier,
//! ladder, enrichment and storage layers. None of them carry behaviour that
//! touches the network or disk.

use std::fmt;

// ---------------------------------------------------------------------------
// Funding-source labels
// ---------------------------------------------------------------------------

/// Label used when no enrichment lookup could attribute a funding source.
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// Label written by the visible-flow path, which performs no enrichment.
pub const RETAIL_SOURCE: &str = "Retail";

/// Label for wallets funded by an address that matches no known entity.
pub const PRIVATE_WALLET_SOURCE: &str = "Private Wallet";

// ---------------------------------------------------------------------------
// Trade events
// ---------------------------------------------------------------------------

/// A single trade observed on the upstream feed.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeEvent {
    pub wallet: String,
    pub condition_id: String,
    /// Position plus outcome, e.g. "BUY Yes".
    pub side: String,
    pub size: f64,
    pub price: f64,
    /// Unix timestamp (seconds).
    pub timestamp: i64,
}

impl TradeEvent {
    /// USD notional of the trade (size × price).
    pub fn notional(&self) -> f64 {
        self.size * self.price
    }

    /// The ladder key this trade accumulates under.
    pub fn bucket_key(&self) -> BucketKey {
        BucketKey {
            wallet: self.wallet.clone(),
            condition_id: self.condition_id.clone(),
            side: self.side.clone(),
        }
    }
}

impl fmt::Display for TradeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} ${:.2} @ {}",
            self.wallet,
            self.side,
            self.condition_id,
            self.notional(),
            self.timestamp,
        )
    }
}

// ---------------------------------------------------------------------------
// Market descriptors
// ---------------------------------------------------------------------------

/// Catalog entry for a tracked market.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketDescriptor {
    pub condition_id: String,
    pub question: String,
    /// Event slug the market belongs to.
    pub category: String,
    pub link: String,
}

impl MarketDescriptor {
    /// Stand-in returned for condition ids the catalog does not know.
    pub fn placeholder(condition_id: &str) -> Self {
        Self {
            condition_id: condition_id.to_string(),
            question: "...".to_string(),
            category: "Politics".to_string(),
            link: "#".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Ladder keys and flush records
// ---------------------------------------------------------------------------

/// Identity of a ladder bucket: one actor, one market, one side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub wallet: String,
    pub condition_id: String,
    pub side: String,
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.wallet, self.condition_id, self.side)
    }
}

/// Which persistence path a record takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPath {
    /// Moderate flow, written to the visible-flow store only.
    VisibleFlow,
    /// Large or laddered flow, enriched and written to both stores.
    Forensic,
}

impl fmt::Display for FlushPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushPath::VisibleFlow => write!(f, "visible-flow"),
            FlushPath::Forensic => write!(f, "forensic"),
        }
    }
}

/// A classified amount of flow ready to be persisted.
///
/// Produced either from a single moderate trade or from a ladder bucket
/// at flush time.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRecord {
    pub wallet: String,
    pub question: String,
    pub category: String,
    pub link: String,
    pub side: String,
    /// USD value (single notional, or a bucket's accumulated total).
    pub value: f64,
    /// Timestamp of the most recent contributing trade.
    pub last_ts: i64,
}

impl FlowRecord {
    /// Build a record for a single trade against its market descriptor.
    pub fn from_trade(trade: &TradeEvent, market: &MarketDescriptor) -> Self {
        Self {
            wallet: trade.wallet.clone(),
            question: market.question.clone(),
            category: market.category.clone(),
            link: market.link.clone(),
            side: trade.side.clone(),
            value: trade.notional(),
            last_ts: trade.timestamp,
        }
    }
}

/// A record paired with the path it must take.
#[derive(Debug, Clone, PartialEq)]
pub struct Flush {
    pub path: FlushPath,
    pub record: FlowRecord,
}

// ---------------------------------------------------------------------------
// Wallet intelligence
// ---------------------------------------------------------------------------

/// Best-effort forensic profile of a wallet.
///
/// Zero means "unknown" for both numeric fields.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletIntelProfile {
    pub funding_source: String,
    pub account_created_ts: i64,
    pub portfolio_value: f64,
}

impl Default for WalletIntelProfile {
    fn default() -> Self {
        Self {
            funding_source: UNKNOWN_SOURCE.to_string(),
            account_created_ts: 0,
            portfolio_value: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for SENTINEL.
#[derive(Debug, thiserror::Error)]
pub enum SentinelError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upstream error ({service}): status {status}")]
    Upstream { service: String, status: u16 },

    #[error("Storage error ({store}): {message}")]
    Storage { store: String, message: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
