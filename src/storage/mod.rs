//! Persistence layer.
//!
//! Two independent stores, each holding a wallet aggregate table and an
//! append-only event log:
//!
//! - visible flow (`whale_hunter.db`): every persisted trade or bucket
//! - forensic (`insider_intel.db`): enriched large/laddered flow only
//!
//! A write is one unit of work: upsert the wallet aggregate, append the
//! event, commit. Nothing spans both stores.

pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{FlowRecord, WalletIntelProfile};

pub use sqlite::{SqliteForensicStore, SqliteVisibleStore};

// ---------------------------------------------------------------------------
// Write records
// ---------------------------------------------------------------------------

/// Arguments of the wallet aggregate upsert.
///
/// `first_seen` only lands on insert. `last_seen`, `funding_source` are
/// overwritten and `delta_volume` added on every call.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletUpsert {
    pub address: String,
    pub first_seen: i64,
    pub last_seen: i64,
    pub funding_source: String,
    pub delta_volume: f64,
}

impl WalletUpsert {
    pub fn for_record(record: &FlowRecord, first_seen: i64, funding_source: &str) -> Self {
        Self {
            address: record.wallet.clone(),
            first_seen,
            last_seen: record.last_ts,
            funding_source: funding_source.to_string(),
            delta_volume: record.value,
        }
    }
}

/// Arguments of the event append. The forensic store ignores
/// `category` and `link`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub wallet: String,
    pub timestamp: i64,
    pub question: String,
    pub category: String,
    pub side: String,
    pub size_usd: f64,
    pub link: String,
}

impl From<&FlowRecord> for NewEvent {
    fn from(record: &FlowRecord) -> Self {
        Self {
            wallet: record.wallet.clone(),
            timestamp: record.last_ts,
            question: record.question.clone(),
            category: record.category.clone(),
            side: record.side.clone(),
            size_usd: record.value,
            link: record.link.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Read records
// ---------------------------------------------------------------------------

/// A wallet aggregate row, in either store.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct WalletAggregate {
    pub address: String,
    pub first_seen: i64,
    pub last_seen: i64,
    pub total_volume: f64,
    pub funding_source: String,
}

/// An event log row, in either store.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoredEvent {
    pub id: i64,
    pub wallet: String,
    pub timestamp: i64,
    pub question: String,
    pub category: Option<String>,
    pub side: String,
    pub size_usd: f64,
    pub link: Option<String>,
}

// ---------------------------------------------------------------------------
// Store traits
// ---------------------------------------------------------------------------

/// High-volume store fed by both paths.
#[async_trait]
pub trait VisibleFlowStore: Send + Sync {
    /// Upsert the wallet and append the event as one unit of work.
    async fn record_flow(&self, wallet: &WalletUpsert, event: &NewEvent) -> Result<()>;
}

/// Low-volume store fed by the forensic path only.
#[async_trait]
pub trait ForensicStore: Send + Sync {
    /// Upsert the wallet with its profile and append the event as one unit
    /// of work.
    async fn record_intel(
        &self,
        wallet: &WalletUpsert,
        intel: &WalletIntelProfile,
        event: &NewEvent,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
