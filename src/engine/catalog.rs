//! Market catalog.
//!
//! In-memory map from condition id to market descriptor, used both as the
//! relevance predicate (only tracked markets are classified) and as the
//! source of question/category/link text for persisted records.
//!
//! The catalog is replaced wholesale on each refresh. A failed refresh, or
//! one that returns no markets, keeps the previous snapshot.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::platforms::MarketSource;
use crate::types::MarketDescriptor;

/// Refresh interval for fixed catalogs (~100 years).
const STATIC_REFRESH_SECS: u64 = 100 * 365 * 24 * 3600;

/// Read-only view of the catalog the classifier and ladder consume.
pub trait MarketLookup {
    /// Whether trades on this market should be considered at all.
    fn is_tracked(&self, condition_id: &str) -> bool;

    /// Descriptor for a market. Unknown ids yield a placeholder.
    fn descriptor_for(&self, condition_id: &str) -> MarketDescriptor;
}

pub struct MarketCatalog {
    markets: HashMap<String, MarketDescriptor>,
    refreshed_at: Option<DateTime<Utc>>,
    refresh_interval: Duration,
}

impl MarketCatalog {
    pub fn new(refresh_interval_secs: u64) -> Self {
        Self {
            markets: HashMap::new(),
            refreshed_at: None,
            refresh_interval: Duration::seconds(refresh_interval_secs as i64),
        }
    }

    /// Build a catalog from a fixed list of descriptors that never goes stale.
    pub fn from_descriptors(descriptors: Vec<MarketDescriptor>) -> Self {
        let mut catalog = Self::new(STATIC_REFRESH_SECS);
        catalog.replace(descriptors, Utc::now());
        catalog
    }

    /// Swap in a new snapshot.
    pub fn replace(&mut self, descriptors: Vec<MarketDescriptor>, now: DateTime<Utc>) {
        self.markets = descriptors
            .into_iter()
            .map(|d| (d.condition_id.clone(), d))
            .collect();
        self.refreshed_at = Some(now);
    }

    /// Whether the snapshot is missing or older than the refresh interval.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self.refreshed_at {
            None => true,
            Some(at) => now - at >= self.refresh_interval,
        }
    }

    /// Refresh from `source` if due. Returns true when a new snapshot landed.
    pub async fn refresh_if_due(
        &mut self,
        source: &dyn MarketSource,
        tags: &[String],
        now: DateTime<Utc>,
    ) -> bool {
        if !self.needs_refresh(now) {
            return false;
        }

        let outcome = match source.fetch_tracked_markets(tags).await {
            Ok(descriptors) if !descriptors.is_empty() => {
                self.replace(descriptors, now);
                info!(tracked = self.markets.len(), "Market catalog refreshed");
                return true;
            }
            Ok(_) => "empty result".to_string(),
            Err(e) => e.to_string(),
        };

        warn!(
            error = %outcome,
            kept = self.markets.len(),
            "Market catalog refresh failed, keeping previous snapshot"
        );
        // An empty catalog tracks nothing, so keep retrying every cycle
        // until the first snapshot lands; otherwise wait a full interval.
        if !self.markets.is_empty() {
            self.refreshed_at = Some(now);
        }
        false
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }
}

impl MarketLookup for MarketCatalog {
    fn is_tracked(&self, condition_id: &str) -> bool {
        self.markets.contains_key(condition_id)
    }

    fn descriptor_for(&self, condition_id: &str) -> MarketDescriptor {
        self.markets
            .get(condition_id)
            .cloned()
            .unwrap_or_else(|| MarketDescriptor::placeholder(condition_id))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
