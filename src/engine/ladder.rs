//! Accumulation ladder.
//!
//! Detects large orders split into fragments: trades from the same wallet on
//! the same market and side are summed into one bucket while they keep
//! arriving inside the quiet window.
//!
//! Bucket lifecycle:
//! `Created → Accumulating → {EarlyFlush | TimeoutFlush | TimeoutDiscard}`
//!
//! - A bucket whose total reaches the critical trigger is flushed to the
//!   forensic path on the very update that crossed it.
//! - Once per cycle, buckets quiet for longer than the window are swept:
//!   forensic if at or above the forensic trigger, visible flow if at or
//!   above the stream minimum, otherwise discarded. Swept buckets are always
//!   removed.
//!
//! The ladder performs no I/O; it hands [`Flush`] values back to the caller.

use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::Thresholds;
use crate::engine::catalog::MarketLookup;
use crate::types::{BucketKey, Flush, FlowRecord, FlushPath, MarketDescriptor, TradeEvent};

/// An in-flight suspected fragmented order.
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulationBucket {
    pub key: BucketKey,
    /// Running USD total. Only ever grows while the bucket is live.
    pub value: f64,
    pub last_ts: i64,
    /// Descriptor captured when the bucket was created.
    pub market: MarketDescriptor,
    /// Number of trades folded in.
    pub fills: u32,
}

impl AccumulationBucket {
    fn open(key: BucketKey, market: MarketDescriptor, ts: i64) -> Self {
        Self {
            key,
            value: 0.0,
            last_ts: ts,
            market,
            fills: 0,
        }
    }

    fn into_record(self) -> FlowRecord {
        FlowRecord {
            wallet: self.key.wallet,
            question: self.market.question,
            category: self.market.category,
            link: self.market.link,
            side: self.key.side,
            value: self.value,
            last_ts: self.last_ts,
        }
    }
}

/// Result of one timeout sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub flushes: Vec<Flush>,
    /// Expired buckets too small to persist.
    pub discarded: usize,
}

pub struct AccumulationLadder {
    buckets: HashMap<BucketKey, AccumulationBucket>,
    thresholds: Thresholds,
}

impl AccumulationLadder {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            buckets: HashMap::new(),
            thresholds,
        }
    }

    /// Fold an accumulation-eligible trade into its bucket.
    ///
    /// Returns a forensic flush when the bucket reaches the critical trigger;
    /// the bucket is removed in that case.
    pub fn accumulate(&mut self, trade: &TradeEvent, catalog: &dyn MarketLookup) -> Option<Flush> {
        let key = trade.bucket_key();
        let notional = trade.notional();

        let bucket = self.buckets.entry(key.clone()).or_insert_with(|| {
            debug!(bucket = %key, "Ladder bucket opened");
            AccumulationBucket::open(key.clone(), catalog.descriptor_for(&trade.condition_id), trade.timestamp)
        });

        bucket.value += notional;
        bucket.last_ts = trade.timestamp;
        bucket.fills += 1;

        if bucket.value < self.thresholds.critical_trigger {
            debug!(
                bucket = %key,
                value = format!("${:.2}", bucket.value),
                fills = bucket.fills,
                "Ladder bucket updated"
            );
            return None;
        }

        let bucket = self.buckets.remove(&key)?;
        info!(
            bucket = %key,
            value = format!("${:.0}", bucket.value),
            fills = bucket.fills,
            "Critical trigger crossed, flushing ladder"
        );
        Some(Flush {
            path: FlushPath::Forensic,
            record: bucket.into_record(),
        })
    }

    /// Evaluate and remove every bucket quiet for longer than the window.
    ///
    /// `now` is wall-clock unix seconds, not the latest trade timestamp.
    pub fn sweep(&mut self, now: i64) -> SweepReport {
        let window = self.thresholds.ladder_window_secs;
        let expired: Vec<BucketKey> = self
            .buckets
            .iter()
            .filter(|(_, b)| now - b.last_ts > window)
            .map(|(k, _)| k.clone())
            .collect();

        let mut report = SweepReport::default();

        for key in expired {
            let Some(bucket) = self.buckets.remove(&key) else {
                continue;
            };

            let path = if bucket.value >= self.thresholds.forensic_trigger {
                FlushPath::Forensic
            } else if bucket.value >= self.thresholds.stream_min {
                FlushPath::VisibleFlow
            } else {
                debug!(bucket = %key, value = bucket.value, "Expired bucket below stream minimum, discarded");
                report.discarded += 1;
                continue;
            };

            debug!(
                bucket = %key,
                value = format!("${:.2}", bucket.value),
                path = %path,
                "Expired bucket flushed"
            );
            report.flushes.push(Flush {
                path,
                record: bucket.into_record(),
            });
        }

        report
    }

    pub fn get(&self, key: &BucketKey) -> Option<&AccumulationBucket> {
        self.buckets.get(key)
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Sum of all live bucket values.
    pub fn in_flight_value(&self) -> f64 {
        self.buckets.values().map(|b| b.value).sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
