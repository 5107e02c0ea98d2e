//! Trade poller.
//!
//! Owns the checkpoint: the timestamp of the newest trade already handed to
//! the classifier. Each cycle the feed's newest-first batch is reversed and
//! everything at or before the checkpoint is filtered out.
//!
//! The checkpoint advances to the batch maximum once the batch has been
//! processed, whatever happened to individual events. Downstream failures
//! must therefore be absorbed per event; a trade whose processing fails is
//! not retried.

use anyhow::Result;
use tracing::debug;

use crate::platforms::TradeFeed;
use crate::types::TradeEvent;

/// New events from one poll, oldest first, plus the checkpoint they imply.
#[derive(Debug, Clone, Default)]
pub struct PollBatch {
    pub events: Vec<TradeEvent>,
    /// Highest timestamp in the batch (or the unchanged checkpoint).
    pub high_water: i64,
    /// How many rows the feed returned before filtering.
    pub fetched: usize,
}

pub struct TradePoller {
    checkpoint: i64,
    batch_limit: u32,
}

impl TradePoller {
    /// Start polling from `checkpoint`; trades at or before it are ignored.
    pub fn new(checkpoint: i64, batch_limit: u32) -> Self {
        Self { checkpoint, batch_limit }
    }

    pub fn checkpoint(&self) -> i64 {
        self.checkpoint
    }

    /// Fetch the newest trades and keep only those past the checkpoint.
    ///
    /// Does not move the checkpoint; call [`TradePoller::advance`] once the
    /// batch has been processed.
    pub async fn poll(&self, feed: &dyn TradeFeed) -> Result<PollBatch> {
        let trades = feed.fetch_recent(self.batch_limit).await?;
        Ok(self.select_new(trades))
    }

    /// Reorder a newest-first batch and drop already-seen trades.
    pub fn select_new(&self, mut trades: Vec<TradeEvent>) -> PollBatch {
        let fetched = trades.len();
        trades.reverse();

        let mut high_water = self.checkpoint;
        let events: Vec<TradeEvent> = trades
            .into_iter()
            .filter(|t| t.timestamp > self.checkpoint)
            .inspect(|t| high_water = high_water.max(t.timestamp))
            .collect();

        debug!(
            fetched,
            new = events.len(),
            checkpoint = self.checkpoint,
            high_water,
            "Trade batch selected"
        );

        PollBatch { events, high_water, fetched }
    }

    /// Move the checkpoint forward. Never moves it backwards.
    pub fn advance(&mut self, high_water: i64) {
        if high_water > self.checkpoint {
            self.checkpoint = high_water;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
