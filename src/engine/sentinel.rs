//! Cycle orchestrator.
//!
//! Owns every piece of mutable engine state (catalog, checkpoint, ladder)
//! and runs one pass per tick:
//!
//! 1. refresh the market catalog if due
//! 2. sweep expired ladder buckets
//! 3. poll the feed for new trades
//! 4. classify each trade and persist or accumulate it
//! 5. advance the checkpoint
//!
//! Nothing inside a cycle is fatal. Upstream and storage errors are logged
//! and counted in the [`CycleReport`].

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::engine::catalog::{MarketCatalog, MarketLookup};
use crate::engine::classifier::{Classifier, DiscardReason, Route};
use crate::engine::enricher::WalletIntel;
use crate::engine::ladder::AccumulationLadder;
use crate::engine::poller::TradePoller;
use crate::platforms::{MarketSource, TradeFeed};
use crate::storage::{ForensicStore, NewEvent, VisibleFlowStore, WalletUpsert};
use crate::types::{Flush, FlowRecord, FlushPath, RETAIL_SOURCE};

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// Counters for one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub cycle_number: u64,
    /// False when the trade fetch failed; the checkpoint did not move.
    pub feed_ok: bool,
    pub fetched: usize,
    pub new_trades: usize,
    pub dust: usize,
    pub untracked: usize,
    pub below_stream: usize,
    pub visible_trades: usize,
    pub accumulated: usize,
    pub early_flushes: usize,
    pub swept_forensic: usize,
    pub swept_visible: usize,
    pub swept_discarded: usize,
    pub visible_writes: usize,
    pub forensic_writes: usize,
    pub write_failures: usize,
    pub checkpoint: i64,
    pub live_buckets: usize,
    pub in_flight_value: f64,
    pub tracked_markets: usize,
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Remote inputs of the engine.
pub struct Upstreams {
    pub feed: Box<dyn TradeFeed>,
    pub markets: Box<dyn MarketSource>,
    pub intel: Box<dyn WalletIntel>,
}

/// Both persistence tiers.
pub struct Stores {
    pub visible: Box<dyn VisibleFlowStore>,
    pub forensic: Box<dyn ForensicStore>,
}

// ---------------------------------------------------------------------------
// Sentinel
// ---------------------------------------------------------------------------

pub struct Sentinel {
    upstreams: Upstreams,
    stores: Stores,
    catalog: MarketCatalog,
    tracked_tags: Vec<String>,
    poller: TradePoller,
    classifier: Classifier,
    ladder: AccumulationLadder,
    cycles: u64,
}

impl Sentinel {
    /// Build an engine that ignores every trade at or before `checkpoint`.
    pub fn new(cfg: &AppConfig, checkpoint: i64, upstreams: Upstreams, stores: Stores) -> Self {
        Self {
            upstreams,
            stores,
            catalog: MarketCatalog::new(cfg.catalog.refresh_interval_secs),
            tracked_tags: cfg.catalog.tracked_tags.clone(),
            poller: TradePoller::new(checkpoint, cfg.scanner.trade_batch_limit),
            classifier: Classifier::new(cfg.thresholds),
            ladder: AccumulationLadder::new(cfg.thresholds),
            cycles: 0,
        }
    }

    /// Replace the catalog, e.g. with a fixed set of markets.
    pub fn with_catalog(mut self, catalog: MarketCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn checkpoint(&self) -> i64 {
        self.poller.checkpoint()
    }

    pub fn ladder(&self) -> &AccumulationLadder {
        &self.ladder
    }

    pub fn catalog(&self) -> &MarketCatalog {
        &self.catalog
    }

    /// Run one cycle against the wall clock.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle treating `now` as the current time.
    pub async fn run_cycle_at(&mut self, now: DateTime<Utc>) -> CycleReport {
        self.cycles += 1;
        let now_ts = now.timestamp();
        let mut report = CycleReport {
            cycle_number: self.cycles,
            ..CycleReport::default()
        };

        debug!(cycle = self.cycles, checkpoint = self.poller.checkpoint(), "Starting cycle");

        // 1. Catalog
        self.catalog
            .refresh_if_due(self.upstreams.markets.as_ref(), &self.tracked_tags, now)
            .await;

        // 2. Sweep
        let sweep = self.ladder.sweep(now_ts);
        report.swept_discarded = sweep.discarded;
        for flush in sweep.flushes {
            match flush.path {
                FlushPath::Forensic => report.swept_forensic += 1,
                FlushPath::VisibleFlow => report.swept_visible += 1,
            }
            self.dispatch(flush, now_ts, &mut report).await;
        }

        // 3. Poll
        match self.poller.poll(self.upstreams.feed.as_ref()).await {
            Ok(batch) => {
                report.feed_ok = true;
                report.fetched = batch.fetched;
                report.new_trades = batch.events.len();

                // 4. Classify
                for trade in &batch.events {
                    match self.classifier.route(trade, &self.catalog) {
                        Route::Discard(reason) => match reason {
                            DiscardReason::Dust => report.dust += 1,
                            DiscardReason::Untracked => report.untracked += 1,
                            DiscardReason::BelowStream => report.below_stream += 1,
                        },
                        Route::VisibleFlow { notional } => {
                            report.visible_trades += 1;
                            let market = self.catalog.descriptor_for(&trade.condition_id);
                            debug!(
                                wallet = %trade.wallet,
                                value = format!("${notional:.2}"),
                                "Visible flow"
                            );
                            let record = FlowRecord::from_trade(trade, &market);
                            self.persist_visible(&record, now_ts, &mut report).await;
                        }
                        Route::Accumulate { .. } => {
                            report.accumulated += 1;
                            if let Some(flush) = self.ladder.accumulate(trade, &self.catalog) {
                                report.early_flushes += 1;
                                self.dispatch(flush, now_ts, &mut report).await;
                            }
                        }
                    }
                }

                // 5. Checkpoint
                self.poller.advance(batch.high_water);
            }
            Err(e) => {
                warn!(
                    feed = self.upstreams.feed.name(),
                    error = %e,
                    checkpoint = self.poller.checkpoint(),
                    "Trade fetch failed, retrying next cycle"
                );
            }
        }

        report.checkpoint = self.poller.checkpoint();
        report.live_buckets = self.ladder.len();
        report.in_flight_value = self.ladder.in_flight_value();
        report.tracked_markets = self.catalog.len();
        report
    }

    async fn dispatch(&self, flush: Flush, now_ts: i64, report: &mut CycleReport) {
        match flush.path {
            FlushPath::VisibleFlow => self.persist_visible(&flush.record, now_ts, report).await,
            FlushPath::Forensic => self.flush_forensic(&flush.record, report).await,
        }
    }

    /// Visible-flow only: no enrichment, labelled retail.
    async fn persist_visible(&self, record: &FlowRecord, now_ts: i64, report: &mut CycleReport) {
        let wallet = WalletUpsert::for_record(record, now_ts, RETAIL_SOURCE);
        let event = NewEvent::from(record);

        match self.stores.visible.record_flow(&wallet, &event).await {
            Ok(()) => report.visible_writes += 1,
            Err(e) => {
                report.write_failures += 1;
                warn!(wallet = %record.wallet, error = %e, "Visible-flow write failed, skipping");
            }
        }
    }

    /// Enrich, then write the forensic store, then the visible-flow store.
    ///
    /// The second write happens whether or not the first succeeded.
    async fn flush_forensic(&self, record: &FlowRecord, report: &mut CycleReport) {
        let intel = self.upstreams.intel.profile_for(&record.wallet).await;
        let wallet = WalletUpsert::for_record(record, intel.account_created_ts, &intel.funding_source);
        let event = NewEvent::from(record);

        info!(
            wallet = %record.wallet,
            side = %record.side,
            market = %record.question,
            value = format!("${:.0}", record.value),
            source = %intel.funding_source,
            "Forensic flow detected"
        );

        match self.stores.forensic.record_intel(&wallet, &intel, &event).await {
            Ok(()) => report.forensic_writes += 1,
            Err(e) => {
                report.write_failures += 1;
                warn!(wallet = %record.wallet, error = %e, "Forensic write failed, skipping");
            }
        }

        match self.stores.visible.record_flow(&wallet, &event).await {
            Ok(()) => report.visible_writes += 1,
            Err(e) => {
                report.write_failures += 1;
                warn!(wallet = %record.wallet, error = %e, "Visible-flow write failed, skipping");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
