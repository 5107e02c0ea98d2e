//! Whole-cycle tests.
//!
//! Drive the engine through mocked upstreams into real SQLite stores on
//! temp files, then read both databases back.

use chrono::{DateTime, Utc};

use whale_sentinel::config::AppConfig;
use whale_sentinel::engine::catalog::MarketCatalog;
use whale_sentinel::engine::sentinel::{Sentinel, Stores, Upstreams};
use whale_sentinel::storage::{SqliteForensicStore, SqliteVisibleStore};
use whale_sentinel::types::{WalletIntelProfile, RETAIL_SOURCE, UNKNOWN_SOURCE};

use crate::mock_upstream::*;

const T0: i64 = 1_720_000_000;

fn at(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap()
}

struct Harness {
    sentinel: Sentinel,
    feed: MockFeed,
    markets: MockMarkets,
    intel: MockIntel,
    visible: SqliteVisibleStore,
    forensic: SqliteForensicStore,
    paths: Vec<String>,
}

impl Drop for Harness {
    fn drop(&mut self) {
        for path in &self.paths {
            for suffix in ["", "-wal", "-shm"] {
                let _ = std::fs::remove_file(format!("{path}{suffix}"));
            }
        }
    }
}

fn temp_db(tag: &str) -> String {
    let mut p = std::env::temp_dir();
    p.push(format!("sentinel_it_{tag}_{}.db", uuid::Uuid::new_v4()));
    p.to_string_lossy().to_string()
}

/// Engine with a live (mock-refreshed) catalog.
async fn harness() -> Harness {
    harness_with(None).await
}

/// Engine with a fixed catalog holding only the election market.
async fn harness_fixed_catalog() -> Harness {
    harness_with(Some(MarketCatalog::from_descriptors(vec![election_descriptor()]))).await
}

async fn harness_with(catalog: Option<MarketCatalog>) -> Harness {
    let visible_path = temp_db("visible");
    let forensic_path = temp_db("forensic");

    let feed = MockFeed::new();
    let markets = MockMarkets::with_markets(vec![election_descriptor()]);
    let intel = MockIntel::new();

    let sentinel = Sentinel::new(
        &AppConfig::default(),
        T0,
        Upstreams {
            feed: Box::new(feed.clone()),
            markets: Box::new(markets.clone()),
            intel: Box::new(intel.clone()),
        },
        Stores {
            visible: Box::new(SqliteVisibleStore::open(&visible_path).await.unwrap()),
            forensic: Box::new(SqliteForensicStore::open(&forensic_path).await.unwrap()),
        },
    );
    let sentinel = match catalog {
        Some(c) => sentinel.with_catalog(c),
        None => sentinel,
    };

    Harness {
        sentinel,
        feed,
        markets,
        intel,
        visible: SqliteVisibleStore::open(&visible_path).await.unwrap(),
        forensic: SqliteForensicStore::open(&forensic_path).await.unwrap(),
        paths: vec![visible_path, forensic_path],
    }
}

fn binance() -> WalletIntelProfile {
    WalletIntelProfile {
        funding_source: "Binance".to_string(),
        account_created_ts: 1_650_000_000,
        portfolio_value: 82_000.0,
    }
}

#[tokio::test]
async fn test_mixed_batch_end_to_end() {
    let mut h = harness().await;
    h.intel.set_profile("0xa", binance());
    h.feed.push_batch(vec![
        trade("0xd", 8.0, T0 + 1),
        trade("0xb", 9.5, T0 + 2),
        trade("0xc", 50.0, T0 + 3),
        trade("0xa", 2000.0, T0 + 4),
        trade("0xa", 3200.0, T0 + 5),
    ]);

    let report = h.sentinel.run_cycle_at(at(T0 + 15)).await;
    assert!(report.feed_ok);
    assert_eq!(report.tracked_markets, 1);
    assert_eq!(report.early_flushes, 1);
    assert_eq!(report.checkpoint, T0 + 5);

    // $8 dust and $9.50 gap never reach a store
    assert!(h.visible.wallet("0xd").await.unwrap().is_none());
    assert!(h.visible.wallet("0xb").await.unwrap().is_none());

    let retail = h.visible.wallet("0xc").await.unwrap().unwrap();
    assert_eq!(retail.funding_source, RETAIL_SOURCE);
    assert_eq!(retail.first_seen, T0 + 15);
    assert!((retail.total_volume - 50.0).abs() < 1e-9);

    let whale = h.forensic.wallet("0xa").await.unwrap().unwrap();
    assert_eq!(whale.funding_source, "Binance");
    assert_eq!(whale.first_seen, 1_650_000_000);
    assert_eq!(whale.last_seen, T0 + 5);
    assert!((whale.total_volume - 5200.0).abs() < 1e-9);
    assert_eq!(h.forensic.portfolio_value("0xa").await.unwrap(), Some(82_000.0));

    let mirrored = h.visible.wallet("0xa").await.unwrap().unwrap();
    assert_eq!(mirrored.funding_source, "Binance");
    assert_eq!(mirrored.first_seen, 1_650_000_000);

    let events = h.visible.events_for("0xa").await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].question, "Will the incumbent win the presidential election?");
    assert_eq!(events[0].category.as_deref(), Some("presidential-election"));

    assert_eq!(h.intel.calls(), vec!["0xa".to_string()]);
}

#[tokio::test]
async fn test_visible_trade_overwrites_forensic_label() {
    let mut h = harness_fixed_catalog().await;
    h.intel.set_profile("0xa", binance());

    h.feed.push_batch(vec![trade("0xa", 6000.0, T0 + 1)]);
    h.sentinel.run_cycle_at(at(T0 + 15)).await;
    assert_eq!(h.visible.wallet("0xa").await.unwrap().unwrap().funding_source, "Binance");

    h.feed.push_batch(vec![trade("0xa", 40.0, T0 + 20)]);
    h.sentinel.run_cycle_at(at(T0 + 30)).await;

    let visible = h.visible.wallet("0xa").await.unwrap().unwrap();
    assert_eq!(visible.funding_source, RETAIL_SOURCE);
    assert_eq!(visible.first_seen, 1_650_000_000, "first_seen is insert-only");
    assert!((visible.total_volume - 6040.0).abs() < 1e-9);

    // The forensic store only sees forensic writes
    let forensic = h.forensic.wallet("0xa").await.unwrap().unwrap();
    assert_eq!(forensic.funding_source, "Binance");
    assert!((forensic.total_volume - 6000.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_repeated_feed_batches_are_not_reprocessed() {
    let mut h = harness_fixed_catalog().await;
    h.feed.push_batch(vec![trade("0xc", 50.0, T0 + 1), trade("0xc", 70.0, T0 + 2)]);

    let r1 = h.sentinel.run_cycle_at(at(T0 + 15)).await;
    assert_eq!(r1.visible_writes, 2);

    // No new batch queued: the feed repeats the same rows
    let r2 = h.sentinel.run_cycle_at(at(T0 + 30)).await;
    assert_eq!(r2.fetched, 2);
    assert_eq!(r2.new_trades, 0);
    assert_eq!(r2.checkpoint, T0 + 2);

    h.feed.push_batch(vec![
        trade("0xc", 70.0, T0 + 2),
        trade("0xc", 90.0, T0 + 3),
    ]);
    let r3 = h.sentinel.run_cycle_at(at(T0 + 45)).await;
    assert_eq!(r3.new_trades, 1);
    assert_eq!(r3.checkpoint, T0 + 3);

    let (count, volume) = h.visible.totals().await.unwrap();
    assert_eq!(count, 3);
    assert!((volume - 210.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_checkpoint_never_moves_backwards() {
    let mut h = harness_fixed_catalog().await;
    h.feed.push_batch(vec![trade("0xc", 50.0, T0 + 100)]);
    h.sentinel.run_cycle_at(at(T0 + 115)).await;

    // An older page (e.g. a lagging replica) must not rewind the checkpoint
    h.feed.push_batch(vec![trade("0xc", 50.0, T0 + 50)]);
    let r = h.sentinel.run_cycle_at(at(T0 + 130)).await;
    assert_eq!(r.new_trades, 0);
    assert_eq!(h.sentinel.checkpoint(), T0 + 100);
}

#[tokio::test]
async fn test_feed_outage_recovers_without_losing_trades() {
    let mut h = harness_fixed_catalog().await;
    h.feed.push_batch(vec![trade("0xc", 50.0, T0 + 1)]);
    h.feed.set_error("HTTP 503");

    let r1 = h.sentinel.run_cycle_at(at(T0 + 15)).await;
    assert!(!r1.feed_ok);
    assert_eq!(r1.checkpoint, T0);

    h.feed.clear_error();
    let r2 = h.sentinel.run_cycle_at(at(T0 + 30)).await;
    assert!(r2.feed_ok);
    assert_eq!(r2.visible_writes, 1);
    assert_eq!(h.feed.fetches(), 2);
}

#[tokio::test]
async fn test_ladder_times_out_across_cycles() {
    let mut h = harness_fixed_catalog().await;
    h.feed.push_batch(vec![trade("0xa", 1200.0, T0 + 1), trade("0xa", 1900.0, T0 + 200)]);

    let r1 = h.sentinel.run_cycle_at(at(T0 + 215)).await;
    assert_eq!(r1.accumulated, 2);
    assert_eq!(r1.live_buckets, 1);
    assert!(h.forensic.wallet("0xa").await.unwrap().is_none());

    // Still inside the quiet window
    let r2 = h.sentinel.run_cycle_at(at(T0 + 200 + 600)).await;
    assert_eq!(r2.live_buckets, 1);

    let r3 = h.sentinel.run_cycle_at(at(T0 + 200 + 601)).await;
    assert_eq!(r3.swept_forensic, 1);
    assert_eq!(r3.live_buckets, 0);

    let whale = h.forensic.wallet("0xa").await.unwrap().unwrap();
    assert_eq!(whale.funding_source, UNKNOWN_SOURCE);
    assert_eq!(whale.last_seen, T0 + 200);
    assert!((whale.total_volume - 3100.0).abs() < 1e-9);
    assert_eq!(h.visible.events_for("0xa").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_sides_and_markets_ladder_separately() {
    let mut h = harness_fixed_catalog().await;
    h.feed.push_batch(vec![
        trade_on(ELECTION_MARKET, "0xa", "BUY Yes", 3000.0, T0 + 1),
        trade_on(ELECTION_MARKET, "0xa", "SELL Yes", 3000.0, T0 + 2),
        trade_on(SPORTS_MARKET, "0xa", "BUY Yes", 3000.0, T0 + 3),
    ]);

    let r = h.sentinel.run_cycle_at(at(T0 + 15)).await;
    assert_eq!(r.untracked, 1);
    assert_eq!(r.early_flushes, 0);
    assert_eq!(r.live_buckets, 2);
    assert!((r.in_flight_value - 6000.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_catalog_refreshes_and_survives_outage() {
    let mut h = harness().await;
    h.markets.set_markets(vec![]);
    h.feed.push_batch(vec![trade("0xc", 50.0, T0 + 1)]);

    // Empty snapshot: everything is untracked, the checkpoint still moves
    let r1 = h.sentinel.run_cycle_at(at(T0 + 15)).await;
    assert_eq!(r1.untracked, 1);
    assert_eq!(r1.checkpoint, T0 + 1);

    // Empty results are not a snapshot: the very next cycle retries
    h.markets.set_markets(vec![election_descriptor()]);
    h.feed.push_batch(vec![trade("0xc", 60.0, T0 + 20)]);
    let r2 = h.sentinel.run_cycle_at(at(T0 + 30)).await;
    assert_eq!(r2.tracked_markets, 1);
    assert_eq!(r2.visible_writes, 1);

    // An empty refresh an hour later leaves the engine tracking
    h.markets.set_markets(vec![]);
    h.feed.push_batch(vec![trade("0xc", 65.0, T0 + 3620)]);
    let r2b = h.sentinel.run_cycle_at(at(T0 + 30 + 3600)).await;
    assert_eq!(r2b.tracked_markets, 1);
    assert_eq!(r2b.visible_writes, 1);

    // A failed refresh keeps the previous snapshot
    h.markets.set_error("gamma down");
    h.feed.push_batch(vec![trade("0xc", 70.0, T0 + 7220)]);
    let r3 = h.sentinel.run_cycle_at(at(T0 + 30 + 7200)).await;
    assert_eq!(r3.tracked_markets, 1);
    assert_eq!(r3.visible_writes, 1);
    assert_eq!(h.markets.refreshes(), 4);
}
