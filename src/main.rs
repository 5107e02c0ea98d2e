//! SENTINEL: prediction-market whale flow monitor.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens both stores, and runs the sweep→poll→classify→persist loop
//! with graceful shutdown.

use anyhow::{Context, Result};
use chrono::Utc;
use std::time::Duration;
use tracing::info;

use whale_sentinel::config::{self, AppConfig};
use whale_sentinel::engine::enricher::{known_wallets, EnricherTimings, ForensicEnricher, LiveIntelSources};
use whale_sentinel::engine::sentinel::{CycleReport, Sentinel, Stores, Upstreams};
use whale_sentinel::platforms::polygonscan::PolygonscanClient;
use whale_sentinel::platforms::polymarket::PolymarketClient;
use whale_sentinel::storage::{SqliteForensicStore, SqliteVisibleStore};

const BANNER: &str = r#"
 ____  _____ _   _ _____ ___ _   _ _____ _
/ ___|| ____| \ | |_   _|_ _| \ | | ____| |
\___ \|  _| |  \| | | |  | ||  \| |  _| | |
 ___) | |___| |\  | | |  | || |\  | |___| |___
|____/|_____|_| \_| |_| |___|_| \_|_____|_____|

  Polymarket whale flow monitor
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;
    cfg.validate().context("Invalid configuration")?;

    init_logging();

    println!("{BANNER}");
    let run_id = uuid::Uuid::new_v4();
    info!(
        %run_id,
        poll_interval_secs = cfg.scanner.poll_interval_secs,
        batch = cfg.scanner.trade_batch_limit,
        tags = ?cfg.catalog.tracked_tags,
        "SENTINEL starting up"
    );
    info!(
        noise = cfg.thresholds.noise_floor,
        stream = cfg.thresholds.stream_min,
        accumulation = cfg.thresholds.accumulation_floor,
        forensic = cfg.thresholds.forensic_trigger,
        critical = cfg.thresholds.critical_trigger,
        window_secs = cfg.thresholds.ladder_window_secs,
        "Routing thresholds"
    );
    info!(
        insider_min_size = cfg.thresholds.insider_min_size,
        "insider_min_size is loaded but not used for routing"
    );

    // -- Initialise components -------------------------------------------

    let visible = SqliteVisibleStore::open(&cfg.storage.visible_flow_db).await?;
    let forensic = SqliteForensicStore::open(&cfg.storage.forensic_db).await?;

    let polymarket = PolymarketClient::new(&cfg.scanner, cfg.catalog.event_limit)?
        .with_portfolio_timeout(cfg.enrichment.portfolio_timeout());
    let polygonscan = PolygonscanClient::new(
        &cfg.enrichment.polygonscan_url,
        AppConfig::resolve_secret(&cfg.enrichment.polygonscan_key_env),
        cfg.enrichment.onchain_timeout(),
    )?;

    let enricher = ForensicEnricher::new(
        Box::new(LiveIntelSources::new(polymarket.clone(), polygonscan)),
        known_wallets(&cfg.enrichment.known_wallets),
        EnricherTimings::from(&cfg.enrichment),
    );

    // Trades already in the feed at startup are not replayed.
    let checkpoint = Utc::now().timestamp();

    let mut sentinel = Sentinel::new(
        &cfg,
        checkpoint,
        Upstreams {
            feed: Box::new(polymarket.clone()),
            markets: Box::new(polymarket),
            intel: Box::new(enricher),
        },
        Stores {
            visible: Box::new(visible),
            forensic: Box::new(forensic),
        },
    );

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.scanner.poll_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.scanner.poll_interval_secs,
        checkpoint,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = sentinel.run_cycle().await;
                log_cycle_report(&report);
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!(
        %run_id,
        checkpoint = sentinel.checkpoint(),
        live_buckets = sentinel.ladder().len(),
        abandoned_value = format!("${:.2}", sentinel.ladder().in_flight_value()),
        "SENTINEL shut down cleanly."
    );

    Ok(())
}

/// Log a one-line cycle summary.
fn log_cycle_report(report: &CycleReport) {
    info!(
        cycle = report.cycle_number,
        feed_ok = report.feed_ok,
        fetched = report.fetched,
        new = report.new_trades,
        dust = report.dust,
        untracked = report.untracked,
        visible = report.visible_trades,
        laddered = report.accumulated,
        early_flushes = report.early_flushes,
        swept = report.swept_forensic + report.swept_visible,
        swept_discarded = report.swept_discarded,
        forensic_writes = report.forensic_writes,
        visible_writes = report.visible_writes,
        write_failures = report.write_failures,
        buckets = report.live_buckets,
        in_flight = format!("${:.2}", report.in_flight_value),
        markets = report.tracked_markets,
        checkpoint = report.checkpoint,
        "Cycle complete"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("whale_sentinel=info"));

    let json_logging = std::env::var("SENTINEL_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
