//! SQLite implementations of both stores.
//!
//! No pool is kept: each unit of work opens a connection, runs in a single
//! transaction, and closes it. Files are opened in WAL mode with a 30 s busy
//! timeout so a reporting process can read either database concurrently.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::{ConnectOptions, Connection, SqliteConnection};
use std::time::Duration;
use tracing::{debug, info};

use super::{ForensicStore, NewEvent, StoredEvent, VisibleFlowStore, WalletAggregate, WalletUpsert};
use crate::types::{SentinelError, WalletIntelProfile};

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

fn connect_options(path: &str) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT)
}

async fn open(options: &SqliteConnectOptions, path: &str) -> Result<SqliteConnection> {
    options.connect().await.map_err(|e| {
        SentinelError::Storage {
            store: path.to_string(),
            message: format!("failed to open database: {e}"),
        }
        .into()
    })
}

// ---------------------------------------------------------------------------
// Visible-flow store
// ---------------------------------------------------------------------------

const VISIBLE_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS whales (
        address TEXT PRIMARY KEY,
        first_seen INTEGER,
        last_seen INTEGER,
        total_volume REAL DEFAULT 0,
        funding_source TEXT
    )",
    "CREATE TABLE IF NOT EXISTS bets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        whale_address TEXT,
        timestamp INTEGER,
        market_question TEXT,
        category TEXT,
        position TEXT,
        size_usd REAL,
        bet_link TEXT,
        tx_hash TEXT,
        processed_by_analyst BOOLEAN DEFAULT 0,
        FOREIGN KEY(whale_address) REFERENCES whales(address)
    )",
];

pub struct SqliteVisibleStore {
    path: String,
    options: SqliteConnectOptions,
}

impl SqliteVisibleStore {
    /// Open (creating if needed) the database and ensure its schema.
    pub async fn open(path: &str) -> Result<Self> {
        let store = Self {
            path: path.to_string(),
            options: connect_options(path),
        };
        let mut conn = open(&store.options, path).await?;
        for ddl in VISIBLE_SCHEMA {
            sqlx::query(ddl)
                .execute(&mut conn)
                .await
                .with_context(|| format!("Failed to create visible-flow schema in {path}"))?;
        }
        conn.close().await.ok();
        info!(path, "Visible-flow store ready");
        Ok(store)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn wallet(&self, address: &str) -> Result<Option<WalletAggregate>> {
        let mut conn = open(&self.options, &self.path).await?;
        let row = sqlx::query_as::<_, WalletAggregate>(
            "SELECT address, first_seen, last_seen, total_volume, funding_source
             FROM whales WHERE address = ?",
        )
        .bind(address)
        .fetch_optional(&mut conn)
        .await
        .context("Failed to read visible-flow wallet")?;
        conn.close().await.ok();
        Ok(row)
    }

    pub async fn events_for(&self, address: &str) -> Result<Vec<StoredEvent>> {
        let mut conn = open(&self.options, &self.path).await?;
        let rows = sqlx::query_as::<_, StoredEvent>(
            "SELECT id, whale_address AS wallet, timestamp, market_question AS question,
                    category, position AS side, size_usd, bet_link AS link
             FROM bets WHERE whale_address = ? ORDER BY id",
        )
        .bind(address)
        .fetch_all(&mut conn)
        .await
        .context("Failed to read visible-flow events")?;
        conn.close().await.ok();
        Ok(rows)
    }

    /// Event count and summed USD size over the whole log.
    pub async fn totals(&self) -> Result<(i64, f64)> {
        let mut conn = open(&self.options, &self.path).await?;
        let totals: (i64, f64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(size_usd), 0.0) FROM bets",
        )
        .fetch_one(&mut conn)
        .await
        .context("Failed to total visible-flow events")?;
        conn.close().await.ok();
        Ok(totals)
    }
}

#[async_trait]
impl VisibleFlowStore for SqliteVisibleStore {
    async fn record_flow(&self, wallet: &WalletUpsert, event: &NewEvent) -> Result<()> {
        let mut conn = open(&self.options, &self.path).await?;
        let mut tx = conn.begin().await.context("Failed to begin visible-flow transaction")?;

        sqlx::query(
            "INSERT OR IGNORE INTO whales (address, first_seen, last_seen, funding_source)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&wallet.address)
        .bind(wallet.first_seen)
        .bind(wallet.last_seen)
        .bind(&wallet.funding_source)
        .execute(&mut *tx)
        .await
        .context("Failed to insert visible-flow wallet")?;

        sqlx::query(
            "UPDATE whales
             SET last_seen = ?, total_volume = total_volume + ?, funding_source = ?
             WHERE address = ?",
        )
        .bind(wallet.last_seen)
        .bind(wallet.delta_volume)
        .bind(&wallet.funding_source)
        .bind(&wallet.address)
        .execute(&mut *tx)
        .await
        .context("Failed to update visible-flow wallet")?;

        sqlx::query(
            "INSERT INTO bets
             (whale_address, timestamp, market_question, category, position, size_usd, bet_link)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.wallet)
        .bind(event.timestamp)
        .bind(&event.question)
        .bind(&event.category)
        .bind(&event.side)
        .bind(event.size_usd)
        .bind(&event.link)
        .execute(&mut *tx)
        .await
        .context("Failed to append visible-flow event")?;

        tx.commit().await.context("Failed to commit visible-flow write")?;
        conn.close().await.ok();

        debug!(wallet = %wallet.address, size = event.size_usd, "Visible-flow write committed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Forensic store
// ---------------------------------------------------------------------------

const FORENSIC_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS intel_whales (
        address TEXT PRIMARY KEY,
        funding_source TEXT,
        account_created_ts INTEGER,
        portfolio_value REAL,
        total_scanned_volume REAL DEFAULT 0,
        last_active_ts INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS intel_bets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        whale_address TEXT,
        timestamp INTEGER,
        market_question TEXT,
        position TEXT,
        size_usd REAL,
        FOREIGN KEY(whale_address) REFERENCES intel_whales(address)
    )",
];

pub struct SqliteForensicStore {
    path: String,
    options: SqliteConnectOptions,
}

impl SqliteForensicStore {
    /// Open (creating if needed) the database and ensure its schema.
    pub async fn open(path: &str) -> Result<Self> {
        let store = Self {
            path: path.to_string(),
            options: connect_options(path),
        };
        let mut conn = open(&store.options, path).await?;
        for ddl in FORENSIC_SCHEMA {
            sqlx::query(ddl)
                .execute(&mut conn)
                .await
                .with_context(|| format!("Failed to create forensic schema in {path}"))?;
        }
        conn.close().await.ok();
        info!(path, "Forensic store ready");
        Ok(store)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The forensic aggregate, with account creation standing in for
    /// first-seen.
    pub async fn wallet(&self, address: &str) -> Result<Option<WalletAggregate>> {
        let mut conn = open(&self.options, &self.path).await?;
        let row = sqlx::query_as::<_, WalletAggregate>(
            "SELECT address, account_created_ts AS first_seen, last_active_ts AS last_seen,
                    total_scanned_volume AS total_volume, funding_source
             FROM intel_whales WHERE address = ?",
        )
        .bind(address)
        .fetch_optional(&mut conn)
        .await
        .context("Failed to read forensic wallet")?;
        conn.close().await.ok();
        Ok(row)
    }

    pub async fn portfolio_value(&self, address: &str) -> Result<Option<f64>> {
        let mut conn = open(&self.options, &self.path).await?;
        let value: Option<f64> = sqlx::query_scalar(
            "SELECT portfolio_value FROM intel_whales WHERE address = ?",
        )
        .bind(address)
        .fetch_optional(&mut conn)
        .await
        .context("Failed to read forensic portfolio value")?;
        conn.close().await.ok();
        Ok(value)
    }

    pub async fn events_for(&self, address: &str) -> Result<Vec<StoredEvent>> {
        let mut conn = open(&self.options, &self.path).await?;
        let rows = sqlx::query_as::<_, StoredEvent>(
            "SELECT id, whale_address AS wallet, timestamp, market_question AS question,
                    NULL AS category, position AS side, size_usd, NULL AS link
             FROM intel_bets WHERE whale_address = ? ORDER BY id",
        )
        .bind(address)
        .fetch_all(&mut conn)
        .await
        .context("Failed to read forensic events")?;
        conn.close().await.ok();
        Ok(rows)
    }

    /// Event count and summed USD size over the whole log.
    pub async fn totals(&self) -> Result<(i64, f64)> {
        let mut conn = open(&self.options, &self.path).await?;
        let totals: (i64, f64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(size_usd), 0.0) FROM intel_bets",
        )
        .fetch_one(&mut conn)
        .await
        .context("Failed to total forensic events")?;
        conn.close().await.ok();
        Ok(totals)
    }
}

#[async_trait]
impl ForensicStore for SqliteForensicStore {
    async fn record_intel(
        &self,
        wallet: &WalletUpsert,
        intel: &WalletIntelProfile,
        event: &NewEvent,
    ) -> Result<()> {
        let mut conn = open(&self.options, &self.path).await?;
        let mut tx = conn.begin().await.context("Failed to begin forensic transaction")?;

        sqlx::query(
            "INSERT OR IGNORE INTO intel_whales
             (address, funding_source, account_created_ts, portfolio_value, last_active_ts)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&wallet.address)
        .bind(&wallet.funding_source)
        .bind(wallet.first_seen)
        .bind(intel.portfolio_value)
        .bind(wallet.last_seen)
        .execute(&mut *tx)
        .await
        .context("Failed to insert forensic wallet")?;

        sqlx::query(
            "UPDATE intel_whales
             SET total_scanned_volume = total_scanned_volume + ?, last_active_ts = ?,
                 portfolio_value = ?, funding_source = ?
             WHERE address = ?",
        )
        .bind(wallet.delta_volume)
        .bind(wallet.last_seen)
        .bind(intel.portfolio_value)
        .bind(&wallet.funding_source)
        .bind(&wallet.address)
        .execute(&mut *tx)
        .await
        .context("Failed to update forensic wallet")?;

        sqlx::query(
            "INSERT INTO intel_bets (whale_address, timestamp, market_question, position, size_usd)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&event.wallet)
        .bind(event.timestamp)
        .bind(&event.question)
        .bind(&event.side)
        .bind(event.size_usd)
        .execute(&mut *tx)
        .await
        .context("Failed to append forensic event")?;

        tx.commit().await.context("Failed to commit forensic write")?;
        conn.close().await.ok();

        debug!(wallet = %wallet.address, size = event.size_usd, "Forensic write committed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
