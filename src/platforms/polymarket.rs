//! Polymarket integration.
//!
//! Uses the Data API for the public trade feed and portfolio valuation,
//! and the Gamma API for market discovery and user profiles. Everything
//! here is unauthenticated.
//!
//! Data API: https://data-api.polymarket.com
//! Gamma API: https://gamma-api.polymarket.com

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ScannerConfig;
use crate::platforms::{MarketSource, TradeFeed};
use crate::types::{MarketDescriptor, SentinelError, TradeEvent};

const EVENT_URL_BASE: &str = "https://polymarket.com/event";

// ---------------------------------------------------------------------------
// Lenient numeric decoding
// ---------------------------------------------------------------------------

/// The Data API is inconsistent about quoting numbers; accept both.
fn de_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Num(f64),
        Str(String),
    }

    match NumOrStr::deserialize(deserializer)? {
        NumOrStr::Num(n) => Ok(n),
        NumOrStr::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn de_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    de_f64(deserializer).map(|v| v as i64)
}

fn de_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrap(#[serde(deserialize_with = "de_f64")] f64);

    Option::<Wrap>::deserialize(deserializer).map(|w| w.map(|Wrap(v)| v))
}

// ---------------------------------------------------------------------------
// Data API response types
// ---------------------------------------------------------------------------

/// One row of `GET /trades`.
#[derive(Debug, Deserialize, Clone)]
pub struct DataApiTrade {
    #[serde(default, rename = "proxyWallet")]
    pub proxy_wallet: Option<String>,
    #[serde(default)]
    pub taker: Option<String>,
    #[serde(default, rename = "conditionId")]
    pub condition_id: Option<String>,
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub outcome: String,
    #[serde(deserialize_with = "de_f64")]
    pub size: f64,
    #[serde(deserialize_with = "de_f64")]
    pub price: f64,
    #[serde(deserialize_with = "de_i64")]
    pub timestamp: i64,
}

impl DataApiTrade {
    /// Convert into the engine's event type.
    ///
    /// Rows without a wallet or a condition id cannot be keyed and are
    /// dropped.
    pub fn into_event(self) -> Option<TradeEvent> {
        let wallet = self
            .proxy_wallet
            .filter(|w| !w.is_empty())
            .or(self.taker.filter(|w| !w.is_empty()))?;
        let condition_id = self.condition_id.filter(|c| !c.is_empty())?;

        Some(TradeEvent {
            wallet,
            condition_id,
            side: format!("{} {}", self.side, self.outcome),
            size: self.size,
            price: self.price,
            timestamp: self.timestamp,
        })
    }
}

/// `GET /value?user=` response row.
#[derive(Debug, Deserialize)]
struct PortfolioValue {
    #[serde(default, deserialize_with = "de_opt_f64")]
    value: Option<f64>,
}

/// `GET /positions?user=` response row.
#[derive(Debug, Deserialize)]
pub struct PositionValue {
    #[serde(default, rename = "currentValue", deserialize_with = "de_opt_f64")]
    current_value: Option<f64>,
}

/// The value endpoint has returned both a bare object and a one-element list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortfolioResponse {
    One(PortfolioValue),
    Many(Vec<PortfolioValue>),
}

impl PortfolioResponse {
    fn value(&self) -> f64 {
        match self {
            PortfolioResponse::One(v) => v.value.unwrap_or(0.0),
            PortfolioResponse::Many(vs) => vs.iter().filter_map(|v| v.value).sum(),
        }
    }
}

/// A zero from the value endpoint sends us to the positions endpoint.
pub fn needs_positions_fallback(reported: f64) -> bool {
    reported == 0.0
}

/// The reported portfolio value, or the sum of open positions when the
/// value endpoint reported zero. Positions without a value count as zero.
pub fn portfolio_total(reported: f64, positions: &[PositionValue]) -> f64 {
    if !needs_positions_fallback(reported) {
        return reported;
    }
    positions.iter().filter_map(|p| p.current_value).sum()
}

/// Decode `/trades` rows one at a time so a single malformed row only
/// costs that row.
pub fn events_from_rows(rows: Vec<Value>) -> Vec<TradeEvent> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<DataApiTrade>(row) {
            Ok(trade) => trade.into_event(),
            Err(e) => {
                debug!(error = %e, "Skipping undecodable trade row");
                None
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Gamma API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct GammaEvent {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub tags: Vec<GammaTag>,
    #[serde(default)]
    pub markets: Vec<GammaMarket>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GammaTag {
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GammaMarket {
    #[serde(default, rename = "conditionId")]
    pub condition_id: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GammaUser {
    #[serde(default, rename = "createdAt")]
    created_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PolymarketClient {
    http: Client,
    data_api_url: String,
    gamma_api_url: String,
    event_limit: u32,
    portfolio_timeout: Duration,
}

impl PolymarketClient {
    pub fn new(cfg: &ScannerConfig, event_limit: u32) -> Result<Self> {
        let request_timeout = Duration::from_secs(cfg.request_timeout_secs);
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build Polymarket HTTP client")?;

        Ok(Self {
            http,
            data_api_url: cfg.data_api_url.trim_end_matches('/').to_string(),
            gamma_api_url: cfg.gamma_api_url.trim_end_matches('/').to_string(),
            event_limit,
            portfolio_timeout: request_timeout,
        })
    }

    /// Per-request timeout for the `/value` and `/positions` calls.
    pub fn with_portfolio_timeout(mut self, timeout: Duration) -> Self {
        self.portfolio_timeout = timeout;
        self
    }

    /// Fetch the newest trades from the Data API (newest first).
    pub async fn fetch_trades(&self, limit: u32) -> Result<Vec<TradeEvent>> {
        let url = format!("{}/trades", self.data_api_url);
        debug!(limit, "Fetching recent trades");

        let resp = self.http
            .get(&url)
            .query(&[("limit", limit.to_string())])
            .send()
            .await
            .context("Data API trades request failed")?;

        if !resp.status().is_success() {
            return Err(SentinelError::Upstream {
                service: "data-api".to_string(),
                status: resp.status().as_u16(),
            }
            .into());
        }

        let rows: Vec<Value> = resp.json().await
            .context("Failed to parse Data API trades response")?;
        let fetched = rows.len();
        let events = events_from_rows(rows);

        debug!(fetched, usable = events.len(), "Trades decoded");
        Ok(events)
    }

    /// Fetch active events from the Gamma API (no auth required).
    pub async fn fetch_events(&self) -> Result<Vec<GammaEvent>> {
        let url = format!("{}/events", self.gamma_api_url);

        let resp = self.http
            .get(&url)
            .query(&[
                ("limit", self.event_limit.to_string()),
                ("active", "true".to_string()),
                ("closed", "false".to_string()),
            ])
            .send()
            .await
            .context("Gamma API events request failed")?;

        if !resp.status().is_success() {
            return Err(SentinelError::Upstream {
                service: "gamma-api".to_string(),
                status: resp.status().as_u16(),
            }
            .into());
        }

        let events: Vec<GammaEvent> = resp.json().await
            .context("Failed to parse Gamma events response")?;
        info!(count = events.len(), "Fetched raw Gamma events");
        Ok(events)
    }

    /// Account creation time from the Gamma user profile, if published.
    pub async fn fetch_account_created(&self, wallet: &str) -> Result<Option<i64>> {
        let url = format!("{}/users/{}", self.gamma_api_url, urlencoding::encode(wallet));

        let resp = self.http.get(&url).send().await
            .context("Gamma user request failed")?;
        if !resp.status().is_success() {
            return Err(SentinelError::Upstream {
                service: "gamma-api".to_string(),
                status: resp.status().as_u16(),
            }
            .into());
        }

        let user: GammaUser = resp.json().await
            .context("Failed to parse Gamma user response")?;
        Ok(user.created_at.as_deref().and_then(parse_created_at))
    }

    /// Current portfolio value in USD.
    ///
    /// Falls back to summing open positions when the value endpoint
    /// reports zero. Each of the two requests gets the full portfolio
    /// timeout.
    pub async fn fetch_portfolio_value(&self, wallet: &str) -> Result<f64> {
        let url = format!("{}/value", self.data_api_url);
        let resp: PortfolioResponse = self.http
            .get(&url)
            .query(&[("user", wallet)])
            .timeout(self.portfolio_timeout)
            .send()
            .await
            .context("Data API value request failed")?
            .json()
            .await
            .context("Failed to parse Data API value response")?;

        let reported = resp.value();
        let positions = if needs_positions_fallback(reported) {
            self.fetch_positions(wallet).await?
        } else {
            Vec::new()
        };

        Ok(portfolio_total(reported, &positions))
    }

    async fn fetch_positions(&self, wallet: &str) -> Result<Vec<PositionValue>> {
        let url = format!("{}/positions", self.data_api_url);
        self.http
            .get(&url)
            .query(&[("user", wallet), ("sizeThreshold", "1")])
            .timeout(self.portfolio_timeout)
            .send()
            .await
            .context("Data API positions request failed")?
            .json()
            .await
            .context("Failed to parse Data API positions response")
    }
}

/// Parse Gamma's `createdAt` (RFC 3339, usually with a trailing `Z`).
pub fn parse_created_at(raw: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.timestamp())
}

/// Flatten Gamma events into descriptors for markets under a tracked tag.
pub fn descriptors_from_events(events: &[GammaEvent], tags: &[String]) -> Vec<MarketDescriptor> {
    let tracked: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();

    events
        .iter()
        .filter(|event| {
            event.tags.iter().any(|tag| {
                tag.slug
                    .as_deref()
                    .map(|s| tracked.contains(&s.to_lowercase()))
                    .unwrap_or(false)
            })
        })
        .flat_map(|event| {
            event.markets.iter().filter_map(move |market| {
                let condition_id = market.condition_id.as_deref().filter(|c| !c.is_empty())?;
                Some(MarketDescriptor {
                    condition_id: condition_id.to_string(),
                    question: market.question.clone().unwrap_or_else(|| "...".to_string()),
                    category: event.slug.clone(),
                    link: format!("{EVENT_URL_BASE}/{}", event.slug),
                })
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl TradeFeed for PolymarketClient {
    async fn fetch_recent(&self, limit: u32) -> Result<Vec<TradeEvent>> {
        self.fetch_trades(limit).await
    }

    fn name(&self) -> &str {
        "polymarket-data-api"
    }
}

#[async_trait]
impl MarketSource for PolymarketClient {
    async fn fetch_tracked_markets(&self, tags: &[String]) -> Result<Vec<MarketDescriptor>> {
        let events = self.fetch_events().await?;
        let descriptors = descriptors_from_events(&events, tags);
        info!(count = descriptors.len(), tags = ?tags, "Tracked markets mapped");
        Ok(descriptors)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
