//! Polygonscan account API.
//!
//! Only one call is needed: the earliest transaction touching a wallet,
//! which is treated as its funding transaction.
//!
//! API: `https://api.polygonscan.com/api?module=account&action=txlist`
//! Auth: API key via `apikey` query param. Free tier is rate limited to a
//! handful of calls per second, so callers pace their requests.

use anyhow::{Context, Result};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Envelope shared by every Polygonscan endpoint.
///
/// `result` is a list on success and an error string otherwise.
#[derive(Debug, Deserialize)]
struct TxListResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Value,
}

pub struct PolygonscanClient {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl PolygonscanClient {
    pub fn new(base_url: &str, api_key: Option<SecretString>, timeout: Duration) -> Result<Self> {
        if api_key.is_none() {
            warn!("No Polygonscan API key configured; funding traces will be rate limited");
        }

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Polygonscan HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.to_string(),
            api_key,
        })
    }

    /// The wallet's first transaction as raw JSON, or `None` if it has none.
    pub async fn first_transaction(&self, wallet: &str) -> Result<Option<Value>> {
        let api_key = self.api_key
            .as_ref()
            .map(|k| k.expose_secret().as_str())
            .unwrap_or_default();

        let resp: TxListResponse = self.http
            .get(&self.base_url)
            .query(&[
                ("module", "account"),
                ("action", "txlist"),
                ("address", wallet),
                ("startblock", "0"),
                ("endblock", "99999999"),
                ("page", "1"),
                ("offset", "1"),
                ("sort", "asc"),
                ("apikey", api_key),
            ])
            .send()
            .await
            .context("Polygonscan txlist request failed")?
            .json()
            .await
            .context("Failed to parse Polygonscan txlist response")?;

        Ok(first_tx_from_response(resp, wallet))
    }
}

fn first_tx_from_response(resp: TxListResponse, wallet: &str) -> Option<Value> {
    if resp.status != "1" {
        debug!(wallet, message = %resp.message, "Polygonscan returned no transactions");
        return None;
    }
    match resp.result {
        Value::Array(mut txs) if !txs.is_empty() => Some(txs.swap_remove(0)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
