//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every field has a default, so a partial file is valid. Secrets (the
//! Polygonscan key) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use crate::types::SentinelError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub scanner: ScannerConfig,
    pub thresholds: Thresholds,
    pub catalog: CatalogConfig,
    pub enrichment: EnrichmentConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScannerConfig {
    pub poll_interval_secs: u64,
    /// How many of the newest trades to pull per cycle.
    pub trade_batch_limit: u32,
    pub data_api_url: String,
    pub gamma_api_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 15,
            trade_batch_limit: 50,
            data_api_url: "https://data-api.polymarket.com".to_string(),
            gamma_api_url: "https://gamma-api.polymarket.com".to_string(),
            request_timeout_secs: 10,
        }
    }
}

/// Routing thresholds, all in USD except the ladder window.
///
/// Must satisfy `noise_floor <= stream_min <= accumulation_floor
/// <= forensic_trigger <= critical_trigger`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    /// Below this a trade is dust.
    pub noise_floor: f64,
    /// Minimum value persisted to the visible-flow store.
    pub stream_min: f64,
    /// Trades at or above this enter the ladder.
    pub accumulation_floor: f64,
    /// A swept bucket at or above this takes the forensic path.
    pub forensic_trigger: f64,
    /// A live bucket reaching this flushes immediately.
    pub critical_trigger: f64,
    /// Minimum forensic entry size. Parsed and reported, never used for routing.
    pub insider_min_size: f64,
    /// Quiet window after which a bucket is swept.
    pub ladder_window_secs: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            noise_floor: 9.0,
            stream_min: 10.0,
            accumulation_floor: 500.0,
            forensic_trigger: 3000.0,
            critical_trigger: 5000.0,
            insider_min_size: 1000.0,
            ladder_window_secs: 600,
        }
    }
}

impl Thresholds {
    /// Reject orderings that would make routing undefined.
    pub fn validate(&self) -> Result<(), SentinelError> {
        let chain = [
            ("noise_floor", self.noise_floor),
            ("stream_min", self.stream_min),
            ("accumulation_floor", self.accumulation_floor),
            ("forensic_trigger", self.forensic_trigger),
            ("critical_trigger", self.critical_trigger),
        ];

        for (name, value) in chain {
            if !value.is_finite() || value < 0.0 {
                return Err(SentinelError::Config(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }

        for pair in chain.windows(2) {
            let (lo_name, lo) = pair[0];
            let (hi_name, hi) = pair[1];
            if lo > hi {
                return Err(SentinelError::Config(format!(
                    "{lo_name} ({lo}) must not exceed {hi_name} ({hi})"
                )));
            }
        }

        if self.ladder_window_secs <= 0 {
            return Err(SentinelError::Config(format!(
                "ladder_window_secs must be positive, got {}",
                self.ladder_window_secs
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CatalogConfig {
    /// Event tag slugs whose markets are tracked.
    pub tracked_tags: Vec<String>,
    pub refresh_interval_secs: u64,
    pub event_limit: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            tracked_tags: vec!["politics".to_string(), "us-election".to_string()],
            refresh_interval_secs: 3600,
            event_limit: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub polygonscan_key_env: String,
    pub polygonscan_url: String,
    pub profile_timeout_secs: u64,
    pub portfolio_timeout_secs: u64,
    pub onchain_timeout_secs: u64,
    /// Delay before each on-chain lookup, to respect provider rate limits.
    pub onchain_pacing_ms: u64,
    /// Extra address → label entries merged over the built-in allow-list.
    pub known_wallets: HashMap<String, String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            polygonscan_key_env: "POLYGONSCAN_API_KEY".to_string(),
            polygonscan_url: "https://api.polygonscan.com/api".to_string(),
            profile_timeout_secs: 4,
            portfolio_timeout_secs: 4,
            onchain_timeout_secs: 5,
            onchain_pacing_ms: 200,
            known_wallets: HashMap::new(),
        }
    }
}

impl EnrichmentConfig {
    pub fn profile_timeout(&self) -> Duration {
        Duration::from_secs(self.profile_timeout_secs)
    }

    pub fn portfolio_timeout(&self) -> Duration {
        Duration::from_secs(self.portfolio_timeout_secs)
    }

    pub fn onchain_timeout(&self) -> Duration {
        Duration::from_secs(self.onchain_timeout_secs)
    }

    pub fn onchain_pacing(&self) -> Duration {
        Duration::from_millis(self.onchain_pacing_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub visible_flow_db: String,
    pub forensic_db: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            visible_flow_db: "whale_hunter.db".to_string(),
            forensic_db: "insider_intel.db".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Startup checks. Any failure here is fatal.
    pub fn validate(&self) -> Result<(), SentinelError> {
        self.thresholds.validate()?;
        if self.scanner.poll_interval_secs == 0 {
            return Err(SentinelError::Config(
                "scanner.poll_interval_secs must be positive".to_string(),
            ));
        }
        if self.scanner.trade_batch_limit == 0 {
            return Err(SentinelError::Config(
                "scanner.trade_batch_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve a secret referenced by env-var name, if set and non-empty.
    pub fn resolve_secret(env_name: &str) -> Option<SecretString> {
        Self::resolve_env(env_name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(SecretString::new)
    }
}
