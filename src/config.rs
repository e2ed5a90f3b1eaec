//! Configuration loading
//!
//! The watchlist and provider settings live in a TOML file so the instrument
//! list is data rather than code. Lookup order: an explicit `--config` path,
//! `./dividends.toml`, then `<config_home>/dividends/config.toml`. When no
//! file exists the built-in defaults are used.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Result, SnapshotError};
use crate::pricing::{finnhub, yahoo, FINNHUB_API_KEY_ENV};
use crate::snapshot::{Instrument, UPDATED_AT_KEY};
use crate::utils::RoundingPolicy;

pub const LOCAL_CONFIG_FILENAME: &str = "dividends.toml";
const CONFIG_DIR_NAME: &str = "dividends";
const CONFIG_FILENAME: &str = "config.toml";

pub const DEFAULT_OUTPUT: &str = "data/dividends.json";
pub const DEFAULT_SNIPPET_OUTPUT: &str = "data/scolkg_snippet.json";
pub const DEFAULT_SNIPPET_URL: &str = "https://scolkg.com/";
pub const DEFAULT_SNIPPET_SELECTOR: &str = ".crypto-widget";
pub const DEFAULT_DISCOVERY_BASE_URL: &str = "https://openapi.koreainvestment.com:9443";
pub const DEFAULT_DISCOVERY_MARKER: &str = "⭐ ";
/// Upper bound on the ranking window, roughly ten years
pub const MAX_WINDOW_DAYS: i64 = 3660;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Snapshot output path
    pub output: PathBuf,
    /// Lookup-key suffixes of the local exchange (integer presentation)
    pub local_suffixes: Vec<String>,
    pub quotes: QuotesConfig,
    pub discovery: DiscoveryConfig,
    pub snippet: SnippetConfig,
    pub watchlist: Vec<Instrument>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteProviderKind {
    #[default]
    Yahoo,
    Finnhub,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotesConfig {
    pub provider: QuoteProviderKind,
    pub base_url: Option<String>,
    /// Yahoo only: endpoint that hands out the session cookie
    pub session_url: Option<String>,
    /// Finnhub only; the environment variable wins when both are set
    pub api_key: Option<String>,
}

impl QuotesConfig {
    pub fn base_url_or_default(&self) -> &str {
        match (&self.base_url, self.provider) {
            (Some(url), _) => url,
            (None, QuoteProviderKind::Yahoo) => yahoo::DEFAULT_BASE_URL,
            (None, QuoteProviderKind::Finnhub) => finnhub::DEFAULT_BASE_URL,
        }
    }

    pub fn session_url_or_default(&self) -> &str {
        self.session_url
            .as_deref()
            .unwrap_or(yahoo::DEFAULT_SESSION_URL)
    }

    /// Finnhub token: the environment variable, else the configured key
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key_with(std::env::var(FINNHUB_API_KEY_ENV).ok())
    }

    fn api_key_with(&self, from_env: Option<String>) -> Option<String> {
        let usable = |k: &String| !k.trim().is_empty();
        from_env
            .filter(usable)
            .or_else(|| self.api_key.clone().filter(usable))
    }

    fn validate(&self, from_env: Option<String>) -> Result<()> {
        if self.provider == QuoteProviderKind::Finnhub && self.api_key_with(from_env).is_none() {
            return Err(SnapshotError::ConfigError(format!(
                "the finnhub provider needs an API key ({} or quotes.api_key)",
                FINNHUB_API_KEY_ENV
            ))
            .into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    pub base_url: String,
    /// Prefix that marks auto-discovered entries in the snapshot
    pub marker: String,
    /// Maximum number of ranked entries kept
    pub limit: usize,
    /// Market segment (0 = all, 1 = KOSPI, 2 = KOSDAQ)
    pub market: String,
    /// Length of the trailing ranking window
    pub window_days: i64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: DEFAULT_DISCOVERY_BASE_URL.to_string(),
            marker: DEFAULT_DISCOVERY_MARKER.to_string(),
            limit: 5,
            market: "0".to_string(),
            window_days: 365,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnippetConfig {
    pub url: String,
    pub selector: String,
    pub output: PathBuf,
}

impl Default for SnippetConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SNIPPET_URL.to_string(),
            selector: DEFAULT_SNIPPET_SELECTOR.to_string(),
            output: PathBuf::from(DEFAULT_SNIPPET_OUTPUT),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output: PathBuf::from(DEFAULT_OUTPUT),
            local_suffixes: vec![".KS".to_string(), ".KQ".to_string()],
            quotes: QuotesConfig::default(),
            discovery: DiscoveryConfig::default(),
            snippet: SnippetConfig::default(),
            watchlist: default_watchlist(),
        }
    }
}

fn default_watchlist() -> Vec<Instrument> {
    [
        ("SCHD", "SCHD"),
        ("TLT", "TLT"),
        ("하나금융지주", "086790.KS"),
        ("우리금융지주", "316140.KS"),
        ("삼성카드", "029780.KS"),
        ("현대차2우B", "005387.KS"),
        ("SK텔레콤", "017670.KS"),
        ("삼성화재우", "000815.KS"),
        ("BNK금융지주", "138930.KS"),
        ("NH투자증권우", "005945.KS"),
        ("삼성생명", "032830.KS"),
        ("LG유플러스", "032640.KS"),
        ("HD현대", "267250.KS"),
        ("KT", "030200.KS"),
        ("iM금융지주", "139130.KS"),
        ("KT&G", "033780.KS"),
        ("삼성증권", "016360.KS"),
        ("삼성전자", "005930.KS"),
    ]
    .into_iter()
    .map(|(name, key)| Instrument::new(name, key))
    .collect()
}

impl Config {
    /// Load configuration from `path`, or from the first default location
    /// that exists, falling back to built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let resolved = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path(),
        };

        let config = match resolved {
            Some(p) => {
                info!("Loading configuration from {}", p.display());
                let text = fs::read_to_string(&p)
                    .with_context(|| format!("Failed to read config file {}", p.display()))?;
                Self::from_toml(&text)
                    .with_context(|| format!("Invalid config file {}", p.display()))?
            }
            None => {
                debug!("No config file found, using built-in defaults");
                Self::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)
            .map_err(|e| SnapshotError::ConfigError(e.to_string().trim_end().to_string()))?;
        Ok(config)
    }

    /// Reject configurations whose display names would clobber each other in
    /// the output mapping.
    pub fn validate(&self) -> Result<()> {
        self.quotes.validate(std::env::var(FINNHUB_API_KEY_ENV).ok())?;

        if self.discovery.limit == 0 {
            return Err(SnapshotError::ConfigError("discovery.limit must be at least 1".into()).into());
        }
        if !(1..=MAX_WINDOW_DAYS).contains(&self.discovery.window_days) {
            return Err(SnapshotError::ConfigError(format!(
                "discovery.window_days must be between 1 and {}",
                MAX_WINDOW_DAYS
            ))
            .into());
        }
        // Discovered names are kept apart from watchlist names only by the marker
        if self.discovery.marker.trim().is_empty() {
            return Err(
                SnapshotError::ConfigError("discovery.marker must not be blank".into()).into(),
            );
        }

        let mut seen = HashSet::new();
        for instrument in &self.watchlist {
            if instrument.name.trim().is_empty() {
                return Err(SnapshotError::ConfigError(format!(
                    "watchlist entry for key '{}' has an empty name",
                    instrument.key
                ))
                .into());
            }
            if instrument.key.trim().is_empty() {
                return Err(SnapshotError::ConfigError(format!(
                    "watchlist entry '{}' has an empty key",
                    instrument.name
                ))
                .into());
            }
            if instrument.name == UPDATED_AT_KEY {
                return Err(SnapshotError::ConfigError(format!(
                    "watchlist name '{}' is reserved for the snapshot timestamp",
                    UPDATED_AT_KEY
                ))
                .into());
            }
            if instrument.name.starts_with(&self.discovery.marker) {
                return Err(SnapshotError::ConfigError(format!(
                    "watchlist name '{}' starts with the discovery marker '{}'",
                    instrument.name, self.discovery.marker
                ))
                .into());
            }
            if !seen.insert(instrument.name.as_str()) {
                return Err(SnapshotError::ConfigError(format!(
                    "duplicate watchlist name '{}'",
                    instrument.name
                ))
                .into());
            }
        }
        Ok(())
    }

    pub fn rounding_policy(&self) -> RoundingPolicy {
        RoundingPolicy::new(self.local_suffixes.clone())
    }
}

fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_FILENAME);
    if local.is_file() {
        return Some(local);
    }

    let user = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(dir_spec::config_home)?
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILENAME);
    user.is_file().then_some(user)
}
