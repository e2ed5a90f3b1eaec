// Pricing module - quote clients for the watchlist phase

pub mod finnhub;
pub mod yahoo;

use anyhow::anyhow;
use serde::Serialize;

use crate::config::{QuoteProviderKind, QuotesConfig};
use crate::error::Result;

pub use finnhub::FinnhubClient;
pub use yahoo::YahooClient;

/// Environment variable holding the Finnhub API token
pub const FINNHUB_API_KEY_ENV: &str = "FINNHUB_API_KEY";

/// Quote fields used to derive a snapshot record.
///
/// Every field is optional: providers routinely omit dividend data for
/// non-paying instruments and the current price outside market hours.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Quote {
    pub current_price: Option<f64>,
    pub previous_close: Option<f64>,
    /// Annualized dividend per share, in the quote currency
    pub dividend_rate: Option<f64>,
    /// Trailing dividend yield as a 0-1 ratio
    pub dividend_yield: Option<f64>,
}

/// Anything that can look up a quote by its source-specific key
#[allow(async_fn_in_trait)]
pub trait QuoteSource {
    async fn fetch_quote(&self, key: &str) -> Result<Quote>;
}

/// Quote client selected from configuration
pub enum QuoteClient {
    Yahoo(YahooClient),
    Finnhub(FinnhubClient),
}

impl QuoteClient {
    pub fn from_config(config: &QuotesConfig) -> Result<Self> {
        match config.provider {
            QuoteProviderKind::Yahoo => Ok(QuoteClient::Yahoo(YahooClient::with_session_url(
                config.base_url_or_default(),
                config.session_url_or_default(),
            )?)),
            QuoteProviderKind::Finnhub => {
                let api_key = config.resolved_api_key().ok_or_else(|| {
                    anyhow!(
                        "Finnhub provider requires an API key ({} or quotes.api_key)",
                        FINNHUB_API_KEY_ENV
                    )
                })?;
                Ok(QuoteClient::Finnhub(FinnhubClient::new(
                    config.base_url_or_default(),
                    api_key,
                )?))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            QuoteClient::Yahoo(_) => "Yahoo Finance",
            QuoteClient::Finnhub(_) => "Finnhub",
        }
    }
}

impl QuoteSource for QuoteClient {
    async fn fetch_quote(&self, key: &str) -> Result<Quote> {
        match self {
            QuoteClient::Yahoo(client) => client.fetch_quote(key).await,
            QuoteClient::Finnhub(client) => client.fetch_quote(key).await,
        }
    }
}
