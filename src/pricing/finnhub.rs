use anyhow::{anyhow, Context};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

use super::{Quote, QuoteSource};
use crate::error::{Result, SnapshotError};

pub const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1";

/// Finnhub `/quote` response
#[derive(Debug, Deserialize)]
struct FinnhubQuote {
    /// Current price
    c: Option<f64>,
    /// Previous close
    pc: Option<f64>,
}

/// Finnhub `/stock/metric` response
#[derive(Debug, Deserialize)]
struct FinnhubMetricResponse {
    #[serde(default)]
    metric: FinnhubMetric,
}

#[derive(Debug, Default, Deserialize)]
struct FinnhubMetric {
    #[serde(rename = "dividendPerShareAnnual")]
    dividend_per_share_annual: Option<f64>,
    /// Trailing yield as a 0-1 ratio
    #[serde(rename = "dividendYieldTTM")]
    dividend_yield_ttm: Option<f64>,
    /// Reported on the 0-100 scale
    #[serde(rename = "dividendYieldIndicatedAnnual")]
    dividend_yield_indicated_annual: Option<f64>,
}

/// Finnhub quote client (quote + basic financials)
pub struct FinnhubClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl FinnhubClient {
    pub fn new(base_url: &str, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (compatible; DividendsBot/1.0)")
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build Finnhub HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let mut params = query.to_vec();
        params.push(("token", self.api_key.as_str()));
        let url = Url::parse_with_params(&format!("{}{}", self.base_url, path), &params)
            .context("Invalid Finnhub URL")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request to Finnhub")?;

        if !response.status().is_success() {
            return Err(anyhow!("Finnhub returned error status: {}", response.status()));
        }

        response
            .json()
            .await
            .context("Failed to parse Finnhub response")
    }
}

impl QuoteSource for FinnhubClient {
    async fn fetch_quote(&self, key: &str) -> Result<Quote> {
        info!("Fetching quote for {} from Finnhub", key);

        let quote: FinnhubQuote = self.get_json("/quote", &[("symbol", key)]).await?;
        let metrics: FinnhubMetricResponse = self
            .get_json("/stock/metric", &[("symbol", key), ("metric", "all")])
            .await?;

        to_quote(key, quote, metrics.metric)
    }
}

fn to_quote(key: &str, quote: FinnhubQuote, metric: FinnhubMetric) -> Result<Quote> {
    // Finnhub answers unknown symbols with an all-zero quote instead of an error
    let current_price = quote.c.filter(|p| *p != 0.0);
    let previous_close = quote.pc.filter(|p| *p != 0.0);
    if current_price.is_none() && previous_close.is_none() {
        return Err(SnapshotError::QuoteError(format!("no data returned from Finnhub for {}", key)).into());
    }

    Ok(Quote {
        current_price,
        previous_close,
        dividend_rate: metric.dividend_per_share_annual,
        dividend_yield: metric
            .dividend_yield_ttm
            .or_else(|| metric.dividend_yield_indicated_annual.map(|y| y / 100.0)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_fixtures() -> (FinnhubQuote, FinnhubMetric) {
        let quote: FinnhubQuote = serde_json::from_str(include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/finnhub_quote_schd.json"
        )))
        .unwrap();
        let metrics: FinnhubMetricResponse = serde_json::from_str(include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/finnhub_metric_schd.json"
        )))
        .unwrap();
        (quote, metrics.metric)
    }

    #[test]
    fn test_fixture_maps_to_quote() {
        let (quote, metric) = parse_fixtures();
        let quote = to_quote("SCHD", quote, metric).unwrap();
        assert_eq!(quote.current_price, Some(27.41));
        assert_eq!(quote.previous_close, Some(27.29));
        assert_eq!(quote.dividend_rate, Some(1.0216));
        assert_eq!(quote.dividend_yield, Some(0.0371));
    }

    #[test]
    fn test_indicated_yield_is_the_fallback() {
        let metrics: FinnhubMetricResponse =
            serde_json::from_str(r#"{"metric":{"dividendYieldIndicatedAnnual":3.7271}}"#)
                .unwrap();
        let quote = FinnhubQuote {
            c: Some(27.41),
            pc: Some(27.29),
        };
        let quote = to_quote("SCHD", quote, metrics.metric).unwrap();
        let ratio = quote.dividend_yield.unwrap();
        assert!((ratio - 0.037271).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_symbol_is_an_error() {
        let quote: FinnhubQuote =
            serde_json::from_str(r#"{"c":0,"d":null,"dp":null,"h":0,"l":0,"o":0,"pc":0,"t":0}"#)
                .unwrap();
        let err = to_quote("NOPE", quote, FinnhubMetric::default()).unwrap_err();
        assert_eq!(err.to_string(), "quote error: no data returned from Finnhub for NOPE");
    }

    #[test]
    fn test_missing_metrics_leave_dividends_empty() {
        let metrics: FinnhubMetricResponse = serde_json::from_str(r#"{"metric":{}}"#).unwrap();
        let quote = FinnhubQuote {
            c: Some(90.5),
            pc: None,
        };
        let quote = to_quote("TLT", quote, metrics.metric).unwrap();
        assert_eq!(quote.current_price, Some(90.5));
        assert_eq!(quote.previous_close, None);
        assert_eq!(quote.dividend_rate, None);
        assert_eq!(quote.dividend_yield, None);
    }
}
