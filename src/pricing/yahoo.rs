use anyhow::{anyhow, Context};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{Quote, QuoteSource};
use crate::error::Result;

pub const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";
pub const DEFAULT_SESSION_URL: &str = "https://fc.yahoo.com";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const QUOTE_MODULES: &str = "price,summaryDetail,financialData";

/// Yahoo Finance quoteSummary response
#[derive(Debug, Deserialize)]
struct QuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummary,
}

#[derive(Debug, Deserialize)]
struct QuoteSummary {
    result: Option<Vec<QuoteSummaryResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResult {
    price: Option<PriceModule>,
    summary_detail: Option<SummaryDetail>,
    financial_data: Option<FinancialData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    regular_market_price: Option<RawValue>,
    regular_market_previous_close: Option<RawValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDetail {
    previous_close: Option<RawValue>,
    dividend_rate: Option<RawValue>,
    dividend_yield: Option<RawValue>,
    trailing_annual_dividend_yield: Option<RawValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinancialData {
    current_price: Option<RawValue>,
}

/// Yahoo wraps numbers as `{"raw": 1.0, "fmt": "1.00"}`, or `{}` when absent
#[derive(Debug, Deserialize)]
struct RawValue {
    raw: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: String,
    description: String,
}

fn raw(value: Option<&RawValue>) -> Option<f64> {
    value.and_then(|v| v.raw)
}

/// Yahoo Finance quote client.
///
/// Yahoo rejects quoteSummary requests without a session cookie and a
/// matching crumb, so the first lookup primes both and later lookups reuse
/// them.
pub struct YahooClient {
    client: Client,
    base_url: String,
    session_url: String,
    crumb: OnceCell<Option<String>>,
}

impl YahooClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_session_url(base_url, DEFAULT_SESSION_URL)
    }

    pub fn with_session_url(base_url: &str, session_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build Yahoo Finance HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_url: session_url.to_string(),
            crumb: OnceCell::new(),
        })
    }

    async fn crumb(&self) -> Option<&str> {
        self.crumb
            .get_or_init(|| async {
                match self.fetch_crumb().await {
                    Ok(crumb) => Some(crumb),
                    Err(e) => {
                        warn!("Yahoo Finance session setup failed: {:#}", e);
                        None
                    }
                }
            })
            .await
            .as_deref()
    }

    async fn fetch_crumb(&self) -> Result<String> {
        debug!("Priming Yahoo Finance session cookie from {}", self.session_url);
        // The session endpoint answers 404 but still sets the cookie
        self.client
            .get(&self.session_url)
            .send()
            .await
            .context("Failed to reach Yahoo Finance session endpoint")?;

        let url = format!("{}/v1/test/getcrumb", self.base_url);
        let crumb = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to request Yahoo Finance crumb")?
            .error_for_status()
            .context("Yahoo Finance crumb request returned error status")?
            .text()
            .await
            .context("Failed to read Yahoo Finance crumb")?;

        let crumb = crumb.trim().to_string();
        if crumb.is_empty() || crumb.contains('<') {
            return Err(anyhow!("Yahoo Finance returned an invalid crumb"));
        }
        Ok(crumb)
    }
}

impl QuoteSource for YahooClient {
    async fn fetch_quote(&self, key: &str) -> Result<Quote> {
        info!("Fetching quote for {} from Yahoo Finance", key);

        let mut params = vec![("modules", QUOTE_MODULES)];
        if let Some(crumb) = self.crumb().await {
            params.push(("crumb", crumb));
        }
        let url = Url::parse_with_params(
            &format!("{}/v10/finance/quoteSummary/{}", self.base_url, key),
            &params,
        )
        .context("Invalid Yahoo Finance URL")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request to Yahoo Finance")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read Yahoo Finance response")?;

        // Unknown symbols come back as 404 with a JSON error body
        match parse_quote_summary(&body) {
            Ok(quote) => Ok(quote),
            Err(e) if status.is_success() => Err(e),
            Err(e) => Err(e.context(format!("Yahoo Finance returned error status: {}", status))),
        }
    }
}

/// Parse a quoteSummary JSON body into a [`Quote`]
pub fn parse_quote_summary(body: &str) -> Result<Quote> {
    let data: QuoteSummaryResponse =
        serde_json::from_str(body).context("Failed to parse Yahoo Finance response")?;

    if let Some(error) = data.quote_summary.error {
        return Err(anyhow!(
            "Yahoo Finance API error: {} - {}",
            error.code,
            error.description
        ));
    }

    let result = data
        .quote_summary
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| anyhow!("No data returned from Yahoo Finance"))?;

    let price = result.price.as_ref();
    let detail = result.summary_detail.as_ref();
    let financial = result.financial_data.as_ref();

    let current_price = raw(financial.and_then(|f| f.current_price.as_ref()))
        .or_else(|| raw(price.and_then(|p| p.regular_market_price.as_ref())));

    let previous_close = raw(detail.and_then(|d| d.previous_close.as_ref()))
        .or_else(|| raw(price.and_then(|p| p.regular_market_previous_close.as_ref())));

    let dividend_yield = raw(detail.and_then(|d| d.dividend_yield.as_ref()))
        .or_else(|| raw(detail.and_then(|d| d.trailing_annual_dividend_yield.as_ref())));

    Ok(Quote {
        current_price,
        previous_close,
        dividend_rate: raw(detail.and_then(|d| d.dividend_rate.as_ref())),
        dividend_yield,
    })
}
