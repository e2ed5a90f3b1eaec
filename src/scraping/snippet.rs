// Snippet scraper: captures one element of an external page as an HTML string
//
// The page is fetched with a browser user agent and the first element
// matching the CSS selector is serialized (outer HTML) together with a
// timestamp. A missing element is an error: an empty snippet file would
// silently blank whatever embeds it.

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, SnapshotError};
use crate::snapshot::{format_timestamp, write_json_document};

const USER_AGENT: &str = "Mozilla/5.0";

/// Captured page fragment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snippet {
    pub updated_at: String,
    pub snippet: String,
}

impl Snippet {
    pub fn new(snippet: String, captured_at: DateTime<Utc>) -> Self {
        Self {
            updated_at: format_timestamp(captured_at),
            snippet,
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize snippet")?;
        write_json_document(path, &json)
    }
}

/// Download a page body as text
pub async fn fetch_page(url: &str) -> Result<String> {
    info!("Fetching page {}", url);

    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch {}", url))?;

    if !response.status().is_success() {
        return Err(anyhow!("{} returned error status: {}", url, response.status()));
    }

    response
        .text()
        .await
        .with_context(|| format!("Failed to read body of {}", url))
}

/// Outer HTML of the first element matching `selector`
pub fn extract_snippet(html: &str, selector: &str) -> Result<String> {
    let parsed = Selector::parse(selector).map_err(|e| {
        SnapshotError::ScrapeError(format!("invalid selector '{}': {}", selector, e))
    })?;

    let document = Html::parse_document(html);
    document
        .select(&parsed)
        .next()
        .map(|element| element.html())
        .ok_or_else(|| {
            SnapshotError::ScrapeError(format!("element not found: {}", selector)).into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn fixture() -> &'static str {
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/scolkg_home.html"
        ))
    }

    #[test]
    fn test_extract_first_match() {
        let snippet = extract_snippet(fixture(), ".crypto-widget").unwrap();
        assert!(snippet.starts_with("<section class=\"crypto-widget\">"));
        assert!(snippet.contains("143,250,000"));
        assert!(!snippet.contains("second widget"));
    }

    #[test]
    fn test_missing_element_is_an_error() {
        let err = extract_snippet(fixture(), ".stock-widget").unwrap_err();
        assert_eq!(err.to_string(), "scrape error: element not found: .stock-widget");
    }

    #[test]
    fn test_invalid_selector_is_an_error() {
        let err = extract_snippet(fixture(), "div[").unwrap_err();
        assert!(err.to_string().contains("invalid selector"));
    }

    #[test]
    fn test_snippet_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("scolkg_snippet.json");
        let ts = Utc.with_ymd_and_hms(2026, 10, 15, 0, 0, 5).unwrap();

        let snippet = Snippet::new("<div>시세</div>".to_string(), ts);
        snippet.write_to(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "{\n  \"updated_at\": \"2026-10-15T00:00:05+00:00\",\n  \"snippet\": \"<div>시세</div>\"\n}"
        );
    }

    #[tokio::test]
    #[ignore]
    async fn test_fetch_page_online() {
        let html = fetch_page("https://scolkg.com/").await.unwrap();
        assert!(html.contains("<html"));
    }
}
