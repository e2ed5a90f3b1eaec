use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use reqwest::{Client, Url};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{DiscoverySource, RankedDividend};
use crate::error::{Result, SnapshotError};

pub const APP_KEY_ENV: &str = "KIS_APP_KEY";
pub const APP_SECRET_ENV: &str = "KIS_APP_SECRET";

const TOKEN_PATH: &str = "/oauth2/tokenP";
const DIVIDEND_RANKING_PATH: &str = "/uapi/domestic-stock/v1/ranking/dividend-rate";
/// Transaction id of the dividend-rate ranking
const DIVIDEND_RANKING_TR_ID: &str = "HHKDB13470100";

/// App key/secret pair for the KIS Open API
#[derive(Clone)]
pub struct KisCredentials {
    pub app_key: String,
    pub app_secret: String,
}

impl std::fmt::Debug for KisCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KisCredentials")
            .field("app_key", &"***")
            .field("app_secret", &"***")
            .finish()
    }
}

impl KisCredentials {
    /// Both variables must be set and non-empty; otherwise discovery is off.
    pub fn from_env() -> Option<Self> {
        let app_key = std::env::var(APP_KEY_ENV).ok().filter(|v| !v.is_empty())?;
        let app_secret = std::env::var(APP_SECRET_ENV)
            .ok()
            .filter(|v| !v.is_empty())?;
        Some(Self {
            app_key,
            app_secret,
        })
    }
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    appkey: &'a str,
    appsecret: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error_code: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RankingResponse {
    rt_cd: String,
    #[serde(default)]
    msg1: String,
    #[serde(default)]
    output: Vec<RankingRow>,
}

#[derive(Debug, Deserialize)]
struct RankingRow {
    isin_name: String,
    /// Dividend yield, percent
    divi_rate: String,
    /// Dividend per share
    per_sto_divi_amt: String,
}

/// Korea Investment & Securities Open API client (dividend-rate ranking)
pub struct KisClient {
    client: Client,
    base_url: String,
    credentials: KisCredentials,
    market: String,
}

impl KisClient {
    pub fn new(base_url: &str, credentials: KisCredentials, market: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build KIS HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            market: market.to_string(),
        })
    }

    async fn request_token(&self) -> Result<String> {
        info!("Requesting KIS access token");

        let url = format!("{}{}", self.base_url, TOKEN_PATH);
        let response = self
            .client
            .post(&url)
            .json(&TokenRequest {
                grant_type: "client_credentials",
                appkey: &self.credentials.app_key,
                appsecret: &self.credentials.app_secret,
            })
            .send()
            .await
            .context("Failed to send token request to KIS")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read KIS token response")?;

        parse_token(&body).with_context(|| format!("KIS token request failed ({})", status))
    }

    async fn fetch_ranking(
        &self,
        token: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RankedDividend>> {
        let from = from.format("%Y%m%d").to_string();
        let to = to.format("%Y%m%d").to_string();
        let url = Url::parse_with_params(
            &format!("{}{}", self.base_url, DIVIDEND_RANKING_PATH),
            &[
                ("CTS_AREA", ""),
                ("GB1", self.market.as_str()),
                ("UPJONG", "0001"),
                ("GB2", "0"),
                ("GB3", "2"),
                ("F_DT", from.as_str()),
                ("T_DT", to.as_str()),
                ("GB4", "0"),
            ],
        )
        .context("Invalid KIS dividend ranking URL")?;

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .header("appkey", &self.credentials.app_key)
            .header("appsecret", &self.credentials.app_secret)
            .header("tr_id", DIVIDEND_RANKING_TR_ID)
            .header("custtype", "P")
            .send()
            .await
            .context("Failed to send dividend ranking request to KIS")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "KIS dividend ranking returned error status: {}",
                response.status()
            ));
        }

        let body = response
            .text()
            .await
            .context("Failed to read KIS dividend ranking response")?;
        parse_ranking(&body)
    }
}

impl DiscoverySource for KisClient {
    async fn top_dividend_payers(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RankedDividend>> {
        let token = self.request_token().await?;
        let ranked = self.fetch_ranking(&token, from, to).await?;
        debug!("KIS ranking returned {} entries", ranked.len());
        Ok(ranked)
    }
}

fn parse_token(body: &str) -> Result<String> {
    let response: TokenResponse =
        serde_json::from_str(body).context("Failed to parse KIS token response")?;

    match response.access_token.filter(|t| !t.is_empty()) {
        Some(token) => Ok(token),
        None => Err(SnapshotError::DiscoveryError(format!(
            "no access token returned ({}: {})",
            response.error_code.as_deref().unwrap_or("-"),
            response.error_description.as_deref().unwrap_or("no description")
        ))
        .into()),
    }
}

/// Parse the dividend-rate ranking body, keeping rank order.
///
/// Rows with unparseable numbers are dropped rather than failing the batch.
pub fn parse_ranking(body: &str) -> Result<Vec<RankedDividend>> {
    let response: RankingResponse =
        serde_json::from_str(body).context("Failed to parse KIS dividend ranking response")?;

    if response.rt_cd != "0" {
        return Err(SnapshotError::DiscoveryError(format!(
            "KIS dividend ranking rejected (rt_cd {}): {}",
            response.rt_cd, response.msg1
        ))
        .into());
    }

    let mut ranked = Vec::with_capacity(response.output.len());
    for row in response.output {
        let rate = parse_number(&row.divi_rate);
        let amount = parse_number(&row.per_sto_divi_amt);
        match (rate, amount) {
            (Some(rate), Some(amount)) => ranked.push(RankedDividend {
                name: row.isin_name.trim().to_string(),
                dividend_rate_percent: rate,
                dividend_amount: amount,
            }),
            _ => warn!(
                "Skipping ranking row {} with invalid numbers ({}, {})",
                row.isin_name, row.divi_rate, row.per_sto_divi_amt
            ),
        }
    }
    Ok(ranked)
}

/// KIS sends numbers as strings, sometimes with thousands separators
fn parse_number(text: &str) -> Option<Decimal> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_token_fixture() {
        let body = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/kis_token.json"
        ));
        let token = parse_token(body).unwrap();
        assert!(token.starts_with("eyJ0eXAi"));
    }

    #[test]
    fn test_parse_token_error() {
        let body = r#"{"error_description":"유효하지 않은 AppKey입니다.","error_code":"EGW00103"}"#;
        let err = parse_token(body).unwrap_err();
        assert!(err.to_string().contains("EGW00103"));
        assert!(err.to_string().starts_with("discovery error"));
    }

    #[test]
    fn test_parse_token_empty() {
        assert!(parse_token(r#"{"access_token":""}"#).is_err());
    }

    #[test]
    fn test_parse_ranking_fixture() {
        let body = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/kis_dividend_rate.json"
        ));
        let ranked = parse_ranking(body).unwrap();
        assert_eq!(ranked.len(), 6);
        assert_eq!(ranked[0].name, "맥쿼리인프라");
        assert_eq!(ranked[0].dividend_rate_percent, dec!(7.51));
        assert_eq!(ranked[0].dividend_amount, dec!(790));
        assert_eq!(ranked[1].dividend_amount, dec!(5200));
    }

    #[test]
    fn test_parse_ranking_rejected() {
        let body = r#"{"rt_cd":"1","msg_cd":"EGW00121","msg1":"유효하지 않은 token 입니다."}"#;
        let err = parse_ranking(body).unwrap_err();
        assert!(err.to_string().contains("rt_cd 1"));
    }

    #[test]
    fn test_parse_ranking_skips_bad_rows() {
        let body = r#"{"rt_cd":"0","msg1":"ok","output":[
            {"isin_name":"A","divi_rate":"abc","per_sto_divi_amt":"100"},
            {"isin_name":" B ","divi_rate":"3.5","per_sto_divi_amt":"1,000"}
        ]}"#;
        let ranked = parse_ranking(body).unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].name, "B");
        assert_eq!(ranked[0].dividend_amount, dec!(1000));
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("1,234.5"), Some(dec!(1234.5)));
        assert_eq!(parse_number(" 7 "), Some(dec!(7)));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("-"), None);
    }

    #[test]
    fn test_credentials_debug_hides_secrets() {
        let creds = KisCredentials {
            app_key: "PSkey".to_string(),
            app_secret: "secret".to_string(),
        };
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("PSkey"));
        assert!(debug.contains("***"));
    }
}
