// Discovery module - ranked dividend sources for auto-discovered entries

pub mod kis;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::Result;

pub use kis::{KisClient, KisCredentials};

/// One entry of a dividend ranking, best first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedDividend {
    pub name: String,
    /// Dividend yield on the 0-100 scale
    pub dividend_rate_percent: Decimal,
    /// Dividend per share, in currency units
    pub dividend_amount: Decimal,
}

/// A source that ranks instruments by trailing dividend yield
#[allow(async_fn_in_trait)]
pub trait DiscoverySource {
    /// Ranked payers for the `[from, to]` window, best first. Callers cap
    /// the count after dropping repeats.
    async fn top_dividend_payers(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RankedDividend>>;
}
