//! Utility functions for formatting and presentation policy
//!
//! This module centralizes the percent formatting and the per-exchange
//! integer rounding rule so every snapshot field is rendered the same way.

use rust_decimal::Decimal;

/// Sentinel written when a derived field cannot be computed
pub const NOT_AVAILABLE: &str = "N/A";

/// Sentinel written when the source does not provide a field at all
pub const NOT_PROVIDED: &str = "-";

/// Format a percentage value with two decimals and a trailing `%`.
///
/// # Examples
/// ```
/// use dividends::utils::format_percent;
///
/// assert_eq!(format_percent(5.0), "5.00%");
/// assert_eq!(format_percent(2.142857), "2.14%");
/// assert_eq!(format_percent(-4.7619), "-4.76%");
/// ```
pub fn format_percent(value: f64) -> String {
    format!("{:.2}%", value)
}

/// Format a 0-1 ratio (e.g. `0.0345`) as a percentage (`"3.45%"`).
///
/// # Examples
/// ```
/// use dividends::utils::format_ratio_percent;
///
/// assert_eq!(format_ratio_percent(0.0345), "3.45%");
/// ```
pub fn format_ratio_percent(ratio: f64) -> String {
    format_percent(ratio * 100.0)
}

/// Format an exact decimal percentage (already on the 0-100 scale).
///
/// # Examples
/// ```
/// use dividends::utils::format_decimal_percent;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_decimal_percent(dec!(7.5)), "7.50%");
/// assert_eq!(format_decimal_percent(dec!(6.126)), "6.13%");
/// ```
pub fn format_decimal_percent(value: Decimal) -> String {
    format!("{:.2}%", value.round_dp(2))
}

/// Relative change from `previous` to `current`, in percent.
///
/// Returns `None` when `previous` is zero.
pub fn percent_change(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 {
        return None;
    }
    Some((current - previous) / previous * 100.0)
}

/// Decides which lookup keys get their amounts coerced to whole numbers.
///
/// Local-exchange quotes (identified by key suffix) are priced in a currency
/// without minor units, so `price` and `dividend_rate` are written as
/// integers for them and left as floats for everything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundingPolicy {
    local_suffixes: Vec<String>,
}

impl Default for RoundingPolicy {
    fn default() -> Self {
        Self::new(vec![".KS".to_string(), ".KQ".to_string()])
    }
}

impl RoundingPolicy {
    pub fn new(local_suffixes: Vec<String>) -> Self {
        Self { local_suffixes }
    }

    /// Suffix match is case-insensitive (`005930.ks` counts as local).
    pub fn should_round_to_integer(&self, key: &str) -> bool {
        let upper = key.to_uppercase();
        self.local_suffixes
            .iter()
            .any(|suffix| !suffix.is_empty() && upper.ends_with(&suffix.to_uppercase()))
    }
}
