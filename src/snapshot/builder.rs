//! Snapshot assembly: discovery phase, watchlist phase, merge.
//!
//! Neither phase can fail the run. A watchlist instrument whose quote can't
//! be fetched becomes an error entry; a failed discovery phase contributes
//! nothing and is reported through [`DiscoveryOutcome`].

use anyhow::Context;
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::{Amount, Instrument, Snapshot, SnapshotEntry, SnapshotRecord};
use crate::config::DiscoveryConfig;
use crate::discovery::{DiscoverySource, RankedDividend};
use crate::error::{Result, SnapshotError};
use crate::pricing::{Quote, QuoteSource};
use crate::utils::{
    format_decimal_percent, format_percent, format_ratio_percent, percent_change,
    RoundingPolicy, NOT_AVAILABLE, NOT_PROVIDED,
};

/// What the discovery phase contributed to a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// No credentials, or switched off in configuration
    Disabled,
    Found(usize),
    Failed(String),
}

/// A built snapshot plus how the discovery phase went
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub snapshot: Snapshot,
    pub discovery: DiscoveryOutcome,
}

/// Derive the snapshot fields for one watchlist quote.
///
/// `real_time_yield` is recomputed from the live price whenever a dividend
/// rate is available, since the provider's own yield is often computed
/// against a stale price.
pub fn derive_record(quote: &Quote, round_to_integer: bool) -> SnapshotRecord {
    let price = quote.current_price.or(quote.previous_close);

    let price_change_percent = match (price, quote.previous_close) {
        (Some(current), Some(previous)) => percent_change(current, previous).map(format_percent),
        _ => None,
    }
    .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    let ratio = quote.dividend_yield.filter(|r| *r != 0.0);
    let dividend_yield = ratio
        .map(format_ratio_percent)
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    let real_time_yield = match (quote.dividend_rate, price) {
        (Some(rate), Some(p)) if p != 0.0 => format_percent(rate / p * 100.0),
        _ => ratio
            .map(format_ratio_percent)
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
    };

    SnapshotRecord {
        price: price.map(|p| Amount::from_f64(p, round_to_integer)),
        dividend_yield,
        dividend_rate: quote
            .dividend_rate
            .map(|r| Amount::from_f64(r, round_to_integer)),
        price_change_percent,
        real_time_yield,
    }
}

/// Record for an auto-discovered instrument.
///
/// The ranking only reports the dividend per share and its yield, so the
/// price is backed out of the two and truncated to a whole number. Figures
/// that don't fit a whole-number price are an error for that row.
pub fn discovered_record(ranked: &RankedDividend) -> Result<SnapshotRecord> {
    let price = if ranked.dividend_rate_percent > Decimal::ZERO {
        ranked
            .dividend_rate_percent
            .checked_div(Decimal::ONE_HUNDRED)
            .and_then(|ratio| ranked.dividend_amount.checked_div(ratio))
            .and_then(|price| price.trunc().to_i64())
            .ok_or_else(|| {
                SnapshotError::DiscoveryError(format!(
                    "price out of range for {} (amount {}, rate {}%)",
                    ranked.name, ranked.dividend_amount, ranked.dividend_rate_percent
                ))
            })?
    } else {
        0
    };
    let dividend_rate = ranked.dividend_amount.trunc().to_i64().ok_or_else(|| {
        SnapshotError::DiscoveryError(format!(
            "dividend amount out of range for {}: {}",
            ranked.name, ranked.dividend_amount
        ))
    })?;
    let yield_text = format_decimal_percent(ranked.dividend_rate_percent);

    Ok(SnapshotRecord {
        price: Some(Amount::Integer(price)),
        dividend_yield: yield_text.clone(),
        dividend_rate: Some(Amount::Integer(dividend_rate)),
        price_change_percent: NOT_PROVIDED.to_string(),
        real_time_yield: yield_text,
    })
}

/// Discovery phase: top dividend payers over the trailing window, names
/// prefixed with the configured marker.
///
/// Repeated names and rows with unusable figures are skipped before the
/// limit is applied, so the ranking fills up to `limit` distinct entries.
pub async fn discover<D: DiscoverySource>(
    source: &D,
    today: NaiveDate,
    settings: &DiscoveryConfig,
) -> Result<Vec<(String, SnapshotEntry)>> {
    let from = Duration::try_days(settings.window_days)
        .and_then(|window| today.checked_sub_signed(window))
        .with_context(|| {
            format!(
                "ranking window of {} days before {} is out of range",
                settings.window_days, today
            )
        })?;
    info!(
        "Discovering top {} dividend payers from {} to {}",
        settings.limit, from, today
    );

    let ranked = source.top_dividend_payers(from, today).await?;

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for item in &ranked {
        if entries.len() == settings.limit {
            break;
        }
        let name = format!("{}{}", settings.marker, item.name);
        if seen.contains(&name) {
            debug!("Skipping repeated ranking entry {}", item.name);
            continue;
        }
        match discovered_record(item) {
            Ok(record) => {
                seen.insert(name.clone());
                entries.push((name, SnapshotEntry::Record(record)));
            }
            Err(e) => warn!("Skipping ranking entry {}: {:#}", item.name, e),
        }
    }
    Ok(entries)
}

/// Watchlist phase: one entry per instrument, fetched sequentially
pub async fn collect_watchlist<Q: QuoteSource>(
    quotes: &Q,
    watchlist: &[Instrument],
    policy: &RoundingPolicy,
) -> Vec<(String, SnapshotEntry)> {
    let mut entries = Vec::with_capacity(watchlist.len());

    for instrument in watchlist {
        let entry = match quotes.fetch_quote(&instrument.key).await {
            Ok(quote) => {
                debug!("{} ({}): {:?}", instrument.name, instrument.key, quote);
                SnapshotEntry::Record(derive_record(
                    &quote,
                    policy.should_round_to_integer(&instrument.key),
                ))
            }
            Err(e) => {
                warn!(
                    "Quote fetch failed for {} ({}): {:#}",
                    instrument.name, instrument.key, e
                );
                SnapshotEntry::error(format!("{:#}", e))
            }
        };
        entries.push((instrument.name.clone(), entry));
    }

    entries
}

/// Run both phases and merge them into a timestamped snapshot.
///
/// Discovered entries come first, in rank order, followed by the watchlist
/// in configured order. Marker-prefixed names keep the two sets disjoint.
pub async fn build_snapshot<Q: QuoteSource, D: DiscoverySource>(
    quotes: &Q,
    discovery: Option<&D>,
    watchlist: &[Instrument],
    settings: &DiscoveryConfig,
    policy: &RoundingPolicy,
    today: NaiveDate,
) -> BuildReport {
    let (mut entries, outcome) = match discovery {
        Some(source) => match discover(source, today, settings).await {
            Ok(found) => {
                let count = found.len();
                (found, DiscoveryOutcome::Found(count))
            }
            Err(e) => {
                warn!("Discovery phase failed: {:#}", e);
                (Vec::new(), DiscoveryOutcome::Failed(format!("{:#}", e)))
            }
        },
        None => (Vec::new(), DiscoveryOutcome::Disabled),
    };

    entries.extend(collect_watchlist(quotes, watchlist, policy).await);

    BuildReport {
        snapshot: Snapshot::new(entries, Utc::now()),
        discovery: outcome,
    }
}
