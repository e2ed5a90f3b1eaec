//! Dividends - dividend yield snapshot builder
//!
//! This library fetches quotes for a configured watchlist, optionally adds
//! the top dividend payers from a brokerage ranking, derives yield fields
//! and writes the result as a JSON snapshot.

pub mod cli;
pub mod config;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod pricing;
pub mod scraping;
pub mod snapshot;
pub mod utils;
