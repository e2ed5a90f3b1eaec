//! Dividend snapshot model and persistence
//!
//! A [`Snapshot`] maps instrument display names to a derived record (or the
//! error that prevented deriving one), plus the reserved `updated_at`
//! timestamp. Entries keep insertion order so repeated runs over the same
//! upstream data serialize to identical bytes apart from the timestamp.

pub mod builder;

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::Result;

pub use builder::{build_snapshot, collect_watchlist, derive_record, discover};

/// Reserved key holding the snapshot timestamp
pub const UPDATED_AT_KEY: &str = "updated_at";

/// A configured instrument: display name plus the quote source lookup key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    pub key: String,
}

impl Instrument {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
        }
    }
}

/// A monetary amount as written to the snapshot.
///
/// Local-exchange amounts are whole numbers; everything else keeps the
/// provider's float.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Amount {
    Integer(i64),
    Float(f64),
}

impl Amount {
    /// Truncates toward zero when `as_integer` is set.
    pub fn from_f64(value: f64, as_integer: bool) -> Self {
        if as_integer {
            Amount::Integer(value.trunc() as i64)
        } else {
            Amount::Float(value)
        }
    }
}

/// Derived per-instrument fields
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotRecord {
    pub price: Option<Amount>,
    pub dividend_yield: String,
    pub dividend_rate: Option<Amount>,
    pub price_change_percent: String,
    pub real_time_yield: String,
}

/// Outcome for a single instrument
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SnapshotEntry {
    Record(SnapshotRecord),
    Error { error: String },
}

impl SnapshotEntry {
    pub fn error(message: impl Into<String>) -> Self {
        SnapshotEntry::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SnapshotEntry::Error { .. })
    }

    pub fn record(&self) -> Option<&SnapshotRecord> {
        match self {
            SnapshotEntry::Record(record) => Some(record),
            SnapshotEntry::Error { .. } => None,
        }
    }
}

/// Ordered snapshot of all instruments for one run
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    entries: Vec<(String, SnapshotEntry)>,
    updated_at: DateTime<Utc>,
}

impl Snapshot {
    /// `updated_at` is truncated to whole seconds.
    pub fn new(entries: Vec<(String, SnapshotEntry)>, updated_at: DateTime<Utc>) -> Self {
        Self {
            entries,
            updated_at: updated_at.trunc_subsecs(0),
        }
    }

    pub fn entries(&self) -> &[(String, SnapshotEntry)] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&SnapshotEntry> {
        self.entries
            .iter()
            .find(|(entry_name, _)| entry_name == name)
            .map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|(_, e)| e.is_error()).count()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// ISO-8601 form written to `updated_at`, e.g. `2026-10-15T09:30:00+00:00`
    pub fn updated_at_iso(&self) -> String {
        format_timestamp(self.updated_at)
    }

    /// Pretty-printed JSON document (UTF-8, non-ASCII kept as-is)
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize snapshot")
    }

    /// Write the snapshot over `path`, creating the parent directory.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        write_json_document(path, &self.to_json_pretty()?)
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len() + 1))?;
        for (name, entry) in &self.entries {
            map.serialize_entry(name, entry)?;
        }
        map.serialize_entry(UPDATED_AT_KEY, &self.updated_at_iso())?;
        map.end()
    }
}

/// ISO-8601 UTC timestamp with whole seconds and an explicit `+00:00` offset
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.trunc_subsecs(0)
        .to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Replace `path` with `contents`, going through a temporary sibling file
pub(crate) fn write_json_document(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
    }

    let file_name = path
        .file_name()
        .with_context(|| format!("Output path {} has no file name", path.display()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, contents)
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to finalize {}", path.display()))?;

    debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn sample_record() -> SnapshotRecord {
        SnapshotRecord {
            price: Some(Amount::Integer(70000)),
            dividend_yield: "2.06%".to_string(),
            dividend_rate: Some(Amount::Integer(1444)),
            price_change_percent: "0.72%".to_string(),
            real_time_yield: "2.06%".to_string(),
        }
    }

    fn sample_snapshot() -> Snapshot {
        let ts = Utc.with_ymd_and_hms(2026, 10, 15, 9, 30, 0).unwrap()
            + chrono::Duration::microseconds(123_456);
        Snapshot::new(
            vec![
                ("삼성전자".to_string(), SnapshotEntry::Record(sample_record())),
                ("TLT".to_string(), SnapshotEntry::error("No data returned")),
            ],
            ts,
        )
    }

    #[test]
    fn test_timestamp_has_no_subseconds() {
        let snapshot = sample_snapshot();
        assert_eq!(snapshot.updated_at_iso(), "2026-10-15T09:30:00+00:00");
        assert_eq!(snapshot.updated_at().timestamp_subsec_micros(), 0);
    }

    #[test]
    fn test_json_layout() {
        let json = sample_snapshot().to_json_pretty().unwrap();
        let expected = r#"{
  "삼성전자": {
    "price": 70000,
    "dividend_yield": "2.06%",
    "dividend_rate": 1444,
    "price_change_percent": "0.72%",
    "real_time_yield": "2.06%"
  },
  "TLT": {
    "error": "No data returned"
  },
  "updated_at": "2026-10-15T09:30:00+00:00"
}"#;
        assert_eq!(json, expected);
    }

    #[test]
    fn test_float_and_null_amounts() {
        let record = SnapshotRecord {
            price: Some(Amount::Float(27.41)),
            dividend_yield: "N/A".to_string(),
            dividend_rate: None,
            price_change_percent: "N/A".to_string(),
            real_time_yield: "N/A".to_string(),
        };
        let value = serde_json::to_value(SnapshotEntry::Record(record)).unwrap();
        assert_eq!(value["price"], serde_json::json!(27.41));
        assert!(value["dividend_rate"].is_null());
    }

    #[test]
    fn test_amount_truncates_when_integer() {
        assert_eq!(Amount::from_f64(70000.6, true), Amount::Integer(70000));
        assert_eq!(Amount::from_f64(70000.6, false), Amount::Float(70000.6));
        assert_eq!(Amount::from_f64(-1.9, true), Amount::Integer(-1));
    }

    #[test]
    fn test_lookup_and_counts() {
        let snapshot = sample_snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.error_count(), 1);
        assert!(snapshot.get("TLT").unwrap().is_error());
        assert!(snapshot.get("삼성전자").unwrap().record().is_some());
        assert!(snapshot.get("SCHD").is_none());
    }

    #[test]
    fn test_write_creates_directory_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("dividends.json");

        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"stale": true}"#).unwrap();

        let snapshot = sample_snapshot();
        snapshot.write_to(&path).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, snapshot.to_json_pretty().unwrap());
        assert!(!written.contains("stale"));
        assert!(written.contains("삼성전자"));
        assert!(!path.with_file_name("dividends.json.tmp").exists());

        let nested = dir.path().join("fresh").join("nested").join("out.json");
        snapshot.write_to(&nested).unwrap();
        assert!(nested.exists());
    }

    #[test]
    fn test_write_fails_when_parent_is_a_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("data");
        fs::write(&blocker, "not a directory").unwrap();

        let err = sample_snapshot()
            .write_to(&blocker.join("dividends.json"))
            .unwrap_err();
        assert!(err.to_string().contains("Failed to create output directory"));
    }
}
