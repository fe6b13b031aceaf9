//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use data_checksum::session::UniqueKeyCandidate;
use data_checksum::{
    ChecksumContext, ChecksumSettings, Config, MemorySession, MemoryTable, SqlValue, TablePair,
    TableRef,
};

pub fn orders() -> TableRef {
    TableRef::new("shop", "orders")
}

pub fn items() -> TableRef {
    TableRef::new("shop", "items")
}

/// `(id, name)` rows keyed on the primary key `id`.
pub fn keyed_table(ids: impl IntoIterator<Item = i64>) -> MemoryTable {
    MemoryTable::new(&["id", "name"])
        .with_unique_key(UniqueKeyCandidate::new("PRIMARY", &["id"], "int"))
        .with_rows(
            ids.into_iter()
                .map(|id| vec![SqlValue::Int(id), SqlValue::from(format!("row-{}", id))])
                .collect(),
        )
}

pub fn day_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap()
}

/// `(id, name, created_at)` rows, one per hour from [`day_start`].
pub fn hourly_table(hours: impl IntoIterator<Item = i64>) -> MemoryTable {
    MemoryTable::new(&["id", "name", "created_at"])
        .with_unique_key(UniqueKeyCandidate::new("PRIMARY", &["id"], "int"))
        .with_rows(
            hours
                .into_iter()
                .map(|h| {
                    vec![
                        SqlValue::Int(h),
                        SqlValue::from(format!("event-{}", h)),
                        SqlValue::DateTime(day_start() + Duration::hours(h)),
                    ]
                })
                .collect(),
        )
}

/// A source and target session holding `table` under the same name.
pub fn sessions(
    table: &TableRef,
    source: MemoryTable,
    target: MemoryTable,
) -> (Arc<MemorySession>, Arc<MemorySession>) {
    let src = Arc::new(MemorySession::new("source"));
    let tgt = Arc::new(MemorySession::new("target"));
    src.add_table(table.clone(), source).unwrap();
    tgt.add_table(table.clone(), target).unwrap();
    (src, tgt)
}

pub fn context(
    table: &TableRef,
    src: &Arc<MemorySession>,
    tgt: &Arc<MemorySession>,
    settings: ChecksumSettings,
) -> ChecksumContext {
    ChecksumContext::new(
        TablePair::new(table.clone(), table.clone()),
        src.clone(),
        tgt.clone(),
        settings,
    )
}

pub fn chunked(chunk_size: i64) -> ChecksumSettings {
    ChecksumSettings {
        chunk_size,
        ..ChecksumSettings::default()
    }
}

/// Config comparing the given `database.table` names against themselves.
pub fn config_for(tables: &[&str], extra: &str) -> Config {
    let pairs: String = tables
        .iter()
        .map(|t| format!("    - source: {}\n", t))
        .collect();
    let yaml = format!(
        r#"
source:
  host: source.test
  user: checker
target:
  host: target.test
  user: checker
tables:
  pairs:
{}checksum:
  chunk_size: 10
  workers: 2
{}"#,
        pairs, extra
    );
    Config::from_yaml(&yaml).unwrap()
}
