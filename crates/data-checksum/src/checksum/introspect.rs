//! Comparison column and unique key resolution.

use std::cmp::Reverse;

use tracing::debug;

use super::context::ChecksumContext;
use crate::core::ColumnList;
use crate::error::{ChecksumError, Result};
use crate::session::UniqueKeyCandidate;

/// Rank of the leading key column type; smaller integer types chunk cheapest.
fn leading_type_rank(data_type: &str) -> u8 {
    match data_type {
        "tinyint" => 0,
        "smallint" => 1,
        "int" => 2,
        "bigint" => 3,
        _ => 100,
    }
}

/// Pick the unique key used for chunking.
///
/// Candidates are ordered by: primary first, non-nullable first, leading column
/// without charset first, leading column type, column count, then index name.
/// A nullable winner is rejected rather than skipped.
pub fn select_unique_key<'a>(
    table: &str,
    candidates: &'a [UniqueKeyCandidate],
) -> Result<&'a UniqueKeyCandidate> {
    let best = candidates
        .iter()
        .min_by_key(|&c| {
            (
                Reverse(c.is_primary()),
                c.has_nullable,
                !c.first_column_charset.is_empty(),
                leading_type_rank(&c.first_column_type),
                c.column_count(),
                c.index_name.as_str(),
            )
        })
        .ok_or_else(|| ChecksumError::NoUniqueKey(table.to_string()))?;

    if best.has_nullable {
        return Err(ChecksumError::NullableUniqueKey {
            table: table.to_string(),
            index: best.index_name.clone(),
        });
    }
    Ok(best)
}

/// The time-range column must exist and must not be a known non-temporal type.
fn check_time_column(table: &str, columns: &ColumnList, name: &str) -> Result<()> {
    match columns.column(name) {
        None => Err(ChecksumError::schema(
            table,
            format!("time-range column '{}' not in table", name),
        )),
        Some(column) if column.column_type.is_non_temporal() => Err(ChecksumError::schema(
            table,
            format!(
                "time-range column '{}' is {:?}, not a date or time",
                name, column.column_type
            ),
        )),
        Some(_) => Ok(()),
    }
}

impl ChecksumContext {
    /// Columns to fingerprint: the configured list, or every source column in ordinal order.
    ///
    /// Configured columns must exist in the source table. A configured time-range
    /// column must exist too, and must not have a clearly non-temporal type.
    pub async fn resolve_check_columns(&mut self) -> Result<ColumnList> {
        let source = self.table.source().clone();
        let table_columns = self.source.columns(&source).await.map_err(|e| {
            ChecksumError::schema(source.to_string(), format!("reading columns: {}", e))
        })?;
        if table_columns.is_empty() {
            return Err(ChecksumError::schema(
                source.to_string(),
                "table has no columns or does not exist",
            ));
        }

        let configured = self
            .settings
            .columns
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());

        let columns = match configured {
            Some(csv) => {
                let wanted = ColumnList::parse(csv);
                if wanted.is_empty() {
                    return Err(ChecksumError::schema(source.to_string(), "no columns configured"));
                }
                if !wanted.is_subset_of(&table_columns) {
                    return Err(ChecksumError::schema(
                        source.to_string(),
                        format!(
                            "configured columns not in table: {}",
                            wanted.missing_from(&table_columns).join(",")
                        ),
                    ));
                }
                wanted.described_by(&table_columns)
            }
            None => table_columns.clone(),
        };

        if let Some(time_range) = &self.settings.time_range {
            check_time_column(&source.to_string(), &table_columns, &time_range.column)?;
        }

        debug!("{}: comparing columns {}", source, columns);
        self.check_columns = columns.clone();
        Ok(columns)
    }

    /// Best unique key of the source table and its index name.
    pub async fn resolve_unique_key(&mut self) -> Result<(ColumnList, String)> {
        let source = self.table.source().clone();
        let candidates = self
            .source
            .unique_key_candidates(&source)
            .await
            .map_err(|e| {
                ChecksumError::schema(source.to_string(), format!("reading unique keys: {}", e))
            })?;

        let chosen = select_unique_key(&source.to_string(), &candidates)?;
        let key = ColumnList::new(&chosen.column_names);
        let index_name = chosen.index_name.clone();

        debug!("{}: chunking on {} ({})", source, index_name, key);
        self.unique_key = key.clone();
        self.index_name = index_name.clone();
        Ok((key, index_name))
    }
}
