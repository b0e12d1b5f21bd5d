//! Storage schema contract shared by both backends.
//!
//! Defines the exact column names and types of the columnar partition files,
//! the textual timestamp encoding used by the relational store, and the
//! bundled relational DDL.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};

/// Fixed-width timestamp encoding for the relational store.
///
/// Fixed width keeps lexicographic order equal to chronological order, so
/// range predicates on the TEXT column are exact.
pub const SQL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Day encoding returned by SQLite's `DATE()`.
pub const SQL_DATE_FORMAT: &str = "%Y-%m-%d";

/// Default relational schema: `tickers` + `prices` with a foreign key and a
/// `(ticker_id, timestamp)` lookup index.
pub const BUNDLED_SCHEMA: &str = include_str!("../sql/schema.sql");

/// Column types in a partition file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaType {
    Datetime,
    Int64,
    UInt64,
    Float64,
    String,
}

/// Partition file columns, in file order.
///
/// Rows are sorted by timestamp within a partition. Timestamps carry
/// microsecond precision and no zone. The symbol itself is not a column: it
/// is the `ticker=SYMBOL/` directory key.
pub const PARTITION_COLUMNS: [(&str, SchemaType); 9] = [
    ("timestamp", SchemaType::Datetime),
    ("ticker_id", SchemaType::Int64),
    ("name", SchemaType::String),
    ("exchange", SchemaType::String),
    ("open", SchemaType::Float64),
    ("high", SchemaType::Float64),
    ("low", SchemaType::Float64),
    ("close", SchemaType::Float64),
    ("volume", SchemaType::UInt64),
];

/// Compare a file's `(column, type)` pairs with [`PARTITION_COLUMNS`] and
/// return one message per mismatch. Empty means the file conforms.
///
/// Unknown columns count as mismatches since only this crate writes
/// partition files.
pub fn validate_schema(columns: &[(&str, SchemaType)]) -> Vec<String> {
    let actual: HashMap<&str, SchemaType> = columns.iter().copied().collect();

    let mut issues: Vec<String> = PARTITION_COLUMNS
        .iter()
        .filter_map(|&(name, want)| match actual.get(name) {
            None => Some(format!("missing column '{name}'")),
            Some(&got) if got != want => Some(format!("column '{name}' is {got:?}, want {want:?}")),
            Some(_) => None,
        })
        .collect();

    issues.extend(
        columns
            .iter()
            .filter(|(name, _)| !PARTITION_COLUMNS.iter().any(|(known, _)| known == name))
            .map(|(name, _)| format!("unknown column '{name}'")),
    );
    issues
}

pub fn format_sql_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(SQL_TIMESTAMP_FORMAT).to_string()
}

pub fn parse_sql_timestamp(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, SQL_TIMESTAMP_FORMAT)
}

pub fn parse_sql_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s, SQL_DATE_FORMAT)
}
