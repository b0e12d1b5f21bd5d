// ── Parquet I/O helpers ─────────────────────────────────────────────

use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;

use crate::config::Compression;
use crate::domain::StoredRecord;
use crate::error::StoreError;
use crate::schema::{validate_schema, SchemaType};

fn timestamp_dtype() -> DataType {
    DataType::Datetime(TimeUnit::Microseconds, None)
}

fn parquet_compression(compression: Compression) -> ParquetCompression {
    match compression {
        Compression::Snappy => ParquetCompression::Snappy,
        Compression::Zstd => ParquetCompression::Zstd(None),
        Compression::Lz4 => ParquetCompression::Lz4Raw,
        Compression::Uncompressed => ParquetCompression::Uncompressed,
    }
}

/// Convert partition rows to a DataFrame in partition-file column order.
pub fn records_to_dataframe(rows: &[StoredRecord]) -> Result<DataFrame, StoreError> {
    let timestamps: Vec<i64> = rows
        .iter()
        .map(|r| r.timestamp.and_utc().timestamp_micros())
        .collect();
    let ids: Vec<i64> = rows.iter().map(|r| r.ticker_id).collect();
    let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
    let exchanges: Vec<&str> = rows.iter().map(|r| r.exchange.as_str()).collect();
    let opens: Vec<f64> = rows.iter().map(|r| r.open).collect();
    let highs: Vec<f64> = rows.iter().map(|r| r.high).collect();
    let lows: Vec<f64> = rows.iter().map(|r| r.low).collect();
    let closes: Vec<f64> = rows.iter().map(|r| r.close).collect();
    let volumes: Vec<u64> = rows.iter().map(|r| r.volume).collect();

    let df = DataFrame::new(vec![
        Column::new("timestamp".into(), timestamps).cast(&timestamp_dtype())?,
        Column::new("ticker_id".into(), ids),
        Column::new("name".into(), names),
        Column::new("exchange".into(), exchanges),
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])?;
    Ok(df)
}

/// Write a DataFrame to a Parquet file.
///
/// The default writer options embed per-column min/max statistics, which the
/// lazy range scan uses to skip row groups.
pub fn write_parquet(
    df: &mut DataFrame,
    path: &Path,
    compression: Compression,
) -> Result<u64, StoreError> {
    let file = fs::File::create(path)?;
    let bytes = ParquetWriter::new(file)
        .with_compression(parquet_compression(compression))
        .finish(df)?;
    Ok(bytes)
}

fn schema_type(dtype: &DataType) -> Option<SchemaType> {
    match dtype {
        DataType::Datetime(_, _) => Some(SchemaType::Datetime),
        DataType::Int64 => Some(SchemaType::Int64),
        DataType::UInt64 => Some(SchemaType::UInt64),
        DataType::Float64 => Some(SchemaType::Float64),
        DataType::String => Some(SchemaType::String),
        _ => None,
    }
}

/// Check `(name, dtype)` pairs against the partition schema.
fn check_columns<'a>(
    fields: impl Iterator<Item = (&'a str, &'a DataType)>,
    path: &Path,
) -> Result<(), StoreError> {
    let mut columns = Vec::new();
    for (name, dtype) in fields {
        let Some(kind) = schema_type(dtype) else {
            return Err(StoreError::Schema(format!(
                "{}: column '{name}' has unsupported type {dtype}",
                path.display(),
            )));
        };
        columns.push((name, kind));
    }
    let issues = validate_schema(&columns);
    if !issues.is_empty() {
        return Err(StoreError::Schema(format!(
            "{}: {}",
            path.display(),
            issues.join("; ")
        )));
    }
    Ok(())
}

/// Check a frame's columns against the partition schema.
pub fn check_partition_schema(df: &DataFrame, path: &Path) -> Result<(), StoreError> {
    check_columns(
        df.get_columns().iter().map(|c| (c.name().as_str(), c.dtype())),
        path,
    )
}

/// Load one partition file, validating its schema.
pub fn load_partition_file(path: &Path, ticker: &str) -> Result<Vec<StoredRecord>, StoreError> {
    let file = fs::File::open(path)?;
    let df = ParquetReader::new(file).finish()?;
    check_partition_schema(&df, path)?;
    dataframe_to_records(&df, ticker)
}

fn from_micros(us: i64, row: usize) -> Result<NaiveDateTime, StoreError> {
    DateTime::from_timestamp_micros(us)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| StoreError::Schema(format!("timestamp out of range at row {row}")))
}

fn null_at(column: &str, row: usize) -> StoreError {
    StoreError::Schema(format!("null {column} at row {row}"))
}

/// Convert a partition DataFrame back to rows. `ticker` comes from the
/// partition directory, not from the file.
pub fn dataframe_to_records(df: &DataFrame, ticker: &str) -> Result<Vec<StoredRecord>, StoreError> {
    let timestamps = df.column("timestamp")?.cast(&timestamp_dtype())?;
    let ts_ca = timestamps.datetime()?;
    let id_ca = df.column("ticker_id")?.i64()?;
    let name_ca = df.column("name")?.str()?;
    let exchange_ca = df.column("exchange")?.str()?;
    let open_ca = df.column("open")?.f64()?;
    let high_ca = df.column("high")?.f64()?;
    let low_ca = df.column("low")?.f64()?;
    let close_ca = df.column("close")?.f64()?;
    let vol_ca = df.column("volume")?.u64()?;

    let n = df.height();
    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        let us = ts_ca.get(i).ok_or_else(|| null_at("timestamp", i))?;
        rows.push(StoredRecord {
            timestamp: from_micros(us, i)?,
            ticker: ticker.to_string(),
            ticker_id: id_ca.get(i).ok_or_else(|| null_at("ticker_id", i))?,
            name: name_ca.get(i).ok_or_else(|| null_at("name", i))?.to_string(),
            exchange: exchange_ca
                .get(i)
                .ok_or_else(|| null_at("exchange", i))?
                .to_string(),
            open: open_ca.get(i).ok_or_else(|| null_at("open", i))?,
            high: high_ca.get(i).ok_or_else(|| null_at("high", i))?,
            low: low_ca.get(i).ok_or_else(|| null_at("low", i))?,
            close: close_ca.get(i).ok_or_else(|| null_at("close", i))?,
            volume: vol_ca.get(i).ok_or_else(|| null_at("volume", i))?,
        });
    }
    Ok(rows)
}

/// Lazily scan every file in a partition directory, keeping only rows with
/// `start <= timestamp <= end`, sorted ascending by timestamp. The scanned
/// schema is checked before any predicate is applied.
pub fn scan_range(
    dir: &Path,
    ticker: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<Vec<StoredRecord>, StoreError> {
    let pattern = dir.join("*.parquet");
    let mut scan = LazyFrame::scan_parquet(&pattern, ScanArgsParquet::default())?;
    let schema = scan.collect_schema()?;
    check_columns(schema.iter().map(|(name, dtype)| (name.as_str(), dtype)), dir)?;
    let df = scan
        .filter(
            col("timestamp")
                .gt_eq(lit(start))
                .and(col("timestamp").lt_eq(lit(end))),
        )
        .sort(
            ["timestamp"],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .collect()?;
    dataframe_to_records(&df, ticker)
}
