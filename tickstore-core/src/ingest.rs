//! Ingestion boundary: load and validate the two input CSV files.
//!
//! - `tickers.csv`: `ticker_id, symbol, name, exchange`
//! - `market_data_multi.csv`: `timestamp, ticker, open, high, low, close, volume`
//!
//! Header names are trimmed and lower-cased before mapping. Rows come back
//! sorted by `(timestamp, ticker)`. Nothing here touches either store; the
//! stores only ever see the validated output.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{Instrument, MarketRecord};

pub const TICKERS_FILE: &str = "tickers.csv";
pub const MARKET_DATA_FILE: &str = "market_data_multi.csv";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("input file not found: {0}")]
    NotFound(PathBuf),

    #[error("csv error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("row {row}: {message}")]
    Parse { row: usize, message: String },

    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

/// One market data row as read, before validation.
///
/// Every value column is optional so validation can report missing values
/// instead of failing on the first one.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMarketRow {
    pub timestamp: Option<NaiveDateTime>,
    pub ticker: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

impl RawMarketRow {
    /// The row as a record when every field is present and the volume is a
    /// whole non-negative number.
    pub fn to_record(&self) -> Option<MarketRecord> {
        let volume = self.volume.filter(|v| *v >= 0.0 && v.fract() == 0.0)?;
        Some(MarketRecord {
            timestamp: self.timestamp?,
            ticker: self.ticker.clone(),
            open: self.open?,
            high: self.high?,
            low: self.low?,
            close: self.close?,
            volume: volume as u64,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CsvMarketRow {
    timestamp: Option<String>,
    ticker: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
}

/// Parse an ISO-8601-ish timestamp.
///
/// Accepts RFC 3339 with offset (converted to UTC), `T` or space separated
/// date-times with optional fractional seconds, minute precision, and bare
/// dates (midnight).
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    for fmt in FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn open_reader(path: &Path) -> Result<csv::Reader<std::fs::File>, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;
    let headers: csv::StringRecord = rdr
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();
    rdr.set_headers(headers);
    Ok(rdr)
}

/// Load the instrument reference table.
pub fn load_instruments(path: &Path) -> Result<Vec<Instrument>, LoadError> {
    let mut rdr = open_reader(path)?;
    let mut instruments = Vec::new();
    for row in rdr.deserialize::<Instrument>() {
        instruments.push(row.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?);
    }
    Ok(instruments)
}

/// Load raw market rows, sorted by `(timestamp, ticker)`.
///
/// Rows with a missing timestamp sort last.
pub fn load_market_data(path: &Path) -> Result<Vec<RawMarketRow>, LoadError> {
    let mut rdr = open_reader(path)?;
    let mut rows = Vec::new();
    for (i, row) in rdr.deserialize::<CsvMarketRow>().enumerate() {
        let row = row.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let timestamp = match row.timestamp.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) => Some(parse_timestamp(s).ok_or_else(|| LoadError::Parse {
                row: i + 1,
                message: format!("unparseable timestamp '{s}'"),
            })?),
        };
        rows.push(RawMarketRow {
            timestamp,
            ticker: row.ticker,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }

    rows.sort_by(|a, b| {
        let key = |r: &RawMarketRow| (r.timestamp.is_none(), r.timestamp);
        key(a).cmp(&key(b)).then_with(|| a.ticker.cmp(&b.ticker))
    });
    Ok(rows)
}

/// Outcome of [`validate`]: one human-readable line per issue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub issues: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check the loaded rows for completeness and consistency with the catalog.
pub fn validate(rows: &[RawMarketRow], instruments: &[Instrument]) -> ValidationReport {
    let mut issues = Vec::new();

    let missing_ts = rows.iter().filter(|r| r.timestamp.is_none()).count();
    if missing_ts > 0 {
        issues.push(format!("Found {missing_ts} missing timestamps"));
    }

    let price_columns: [(&str, fn(&RawMarketRow) -> Option<f64>); 4] = [
        ("open", |r| r.open),
        ("high", |r| r.high),
        ("low", |r| r.low),
        ("close", |r| r.close),
    ];
    for (name, get) in price_columns {
        let missing = rows.iter().filter(|r| get(r).is_none()).count();
        if missing > 0 {
            issues.push(format!("Found {missing} missing values in column '{name}'"));
        }
    }

    // Zero volume is legitimate; null is not.
    let missing_volume = rows.iter().filter(|r| r.volume.is_none()).count();
    if missing_volume > 0 {
        issues.push(format!("Found {missing_volume} missing volume values"));
    }
    let bad_volume = rows
        .iter()
        .filter_map(|r| r.volume)
        .filter(|v| *v < 0.0 || v.fract() != 0.0)
        .count();
    if bad_volume > 0 {
        issues.push(format!(
            "Found {bad_volume} volume values that are negative or fractional"
        ));
    }

    let expected: BTreeSet<&str> = instruments.iter().map(|i| i.symbol.as_str()).collect();
    let actual: BTreeSet<&str> = rows.iter().map(|r| r.ticker.as_str()).collect();

    let missing_tickers: Vec<&str> = expected.difference(&actual).copied().collect();
    if !missing_tickers.is_empty() {
        issues.push(format!("Missing tickers in data: {missing_tickers:?}"));
    }
    let extra_tickers: Vec<&str> = actual.difference(&expected).copied().collect();
    if !extra_tickers.is_empty() {
        issues.push(format!("Unexpected tickers in data: {extra_tickers:?}"));
    }

    // Incomplete rows are already reported above.
    let inverted = rows
        .iter()
        .filter_map(RawMarketRow::to_record)
        .filter(|r| !r.is_sane())
        .count();
    if inverted > 0 {
        issues.push(format!("Found {inverted} rows where high < low"));
    }

    ValidationReport { issues }
}

/// Convert validated rows into records. Fails on the first incomplete row.
pub fn into_records(rows: Vec<RawMarketRow>) -> Result<Vec<MarketRecord>, LoadError> {
    rows.into_iter()
        .enumerate()
        .map(|(i, r)| {
            let incomplete = || LoadError::Parse {
                row: i + 1,
                message: format!("incomplete row for ticker '{}'", r.ticker),
            };
            let volume = r.volume.ok_or_else(incomplete)?;
            if volume < 0.0 || volume.fract() != 0.0 {
                return Err(LoadError::Parse {
                    row: i + 1,
                    message: format!("invalid volume {volume}"),
                });
            }
            Ok(MarketRecord {
                timestamp: r.timestamp.ok_or_else(incomplete)?,
                open: r.open.ok_or_else(incomplete)?,
                high: r.high.ok_or_else(incomplete)?,
                low: r.low.ok_or_else(incomplete)?,
                close: r.close.ok_or_else(incomplete)?,
                volume: volume as u64,
                ticker: r.ticker,
            })
        })
        .collect()
}

/// Load both input files from `dir` and validate them.
pub fn load_and_validate(dir: &Path) -> Result<(Vec<MarketRecord>, Vec<Instrument>), LoadError> {
    let instruments = load_instruments(&dir.join(TICKERS_FILE))?;
    let rows = load_market_data(&dir.join(MARKET_DATA_FILE))?;

    let report = validate(&rows, &instruments);
    if !report.is_valid() {
        for issue in &report.issues {
            warn!(%issue, "input validation issue");
        }
        return Err(LoadError::Validation(report.issues));
    }

    let records = into_records(rows)?;
    info!(
        records = records.len(),
        instruments = instruments.len(),
        "loaded and validated input"
    );
    Ok((records, instruments))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICKERS: &str = "ticker_id,symbol,name,exchange\n\
        1,AAPL,Apple Inc.,NASDAQ\n\
        2,MSFT,Microsoft Corp.,NASDAQ\n";

    const MARKET: &str = " Timestamp ,Ticker,Open,High,Low,Close,Volume\n\
        2025-11-17 09:31:00,AAPL,100.5,102,100,101.5,1500\n\
        2025-11-17 09:30:00,MSFT,300,301,299,300.5,0\n\
        2025-11-17 09:30:00,AAPL,100,101,99,100.5,1000\n";

    fn write_inputs(dir: &Path, tickers: &str, market: &str) {
        std::fs::write(dir.join(TICKERS_FILE), tickers).unwrap();
        std::fs::write(dir.join(MARKET_DATA_FILE), market).unwrap();
    }

    #[test]
    fn parse_timestamp_variants() {
        let expected = NaiveDate::from_ymd_opt(2025, 11, 17)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2025-11-17T09:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-11-17 09:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-11-17 09:30"), Some(expected));
        assert_eq!(parse_timestamp("2025-11-17T14:30:00+05:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2025-11-17"),
            NaiveDate::from_ymd_opt(2025, 11, 17).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn load_normalizes_headers_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        write_inputs(dir.path(), TICKERS, MARKET);

        let (records, instruments) = load_and_validate(dir.path()).unwrap();
        assert_eq!(instruments.len(), 2);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].ticker, "AAPL");
        assert_eq!(records[1].ticker, "MSFT");
        assert_eq!(records[1].volume, 0);
        assert_eq!(records[2].close, 101.5);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_instruments(&dir.path().join(TICKERS_FILE)).unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
    }

    #[test]
    fn validation_reports_every_issue() {
        let dir = tempfile::tempdir().unwrap();
        let market = "timestamp,ticker,open,high,low,close,volume\n\
            2025-11-17 09:30:00,AAPL,100,101,99,100.5,\n\
            2025-11-17 09:31:00,AAPL,100,99,101,100.5,5\n\
            ,TSLA,,101,99,100.5,10\n";
        write_inputs(dir.path(), TICKERS, market);

        let err = load_and_validate(dir.path()).unwrap_err();
        let LoadError::Validation(issues) = err else {
            panic!("expected validation error");
        };
        let joined = issues.join("\n");
        assert!(joined.contains("missing timestamps"));
        assert!(joined.contains("'open'"));
        assert!(joined.contains("missing volume"));
        assert!(joined.contains("Missing tickers in data: [\"MSFT\"]"));
        assert!(joined.contains("Unexpected tickers in data: [\"TSLA\"]"));
        assert!(joined.contains("high < low"));
    }

    #[test]
    fn inverted_rows_counted_through_record_sanity() {
        let row = |high: f64, low: f64, volume: Option<f64>| RawMarketRow {
            timestamp: parse_timestamp("2025-11-17 09:30:00"),
            ticker: "AAPL".into(),
            open: Some(100.0),
            high: Some(high),
            low: Some(low),
            close: Some(100.0),
            volume,
        };
        let insts = vec![Instrument::new(1, "AAPL", "Apple", "NASDAQ")];

        let sane = row(101.0, 99.0, Some(10.0));
        assert!(sane.to_record().unwrap().is_sane());
        assert!(validate(&[sane], &insts).is_valid());

        // Only the complete inverted row is counted as inverted.
        let rows = vec![row(99.0, 101.0, Some(10.0)), row(99.0, 101.0, None)];
        assert!(rows[1].to_record().is_none());
        let report = validate(&rows, &insts);
        assert!(report.issues.iter().any(|i| i == "Found 1 rows where high < low"));
        assert!(report.issues.iter().any(|i| i == "Found 1 missing volume values"));
    }

    #[test]
    fn malformed_timestamp_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let market = "timestamp,ticker,open,high,low,close,volume\n\
            not-a-time,AAPL,100,101,99,100.5,1\n";
        write_inputs(dir.path(), TICKERS, market);
        let err = load_market_data(&dir.path().join(MARKET_DATA_FILE)).unwrap_err();
        assert!(matches!(err, LoadError::Parse { row: 1, .. }));
    }

    #[test]
    fn fractional_volume_rejected() {
        let rows = vec![RawMarketRow {
            timestamp: parse_timestamp("2025-11-17 09:30:00"),
            ticker: "AAPL".into(),
            open: Some(1.0),
            high: Some(1.0),
            low: Some(1.0),
            close: Some(1.0),
            volume: Some(1.5),
        }];
        let insts = vec![Instrument::new(1, "AAPL", "Apple", "NASDAQ")];
        assert!(!validate(&rows, &insts).is_valid());
        assert!(into_records(rows).is_err());
    }
}
