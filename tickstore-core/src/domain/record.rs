//! Price records: the unit of ingestion and storage.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Instrument;

/// One validated input row, as produced by the ingestion boundary.
///
/// `ticker` is the raw symbol string from the input file; it is resolved
/// against the entity catalog by each store according to its conflict policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRecord {
    pub timestamp: NaiveDateTime,
    pub ticker: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl MarketRecord {
    /// OHLC sanity: high >= low.
    pub fn is_sane(&self) -> bool {
        self.high >= self.low
    }

    /// Calendar day of the observation.
    pub fn day(&self) -> NaiveDate {
        self.timestamp.date()
    }

    /// Attach the catalog id the ticker resolved to.
    pub fn resolve(&self, ticker_id: i64) -> PriceRecord {
        PriceRecord {
            timestamp: self.timestamp,
            ticker_id,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

/// A record whose ticker has been resolved to a catalog `ticker_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub timestamp: NaiveDateTime,
    pub ticker_id: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// A price row joined with its instrument symbol.
///
/// This is the uniform row shape both backends return from range queries and
/// feed into the analytics engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub timestamp: NaiveDateTime,
    pub symbol: String,
    pub ticker_id: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl PriceRow {
    /// Read one numeric column as f64.
    pub fn field(&self, field: PriceField) -> f64 {
        match field {
            PriceField::Open => self.open,
            PriceField::High => self.high,
            PriceField::Low => self.low,
            PriceField::Close => self.close,
            PriceField::Volume => self.volume as f64,
        }
    }

    pub fn day(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// A row as persisted in the columnar store: the price row plus the
/// instrument attributes denormalised onto it at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub timestamp: NaiveDateTime,
    pub ticker: String,
    pub ticker_id: i64,
    pub name: String,
    pub exchange: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl StoredRecord {
    /// Denormalise the instrument attributes onto a resolved record.
    pub fn new(instrument: &Instrument, record: &PriceRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            ticker: instrument.symbol.clone(),
            ticker_id: record.ticker_id,
            name: instrument.name.clone(),
            exchange: instrument.exchange.clone(),
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record.volume,
        }
    }
}

impl From<StoredRecord> for PriceRow {
    fn from(r: StoredRecord) -> Self {
        Self {
            timestamp: r.timestamp,
            symbol: r.ticker,
            ticker_id: r.ticker_id,
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            volume: r.volume,
        }
    }
}

/// Numeric columns a windowed statistic can be computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl PriceField {
    pub const ALL: [PriceField; 5] = [
        PriceField::Open,
        PriceField::High,
        PriceField::Low,
        PriceField::Close,
        PriceField::Volume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceField::Open => "open",
            PriceField::High => "high",
            PriceField::Low => "low",
            PriceField::Close => "close",
            PriceField::Volume => "volume",
        }
    }
}

impl fmt::Display for PriceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(PriceField::Open),
            "high" => Ok(PriceField::High),
            "low" => Ok(PriceField::Low),
            "close" => Ok(PriceField::Close),
            "volume" => Ok(PriceField::Volume),
            other => Err(format!("unknown price field '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 17)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn market_record_sanity() {
        let mut rec = MarketRecord {
            timestamp: ts(9, 30),
            ticker: "AAPL".into(),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 0,
        };
        assert!(rec.is_sane());
        rec.high = 98.0;
        assert!(!rec.is_sane());
    }

    #[test]
    fn resolved_record_carries_catalog_id() {
        let rec = MarketRecord {
            timestamp: ts(9, 30),
            ticker: "MSFT".into(),
            open: 300.0,
            high: 301.0,
            low: 299.0,
            close: 300.5,
            volume: 7,
        };
        let priced = rec.resolve(2);
        assert_eq!(priced.ticker_id, 2);
        assert_eq!(priced.close, 300.5);
        assert_eq!(priced.volume, 7);

        let inst = Instrument::new(2, "MSFT", "Microsoft Corp.", "NASDAQ");
        let stored = StoredRecord::new(&inst, &priced);
        assert_eq!(stored.ticker, "MSFT");
        assert_eq!(stored.exchange, "NASDAQ");
        assert_eq!(stored.timestamp, rec.timestamp);
        assert_eq!(PriceRow::from(stored).ticker_id, 2);
    }

    #[test]
    fn price_row_field_access() {
        let row = PriceRow {
            timestamp: ts(9, 31),
            symbol: "AAPL".into(),
            ticker_id: 1,
            open: 100.5,
            high: 102.0,
            low: 100.0,
            close: 101.5,
            volume: 1500,
        };
        assert_eq!(row.field(PriceField::Close), 101.5);
        assert_eq!(row.field(PriceField::Volume), 1500.0);
        assert_eq!(row.day(), NaiveDate::from_ymd_opt(2025, 11, 17).unwrap());
    }

    #[test]
    fn price_field_parses_case_insensitively() {
        assert_eq!("Close".parse::<PriceField>().unwrap(), PriceField::Close);
        assert_eq!(" volume ".parse::<PriceField>().unwrap(), PriceField::Volume);
        assert!("adj_close".parse::<PriceField>().is_err());
        for f in PriceField::ALL {
            assert_eq!(f.as_str().parse::<PriceField>().unwrap(), f);
        }
    }
}
