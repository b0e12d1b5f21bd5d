//! Typed result rows for the aggregate and windowed queries.
//!
//! Both backends produce these same shapes so results can be compared
//! directly.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Mean of the per-day volume sums for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyVolumeRow {
    pub symbol: String,
    pub avg_daily_volume: f64,
}

/// Return over a period, from the first to the last observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnRow {
    pub symbol: String,
    pub first_price: f64,
    pub last_price: f64,
    pub return_pct: f64,
}

impl ReturnRow {
    pub fn new(symbol: impl Into<String>, first_price: f64, last_price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            first_price,
            last_price,
            return_pct: percent_return(first_price, last_price),
        }
    }
}

/// First and last observation of one instrument on one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyFirstLastRow {
    pub symbol: String,
    pub trade_date: NaiveDate,
    pub first_price: f64,
    pub first_time: NaiveDateTime,
    pub last_price: f64,
    pub last_time: NaiveDateTime,
}

/// One point of a rolling mean or simple-return series.
///
/// `metric` is `None` wherever the window (or the previous observation) is
/// not available yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingPoint {
    pub timestamp: NaiveDateTime,
    pub symbol: String,
    pub value: f64,
    pub metric: Option<f64>,
}

/// One point of a rolling volatility series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityPoint {
    pub timestamp: NaiveDateTime,
    pub symbol: String,
    pub close: f64,
    #[serde(rename = "return")]
    pub ret: Option<f64>,
    pub volatility: Option<f64>,
}

/// `(last - first) / first * 100`.
pub fn percent_return(first: f64, last: f64) -> f64 {
    (last - first) / first * 100.0
}
