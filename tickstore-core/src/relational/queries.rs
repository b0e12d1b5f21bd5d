//! SQL text and row mapping for the relational store.
//!
//! The first/last lookups run in two stages: a GROUP BY that finds the
//! boundary timestamps, then a point lookup of the close at each boundary.
//! The lookup orders by `id`, so when several rows share a boundary
//! timestamp the one inserted first wins.

use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};

use crate::analytics::aggregate::rank_by_return;
use crate::domain::{DailyFirstLastRow, DailyVolumeRow, PriceRow, ReturnRow};
use crate::error::StoreError;
use crate::schema::{format_sql_timestamp, parse_sql_date, parse_sql_timestamp};

pub const INSERT_TICKER: &str =
    "INSERT INTO tickers (ticker_id, symbol, name, exchange) VALUES (?1, ?2, ?3, ?4)";

pub const INSERT_PRICE: &str = "INSERT INTO prices (timestamp, ticker_id, open, high, low, close, volume)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

const PRICE_COLUMNS: &str =
    "p.timestamp, t.symbol, p.ticker_id, p.open, p.high, p.low, p.close, p.volume";

const AVERAGE_DAILY_VOLUME: &str = "
    SELECT t.symbol, AVG(daily.daily_volume) AS avg_daily_volume
    FROM (
        SELECT ticker_id, DATE(timestamp) AS trade_date, SUM(volume) AS daily_volume
        FROM prices
        GROUP BY ticker_id, DATE(timestamp)
    ) daily
    JOIN tickers t ON t.ticker_id = daily.ticker_id
    GROUP BY t.symbol
    ORDER BY avg_daily_volume DESC, t.symbol ASC";

const PERIOD_BOUNDS: &str = "
    SELECT p.ticker_id, t.symbol, MIN(p.timestamp), MAX(p.timestamp)
    FROM prices p
    JOIN tickers t ON t.ticker_id = p.ticker_id
    WHERE (?1 IS NULL OR p.timestamp >= ?1)
      AND (?2 IS NULL OR p.timestamp <= ?2)
    GROUP BY p.ticker_id";

const DAILY_BOUNDS: &str = "
    SELECT p.ticker_id, t.symbol, DATE(p.timestamp) AS trade_date,
           MIN(p.timestamp), MAX(p.timestamp)
    FROM prices p
    JOIN tickers t ON t.ticker_id = p.ticker_id
    GROUP BY p.ticker_id, DATE(p.timestamp)
    ORDER BY trade_date, t.symbol";

const CLOSE_AT: &str = "
    SELECT close FROM prices
    WHERE ticker_id = ?1 AND timestamp = ?2
    ORDER BY id
    LIMIT 1";

fn conversion_error(col: usize, e: chrono::ParseError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, Type::Text, Box::new(e))
}

fn timestamp_at(row: &Row<'_>, col: usize) -> rusqlite::Result<NaiveDateTime> {
    let text: String = row.get(col)?;
    parse_sql_timestamp(&text).map_err(|e| conversion_error(col, e))
}

fn price_row(row: &Row<'_>) -> rusqlite::Result<PriceRow> {
    Ok(PriceRow {
        timestamp: timestamp_at(row, 0)?,
        symbol: row.get(1)?,
        ticker_id: row.get(2)?,
        open: row.get(3)?,
        high: row.get(4)?,
        low: row.get(5)?,
        close: row.get(6)?,
        volume: row.get(7)?,
    })
}

/// Joined price rows for one symbol with `start <= timestamp <= end`.
pub fn range(
    conn: &Connection,
    symbol: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<Vec<PriceRow>, StoreError> {
    let sql = format!(
        "SELECT {PRICE_COLUMNS}
         FROM prices p
         JOIN tickers t ON t.ticker_id = p.ticker_id
         WHERE t.symbol = ?1 AND p.timestamp >= ?2 AND p.timestamp <= ?3
         ORDER BY p.timestamp, p.id"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(
            params![symbol, format_sql_timestamp(&start), format_sql_timestamp(&end)],
            price_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Joined price rows ordered by symbol, timestamp, insertion order.
/// `None` selects every symbol.
pub fn series(conn: &Connection, symbol: Option<&str>) -> Result<Vec<PriceRow>, StoreError> {
    let sql = format!(
        "SELECT {PRICE_COLUMNS}
         FROM prices p
         JOIN tickers t ON t.ticker_id = p.ticker_id
         WHERE (?1 IS NULL OR t.symbol = ?1)
         ORDER BY t.symbol, p.timestamp, p.id"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params![symbol], price_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn average_daily_volume(conn: &Connection) -> Result<Vec<DailyVolumeRow>, StoreError> {
    let mut stmt = conn.prepare_cached(AVERAGE_DAILY_VOLUME)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(DailyVolumeRow {
                symbol: row.get(0)?,
                avg_daily_volume: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn close_at(conn: &Connection, ticker_id: i64, timestamp: &str) -> Result<f64, StoreError> {
    let mut stmt = conn.prepare_cached(CLOSE_AT)?;
    let close = stmt.query_row(params![ticker_id, timestamp], |row| row.get(0))?;
    Ok(close)
}

/// Top `n` symbols by percent return between the first and last
/// observation inside the optional inclusive bounds.
pub fn top_n_by_return(
    conn: &Connection,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
    n: usize,
) -> Result<Vec<ReturnRow>, StoreError> {
    let mut stmt = conn.prepare_cached(PERIOD_BOUNDS)?;
    let bounds: Vec<(i64, String, String, String)> = stmt
        .query_map(
            params![
                start.as_ref().map(format_sql_timestamp),
                end.as_ref().map(format_sql_timestamp)
            ],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?
        .collect::<Result<Vec<_>, _>>()?;

    let mut result = Vec::with_capacity(bounds.len());
    for (ticker_id, symbol, first_time, last_time) in bounds {
        let first = close_at(conn, ticker_id, &first_time)?;
        if first == 0.0 {
            continue;
        }
        let last = close_at(conn, ticker_id, &last_time)?;
        result.push(ReturnRow::new(symbol, first, last));
    }

    rank_by_return(&mut result);
    result.truncate(n);
    Ok(result)
}

/// First and last observation per (symbol, calendar day), ordered by day
/// then symbol.
pub fn daily_first_last(conn: &Connection) -> Result<Vec<DailyFirstLastRow>, StoreError> {
    let mut stmt = conn.prepare_cached(DAILY_BOUNDS)?;
    let bounds: Vec<(i64, String, String, String, String)> = stmt
        .query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut result = Vec::with_capacity(bounds.len());
    for (ticker_id, symbol, day, first_time, last_time) in bounds {
        let bad = |e: chrono::ParseError| StoreError::Schema(format!("stored timestamp: {e}"));
        result.push(DailyFirstLastRow {
            trade_date: parse_sql_date(&day).map_err(bad)?,
            first_price: close_at(conn, ticker_id, &first_time)?,
            first_time: parse_sql_timestamp(&first_time).map_err(bad)?,
            last_price: close_at(conn, ticker_id, &last_time)?,
            last_time: parse_sql_timestamp(&last_time).map_err(bad)?,
            symbol,
        });
    }
    Ok(result)
}

/// User tables, sorted by name.
pub fn table_names(conn: &Connection) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}
