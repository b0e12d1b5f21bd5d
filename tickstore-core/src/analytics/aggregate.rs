//! Group-by aggregates over in-memory rows.
//!
//! These are the columnar backend's versions of the relational aggregate
//! queries. Tie-breaking matches the relational side: among rows sharing the
//! minimum (or maximum) timestamp of a group, the earliest row in stable
//! input order wins.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};

use crate::domain::{DailyFirstLastRow, DailyVolumeRow, PriceRow, ReturnRow};

/// First row with the minimum timestamp and first row with the maximum.
fn first_and_last<'a>(rows: &[&'a PriceRow]) -> Option<(&'a PriceRow, &'a PriceRow)> {
    let mut iter = rows.iter().copied();
    let head = iter.next()?;
    let (mut first, mut last) = (head, head);
    for row in iter {
        if row.timestamp < first.timestamp {
            first = row;
        }
        if row.timestamp > last.timestamp {
            last = row;
        }
    }
    Some((first, last))
}

/// Mean over days of the per-day volume sum, per symbol. Descending by the
/// mean, ties by symbol.
pub fn average_daily_volume(rows: &[PriceRow]) -> Vec<DailyVolumeRow> {
    let mut daily: BTreeMap<&str, BTreeMap<NaiveDate, u128>> = BTreeMap::new();
    for row in rows {
        *daily
            .entry(row.symbol.as_str())
            .or_default()
            .entry(row.day())
            .or_default() += u128::from(row.volume);
    }

    let mut result: Vec<DailyVolumeRow> = daily
        .into_iter()
        .map(|(symbol, days)| {
            let total: u128 = days.values().sum();
            DailyVolumeRow {
                symbol: symbol.to_string(),
                avg_daily_volume: total as f64 / days.len() as f64,
            }
        })
        .collect();

    result.sort_by(|a, b| {
        b.avg_daily_volume
            .total_cmp(&a.avg_daily_volume)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    result
}

/// Order return rows descending by return, ties by symbol.
pub fn rank_by_return(rows: &mut [ReturnRow]) {
    rows.sort_by(|a, b| match b.return_pct.total_cmp(&a.return_pct) {
        Ordering::Equal => a.symbol.cmp(&b.symbol),
        other => other,
    });
}

/// Top `n` symbols by return between their first and last observation
/// inside the optional inclusive bounds.
///
/// Symbols whose first price is zero have no defined return and are left
/// out.
pub fn top_n_by_return(
    rows: &[PriceRow],
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
    n: usize,
) -> Vec<ReturnRow> {
    let mut groups: BTreeMap<&str, Vec<&PriceRow>> = BTreeMap::new();
    for row in rows {
        let after_start = start.map_or(true, |s| row.timestamp >= s);
        let before_end = end.map_or(true, |e| row.timestamp <= e);
        if after_start && before_end {
            groups.entry(row.symbol.as_str()).or_default().push(row);
        }
    }

    let mut result: Vec<ReturnRow> = groups
        .into_iter()
        .filter_map(|(symbol, group)| {
            let (first, last) = first_and_last(&group)?;
            if first.close == 0.0 {
                return None;
            }
            Some(ReturnRow::new(symbol, first.close, last.close))
        })
        .collect();

    rank_by_return(&mut result);
    result.truncate(n);
    result
}

/// First and last observation per (symbol, calendar day), ordered by day
/// then symbol.
pub fn daily_first_last(rows: &[PriceRow]) -> Vec<DailyFirstLastRow> {
    let mut groups: BTreeMap<(NaiveDate, &str), Vec<&PriceRow>> = BTreeMap::new();
    for row in rows {
        groups
            .entry((row.day(), row.symbol.as_str()))
            .or_default()
            .push(row);
    }

    groups
        .into_iter()
        .filter_map(|((day, symbol), group)| {
            let (first, last) = first_and_last(&group)?;
            Some(DailyFirstLastRow {
                symbol: symbol.to_string(),
                trade_date: day,
                first_price: first.close,
                first_time: first.timestamp,
                last_price: last.close,
                last_time: last.timestamp,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn row(symbol: &str, ts: NaiveDateTime, close: f64, volume: u64) -> PriceRow {
        PriceRow {
            timestamp: ts,
            symbol: symbol.into(),
            ticker_id: 0,
            open: close,
            high: close,
            low: close,
            close,
            volume,
        }
    }

    #[test]
    fn average_daily_volume_two_level() {
        let rows = vec![
            row("AAPL", at(17, 9, 30), 1.0, 100),
            row("AAPL", at(17, 9, 31), 1.0, 300),
            row("AAPL", at(18, 9, 30), 1.0, 200),
            row("MSFT", at(17, 9, 30), 1.0, 1000),
        ];
        let result = average_daily_volume(&rows);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].symbol, "MSFT");
        assert_eq!(result[0].avg_daily_volume, 1000.0);
        // AAPL: day sums 400 and 200 → mean 300
        assert_eq!(result[1].avg_daily_volume, 300.0);
    }

    #[test]
    fn top_n_sorted_and_truncated() {
        let rows = vec![
            row("A", at(17, 9, 30), 100.0, 1),
            row("A", at(17, 16, 0), 110.0, 1),
            row("B", at(17, 9, 30), 100.0, 1),
            row("B", at(17, 16, 0), 90.0, 1),
            row("C", at(17, 9, 30), 50.0, 1),
            row("C", at(17, 16, 0), 75.0, 1),
            row("D", at(17, 9, 30), 10.0, 1),
            row("D", at(17, 16, 0), 10.0, 1),
        ];
        let top = top_n_by_return(&rows, None, None, 3);
        let symbols: Vec<_> = top.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["C", "A", "D"]);
        assert!((top[0].return_pct - 50.0).abs() < 1e-9);
        assert!(top.windows(2).all(|w| w[0].return_pct >= w[1].return_pct));
    }

    #[test]
    fn zero_first_price_is_excluded() {
        let rows = vec![
            row("A", at(17, 9, 30), 0.0, 1),
            row("A", at(17, 16, 0), 10.0, 1),
            row("B", at(17, 9, 30), 100.0, 1),
            row("B", at(17, 16, 0), 90.0, 1),
            // Zero later in the window does not matter, only the first price.
            row("C", at(17, 9, 30), 50.0, 1),
            row("C", at(17, 16, 0), 0.0, 1),
        ];
        let top = top_n_by_return(&rows, None, None, 5);
        let symbols: Vec<_> = top.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["B", "C"]);
        assert!((top[1].return_pct + 100.0).abs() < 1e-9);
        assert!(top.iter().all(|r| r.return_pct.is_finite()));
    }

    #[test]
    fn top_n_respects_bounds() {
        let rows = vec![
            row("A", at(17, 9, 30), 100.0, 1),
            row("A", at(18, 9, 30), 200.0, 1),
            row("A", at(19, 9, 30), 400.0, 1),
        ];
        let top = top_n_by_return(&rows, Some(at(18, 0, 0)), Some(at(19, 23, 59)), 5);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].first_price, 200.0);
        assert_eq!(top[0].last_price, 400.0);
    }

    #[test]
    fn ties_on_timestamp_pick_earliest_row() {
        let ts = at(17, 9, 30);
        let rows = vec![
            row("A", ts, 100.0, 1),
            row("A", ts, 999.0, 1),
            row("A", ts + Duration::minutes(5), 105.0, 1),
            row("A", ts + Duration::minutes(5), 1.0, 1),
        ];
        let fl = daily_first_last(&rows);
        assert_eq!(fl.len(), 1);
        assert_eq!(fl[0].first_price, 100.0);
        assert_eq!(fl[0].last_price, 105.0);
    }

    #[test]
    fn daily_first_last_ordered_by_day_then_symbol() {
        let rows = vec![
            row("MSFT", at(18, 9, 30), 3.0, 1),
            row("AAPL", at(18, 10, 0), 2.0, 1),
            row("MSFT", at(17, 9, 30), 1.0, 1),
            row("AAPL", at(18, 9, 30), 1.5, 1),
        ];
        let fl = daily_first_last(&rows);
        let keys: Vec<_> = fl
            .iter()
            .map(|r| (r.trade_date.to_string(), r.symbol.clone()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("2025-11-17".to_string(), "MSFT".to_string()),
                ("2025-11-18".to_string(), "AAPL".to_string()),
                ("2025-11-18".to_string(), "MSFT".to_string()),
            ]
        );
        assert_eq!(fl[1].first_price, 1.5);
        assert_eq!(fl[1].first_time, at(18, 9, 30));
        assert_eq!(fl[1].last_price, 2.0);
    }
}
