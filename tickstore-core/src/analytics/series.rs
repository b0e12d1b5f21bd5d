//! Per-entity application of the window kernels.
//!
//! Rows are grouped by symbol, each group is stably sorted by timestamp, and
//! kernels run on each group independently so no window ever spans two
//! instruments. Output is ordered by symbol, then timestamp.

use std::collections::BTreeMap;

use rayon::prelude::*;

use super::window::{defined, RollingMean, RollingVolatility, SimpleReturn, WindowStat};
use crate::domain::{PriceField, PriceRow, RollingPoint, VolatilityPoint};
use crate::error::StoreError;

/// Group rows by symbol; each group is sorted ascending by timestamp with
/// ties left in input order.
pub fn group_by_entity(rows: &[PriceRow]) -> Vec<(&str, Vec<&PriceRow>)> {
    let mut groups: BTreeMap<&str, Vec<&PriceRow>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.symbol.as_str()).or_default().push(row);
    }
    groups
        .into_iter()
        .map(|(symbol, mut group)| {
            group.sort_by_key(|r| r.timestamp);
            (symbol, group)
        })
        .collect()
}

fn check_window(window: usize) -> Result<(), StoreError> {
    if window == 0 {
        return Err(StoreError::InvalidArgument(
            "window must be >= 1".to_string(),
        ));
    }
    Ok(())
}

/// Run one kernel per entity over `field` and emit one point per row.
fn apply_per_entity(
    rows: &[PriceRow],
    field: PriceField,
    stat: &dyn WindowStat,
) -> Vec<RollingPoint> {
    group_by_entity(rows)
        .par_iter()
        .map(|(symbol, group)| {
            let values: Vec<f64> = group.iter().map(|r| r.field(field)).collect();
            let metric = stat.compute(&values);
            group
                .iter()
                .zip(values)
                .zip(metric)
                .map(|((row, value), m)| RollingPoint {
                    timestamp: row.timestamp,
                    symbol: symbol.to_string(),
                    value,
                    metric: defined(m),
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}

/// Trailing mean of `field` over `window` observations, per entity.
pub fn rolling_mean(
    rows: &[PriceRow],
    window: usize,
    field: PriceField,
) -> Result<Vec<RollingPoint>, StoreError> {
    check_window(window)?;
    Ok(apply_per_entity(rows, field, &RollingMean::new(window)))
}

/// Fractional change of `field` from the previous same-entity observation.
pub fn simple_return(rows: &[PriceRow], field: PriceField) -> Vec<RollingPoint> {
    apply_per_entity(rows, field, &SimpleReturn)
}

/// Sample standard deviation of close-to-close returns over `window`
/// observations, per entity.
pub fn rolling_volatility(
    rows: &[PriceRow],
    window: usize,
) -> Result<Vec<VolatilityPoint>, StoreError> {
    check_window(window)?;
    let vol = RollingVolatility::new(window);

    let points = group_by_entity(rows)
        .par_iter()
        .map(|(symbol, group)| {
            let closes: Vec<f64> = group.iter().map(|r| r.close).collect();
            let returns = SimpleReturn.compute(&closes);
            let vols = vol.over_returns(&returns);
            group
                .iter()
                .zip(returns)
                .zip(vols)
                .map(|((row, ret), v)| VolatilityPoint {
                    timestamp: row.timestamp,
                    symbol: symbol.to_string(),
                    close: row.close,
                    ret: defined(ret),
                    volatility: defined(v),
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect();
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 17)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn row(symbol: &str, minute: i64, close: f64) -> PriceRow {
        PriceRow {
            timestamp: t0() + Duration::minutes(minute),
            symbol: symbol.into(),
            ticker_id: if symbol == "AAPL" { 1 } else { 2 },
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000,
        }
    }

    #[test]
    fn example_two_rows() {
        let rows = vec![
            PriceRow {
                timestamp: t0(),
                symbol: "AAPL".into(),
                ticker_id: 1,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.5,
                volume: 1000,
            },
            PriceRow {
                timestamp: t0() + Duration::minutes(1),
                symbol: "AAPL".into(),
                ticker_id: 1,
                open: 100.5,
                high: 102.0,
                low: 100.0,
                close: 101.5,
                volume: 1500,
            },
        ];
        let points = rolling_mean(&rows, 2, PriceField::Close).unwrap();
        assert_eq!(points[0].metric, None);
        assert!((points[1].metric.unwrap() - 101.0).abs() < 1e-12);
    }

    #[test]
    fn windows_never_span_entities() {
        // Interleaved input: AAPL and MSFT alternate.
        let rows = vec![
            row("AAPL", 0, 10.0),
            row("MSFT", 0, 1000.0),
            row("AAPL", 1, 20.0),
            row("MSFT", 1, 2000.0),
            row("AAPL", 2, 30.0),
        ];
        let points = rolling_mean(&rows, 2, PriceField::Close).unwrap();
        let aapl: Vec<_> = points.iter().filter(|p| p.symbol == "AAPL").collect();
        let msft: Vec<_> = points.iter().filter(|p| p.symbol == "MSFT").collect();

        assert_eq!(aapl.len(), 3);
        assert_eq!(aapl[0].metric, None);
        assert_eq!(aapl[1].metric, Some(15.0));
        assert_eq!(aapl[2].metric, Some(25.0));
        assert_eq!(msft[0].metric, None);
        assert_eq!(msft[1].metric, Some(1500.0));
    }

    #[test]
    fn output_ordered_by_symbol_then_time() {
        let rows = vec![row("MSFT", 1, 2.0), row("AAPL", 1, 2.0), row("MSFT", 0, 1.0)];
        let points = simple_return(&rows, PriceField::Close);
        let keys: Vec<_> = points
            .iter()
            .map(|p| (p.symbol.as_str(), p.timestamp))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("AAPL", t0() + Duration::minutes(1)),
                ("MSFT", t0()),
                ("MSFT", t0() + Duration::minutes(1)),
            ]
        );
        assert_eq!(points[2].metric, Some(1.0));
    }

    #[test]
    fn volatility_missing_prefix_per_entity() {
        let mut rows: Vec<PriceRow> = (0..6).map(|i| row("AAPL", i, 50.0)).collect();
        rows.extend((0..4).map(|i| row("MSFT", i, 70.0)));
        let points = rolling_volatility(&rows, 3).unwrap();

        for symbol in ["AAPL", "MSFT"] {
            let series: Vec<_> = points.iter().filter(|p| p.symbol == symbol).collect();
            assert_eq!(series[0].ret, None);
            assert!(series[1..].iter().all(|p| p.ret == Some(0.0)));
            assert!(series[..3].iter().all(|p| p.volatility.is_none()));
            assert!(series[3..].iter().all(|p| p.volatility == Some(0.0)));
        }
    }

    #[test]
    fn zero_close_gives_missing_return_not_infinity() {
        let rows = vec![row("AAPL", 0, 0.0), row("AAPL", 1, 2.0), row("AAPL", 2, 3.0)];
        let points = rolling_volatility(&rows, 2).unwrap();
        assert_eq!(points[1].ret, None);
        assert_eq!(points[2].ret, Some(0.5));
        // The window holding the undefined return stays undefined.
        assert_eq!(points[2].volatility, None);
        let json = serde_json::to_string(&points[1]).unwrap();
        assert!(json.contains("\"return\":null"), "{json}");
    }

    #[test]
    fn zero_window_is_invalid_argument() {
        let rows = vec![row("AAPL", 0, 1.0)];
        assert!(matches!(
            rolling_mean(&rows, 0, PriceField::Close),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(rolling_volatility(&rows, 0).is_err());
    }
}
