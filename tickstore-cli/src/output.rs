//! Result printing: fixed-width tables or JSON lines.

use anyhow::Result;
use serde::Serialize;
use tickstore_core::domain::{
    DailyFirstLastRow, DailyVolumeRow, PriceRow, ReturnRow, RollingPoint, VolatilityPoint,
};

const TS: &str = "%Y-%m-%d %H:%M:%S";

/// A row that knows how to render itself as one table line.
pub trait TableRow: Serialize {
    fn header() -> String;
    fn line(&self) -> String;
}

fn opt(v: Option<f64>, precision: usize) -> String {
    match v {
        Some(v) => format!("{v:.precision$}"),
        None => "-".into(),
    }
}

impl TableRow for PriceRow {
    fn header() -> String {
        format!(
            "{:<20} {:<8} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "Timestamp", "Symbol", "Open", "High", "Low", "Close", "Volume"
        )
    }

    fn line(&self) -> String {
        format!(
            "{:<20} {:<8} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10}",
            self.timestamp.format(TS),
            self.symbol,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume
        )
    }
}

impl TableRow for RollingPoint {
    fn header() -> String {
        format!("{:<20} {:<8} {:>12} {:>12}", "Timestamp", "Symbol", "Value", "Metric")
    }

    fn line(&self) -> String {
        format!(
            "{:<20} {:<8} {:>12.4} {:>12}",
            self.timestamp.format(TS),
            self.symbol,
            self.value,
            opt(self.metric, 4)
        )
    }
}

impl TableRow for VolatilityPoint {
    fn header() -> String {
        format!(
            "{:<20} {:<8} {:>10} {:>12} {:>12}",
            "Timestamp", "Symbol", "Close", "Return", "Volatility"
        )
    }

    fn line(&self) -> String {
        format!(
            "{:<20} {:<8} {:>10.2} {:>12} {:>12}",
            self.timestamp.format(TS),
            self.symbol,
            self.close,
            opt(self.ret, 6),
            opt(self.volatility, 6)
        )
    }
}

impl TableRow for DailyVolumeRow {
    fn header() -> String {
        format!("{:<8} {:>16}", "Symbol", "Avg Daily Vol")
    }

    fn line(&self) -> String {
        format!("{:<8} {:>16.1}", self.symbol, self.avg_daily_volume)
    }
}

impl TableRow for ReturnRow {
    fn header() -> String {
        format!(
            "{:<8} {:>10} {:>10} {:>10}",
            "Symbol", "First", "Last", "Return %"
        )
    }

    fn line(&self) -> String {
        format!(
            "{:<8} {:>10.2} {:>10.2} {:>10.3}",
            self.symbol, self.first_price, self.last_price, self.return_pct
        )
    }
}

impl TableRow for DailyFirstLastRow {
    fn header() -> String {
        format!(
            "{:<8} {:<10} {:>10} {:<20} {:>10} {:<20}",
            "Symbol", "Date", "First", "First Time", "Last", "Last Time"
        )
    }

    fn line(&self) -> String {
        format!(
            "{:<8} {:<10} {:>10.2} {:<20} {:>10.2} {:<20}",
            self.symbol,
            self.trade_date,
            self.first_price,
            self.first_time.format(TS),
            self.last_price,
            self.last_time.format(TS)
        )
    }
}

pub struct Printer {
    pub json: bool,
    pub limit: Option<usize>,
}

impl Printer {
    /// Print `rows`, truncated to the configured limit, followed by a
    /// timing footer in table mode.
    pub fn rows<R: TableRow>(&self, rows: &[R], elapsed_ms: f64) -> Result<()> {
        let shown = match self.limit {
            Some(n) => &rows[..rows.len().min(n)],
            None => rows,
        };
        if self.json {
            for row in shown {
                println!("{}", serde_json::to_string(row)?);
            }
            return Ok(());
        }
        if shown.is_empty() {
            println!("(no rows)");
        } else {
            let header = R::header();
            println!("{header}");
            println!("{}", "-".repeat(header.len()));
            for row in shown {
                println!("{}", row.line());
            }
        }
        if shown.len() < rows.len() {
            println!("... {} of {} rows shown", shown.len(), rows.len());
        }
        println!("{} rows in {elapsed_ms:.2} ms", rows.len());
        Ok(())
    }
}

pub fn format_size(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.1} GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}
