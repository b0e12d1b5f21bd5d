//! Synthetic input fixtures: a `tickers.csv` / `market_data_multi.csv` pair
//! built from a seeded random walk per symbol.
//!
//! Each symbol's RNG is seeded from BLAKE3(master seed, symbol), so the walk
//! for one symbol does not depend on which other symbols are generated.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tickstore_core::domain::Instrument;
use tickstore_core::ingest::{MARKET_DATA_FILE, TICKERS_FILE};

pub struct GenerateOptions {
    pub out_dir: PathBuf,
    pub symbols: Vec<String>,
    pub start: NaiveDate,
    pub days: u32,
    pub bars_per_day: u32,
    pub seed: u64,
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    timestamp: String,
    ticker: &'a str,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
}

#[derive(Debug, Clone)]
struct Bar {
    timestamp: NaiveDateTime,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
}

/// Per-symbol sub-seed, independent of generation order.
pub fn sub_seed(master_seed: u64, symbol: &str) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&master_seed.to_le_bytes());
    hasher.update(symbol.as_bytes());
    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// The first `days` weekdays on or after `start`.
fn trading_days(start: NaiveDate, days: u32) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(days as usize);
    let mut day = start;
    while out.len() < days as usize {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            out.push(day);
        }
        day += Duration::days(1);
    }
    out
}

fn random_walk(rng: &mut StdRng, days: &[NaiveDate], bars_per_day: u32) -> Result<Vec<Bar>> {
    let mut close = rng.gen_range(50.0..500.0_f64);
    let mut bars = Vec::with_capacity(days.len() * bars_per_day as usize);
    for day in days {
        let session_open = day
            .and_hms_opt(9, 30, 0)
            .context("invalid session open time")?;
        for minute in 0..bars_per_day {
            let open = close;
            close = (open * (1.0 + rng.gen_range(-0.002..0.002))).max(0.01);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.001));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.001));
            bars.push(Bar {
                timestamp: session_open + Duration::minutes(i64::from(minute)),
                open: round2(open),
                high: round2(high),
                low: round2(low),
                close: round2(close),
                volume: rng.gen_range(100..10_000),
            });
        }
    }
    Ok(bars)
}

/// Write both fixture files into `opts.out_dir`. Returns the number of
/// market-data rows written.
pub fn generate(opts: &GenerateOptions) -> Result<usize> {
    if opts.symbols.is_empty() {
        bail!("at least one symbol is required");
    }
    if opts.days == 0 || opts.bars_per_day == 0 {
        bail!("--days and --bars-per-day must be >= 1");
    }
    std::fs::create_dir_all(&opts.out_dir)
        .with_context(|| format!("creating {}", opts.out_dir.display()))?;

    let instruments: Vec<Instrument> = opts
        .symbols
        .iter()
        .enumerate()
        .map(|(i, s)| Instrument::new(i as i64 + 1, s.as_str(), format!("{s} Inc."), "NASDAQ"))
        .collect();
    write_tickers(&opts.out_dir.join(TICKERS_FILE), &instruments)?;

    let days = trading_days(opts.start, opts.days);
    let mut walks = Vec::with_capacity(instruments.len());
    for inst in &instruments {
        let mut rng = StdRng::seed_from_u64(sub_seed(opts.seed, &inst.symbol));
        walks.push((inst.symbol.as_str(), random_walk(&mut rng, &days, opts.bars_per_day)?));
    }

    let path = opts.out_dir.join(MARKET_DATA_FILE);
    let mut wtr =
        csv::Writer::from_path(&path).with_context(|| format!("creating {}", path.display()))?;
    let bars_per_symbol = days.len() * opts.bars_per_day as usize;
    let mut written = 0;
    // Interleave symbols so the file is ordered by (timestamp, ticker list order).
    for i in 0..bars_per_symbol {
        for (symbol, bars) in &walks {
            let bar = &bars[i];
            wtr.serialize(CsvRow {
                timestamp: bar.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                ticker: symbol,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            })?;
            written += 1;
        }
    }
    wtr.flush()?;
    Ok(written)
}

fn write_tickers(path: &Path, instruments: &[Instrument]) -> Result<()> {
    let mut wtr =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for inst in instruments {
        wtr.serialize(inst)?;
    }
    wtr.flush()?;
    Ok(())
}
