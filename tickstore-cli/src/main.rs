//! tickstore CLI: ingest, query, and inspect the dual-backend price store.
//!
//! Commands:
//! - `ingest`: load the CSV pair and write the columnar and/or relational store
//! - `range`, `rolling-avg`, `volatility`, `daily-volume`, `top-returns`,
//!   `first-last`: analytical queries against either backend
//! - `info`: storage footprint of both stores
//! - `generate`: write a synthetic CSV pair for testing

mod generate;
mod output;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand, ValueEnum};
use tickstore_core::domain::{Instrument, MarketRecord, PriceField};
use tickstore_core::ingest::{load_and_validate, parse_timestamp};
use tickstore_core::schema::BUNDLED_SCHEMA;
use tickstore_core::{
    Backend, EntityCatalog, IngestReport, PartitionStore, QueryFacade, RecordSink,
    RelationalStore, StoreConfig,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::generate::{generate, GenerateOptions};
use crate::output::{format_size, Printer};

#[derive(Parser)]
#[command(
    name = "tickstore",
    about = "tickstore: columnar and relational storage for multi-ticker price data"
)]
struct Cli {
    /// TOML config file. Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit query results as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    /// Print at most this many result rows.
    #[arg(long, global = true)]
    limit: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Target {
    Columnar,
    Relational,
    Both,
}

#[derive(Subcommand)]
enum Commands {
    /// Load tickers.csv and market_data_multi.csv and write the stores.
    Ingest {
        /// Directory holding the two input files.
        #[arg(long)]
        data_dir: PathBuf,

        /// Which store(s) to write.
        #[arg(long, value_enum, default_value_t = Target::Both)]
        target: Target,
    },
    /// Rows for one symbol between two instants (inclusive).
    Range {
        symbol: String,

        /// Start (YYYY-MM-DD or YYYY-MM-DD HH:MM[:SS]).
        #[arg(long)]
        start: String,

        /// End. A bare date means end of that day.
        #[arg(long)]
        end: String,

        /// columnar or relational.
        #[arg(long, default_value = "columnar")]
        backend: Backend,
    },
    /// Trailing mean of one price field for one symbol.
    RollingAvg {
        symbol: String,

        /// Window size. Defaults to analytics.default_window.
        #[arg(long)]
        window: Option<usize>,

        /// open, high, low, close or volume.
        #[arg(long, default_value = "close")]
        field: PriceField,

        #[arg(long, default_value = "columnar")]
        backend: Backend,
    },
    /// Rolling volatility of close-to-close returns, every symbol.
    Volatility {
        /// Window size. Defaults to analytics.default_window.
        #[arg(long)]
        window: Option<usize>,

        /// Only print rows for this symbol.
        #[arg(long)]
        symbol: Option<String>,

        #[arg(long, default_value = "columnar")]
        backend: Backend,
    },
    /// Average daily volume per symbol.
    DailyVolume {
        #[arg(long, default_value = "columnar")]
        backend: Backend,
    },
    /// Top symbols by return over a period.
    TopReturns {
        #[arg(long, default_value_t = 3)]
        n: usize,

        /// Period start. Open-ended when omitted.
        #[arg(long)]
        start: Option<String>,

        /// Period end. A bare date means end of that day.
        #[arg(long)]
        end: Option<String>,

        #[arg(long, default_value = "columnar")]
        backend: Backend,
    },
    /// First and last price per symbol per day.
    FirstLast {
        #[arg(long, default_value = "columnar")]
        backend: Backend,
    },
    /// Report storage size of both stores.
    Info,
    /// Write a synthetic input pair.
    Generate {
        /// Output directory.
        #[arg(long)]
        out_dir: PathBuf,

        #[arg(long, num_args = 1.., default_values = ["AAPL", "MSFT", "GOOGL", "AMZN", "TSLA"])]
        symbols: Vec<String>,

        /// First trading day (YYYY-MM-DD).
        #[arg(long, default_value = "2025-11-17")]
        start: String,

        /// Number of trading days.
        #[arg(long, default_value_t = 2)]
        days: u32,

        /// Minute bars per day, from 09:30.
        #[arg(long, default_value_t = 390)]
        bars_per_day: u32,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::default(),
    };
    let printer = Printer {
        json: cli.json,
        limit: cli.limit,
    };
    let window = |w: Option<usize>| w.unwrap_or(config.analytics.default_window);

    match cli.command {
        Commands::Ingest { data_dir, target } => run_ingest(&config, &data_dir, target),
        Commands::Generate {
            out_dir,
            symbols,
            start,
            days,
            bars_per_day,
            seed,
        } => run_generate(GenerateOptions {
            out_dir,
            symbols,
            start: NaiveDate::parse_from_str(&start, "%Y-%m-%d")?,
            days,
            bars_per_day,
            seed,
        }),
        Commands::Info => run_info(&QueryFacade::from_config(&config)?),
        Commands::Range {
            symbol,
            start,
            end,
            backend,
        } => {
            let facade = QueryFacade::from_config(&config)?;
            let (start, end) = (parse_bound(&start, false)?, parse_bound(&end, true)?);
            let t = facade.query_range(backend, &symbol, start, end)?;
            printer.rows(&t.value, t.elapsed_ms())
        }
        Commands::RollingAvg {
            symbol,
            window: w,
            field,
            backend,
        } => {
            let facade = QueryFacade::from_config(&config)?;
            let t = facade.rolling_average(backend, &symbol, window(w), field)?;
            printer.rows(&t.value, t.elapsed_ms())
        }
        Commands::Volatility {
            window: w,
            symbol,
            backend,
        } => {
            let facade = QueryFacade::from_config(&config)?;
            let t = facade.rolling_volatility(backend, window(w))?;
            let elapsed = t.elapsed_ms();
            let mut points = t.into_inner();
            if let Some(symbol) = symbol {
                points.retain(|p| p.symbol == symbol);
            }
            printer.rows(&points, elapsed)
        }
        Commands::DailyVolume { backend } => {
            let t = QueryFacade::from_config(&config)?.average_daily_volume(backend)?;
            printer.rows(&t.value, t.elapsed_ms())
        }
        Commands::TopReturns {
            n,
            start,
            end,
            backend,
        } => {
            let start = start.as_deref().map(|s| parse_bound(s, false)).transpose()?;
            let end = end.as_deref().map(|s| parse_bound(s, true)).transpose()?;
            let t = QueryFacade::from_config(&config)?.top_n_by_return(backend, start, end, n)?;
            printer.rows(&t.value, t.elapsed_ms())
        }
        Commands::FirstLast { backend } => {
            let t = QueryFacade::from_config(&config)?.daily_first_last(backend)?;
            printer.rows(&t.value, t.elapsed_ms())
        }
    }
}

/// Parse a CLI time bound. A bare date as an end bound covers the whole day.
fn parse_bound(s: &str, is_end: bool) -> Result<NaiveDateTime> {
    if is_end {
        if let Ok(day) = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
            if let Some(ts) = day.and_hms_micro_opt(23, 59, 59, 999_999) {
                return Ok(ts);
            }
        }
    }
    match parse_timestamp(s) {
        Some(ts) => Ok(ts),
        None => bail!("invalid timestamp '{s}'"),
    }
}

fn run_ingest(config: &StoreConfig, data_dir: &Path, target: Target) -> Result<()> {
    let (records, instruments) = load_and_validate(data_dir)
        .with_context(|| format!("loading input from {}", data_dir.display()))?;
    ingest_records(config, &records, &instruments, target)?;
    Ok(())
}

impl Target {
    /// Backends in write order. The columnar store goes first so a failed
    /// columnar write never leaves the database already recreated.
    fn backends(self) -> &'static [Backend] {
        match self {
            Target::Columnar => &[Backend::Columnar],
            Target::Relational => &[Backend::Relational],
            Target::Both => &[Backend::Columnar, Backend::Relational],
        }
    }
}

/// Write `records` to each target backend in turn. A sink is only opened
/// once every earlier backend has been written.
fn ingest_records(
    config: &StoreConfig,
    records: &[MarketRecord],
    instruments: &[Instrument],
    target: Target,
) -> Result<Vec<IngestReport>> {
    let catalog = EntityCatalog::from_instruments(instruments)?;
    let mut reports = Vec::new();
    for &backend in target.backends() {
        let mut sink: Box<dyn RecordSink> = match backend {
            Backend::Columnar => Box::new(PartitionStore::from_config(&config.columnar)),
            Backend::Relational => Box::new(fresh_database(config, instruments)?),
        };
        let started = Instant::now();
        let report = sink
            .ingest(records, &catalog)
            .with_context(|| format!("writing {backend} store"))?;
        println!(
            "{:<10} policy={:?} written={} dropped={} ({:.1} ms)",
            backend.as_str(),
            sink.policy(),
            report.rows_written,
            report.rows_dropped,
            started.elapsed().as_secs_f64() * 1000.0
        );
        if !report.unresolved_tickers.is_empty() {
            println!("  unresolved tickers: {:?}", report.unresolved_tickers);
        }
        reports.push(report);
    }
    Ok(reports)
}

/// Recreate the database file and load the instrument table.
fn fresh_database(config: &StoreConfig, instruments: &[Instrument]) -> Result<RelationalStore> {
    let db_path = &config.relational.db_path;
    if db_path.exists() {
        std::fs::remove_file(db_path)
            .with_context(|| format!("removing {}", db_path.display()))?;
        info!(path = %db_path.display(), "removed existing database");
    }
    let mut store = RelationalStore::open(db_path)?;
    match &config.relational.schema_path {
        Some(path) => store.create_schema_from_file(path)?,
        None => store.create_schema(BUNDLED_SCHEMA)?,
    }
    store.insert_instruments(instruments)?;
    Ok(store)
}

fn run_info(facade: &QueryFacade) -> Result<()> {
    let report = facade.storage_report()?.into_inner();

    println!("Columnar store: {}", facade.columnar().root().display());
    println!("Partitions: {}", report.partitions.len());
    println!("Total size: {}", format_size(report.columnar_bytes));
    if !report.partitions.is_empty() {
        println!();
        println!("{:<8} {:>6} {:>12}", "Ticker", "Files", "Size");
        println!("{}", "-".repeat(28));
        for p in &report.partitions {
            println!(
                "{:<8} {:>6} {:>12}",
                p.ticker,
                p.file_count,
                format_size(p.size_bytes)
            );
        }
    }

    println!();
    match facade.relational() {
        Some(store) => {
            if let Some(path) = store.db_path() {
                println!("Database: {}", path.display());
            }
            println!("Size: {}", format_size(report.database_bytes));
            println!("Tables: {}", store.table_names()?.join(", "));
        }
        None => println!("Database: (not created)"),
    }
    if let Some(ratio) = report.compression_ratio() {
        println!();
        println!("Columnar / relational size: {ratio:.3}");
    }
    Ok(())
}

fn run_generate(opts: GenerateOptions) -> Result<()> {
    let rows = generate(&opts)?;
    println!(
        "Wrote {} symbols, {rows} rows to {}",
        opts.symbols.len(),
        opts.out_dir.display()
    );
    Ok(())
}
