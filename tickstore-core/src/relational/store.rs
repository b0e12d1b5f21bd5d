use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::queries;
use crate::catalog::{ConflictPolicy, EntityCatalog};
use crate::domain::{
    DailyFirstLastRow, DailyVolumeRow, Instrument, MarketRecord, PriceRow, ReturnRow,
};
use crate::error::StoreError;
use crate::schema::format_sql_timestamp;

/// SQLite-backed store: a `tickers` table and a `prices` table with a
/// foreign key between them.
///
/// Inserts are strict. A record whose ticker is not in the catalog fails the
/// whole call with [`StoreError::Constraint`] and nothing from that call is
/// committed.
#[derive(Debug)]
pub struct RelationalStore {
    conn: Connection,
    db_path: Option<PathBuf>,
}

impl RelationalStore {
    /// Open (creating if needed) the database file.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&db_path)?;
        Self::configure(conn, Some(db_path))
    }

    /// Open a database file that must already exist.
    pub fn open_existing(db_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let db_path = db_path.into();
        if !db_path.is_file() {
            return Err(StoreError::NotFound(format!(
                "database {}",
                db_path.display()
            )));
        }
        Self::open(db_path)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::configure(Connection::open_in_memory()?, None)
    }

    fn configure(conn: Connection, db_path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn, db_path })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn policy(&self) -> ConflictPolicy {
        ConflictPolicy::Strict
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ── Schema ──────────────────────────────────────────────────────

    /// Execute a batch of DDL statements.
    pub fn create_schema(&self, schema_sql: &str) -> Result<(), StoreError> {
        if schema_sql.trim().is_empty() {
            return Err(StoreError::Schema("schema text is empty".to_string()));
        }
        self.conn
            .execute_batch(schema_sql)
            .map_err(|e| StoreError::Schema(e.to_string()))?;
        info!(tables = ?self.table_names()?, "schema created");
        Ok(())
    }

    pub fn create_schema_from_file(&self, path: &Path) -> Result<(), StoreError> {
        let text = fs::read_to_string(path).map_err(|e| {
            StoreError::Schema(format!("schema file {}: {e}", path.display()))
        })?;
        self.create_schema(&text)
    }

    pub fn table_names(&self) -> Result<Vec<String>, StoreError> {
        queries::table_names(&self.conn)
    }

    /// The `CREATE TABLE` text of one table, if it exists.
    pub fn schema_sql(&self, table: &str) -> Result<Option<String>, StoreError> {
        let sql = self
            .conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(sql)
    }

    // ── Inserts ─────────────────────────────────────────────────────

    pub fn insert_instruments(&mut self, instruments: &[Instrument]) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(queries::INSERT_TICKER)?;
            for inst in instruments {
                stmt.execute(params![inst.ticker_id, inst.symbol, inst.name, inst.exchange])?;
            }
        }
        tx.commit()?;
        info!(count = instruments.len(), "inserted instruments");
        Ok(instruments.len())
    }

    /// Resolve every record against `catalog` and append it to `prices`.
    pub fn insert_records(
        &mut self,
        records: &[MarketRecord],
        catalog: &EntityCatalog,
    ) -> Result<usize, StoreError> {
        let started = Instant::now();
        let resolution = catalog.resolve(records, self.policy())?;

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(queries::INSERT_PRICE)?;
            for (_, record) in &resolution.resolved {
                stmt.execute(params![
                    format_sql_timestamp(&record.timestamp),
                    record.ticker_id,
                    record.open,
                    record.high,
                    record.low,
                    record.close,
                    record.volume,
                ])?;
            }
        }
        tx.commit()?;

        let count = resolution.resolved.len();
        info!(
            rows = count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "inserted price records"
        );
        Ok(count)
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn query_range(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<PriceRow>, StoreError> {
        let rows = queries::range(&self.conn, symbol, start, end)?;
        debug!(symbol, rows = rows.len(), "relational range query");
        Ok(rows)
    }

    /// Mean of per-day volume sums per symbol, descending.
    pub fn query_average_daily_volume(&self) -> Result<Vec<DailyVolumeRow>, StoreError> {
        queries::average_daily_volume(&self.conn)
    }

    pub fn query_top_n_by_return(
        &self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
        n: usize,
    ) -> Result<Vec<ReturnRow>, StoreError> {
        queries::top_n_by_return(&self.conn, start, end, n)
    }

    pub fn query_daily_first_last(&self) -> Result<Vec<DailyFirstLastRow>, StoreError> {
        queries::daily_first_last(&self.conn)
    }

    pub fn series(&self, symbol: &str) -> Result<Vec<PriceRow>, StoreError> {
        queries::series(&self.conn, Some(symbol))
    }

    pub fn all_series(&self) -> Result<Vec<PriceRow>, StoreError> {
        queries::series(&self.conn, None)
    }

    /// Size of the database file in bytes; zero for in-memory or missing.
    pub fn database_size(&self) -> Result<u64, StoreError> {
        match &self.db_path {
            Some(path) if path.is_file() => Ok(fs::metadata(path)?.len()),
            _ => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::BUNDLED_SCHEMA;
    use chrono::{Duration, NaiveDate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 17)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn instruments() -> Vec<Instrument> {
        vec![
            Instrument::new(1, "AAPL", "Apple Inc.", "NASDAQ"),
            Instrument::new(2, "MSFT", "Microsoft Corp.", "NASDAQ"),
        ]
    }

    fn rec(ticker: &str, minutes: i64, close: f64, volume: u64) -> MarketRecord {
        MarketRecord {
            timestamp: t0() + Duration::minutes(minutes),
            ticker: ticker.into(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume,
        }
    }

    fn seeded() -> (RelationalStore, EntityCatalog) {
        let mut store = RelationalStore::in_memory().unwrap();
        store.create_schema(BUNDLED_SCHEMA).unwrap();
        store.insert_instruments(&instruments()).unwrap();
        (store, EntityCatalog::from_instruments(&instruments()).unwrap())
    }

    #[test]
    fn schema_creates_both_tables() {
        let (store, _) = seeded();
        assert_eq!(store.table_names().unwrap(), vec!["prices", "tickers"]);
        let ddl = store.schema_sql("prices").unwrap().unwrap();
        assert!(ddl.contains("FOREIGN KEY"));
        assert!(store.schema_sql("nope").unwrap().is_none());
    }

    #[test]
    fn malformed_schema_is_schema_error() {
        let store = RelationalStore::in_memory().unwrap();
        let err = store.create_schema("CREATE TABLE (").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        let err = store.create_schema("   ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        let err = store
            .create_schema_from_file(Path::new("/nonexistent/schema.sql"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn duplicate_instrument_is_constraint_error() {
        let (mut store, _) = seeded();
        let err = store
            .insert_instruments(&[Instrument::new(9, "AAPL", "Dup", "NYSE")])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Constraint);
    }

    #[test]
    fn unknown_ticker_rejects_whole_batch() {
        let (mut store, catalog) = seeded();
        let records = vec![rec("AAPL", 0, 100.0, 10), rec("ZZZZ", 1, 1.0, 1)];
        let err = store.insert_records(&records, &catalog).unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
        assert!(store.all_series().unwrap().is_empty());
    }

    #[test]
    fn foreign_key_enforced_by_database() {
        let mut store = RelationalStore::in_memory().unwrap();
        store.create_schema(BUNDLED_SCHEMA).unwrap();
        // Catalog knows AAPL but the tickers table is empty.
        let catalog = EntityCatalog::from_instruments(&instruments()).unwrap();
        let err = store
            .insert_records(&[rec("AAPL", 0, 100.0, 10)], &catalog)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Constraint);
    }

    #[test]
    fn range_query_inclusive_and_ordered() {
        let (mut store, catalog) = seeded();
        let records: Vec<_> = [3, 0, 2, 1, 4]
            .iter()
            .map(|&m| rec("AAPL", m, 100.0 + m as f64, 10))
            .chain(std::iter::once(rec("MSFT", 2, 300.0, 10)))
            .collect();
        assert_eq!(store.insert_records(&records, &catalog).unwrap(), 6);

        let rows = store
            .query_range("AAPL", t0() + Duration::minutes(1), t0() + Duration::minutes(3))
            .unwrap();
        let closes: Vec<f64> = rows.iter().map(|r| r.close).collect();
        assert_eq!(closes, vec![101.0, 102.0, 103.0]);
        assert!(rows.iter().all(|r| r.symbol == "AAPL"));
        assert!(store.query_range("NOPE", t0(), t0()).unwrap().is_empty());
    }

    #[test]
    fn average_daily_volume_is_mean_of_daily_sums() {
        let (mut store, catalog) = seeded();
        let day = 24 * 60;
        let records = vec![
            rec("AAPL", 0, 1.0, 100),
            rec("AAPL", 1, 1.0, 300),
            rec("AAPL", day, 1.0, 200),
            rec("MSFT", 0, 1.0, 1000),
        ];
        store.insert_records(&records, &catalog).unwrap();

        let rows = store.query_average_daily_volume().unwrap();
        assert_eq!(rows[0].symbol, "MSFT");
        assert_eq!(rows[0].avg_daily_volume, 1000.0);
        assert_eq!(rows[1].symbol, "AAPL");
        assert_eq!(rows[1].avg_daily_volume, 300.0);
    }

    #[test]
    fn top_n_and_tie_break_on_duplicate_timestamps() {
        let (mut store, catalog) = seeded();
        let records = vec![
            rec("AAPL", 0, 100.0, 1),
            rec("AAPL", 0, 50.0, 1),
            rec("AAPL", 10, 110.0, 1),
            rec("MSFT", 0, 200.0, 1),
            rec("MSFT", 10, 180.0, 1),
        ];
        store.insert_records(&records, &catalog).unwrap();

        let top = store.query_top_n_by_return(None, None, 5).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].symbol, "AAPL");
        // First-inserted row wins the tie at minute 0.
        assert_eq!(top[0].first_price, 100.0);
        assert!((top[0].return_pct - 10.0).abs() < 1e-9);
        assert!((top[1].return_pct + 10.0).abs() < 1e-9);

        let bounded = store
            .query_top_n_by_return(Some(t0() + Duration::minutes(5)), None, 5)
            .unwrap();
        assert!(bounded.iter().all(|r| r.return_pct == 0.0));
    }

    #[test]
    fn daily_first_last_per_day() {
        let (mut store, catalog) = seeded();
        let day = 24 * 60;
        let records = vec![
            rec("AAPL", 0, 100.0, 1),
            rec("AAPL", 30, 105.0, 1),
            rec("AAPL", day, 106.0, 1),
            rec("MSFT", 5, 300.0, 1),
        ];
        store.insert_records(&records, &catalog).unwrap();

        let rows = store.query_daily_first_last().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].symbol, "AAPL");
        assert_eq!(rows[0].first_price, 100.0);
        assert_eq!(rows[0].last_price, 105.0);
        assert_eq!(rows[0].last_time, t0() + Duration::minutes(30));
        assert_eq!(rows[1].symbol, "MSFT");
        assert_eq!(rows[2].trade_date, NaiveDate::from_ymd_opt(2025, 11, 18).unwrap());
    }

    #[test]
    fn file_backed_store_reports_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("market_data.db");
        assert!(matches!(
            RelationalStore::open_existing(&path),
            Err(StoreError::NotFound(_))
        ));

        let mut store = RelationalStore::open(&path).unwrap();
        store.create_schema(BUNDLED_SCHEMA).unwrap();
        store.insert_instruments(&instruments()).unwrap();
        assert!(store.database_size().unwrap() > 0);
        drop(store);

        let reopened = RelationalStore::open_existing(&path).unwrap();
        assert_eq!(reopened.table_names().unwrap(), vec!["prices", "tickers"]);
        assert_eq!(RelationalStore::in_memory().unwrap().database_size().unwrap(), 0);
    }
}
