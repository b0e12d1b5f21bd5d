//! Partitioned parquet store.
//!
//! Features:
//! - One partition directory per catalog symbol (`ticker=SYMBOL/`)
//! - Partition files are immutable; a write rebuilds the whole set
//! - Staged swap: the new set is written beside the root, then renamed in
//! - Range reads touch only the addressed partition

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::io::{load_partition_file, records_to_dataframe, scan_range, write_parquet};
use super::layout::{
    list_part_files, list_partitions, part_file_name, partition_dir_name, PartitionInfo,
    PartitionMeta, META_FILE,
};
use crate::catalog::{ConflictPolicy, EntityCatalog};
use crate::config::{ColumnarConfig, Compression};
use crate::domain::{MarketRecord, StoredRecord};
use crate::error::StoreError;

/// Outcome of a full rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReport {
    pub partitions: usize,
    pub rows_written: usize,
    pub rows_dropped: usize,
    pub unresolved_tickers: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct PartitionStore {
    root: PathBuf,
    compression: Compression,
    max_rows_per_file: usize,
}

/// A root ending in `.` or `..` has no directory name to derive the staging
/// and retired siblings from; resolve it to the directory it points at.
fn named_root(root: PathBuf) -> PathBuf {
    if root.file_name().is_some() {
        return root;
    }
    fs::canonicalize(&root).unwrap_or(root)
}

impl PartitionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let defaults = ColumnarConfig::default();
        Self {
            root: named_root(root.into()),
            compression: defaults.compression,
            max_rows_per_file: defaults.max_rows_per_file,
        }
    }

    pub fn from_config(config: &ColumnarConfig) -> Self {
        Self {
            root: named_root(config.root.clone()),
            compression: config.compression,
            max_rows_per_file: config.max_rows_per_file.max(1),
        }
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_max_rows_per_file(mut self, rows: usize) -> Self {
        self.max_rows_per_file = rows.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    pub fn policy(&self) -> ConflictPolicy {
        ConflictPolicy::Lenient
    }

    fn partition_dir(&self, ticker: &str) -> PathBuf {
        self.root.join(partition_dir_name(ticker))
    }

    /// `{root}.{suffix}` next to the root directory.
    fn sibling(&self, suffix: &str) -> Result<PathBuf, StoreError> {
        let name = self.root.file_name().ok_or_else(|| {
            StoreError::InvalidArgument(format!(
                "store root {} has no directory name",
                self.root.display()
            ))
        })?;
        let mut sibling = name.to_os_string();
        sibling.push(format!(".{suffix}"));
        Ok(self.root.with_file_name(sibling))
    }

    fn require_root(&self) -> Result<(), StoreError> {
        if self.exists() {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!(
                "columnar store {}",
                self.root.display()
            )))
        }
    }

    // ── Write ───────────────────────────────────────────────────────

    /// Replace the whole partition set with `records`.
    ///
    /// Records whose ticker has no catalog entry are dropped and reported,
    /// not rejected. Each partition is stably sorted by timestamp.
    pub fn write(
        &self,
        records: &[MarketRecord],
        catalog: &EntityCatalog,
    ) -> Result<WriteReport, StoreError> {
        let started = Instant::now();
        let resolution = catalog.resolve(records, self.policy())?;
        if resolution.dropped > 0 {
            warn!(
                dropped = resolution.dropped,
                tickers = ?resolution.unresolved,
                "dropping rows with no catalog entry"
            );
        }

        let mut partitions: BTreeMap<&str, Vec<StoredRecord>> = BTreeMap::new();
        for (instrument, record) in &resolution.resolved {
            partitions
                .entry(instrument.symbol.as_str())
                .or_default()
                .push(StoredRecord::new(instrument, record));
        }

        let staging = self.sibling("staging")?;
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        let mut rows_written = 0;
        for (symbol, rows) in partitions.iter_mut() {
            rows.sort_by_key(|r| r.timestamp);
            if let Err(e) = self.write_partition(&staging, symbol, rows) {
                let _ = fs::remove_dir_all(&staging);
                return Err(e);
            }
            rows_written += rows.len();
        }

        self.swap_in(&staging)?;

        let report = WriteReport {
            partitions: partitions.len(),
            rows_written,
            rows_dropped: resolution.dropped,
            unresolved_tickers: resolution.unresolved,
        };
        info!(
            root = %self.root.display(),
            partitions = report.partitions,
            rows = report.rows_written,
            dropped = report.rows_dropped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "columnar write complete"
        );
        Ok(report)
    }

    fn write_partition(
        &self,
        base: &Path,
        symbol: &str,
        rows: &[StoredRecord],
    ) -> Result<(), StoreError> {
        let dir = base.join(partition_dir_name(symbol));
        fs::create_dir_all(&dir)?;

        let mut file_count = 0;
        for (index, chunk) in rows.chunks(self.max_rows_per_file).enumerate() {
            let mut df = records_to_dataframe(chunk)?;
            let path = dir.join(part_file_name(index));
            let bytes = write_parquet(&mut df, &path, self.compression)?;
            debug!(symbol, file = %path.display(), rows = chunk.len(), bytes, "wrote partition file");
            file_count += 1;
        }

        // Partitions only exist for resolved rows, so `rows` is non-empty.
        let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
            return Ok(());
        };
        let meta = PartitionMeta {
            symbol: symbol.to_string(),
            ticker_id: first.ticker_id,
            row_count: rows.len(),
            file_count,
            first_timestamp: first.timestamp,
            last_timestamp: last.timestamp,
            data_hash: blake3::hash(&serde_json::to_vec(rows)?).to_hex().to_string(),
            written_at: chrono::Local::now().naive_local(),
        };
        fs::write(dir.join(META_FILE), serde_json::to_string_pretty(&meta)?)?;
        Ok(())
    }

    /// Rename the staged set into place, keeping the old set until the new
    /// one is in.
    fn swap_in(&self, staging: &Path) -> Result<(), StoreError> {
        let retired = self.sibling("retired")?;
        if retired.exists() {
            fs::remove_dir_all(&retired)?;
        }
        let had_root = self.root.exists();
        if had_root {
            fs::rename(&self.root, &retired)?;
        }
        if let Err(e) = fs::rename(staging, &self.root) {
            if had_root {
                let _ = fs::rename(&retired, &self.root);
            }
            let _ = fs::remove_dir_all(staging);
            return Err(e.into());
        }
        if had_root {
            fs::remove_dir_all(&retired)?;
        }
        Ok(())
    }

    // ── Read ────────────────────────────────────────────────────────

    fn read_partition_dir(dir: &Path, ticker: &str) -> Result<Vec<StoredRecord>, StoreError> {
        let mut rows = Vec::new();
        for path in list_part_files(dir)? {
            let loaded = load_partition_file(&path, ticker)?;
            debug!(ticker, file = %path.display(), rows = loaded.len(), "read partition file");
            rows.extend(loaded);
        }
        Ok(rows)
    }

    /// Every partition, concatenated in symbol order. Rows within a partition
    /// keep their stored (timestamp) order.
    pub fn read_all(&self) -> Result<Vec<StoredRecord>, StoreError> {
        self.require_root()?;
        let mut rows = Vec::new();
        for (ticker, dir) in list_partitions(&self.root)? {
            rows.extend(Self::read_partition_dir(&dir, &ticker)?);
        }
        Ok(rows)
    }

    /// One partition, or `None` when the symbol has no partition.
    pub fn read_partition(&self, ticker: &str) -> Result<Option<Vec<StoredRecord>>, StoreError> {
        self.require_root()?;
        let dir = self.partition_dir(ticker);
        if !dir.is_dir() {
            return Ok(None);
        }
        Self::read_partition_dir(&dir, ticker).map(Some)
    }

    /// Rows of one partition with `start <= timestamp <= end`, ascending.
    ///
    /// Only the addressed partition directory is scanned. An absent
    /// partition gives an empty result.
    pub fn query_range(
        &self,
        ticker: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        self.require_root()?;
        let dir = self.partition_dir(ticker);
        if !dir.is_dir() || list_part_files(&dir)?.is_empty() {
            debug!(ticker, "no partition for range query");
            return Ok(Vec::new());
        }
        scan_range(&dir, ticker, start, end)
    }

    // ── Introspection ───────────────────────────────────────────────

    pub fn partition_meta(&self, ticker: &str) -> Result<Option<PartitionMeta>, StoreError> {
        let path = self.partition_dir(ticker).join(META_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Bytes of parquet data under the root; zero when the store is absent.
    pub fn storage_size(&self) -> Result<u64, StoreError> {
        Ok(self.partition_info()?.iter().map(|p| p.size_bytes).sum())
    }

    /// Per-partition file count and parquet bytes; empty when the store is
    /// absent.
    pub fn partition_info(&self) -> Result<Vec<PartitionInfo>, StoreError> {
        if !self.exists() {
            return Ok(Vec::new());
        }
        let mut info = Vec::new();
        for (ticker, dir) in list_partitions(&self.root)? {
            let files = list_part_files(&dir)?;
            let mut size_bytes = 0;
            for file in &files {
                size_bytes += fs::metadata(file)?.len();
            }
            info.push(PartitionInfo {
                ticker,
                file_count: files.len(),
                size_bytes,
            });
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Instrument;
    use chrono::{Duration, NaiveDate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 17)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn catalog() -> EntityCatalog {
        EntityCatalog::from_instruments(&[
            Instrument::new(1, "AAPL", "Apple Inc.", "NASDAQ"),
            Instrument::new(2, "MSFT", "Microsoft Corp.", "NASDAQ"),
            Instrument::new(3, "BTC/USD", "Bitcoin", "CRYPTO"),
        ])
        .unwrap()
    }

    fn rec(ticker: &str, minute: i64, close: f64) -> MarketRecord {
        MarketRecord {
            timestamp: t0() + Duration::minutes(minute),
            ticker: ticker.into(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100,
        }
    }

    fn store() -> (tempfile::TempDir, PartitionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PartitionStore::new(dir.path().join("market_data"));
        (dir, store)
    }

    #[test]
    fn dot_dot_root_is_resolved_before_staging() {
        let dir = tempfile::tempdir().unwrap();
        let named = dir.path().join("market_data");
        fs::create_dir_all(named.join("old")).unwrap();

        let store = PartitionStore::new(named.join("old").join(".."));
        assert_eq!(store.root(), fs::canonicalize(&named).unwrap());

        let report = store.write(&[rec("AAPL", 0, 100.0)], &catalog()).unwrap();
        assert_eq!(report.rows_written, 1);
        assert!(named.join("ticker=AAPL").is_dir());
        assert!(!named.join("old").exists());
        assert!(!dir.path().join("market_data.staging").exists());
        assert!(!dir.path().join("market_data.retired").exists());
        assert_eq!(store.read_all().unwrap().len(), 1);
    }

    #[test]
    fn write_creates_one_partition_per_symbol() {
        let (_dir, store) = store();
        let records = vec![rec("MSFT", 0, 300.0), rec("AAPL", 0, 100.0), rec("AAPL", 1, 101.0)];
        let report = store.write(&records, &catalog()).unwrap();

        assert_eq!(report.partitions, 2);
        assert_eq!(report.rows_written, 3);
        assert_eq!(report.rows_dropped, 0);
        assert!(store.root().join("ticker=AAPL").is_dir());
        assert!(store.root().join("ticker=MSFT").is_dir());

        let info = store.partition_info().unwrap();
        assert_eq!(info.len(), 2);
        assert!(info.iter().all(|p| p.file_count == 1 && p.size_bytes > 0));
        assert_eq!(
            store.storage_size().unwrap(),
            info.iter().map(|p| p.size_bytes).sum::<u64>()
        );
    }

    #[test]
    fn unresolved_tickers_are_dropped_and_reported() {
        let (_dir, store) = store();
        let records = vec![rec("AAPL", 0, 100.0), rec("ZZZZ", 0, 1.0), rec("ZZZZ", 1, 1.0)];
        let report = store.write(&records, &catalog()).unwrap();

        assert_eq!(report.rows_written, 1);
        assert_eq!(report.rows_dropped, 2);
        assert!(report.unresolved_tickers.contains("ZZZZ"));
        assert!(store.read_partition("ZZZZ").unwrap().is_none());
    }

    #[test]
    fn rewrite_replaces_previous_set() {
        let (_dir, store) = store();
        store
            .write(&[rec("AAPL", 0, 100.0), rec("MSFT", 0, 300.0)], &catalog())
            .unwrap();
        store.write(&[rec("MSFT", 5, 310.0)], &catalog()).unwrap();

        assert!(store.read_partition("AAPL").unwrap().is_none());
        let all = store.read_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].close, 310.0);
        assert!(!store.sibling("staging").unwrap().exists());
        assert!(!store.sibling("retired").unwrap().exists());
    }

    #[test]
    fn partitions_sorted_and_split() {
        let (_dir, store) = store();
        let store = store.with_max_rows_per_file(2);
        let records: Vec<_> = [4, 1, 3, 0, 2].iter().map(|&m| rec("AAPL", m, m as f64)).collect();
        store.write(&records, &catalog()).unwrap();

        let rows = store.read_partition("AAPL").unwrap().unwrap();
        let closes: Vec<f64> = rows.iter().map(|r| r.close).collect();
        assert_eq!(closes, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(store.partition_info().unwrap()[0].file_count, 3);

        let meta = store.partition_meta("AAPL").unwrap().unwrap();
        assert_eq!(meta.row_count, 5);
        assert_eq!(meta.file_count, 3);
        assert_eq!(meta.first_timestamp, t0());
        assert_eq!(meta.last_timestamp, t0() + Duration::minutes(4));
        assert_eq!(meta.data_hash.len(), 64);
    }

    #[test]
    fn range_query_inclusive_and_pruned() {
        let (_dir, store) = store();
        let mut records: Vec<_> = (0..10).map(|m| rec("AAPL", m, m as f64)).collect();
        records.extend((0..10).map(|m| rec("MSFT", m, 1000.0 + m as f64)));
        store.write(&records, &catalog()).unwrap();

        let rows = store
            .query_range("AAPL", t0() + Duration::minutes(2), t0() + Duration::minutes(5))
            .unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].close, 2.0);
        assert_eq!(rows[3].close, 5.0);
        assert!(rows.iter().all(|r| r.ticker == "AAPL" && r.ticker_id == 1));
    }

    #[test]
    fn absent_partition_is_empty_but_missing_store_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(store.read_all(), Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.query_range("AAPL", t0(), t0()),
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.storage_size().unwrap(), 0);
        assert!(store.partition_info().unwrap().is_empty());

        store.write(&[rec("AAPL", 0, 1.0)], &catalog()).unwrap();
        assert!(store.query_range("MSFT", t0(), t0()).unwrap().is_empty());
        assert!(store.read_partition("MSFT").unwrap().is_none());
    }

    #[test]
    fn symbols_with_separators_get_encoded_dirs() {
        let (_dir, store) = store();
        store.write(&[rec("BTC/USD", 0, 60_000.0)], &catalog()).unwrap();
        assert!(store.root().join("ticker=BTC%2FUSD").is_dir());

        let rows = store.read_partition("BTC/USD").unwrap().unwrap();
        assert_eq!(rows[0].ticker, "BTC/USD");
        assert_eq!(rows[0].exchange, "CRYPTO");
    }
}
