//! The shared contract both stores implement.
//!
//! [`RecordSink`] is the write side: each store declares the conflict policy
//! it applies to records whose ticker has no catalog entry. [`PriceBackend`]
//! is the read side the query facade dispatches through.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::analytics::aggregate;
use crate::catalog::{ConflictPolicy, EntityCatalog};
use crate::columnar::{PartitionStore, WriteReport};
use crate::domain::{DailyFirstLastRow, DailyVolumeRow, MarketRecord, PriceRow, ReturnRow};
use crate::error::StoreError;
use crate::relational::RelationalStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Columnar,
    Relational,
}

impl Backend {
    pub const ALL: [Backend; 2] = [Backend::Columnar, Backend::Relational];

    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Columnar => "columnar",
            Backend::Relational => "relational",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "columnar" | "parquet" => Ok(Backend::Columnar),
            "relational" | "sqlite" => Ok(Backend::Relational),
            other => Err(format!(
                "unknown backend '{other}' (expected columnar or relational)"
            )),
        }
    }
}

/// Rows accepted and rejected by one ingestion call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub backend: Option<Backend>,
    pub rows_written: usize,
    pub rows_dropped: usize,
    pub unresolved_tickers: BTreeSet<String>,
}

/// Write side of a store.
pub trait RecordSink {
    fn policy(&self) -> ConflictPolicy;

    /// Persist `records`, resolving tickers through `catalog` under
    /// [`RecordSink::policy`].
    fn ingest(
        &mut self,
        records: &[MarketRecord],
        catalog: &EntityCatalog,
    ) -> Result<IngestReport, StoreError>;
}

impl From<WriteReport> for IngestReport {
    fn from(report: WriteReport) -> Self {
        Self {
            backend: Some(Backend::Columnar),
            rows_written: report.rows_written,
            rows_dropped: report.rows_dropped,
            unresolved_tickers: report.unresolved_tickers,
        }
    }
}

impl RecordSink for PartitionStore {
    fn policy(&self) -> ConflictPolicy {
        PartitionStore::policy(self)
    }

    fn ingest(
        &mut self,
        records: &[MarketRecord],
        catalog: &EntityCatalog,
    ) -> Result<IngestReport, StoreError> {
        self.write(records, catalog).map(IngestReport::from)
    }
}

impl RecordSink for RelationalStore {
    fn policy(&self) -> ConflictPolicy {
        RelationalStore::policy(self)
    }

    fn ingest(
        &mut self,
        records: &[MarketRecord],
        catalog: &EntityCatalog,
    ) -> Result<IngestReport, StoreError> {
        let rows_written = self.insert_records(records, catalog)?;
        Ok(IngestReport {
            backend: Some(Backend::Relational),
            rows_written,
            ..IngestReport::default()
        })
    }
}

/// Read side of a store.
pub trait PriceBackend {
    fn backend(&self) -> Backend;

    /// One symbol's rows with `start <= timestamp <= end`, ascending.
    fn range(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<PriceRow>, StoreError>;

    /// One symbol's full history, ascending by timestamp.
    fn series(&self, symbol: &str) -> Result<Vec<PriceRow>, StoreError>;

    /// Every stored row.
    fn all_series(&self) -> Result<Vec<PriceRow>, StoreError>;

    fn average_daily_volume(&self) -> Result<Vec<DailyVolumeRow>, StoreError>;

    fn top_n_by_return(
        &self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
        n: usize,
    ) -> Result<Vec<ReturnRow>, StoreError>;

    fn daily_first_last(&self) -> Result<Vec<DailyFirstLastRow>, StoreError>;
}

impl PriceBackend for PartitionStore {
    fn backend(&self) -> Backend {
        Backend::Columnar
    }

    fn range(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<PriceRow>, StoreError> {
        let rows = self.query_range(symbol, start, end)?;
        Ok(rows.into_iter().map(PriceRow::from).collect())
    }

    fn series(&self, symbol: &str) -> Result<Vec<PriceRow>, StoreError> {
        let rows = self.read_partition(symbol)?.unwrap_or_default();
        Ok(rows.into_iter().map(PriceRow::from).collect())
    }

    fn all_series(&self) -> Result<Vec<PriceRow>, StoreError> {
        Ok(self.read_all()?.into_iter().map(PriceRow::from).collect())
    }

    fn average_daily_volume(&self) -> Result<Vec<DailyVolumeRow>, StoreError> {
        Ok(aggregate::average_daily_volume(&self.all_series()?))
    }

    fn top_n_by_return(
        &self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
        n: usize,
    ) -> Result<Vec<ReturnRow>, StoreError> {
        Ok(aggregate::top_n_by_return(&self.all_series()?, start, end, n))
    }

    fn daily_first_last(&self) -> Result<Vec<DailyFirstLastRow>, StoreError> {
        Ok(aggregate::daily_first_last(&self.all_series()?))
    }
}

impl PriceBackend for RelationalStore {
    fn backend(&self) -> Backend {
        Backend::Relational
    }

    fn range(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<PriceRow>, StoreError> {
        self.query_range(symbol, start, end)
    }

    fn series(&self, symbol: &str) -> Result<Vec<PriceRow>, StoreError> {
        RelationalStore::series(self, symbol)
    }

    fn all_series(&self) -> Result<Vec<PriceRow>, StoreError> {
        RelationalStore::all_series(self)
    }

    fn average_daily_volume(&self) -> Result<Vec<DailyVolumeRow>, StoreError> {
        self.query_average_daily_volume()
    }

    fn top_n_by_return(
        &self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
        n: usize,
    ) -> Result<Vec<ReturnRow>, StoreError> {
        self.query_top_n_by_return(start, end, n)
    }

    fn daily_first_last(&self) -> Result<Vec<DailyFirstLastRow>, StoreError> {
        self.query_daily_first_last()
    }
}
