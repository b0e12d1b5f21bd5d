//! Query facade: one name-stable contract over both backends, with every
//! operation timed.

use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analytics;
use crate::backend::{Backend, PriceBackend};
use crate::columnar::{PartitionInfo, PartitionStore};
use crate::config::StoreConfig;
use crate::domain::{
    DailyFirstLastRow, DailyVolumeRow, PriceField, PriceRow, ReturnRow, RollingPoint,
    VolatilityPoint,
};
use crate::error::StoreError;
use crate::relational::RelationalStore;

/// A query result with the wall time it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Timed<T> {
    pub value: T,
    pub elapsed: Duration,
}

impl<T> Timed<T> {
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

/// On-disk footprint of both stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageReport {
    pub columnar_bytes: u64,
    pub partitions: Vec<PartitionInfo>,
    pub database_bytes: u64,
}

impl StorageReport {
    /// Columnar size as a fraction of the database size, if both exist.
    pub fn compression_ratio(&self) -> Option<f64> {
        if self.columnar_bytes == 0 || self.database_bytes == 0 {
            return None;
        }
        Some(self.columnar_bytes as f64 / self.database_bytes as f64)
    }
}

pub struct QueryFacade {
    columnar: PartitionStore,
    relational: Option<RelationalStore>,
}

impl QueryFacade {
    pub fn new(columnar: PartitionStore, relational: Option<RelationalStore>) -> Self {
        Self {
            columnar,
            relational,
        }
    }

    /// Build from configuration. A missing database file leaves the
    /// relational side closed; relational queries then fail with `NotFound`.
    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        let columnar = PartitionStore::from_config(&config.columnar);
        let relational = match RelationalStore::open_existing(&config.relational.db_path) {
            Ok(store) => Some(store),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        Ok(Self::new(columnar, relational))
    }

    pub fn columnar(&self) -> &PartitionStore {
        &self.columnar
    }

    pub fn relational(&self) -> Option<&RelationalStore> {
        self.relational.as_ref()
    }

    fn store(&self, backend: Backend) -> Result<&dyn PriceBackend, StoreError> {
        match backend {
            Backend::Columnar => Ok(&self.columnar),
            Backend::Relational => self
                .relational
                .as_ref()
                .map(|s| s as &dyn PriceBackend)
                .ok_or_else(|| StoreError::NotFound("relational store is not open".to_string())),
        }
    }

    fn timed<R>(
        &self,
        op: &'static str,
        backend: Backend,
        f: impl FnOnce(&dyn PriceBackend) -> Result<Vec<R>, StoreError>,
    ) -> Result<Timed<Vec<R>>, StoreError> {
        let store = self.store(backend)?;
        let started = Instant::now();
        let value = f(store)?;
        let elapsed = started.elapsed();
        info!(
            op,
            %backend,
            rows = value.len(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "query complete"
        );
        Ok(Timed { value, elapsed })
    }

    pub fn query_range(
        &self,
        backend: Backend,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Timed<Vec<PriceRow>>, StoreError> {
        self.timed("query_range", backend, |s| s.range(symbol, start, end))
    }

    pub fn rolling_average(
        &self,
        backend: Backend,
        symbol: &str,
        window: usize,
        field: PriceField,
    ) -> Result<Timed<Vec<RollingPoint>>, StoreError> {
        self.timed("rolling_average", backend, |s| {
            analytics::rolling_mean(&s.series(symbol)?, window, field)
        })
    }

    pub fn simple_return(
        &self,
        backend: Backend,
        symbol: &str,
        field: PriceField,
    ) -> Result<Timed<Vec<RollingPoint>>, StoreError> {
        self.timed("simple_return", backend, |s| {
            Ok(analytics::simple_return(&s.series(symbol)?, field))
        })
    }

    /// Rolling volatility of close-to-close returns for every symbol.
    pub fn rolling_volatility(
        &self,
        backend: Backend,
        window: usize,
    ) -> Result<Timed<Vec<VolatilityPoint>>, StoreError> {
        self.timed("rolling_volatility", backend, |s| {
            analytics::rolling_volatility(&s.all_series()?, window)
        })
    }

    pub fn average_daily_volume(
        &self,
        backend: Backend,
    ) -> Result<Timed<Vec<DailyVolumeRow>>, StoreError> {
        self.timed("average_daily_volume", backend, |s| s.average_daily_volume())
    }

    pub fn top_n_by_return(
        &self,
        backend: Backend,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
        n: usize,
    ) -> Result<Timed<Vec<ReturnRow>>, StoreError> {
        self.timed("top_n_by_return", backend, |s| s.top_n_by_return(start, end, n))
    }

    pub fn daily_first_last(
        &self,
        backend: Backend,
    ) -> Result<Timed<Vec<DailyFirstLastRow>>, StoreError> {
        self.timed("daily_first_last", backend, |s| s.daily_first_last())
    }

    pub fn storage_report(&self) -> Result<Timed<StorageReport>, StoreError> {
        let started = Instant::now();
        let partitions = self.columnar.partition_info()?;
        let report = StorageReport {
            columnar_bytes: partitions.iter().map(|p| p.size_bytes).sum(),
            partitions,
            database_bytes: match &self.relational {
                Some(store) => store.database_size()?,
                None => 0,
            },
        };
        let elapsed = started.elapsed();
        info!(
            columnar_bytes = report.columnar_bytes,
            database_bytes = report.database_bytes,
            "storage report"
        );
        Ok(Timed {
            value: report,
            elapsed,
        })
    }
}
