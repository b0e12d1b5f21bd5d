//! tickstore core: storage and query engine for multi-instrument price data.
//!
//! This crate contains:
//! - Domain types (records, instruments, result rows)
//! - Entity catalog resolving symbols to instrument ids
//! - Columnar partition store (one parquet partition per symbol)
//! - Relational store (SQLite `tickers` / `prices` with a foreign key)
//! - Windowed analytics shared by both stores
//! - Query facade dispatching the same contract to either backend

pub mod analytics;
pub mod backend;
pub mod catalog;
pub mod columnar;
pub mod config;
pub mod domain;
pub mod error;
pub mod facade;
pub mod ingest;
pub mod relational;
pub mod schema;

pub use backend::{Backend, IngestReport, PriceBackend, RecordSink};
pub use catalog::{ConflictPolicy, EntityCatalog};
pub use columnar::{PartitionStore, WriteReport};
pub use config::StoreConfig;
pub use error::{ErrorKind, StoreError};
pub use facade::{QueryFacade, StorageReport, Timed};
pub use relational::RelationalStore;
