//! Columnar partition store: Hive-style `ticker=SYMBOL` directories of
//! immutable parquet files.

pub mod io;
pub mod layout;
pub mod store;

pub use layout::{PartitionInfo, PartitionMeta};
pub use store::{PartitionStore, WriteReport};
