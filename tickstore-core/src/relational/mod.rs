//! Relational store: normalized `tickers` / `prices` tables in SQLite.

pub mod queries;
pub mod store;

pub use store::RelationalStore;
