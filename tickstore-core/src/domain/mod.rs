//! Domain types for the tick store

pub mod instrument;
pub mod record;
pub mod rows;

pub use instrument::Instrument;
pub use record::{MarketRecord, PriceField, PriceRecord, PriceRow, StoredRecord};
pub use rows::{
    percent_return, DailyFirstLastRow, DailyVolumeRow, ReturnRow, RollingPoint, VolatilityPoint,
};
