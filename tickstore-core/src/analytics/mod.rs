//! Windowed analytics engine.
//!
//! Pure functions over time-ordered, per-entity series. Nothing here is
//! persisted; both backends feed the same functions so results agree
//! numerically regardless of where the rows came from.

pub mod aggregate;
pub mod series;
pub mod window;

pub use series::{group_by_entity, rolling_mean, rolling_volatility, simple_return};
pub use window::{RollingMean, RollingVolatility, SimpleReturn, WindowStat};
