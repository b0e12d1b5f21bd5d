use serde::{Deserialize, Serialize};

/// Reference data for one tradable instrument.
///
/// Created once from the reference table and read-only thereafter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Instrument {
    pub ticker_id: i64,
    pub symbol: String,
    pub name: String,
    pub exchange: String,
}

impl Instrument {
    pub fn new(
        ticker_id: i64,
        symbol: impl Into<String>,
        name: impl Into<String>,
        exchange: impl Into<String>,
    ) -> Self {
        Self {
            ticker_id,
            symbol: symbol.into(),
            name: name.into(),
            exchange: exchange.into(),
        }
    }
}
