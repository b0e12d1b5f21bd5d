//! Entity catalog: `symbol -> ticker_id` with reverse lookup.
//!
//! Built once per ingestion batch from the reference table. Both stores
//! resolve input tickers through it, each under its own [`ConflictPolicy`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::domain::{Instrument, MarketRecord, PriceRecord};
use crate::error::StoreError;

/// What a store does with a record whose ticker is not in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictPolicy {
    /// Keep going: the record is dropped and reported, the batch succeeds.
    Lenient,
    /// Reject the whole batch with a constraint error.
    Strict,
}

/// In-memory instrument catalog.
#[derive(Debug, Clone, Default)]
pub struct EntityCatalog {
    by_symbol: HashMap<String, i64>,
    by_id: BTreeMap<i64, Instrument>,
}

impl EntityCatalog {
    /// Build the catalog. Duplicate symbols or ids are a schema error.
    pub fn from_instruments(instruments: &[Instrument]) -> Result<Self, StoreError> {
        let mut catalog = Self::default();
        for inst in instruments {
            if catalog.by_symbol.contains_key(&inst.symbol) {
                return Err(StoreError::Schema(format!(
                    "duplicate symbol '{}' in reference table",
                    inst.symbol
                )));
            }
            if catalog.by_id.contains_key(&inst.ticker_id) {
                return Err(StoreError::Schema(format!(
                    "duplicate ticker_id {} in reference table",
                    inst.ticker_id
                )));
            }
            catalog.by_symbol.insert(inst.symbol.clone(), inst.ticker_id);
            catalog.by_id.insert(inst.ticker_id, inst.clone());
        }
        Ok(catalog)
    }

    pub fn ticker_id(&self, symbol: &str) -> Option<i64> {
        self.by_symbol.get(symbol).copied()
    }

    pub fn instrument(&self, ticker_id: i64) -> Option<&Instrument> {
        self.by_id.get(&ticker_id)
    }

    pub fn by_symbol(&self, symbol: &str) -> Option<&Instrument> {
        self.ticker_id(symbol).and_then(|id| self.instrument(id))
    }

    pub fn symbol(&self, ticker_id: i64) -> Option<&str> {
        self.by_id.get(&ticker_id).map(|i| i.symbol.as_str())
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.by_symbol.contains_key(symbol)
    }

    /// Instruments in ascending `ticker_id` order.
    pub fn instruments(&self) -> impl Iterator<Item = &Instrument> {
        self.by_id.values()
    }

    /// Symbols in ascending order.
    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.by_symbol.keys().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Resolve every record's ticker under the given policy.
    ///
    /// Resolved records keep their input order and carry the catalog id. Under `Strict` the first
    /// unresolvable ticker aborts with [`StoreError::Constraint`]; under
    /// `Lenient` unresolved records are counted and their tickers collected.
    pub fn resolve<'a>(
        &'a self,
        records: &[MarketRecord],
        policy: ConflictPolicy,
    ) -> Result<Resolution<'a>, StoreError> {
        let mut resolved = Vec::with_capacity(records.len());
        let mut dropped = 0usize;
        let mut unresolved = BTreeSet::new();

        for (row, record) in records.iter().enumerate() {
            match self.by_symbol(&record.ticker) {
                Some(inst) => resolved.push((inst, record.resolve(inst.ticker_id))),
                None => match policy {
                    ConflictPolicy::Strict => {
                        return Err(StoreError::Constraint(format!(
                            "row {row}: ticker '{}' has no catalog entry",
                            record.ticker
                        )));
                    }
                    ConflictPolicy::Lenient => {
                        dropped += 1;
                        unresolved.insert(record.ticker.clone());
                    }
                },
            }
        }

        Ok(Resolution {
            resolved,
            dropped,
            unresolved,
        })
    }
}

/// Output of [`EntityCatalog::resolve`].
#[derive(Debug)]
pub struct Resolution<'a> {
    pub resolved: Vec<(&'a Instrument, PriceRecord)>,
    pub dropped: usize,
    pub unresolved: BTreeSet<String>,
}
