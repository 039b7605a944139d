//! Ensemble-wide rupture index and per-branch rupture tables

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::error::{HazardError, Result};
use crate::core::types::{RuptureId, SourceType, TectonicType};
use crate::data::RuptureRecord;

/// Attributes of a rupture as first seen by the ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuptureInfo {
    pub id: RuptureId,
    pub name: String,
    pub magnitude: f64,
    pub tectonic_type: TectonicType,
    pub source_type: SourceType,
    pub rupture_source: String,
    /// Key into the site-source distance table (fault name for fault ruptures)
    pub distance_key: String,
}

/// A rupture as listed by one source file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceRupture {
    pub id: RuptureId,
    pub annual_rec_prob: f64,
    pub magnitude: f64,
}

/// Stable name <-> index lookup over every rupture source of an ensemble
///
/// Indices are assigned in order of first appearance and never change for the
/// lifetime of the catalogue. Ruptures shared by several branches (same source
/// file) get one index.
#[derive(Debug, Default)]
pub struct RuptureCatalog {
    ruptures: Vec<RuptureInfo>,
    lookup: AHashMap<String, RuptureId>,
    sources: AHashMap<String, Vec<SourceRupture>>,
}

impl RuptureCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rupture source file; a file already added is ignored
    pub fn add_source(&mut self, rupture_source: &str, source_type: SourceType, records: &[RuptureRecord]) {
        if self.sources.contains_key(rupture_source) {
            return;
        }

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let id = match self.lookup.get(&record.name) {
                Some(id) => *id,
                None => {
                    let id = RuptureId(self.ruptures.len() as u32);
                    self.ruptures.push(RuptureInfo {
                        id,
                        name: record.name.clone(),
                        magnitude: record.magnitude,
                        tectonic_type: record.tectonic_type,
                        source_type,
                        rupture_source: rupture_source.to_string(),
                        distance_key: record.distance_key().to_string(),
                    });
                    self.lookup.insert(record.name.clone(), id);
                    id
                }
            };
            rows.push(SourceRupture { id, annual_rec_prob: record.annual_rec_prob, magnitude: record.magnitude });
        }
        self.sources.insert(rupture_source.to_string(), rows);
    }

    pub fn len(&self) -> usize {
        self.ruptures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ruptures.is_empty()
    }

    pub fn id(&self, name: &str) -> Option<RuptureId> {
        self.lookup.get(name).copied()
    }

    pub fn info(&self, id: RuptureId) -> Option<&RuptureInfo> {
        self.ruptures.get(id.0 as usize)
    }

    pub fn name(&self, id: RuptureId) -> Option<&str> {
        self.info(id).map(|r| r.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuptureInfo> {
        self.ruptures.iter()
    }

    pub fn source(&self, rupture_source: &str) -> Result<&[SourceRupture]> {
        self.sources
            .get(rupture_source)
            .map(|rows| rows.as_slice())
            .ok_or_else(|| HazardError::UnknownSource(rupture_source.to_string()))
    }
}

/// Rupture table of one branch: annual recurrence probability per rupture
#[derive(Debug, Clone, Default)]
pub struct BranchRuptureTable {
    pub ids: Vec<RuptureId>,
    rates: AHashMap<RuptureId, f64>,
}

impl BranchRuptureTable {
    pub fn insert(&mut self, id: RuptureId, annual_rec_prob: f64) {
        if self.rates.insert(id, annual_rec_prob).is_none() {
            self.ids.push(id);
        }
    }

    pub fn rate(&self, id: RuptureId) -> Option<f64> {
        self.rates.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, rate: f64, mag: f64) -> RuptureRecord {
        RuptureRecord {
            name: name.to_string(),
            annual_rec_prob: rate,
            magnitude: mag,
            tectonic_type: TectonicType::ActiveShallow,
            fault_name: None,
        }
    }

    #[test]
    fn test_indices_are_stable_and_deduplicated() {
        let mut catalog = RuptureCatalog::new();
        catalog.add_source("erf_a", SourceType::Fault, &[record("r1", 1e-3, 6.5), record("r2", 1e-4, 7.0)]);
        catalog.add_source("erf_b", SourceType::Fault, &[record("r2", 2e-4, 7.0), record("r3", 1e-5, 7.5)]);

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.id("r1"), Some(RuptureId(0)));
        assert_eq!(catalog.id("r2"), Some(RuptureId(1)));
        assert_eq!(catalog.id("r3"), Some(RuptureId(2)));

        // Rates stay per source file
        let rows = catalog.source("erf_b").unwrap();
        assert_eq!(rows[0].id, RuptureId(1));
        assert_eq!(rows[0].annual_rec_prob, 2e-4);
    }

    #[test]
    fn test_re_adding_source_is_noop() {
        let mut catalog = RuptureCatalog::new();
        catalog.add_source("erf_a", SourceType::Fault, &[record("r1", 1e-3, 6.5)]);
        catalog.add_source("erf_a", SourceType::Fault, &[record("other", 1e-3, 6.5)]);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.id("other").is_none());
    }

    #[test]
    fn test_branch_table_ignores_duplicates() {
        let mut table = BranchRuptureTable::default();
        table.insert(RuptureId(3), 1e-4);
        table.insert(RuptureId(3), 1e-4);
        table.insert(RuptureId(1), 2e-4);
        assert_eq!(table.ids, vec![RuptureId(3), RuptureId(1)]);
        assert_eq!(table.rate(RuptureId(1)), Some(2e-4));
    }
}
