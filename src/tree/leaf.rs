//! Leaf: IM data of one source category

use std::cell::OnceCell;
use std::collections::BTreeSet;

use ahash::AHashMap;

use super::config::LeafConfig;
use super::get_or_try_init;
use crate::core::error::{HazardError, Result};
use crate::core::types::{IMDataType, SourceType, IM};
use crate::data::IMDataProvider;

/// The unit of a branch that points at IM data
///
/// A leaf serves one source category from one rupture source file. Its IM
/// data may be split over several sources (e.g. by station); every source must
/// have the same data type, and the leaf only offers IMs that all of them
/// provide.
#[derive(Debug)]
pub struct Leaf {
    pub source_type: SourceType,
    pub rupture_source: String,
    pub im_sources: Vec<String>,
    ims: OnceCell<Vec<IM>>,
    data_type: OnceCell<IMDataType>,
    station_sources: OnceCell<AHashMap<String, usize>>,
    stations: OnceCell<BTreeSet<String>>,
}

impl Leaf {
    pub fn new(source_type: SourceType, rupture_source: impl Into<String>, im_sources: Vec<String>) -> Self {
        Self {
            source_type,
            rupture_source: rupture_source.into(),
            im_sources,
            ims: OnceCell::new(),
            data_type: OnceCell::new(),
            station_sources: OnceCell::new(),
            stations: OnceCell::new(),
        }
    }

    pub fn from_config(config: &LeafConfig) -> Self {
        Self::new(config.source_type, config.rupture_source.clone(), config.im_sources.clone())
    }

    /// Data type shared by all IM sources of this leaf
    ///
    /// Sources that disagree are a malformed logic tree, reported as an
    /// invariant violation.
    pub fn im_data_type(&self, provider: &dyn IMDataProvider) -> Result<IMDataType> {
        get_or_try_init(&self.data_type, || {
            let mut data_type = None;
            for source in &self.im_sources {
                let source_type = provider.im_data_type(source)?;
                match data_type {
                    None => data_type = Some(source_type),
                    Some(existing) if existing != source_type => {
                        return Err(HazardError::InvariantViolation(format!(
                            "Leaf over {} mixes {:?} and {:?} IM data (source {})",
                            self.rupture_source, existing, source_type, source
                        )));
                    }
                    Some(_) => {}
                }
            }
            data_type.ok_or_else(|| {
                HazardError::InvalidConfig(format!("Leaf over {} has no IM sources", self.rupture_source))
            })
        })
        .copied()
    }

    /// IMs offered by every IM source of the leaf, sorted
    pub fn ims(&self, provider: &dyn IMDataProvider) -> Result<&[IM]> {
        get_or_try_init(&self.ims, || {
            let mut common: Option<BTreeSet<IM>> = None;
            for source in &self.im_sources {
                let ims: BTreeSet<IM> = provider.ims(source)?.into_iter().collect();
                common = Some(match common {
                    None => ims,
                    Some(prev) => prev.intersection(&ims).copied().collect(),
                });
            }
            Ok(common.unwrap_or_default().into_iter().collect())
        })
        .map(|ims| ims.as_slice())
    }

    fn station_sources(&self, provider: &dyn IMDataProvider) -> Result<&AHashMap<String, usize>> {
        get_or_try_init(&self.station_sources, || {
            let mut lookup = AHashMap::new();
            for (ix, source) in self.im_sources.iter().enumerate() {
                for station in provider.stations(source)? {
                    lookup.entry(station).or_insert(ix);
                }
            }
            Ok(lookup)
        })
    }

    /// Stations covered by any of the leaf's IM sources
    pub fn stations(&self, provider: &dyn IMDataProvider) -> Result<&BTreeSet<String>> {
        get_or_try_init(&self.stations, || {
            Ok(self.station_sources(provider)?.keys().cloned().collect())
        })
    }

    /// The IM source holding data for a station
    pub fn source_for_station(&self, provider: &dyn IMDataProvider, station: &str) -> Result<Option<&str>> {
        Ok(self
            .station_sources(provider)?
            .get(station)
            .map(|&ix| self.im_sources[ix].as_str()))
    }

    pub fn clear_cache(&mut self) {
        self.ims.take();
        self.data_type.take();
        self.station_sources.take();
        self.stations.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::IMType;
    use crate::data::InMemoryIMStore;

    fn store() -> InMemoryIMStore {
        let mut store = InMemoryIMStore::new();
        store
            .add_source("src_a", IMDataType::Parametric, vec![IM::new(IMType::PGA), IM::psa(1.0)])
            .unwrap();
        store
            .add_source("src_b", IMDataType::Parametric, vec![IM::new(IMType::PGA)])
            .unwrap();
        store
            .add_source("src_np", IMDataType::NonParametric, vec![IM::new(IMType::PGA)])
            .unwrap();
        store
    }

    #[test]
    fn test_ims_are_intersection_of_sources() {
        let store = store();
        let leaf = Leaf::new(SourceType::Fault, "erf", vec!["src_a".into(), "src_b".into()]);
        assert_eq!(leaf.ims(&store).unwrap(), &[IM::new(IMType::PGA)]);
    }

    #[test]
    fn test_mixed_sources_violate_invariant() {
        let store = store();
        let leaf = Leaf::new(SourceType::Fault, "erf", vec!["src_a".into(), "src_np".into()]);
        assert!(matches!(
            leaf.im_data_type(&store),
            Err(HazardError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_clear_cache_forgets_ims() {
        let store = store();
        let mut leaf = Leaf::new(SourceType::Fault, "erf", vec!["src_a".into()]);
        assert_eq!(leaf.ims(&store).unwrap().len(), 2);
        leaf.clear_cache();
        assert!(leaf.ims.get().is_none());
    }
}
