//! Ensemble: root of a logic tree

use std::cell::{OnceCell, RefCell};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};

use super::branch::Branch;
use super::config::EnsembleConfig;
use super::get_or_try_init;
use super::im_data::BranchIMData;
use super::im_ensemble::IMEnsemble;
use super::leaf::Leaf;
use super::rupture::RuptureCatalog;
use crate::core::config::EngineConfig;
use crate::core::error::{HazardError, Result};
use crate::core::types::{IMType, RuptureId, IM};
use crate::data::{DataSources, IMTable, SiteSourceDistance};

/// A logic tree of alternative hazard models
///
/// The ensemble owns its IM ensembles, the rupture index and an IM value cache
/// keyed by (station, IM source). Caches are filled lazily and are local to
/// this instance; build one ensemble per worker rather than sharing it.
pub struct Ensemble {
    pub name: String,
    im_ensembles: Vec<IMEnsemble>,
    data: DataSources,
    config: EngineConfig,
    ruptures: OnceCell<RuptureCatalog>,
    ims: OnceCell<Vec<IM>>,
    stations: OnceCell<BTreeSet<String>>,
    im_cache: RefCell<AHashMap<(String, String), Arc<IMTable>>>,
}

impl Ensemble {
    pub fn new(config: &EnsembleConfig, data: DataSources, engine_config: EngineConfig) -> Result<Self> {
        config.validate()?;
        engine_config.validate()?;
        Ok(Self {
            name: config.name.clone(),
            im_ensembles: config.im_ensembles.iter().map(IMEnsemble::from_config).collect(),
            data,
            config: engine_config,
            ruptures: OnceCell::new(),
            ims: OnceCell::new(),
            stations: OnceCell::new(),
            im_cache: RefCell::new(AHashMap::new()),
        })
    }

    pub fn from_toml_file(path: &Path, data: DataSources, engine_config: EngineConfig) -> Result<Self> {
        let config = EnsembleConfig::load_from_toml(path)?;
        Self::new(&config, data, engine_config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn data(&self) -> &DataSources {
        &self.data
    }

    pub fn im_ensembles(&self) -> &[IMEnsemble] {
        &self.im_ensembles
    }

    pub fn get_im_ensemble(&self, im_type: IMType) -> Result<&IMEnsemble> {
        self.im_ensembles
            .iter()
            .find(|e| e.covers(im_type))
            .ok_or_else(|| HazardError::UnsupportedIM {
                im: im_type.to_string(),
                context: format!("ensemble {}", self.name),
            })
    }

    /// Every IM supported by some IM ensemble
    pub fn ims(&self) -> Result<&[IM]> {
        get_or_try_init(&self.ims, || {
            let mut all = BTreeSet::new();
            for im_ens in &self.im_ensembles {
                all.extend(im_ens.ims(self.data.im_data.as_ref())?.iter().copied());
            }
            Ok(all.into_iter().collect())
        })
        .map(|ims| ims.as_slice())
    }

    /// Stations supported by every IM ensemble
    pub fn stations(&self) -> Result<&BTreeSet<String>> {
        get_or_try_init(&self.stations, || {
            let mut common: Option<BTreeSet<String>> = None;
            for im_ens in &self.im_ensembles {
                let stations = im_ens.stations(self.data.im_data.as_ref())?;
                common = Some(match common {
                    None => stations.clone(),
                    Some(prev) => prev.intersection(stations).cloned().collect(),
                });
            }
            Ok(common.unwrap_or_default())
        })
    }

    /// The IM ensemble answering for `im`, if it supports that exact IM and
    /// component
    pub fn check_im(&self, im: &IM) -> Result<&IMEnsemble> {
        let im_ens = self.get_im_ensemble(im.im_type)?;
        if !im_ens.ims(self.data.im_data.as_ref())?.contains(im) {
            return Err(HazardError::UnsupportedIM {
                im: im.to_string(),
                context: format!("ensemble {}", self.name),
            });
        }
        Ok(im_ens)
    }

    /// Check that `station` has data for `im` in every branch and leaf
    pub fn check_station(&self, im: &IM, station: &str) -> Result<&IMEnsemble> {
        let im_ens = self.check_im(im)?;
        if !im_ens.stations(self.data.im_data.as_ref())?.contains(station) {
            return Err(HazardError::UnsupportedStation {
                station: station.to_string(),
                context: format!("ensemble {} ({})", self.name, im),
            });
        }
        Ok(im_ens)
    }

    /// Rupture index over every rupture source referenced by the tree
    pub fn rupture_catalog(&self) -> Result<&RuptureCatalog> {
        get_or_try_init(&self.ruptures, || {
            let mut catalog = RuptureCatalog::new();
            let mut loaded = AHashSet::new();
            for im_ens in &self.im_ensembles {
                for branch in im_ens.branches() {
                    for leaf in &branch.leaves {
                        if loaded.insert(leaf.rupture_source.clone()) {
                            let records = self.data.ruptures.ruptures(&leaf.rupture_source)?;
                            catalog.add_source(&leaf.rupture_source, leaf.source_type, &records);
                        }
                    }
                }
            }
            tracing::debug!(ensemble = %self.name, n_ruptures = catalog.len(), "Built rupture index");
            Ok(catalog)
        })
    }

    /// Full IM table of a leaf at a station, read once per (station, source)
    pub fn im_table(&self, leaf: &Leaf, station: &str) -> Result<Arc<IMTable>> {
        let provider = self.data.im_data.as_ref();
        let source = leaf
            .source_for_station(provider, station)?
            .ok_or_else(|| HazardError::UnsupportedStation {
                station: station.to_string(),
                context: format!("leaf over {}", leaf.rupture_source),
            })?;

        let key = (station.to_string(), source.to_string());
        if let Some(table) = self.im_cache.borrow().get(&key) {
            return Ok(Arc::clone(table));
        }

        tracing::debug!(station, source, "Loading IM data");
        let table = provider
            .get_im_values(source, station, None)?
            .ok_or_else(|| HazardError::UnsupportedStation {
                station: station.to_string(),
                context: format!("IM source {}", source),
            })?;
        table.validate()?;
        if table.data_type() != leaf.im_data_type(provider)? {
            return Err(HazardError::InvariantViolation(format!(
                "Source {} returned {:?} data for station {}",
                source,
                table.data_type(),
                station
            )));
        }

        let table = Arc::new(table);
        self.im_cache.borrow_mut().insert(key, Arc::clone(&table));
        Ok(table)
    }

    /// IM data of every rupture of a branch at a station
    pub fn branch_im_data(&self, branch: &Branch, station: &str, ims: &[IM]) -> Result<BranchIMData> {
        let catalog = self.rupture_catalog()?;
        let rupture_table = branch.rupture_table(catalog)?;

        let mut data = BranchIMData::new(&branch.name);
        let mut seen = AHashSet::new();
        for leaf in &branch.leaves {
            let table = self.im_table(leaf, station)?;
            let resolve = |name: &str| -> Result<(RuptureId, f64)> {
                let id = catalog.id(name).ok_or_else(|| {
                    HazardError::InvariantViolation(format!(
                        "IM data of branch {} references unknown rupture {}",
                        branch.name, name
                    ))
                })?;
                let rate = rupture_table.rate(id).ok_or_else(|| {
                    HazardError::InvariantViolation(format!(
                        "Rupture {} is not part of the rupture sources of branch {}",
                        name, branch.name
                    ))
                })?;
                Ok((id, rate))
            };
            data.extend_from_table(&table, leaf.source_type, ims, &mut seen, resolve)?;
        }
        Ok(data)
    }

    /// Site-source distances of every indexed rupture at a station
    ///
    /// Ruptures without distance data are absent from the map.
    pub fn rupture_distances(&self, station: &str) -> Result<AHashMap<RuptureId, SiteSourceDistance>> {
        let catalog = self.rupture_catalog()?;
        let mut by_source: AHashMap<&str, AHashMap<String, SiteSourceDistance>> = AHashMap::new();
        let mut result = AHashMap::new();
        for info in catalog.iter() {
            if !by_source.contains_key(info.rupture_source.as_str()) {
                let table = self.data.distances.distances(&info.rupture_source, station)?;
                by_source.insert(info.rupture_source.as_str(), table);
            }
            if let Some(distance) = by_source
                .get(info.rupture_source.as_str())
                .and_then(|table| table.get(&info.distance_key))
            {
                result.insert(info.id, *distance);
            }
        }
        Ok(result)
    }

    /// Drop every lazily computed value and cached IM table
    pub fn clear_cache(&mut self) {
        self.ruptures.take();
        self.ims.take();
        self.stations.take();
        self.im_cache.get_mut().clear();
        for im_ens in &mut self.im_ensembles {
            im_ens.clear_cache();
        }
    }

    /// Number of IM tables currently cached
    pub fn cached_tables(&self) -> usize {
        self.im_cache.borrow().len()
    }
}
