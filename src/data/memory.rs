//! In-memory data stores, loadable from JSON documents
//!
//! These back tests and small studies; production deployments implement the
//! provider traits over their own IM stores.

use std::collections::BTreeMap;
use std::path::Path;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use super::table::IMTable;
use super::{IMDataProvider, RuptureRecord, RuptureSourceProvider, SiteSourceDistance, SiteSourceProvider};
use crate::core::error::{HazardError, Result};
use crate::core::persist::load_json;
use crate::core::types::{IMDataType, IM};

/// IM data of one source (e.g. one GMM run over one source file)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IMSourceData {
    pub data_type: IMDataType,
    pub ims: Vec<IM>,
    pub stations: BTreeMap<String, IMTable>,
}

/// IM data for any number of sources, keyed by source id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryIMStore {
    sources: BTreeMap<String, IMSourceData>,
}

impl InMemoryIMStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty source
    pub fn add_source(&mut self, source: &str, data_type: IMDataType, ims: Vec<IM>) -> Result<()> {
        if data_type == IMDataType::Mixed {
            return Err(HazardError::InvalidConfig(format!(
                "Source {} cannot have a mixed data type",
                source
            )));
        }
        self.sources.insert(
            source.to_string(),
            IMSourceData { data_type, ims, stations: BTreeMap::new() },
        );
        Ok(())
    }

    /// Add the IM table of one station to an existing source
    pub fn insert_station(&mut self, source: &str, station: &str, table: IMTable) -> Result<()> {
        table.validate()?;
        let data = self
            .sources
            .get_mut(source)
            .ok_or_else(|| HazardError::UnknownSource(source.to_string()))?;
        if table.data_type() != data.data_type {
            return Err(HazardError::InvariantViolation(format!(
                "Station {} table of source {} is {:?}, source is {:?}",
                station,
                source,
                table.data_type(),
                data.data_type
            )));
        }
        data.stations.insert(station.to_string(), table);
        Ok(())
    }

    pub fn load_from_json(path: &Path) -> Result<Self> {
        let store: InMemoryIMStore = load_json(path)?;
        for data in store.sources.values() {
            for table in data.stations.values() {
                table.validate()?;
            }
        }
        Ok(store)
    }

    fn source(&self, source: &str) -> Result<&IMSourceData> {
        self.sources
            .get(source)
            .ok_or_else(|| HazardError::UnknownSource(source.to_string()))
    }
}

impl IMDataProvider for InMemoryIMStore {
    fn im_data_type(&self, source: &str) -> Result<IMDataType> {
        Ok(self.source(source)?.data_type)
    }

    fn ims(&self, source: &str) -> Result<Vec<IM>> {
        Ok(self.source(source)?.ims.clone())
    }

    fn stations(&self, source: &str) -> Result<Vec<String>> {
        Ok(self.source(source)?.stations.keys().cloned().collect())
    }

    fn get_im_values(&self, source: &str, station: &str, ims: Option<&[IM]>) -> Result<Option<IMTable>> {
        let Some(table) = self.source(source)?.stations.get(station) else {
            return Ok(None);
        };
        match ims {
            Some(ims) => table.select(ims).map(Some),
            None => Ok(Some(table.clone())),
        }
    }
}

/// Rupture catalogues keyed by source file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryRuptureStore {
    sources: BTreeMap<String, Vec<RuptureRecord>>,
}

impl InMemoryRuptureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source_file: &str, ruptures: Vec<RuptureRecord>) {
        self.sources.insert(source_file.to_string(), ruptures);
    }

    pub fn load_from_json(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

impl RuptureSourceProvider for InMemoryRuptureStore {
    fn ruptures(&self, source_file: &str) -> Result<Vec<RuptureRecord>> {
        self.sources
            .get(source_file)
            .cloned()
            .ok_or_else(|| HazardError::UnknownSource(source_file.to_string()))
    }
}

/// Site-source distances keyed by source file, then station, then
/// rupture/fault name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryDistanceStore {
    sources: BTreeMap<String, BTreeMap<String, BTreeMap<String, SiteSourceDistance>>>,
}

impl InMemoryDistanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source_file: &str, station: &str, key: &str, distance: SiteSourceDistance) {
        self.sources
            .entry(source_file.to_string())
            .or_default()
            .entry(station.to_string())
            .or_default()
            .insert(key.to_string(), distance);
    }

    pub fn load_from_json(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

impl SiteSourceProvider for InMemoryDistanceStore {
    fn distances(&self, source_file: &str, station: &str) -> Result<AHashMap<String, SiteSourceDistance>> {
        Ok(self
            .sources
            .get(source_file)
            .and_then(|stations| stations.get(station))
            .map(|entries| entries.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default())
    }
}
