//! Ground motion datasets: the candidate pool for selection
//!
//! A dataset is either a catalogue of historical records (amplitude scaled
//! to the conditioning level), a set of per-station simulations (used as
//! is), or a concatenation of other datasets. `GMDatasetRegistry` builds them
//! by kind name from a [`GMDatasetConfig`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::causal::CausalParamBounds;
use crate::core::error::{HazardError, Result};
use crate::core::persist::load_json;
use crate::core::types::{SiteInfo, IM};

/// Scale records so that `im` equals `value`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleTarget {
    pub im: IM,
    pub value: f64,
}

/// IM values of candidate ground motions, one row per record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GMImTable {
    pub ims: Vec<IM>,
    pub ids: Vec<String>,
    pub values: Vec<Vec<f64>>,
    /// Amplitude scale factor applied to each record (1.0 when unscaled)
    pub scale_factors: Vec<f64>,
}

impl GMImTable {
    pub fn new(ims: Vec<IM>) -> Self {
        Self { ims, ..Default::default() }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn push(&mut self, id: String, row: Vec<f64>, scale_factor: f64) {
        debug_assert_eq!(row.len(), self.ims.len());
        self.ids.push(id);
        self.values.push(row);
        self.scale_factors.push(scale_factor);
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i]
    }

    pub fn column(&self, im: &IM) -> Option<Vec<f64>> {
        let j = self.ims.iter().position(|x| x == im)?;
        Some(self.values.iter().map(|row| row[j]).collect())
    }

    /// Rows at `indices`, in that order
    pub fn select(&self, indices: &[usize]) -> Self {
        let mut table = Self::new(self.ims.clone());
        for &i in indices {
            table.push(self.ids[i].clone(), self.values[i].clone(), self.scale_factors[i]);
        }
        table
    }

    /// Append the rows of `other`, which must hold the same IMs
    pub fn extend(&mut self, other: GMImTable) -> Result<()> {
        if other.ims != self.ims {
            return Err(HazardError::InvariantViolation(
                "Cannot concatenate ground motion tables with different IMs".into(),
            ));
        }
        self.ids.extend(other.ids);
        self.values.extend(other.values);
        self.scale_factors.extend(other.scale_factors);
        Ok(())
    }
}

/// Causal parameters of a ground motion record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GMMetadata {
    pub gm_id: String,
    pub magnitude: f64,
    pub rrup: f64,
    pub vs30: f64,
}

/// One ground motion record as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GMRecord {
    pub id: String,
    pub magnitude: f64,
    pub rrup: f64,
    pub vs30: f64,
    pub im_values: BTreeMap<IM, f64>,
    #[serde(default)]
    pub waveform: Option<PathBuf>,
}

impl GMRecord {
    fn metadata(&self, vs30: f64) -> GMMetadata {
        GMMetadata { gm_id: self.id.clone(), magnitude: self.magnitude, rrup: self.rrup, vs30 }
    }

    fn row(&self, ims: &[IM], scale_factor: f64) -> Option<Vec<f64>> {
        ims.iter()
            .map(|im| {
                self.im_values
                    .get(im)
                    .map(|v| v * scale_factor.powf(im.im_type.scale_exponent()))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GMDatasetKind {
    Historical,
    Simulation,
    Mixed,
}

impl GMDatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GMDatasetKind::Historical => "historical",
            GMDatasetKind::Simulation => "simulation",
            GMDatasetKind::Mixed => "mixed",
        }
    }
}

impl fmt::Display for GMDatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source of candidate ground motions
pub trait GMDataset: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> GMDatasetKind;

    /// IMs available for every record
    fn ims(&self) -> Vec<IM>;

    /// IM values of the candidate records for a site
    ///
    /// Records outside `bounds` are excluded. Datasets that support amplitude
    /// scaling scale each record to `scale` first and filter on the scale
    /// factor too.
    fn get_im_df(
        &self,
        site: &SiteInfo,
        ims: &[IM],
        bounds: Option<&CausalParamBounds>,
        scale: Option<ScaleTarget>,
    ) -> Result<GMImTable>;

    /// Causal parameters of the records `ids`, or of every record
    fn get_metadata_df(&self, site: &SiteInfo, ids: Option<&[String]>) -> Result<Vec<GMMetadata>>;

    /// Copy the waveforms of `ids` into `out_dir`, returning the ids that
    /// have no waveform
    fn get_waveforms(&self, ids: &[String], site: &SiteInfo, out_dir: &Path) -> Result<Vec<String>>;
}

fn ims_of(records: &[GMRecord]) -> Vec<IM> {
    let mut iter = records.iter();
    let Some(first) = iter.next() else {
        return Vec::new();
    };
    let mut ims: BTreeSet<IM> = first.im_values.keys().copied().collect();
    for record in iter {
        ims.retain(|im| record.im_values.contains_key(im));
    }
    ims.into_iter().collect()
}

fn copy_waveforms(records: &[GMRecord], ids: &[String], out_dir: &Path) -> Result<Vec<String>> {
    std::fs::create_dir_all(out_dir)?;
    let mut missing = Vec::new();
    for id in ids {
        let source = records
            .iter()
            .find(|r| &r.id == id)
            .and_then(|r| r.waveform.as_deref())
            .filter(|p| p.exists());
        match source.and_then(|p| p.file_name().map(|name| (p, name))) {
            Some((path, name)) => {
                std::fs::copy(path, out_dir.join(name))?;
            }
            None => missing.push(id.clone()),
        }
    }
    Ok(missing)
}

fn filter_metadata(records: &[GMRecord], ids: Option<&[String]>, vs30: impl Fn(&GMRecord) -> f64) -> Vec<GMMetadata> {
    match ids {
        Some(ids) => ids
            .iter()
            .filter_map(|id| records.iter().find(|r| &r.id == id))
            .map(|r| r.metadata(vs30(r)))
            .collect(),
        None => records.iter().map(|r| r.metadata(vs30(r))).collect(),
    }
}

/// Recorded ground motions, amplitude scaled to the conditioning level
#[derive(Debug, Clone)]
pub struct HistoricalGMDataset {
    name: String,
    records: Vec<GMRecord>,
}

impl HistoricalGMDataset {
    pub fn new(name: impl Into<String>, records: Vec<GMRecord>) -> Self {
        Self { name: name.into(), records }
    }

    pub fn load_from_json(name: impl Into<String>, path: &Path) -> Result<Self> {
        Ok(Self::new(name, load_json(path)?))
    }
}

impl GMDataset for HistoricalGMDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> GMDatasetKind {
        GMDatasetKind::Historical
    }

    fn ims(&self) -> Vec<IM> {
        ims_of(&self.records)
    }

    fn get_im_df(
        &self,
        _site: &SiteInfo,
        ims: &[IM],
        bounds: Option<&CausalParamBounds>,
        scale: Option<ScaleTarget>,
    ) -> Result<GMImTable> {
        let mut table = GMImTable::new(ims.to_vec());
        let mut n_excluded = 0usize;
        for record in &self.records {
            let sf = match scale {
                Some(target) => match record.im_values.get(&target.im) {
                    Some(&gm) if gm > 0.0 => target.value / gm,
                    _ => {
                        n_excluded += 1;
                        continue;
                    }
                },
                None => 1.0,
            };
            let in_bounds = bounds.map_or(true, |b| {
                b.contains_mw(record.magnitude)
                    && b.contains_rrup(record.rrup)
                    && b.contains_vs30(record.vs30)
                    && (scale.is_none() || b.contains_sf(sf))
            });
            match record.row(ims, sf) {
                Some(row) if in_bounds => table.push(record.id.clone(), row, sf),
                _ => n_excluded += 1,
            }
        }
        tracing::debug!(dataset = %self.name, n_candidates = table.len(), n_excluded, "Built historical candidate pool");
        Ok(table)
    }

    fn get_metadata_df(&self, _site: &SiteInfo, ids: Option<&[String]>) -> Result<Vec<GMMetadata>> {
        Ok(filter_metadata(&self.records, ids, |r| r.vs30))
    }

    fn get_waveforms(&self, ids: &[String], _site: &SiteInfo, out_dir: &Path) -> Result<Vec<String>> {
        copy_waveforms(&self.records, ids, out_dir)
    }
}

/// Simulated ground motions per station, never scaled
#[derive(Debug, Clone)]
pub struct SimulationGMDataset {
    name: String,
    stations: BTreeMap<String, Vec<GMRecord>>,
}

impl SimulationGMDataset {
    pub fn new(name: impl Into<String>, stations: BTreeMap<String, Vec<GMRecord>>) -> Self {
        Self { name: name.into(), stations }
    }

    pub fn load_from_json(name: impl Into<String>, path: &Path) -> Result<Self> {
        Ok(Self::new(name, load_json(path)?))
    }

    fn records(&self, site: &SiteInfo) -> Result<&[GMRecord]> {
        self.stations
            .get(&site.station_name)
            .map(|r| r.as_slice())
            .ok_or_else(|| HazardError::UnsupportedStation {
                station: site.station_name.clone(),
                context: format!("simulation dataset {}", self.name),
            })
    }
}

impl GMDataset for SimulationGMDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> GMDatasetKind {
        GMDatasetKind::Simulation
    }

    fn ims(&self) -> Vec<IM> {
        let all: Vec<GMRecord> = self.stations.values().flatten().cloned().collect();
        ims_of(&all)
    }

    fn get_im_df(
        &self,
        site: &SiteInfo,
        ims: &[IM],
        bounds: Option<&CausalParamBounds>,
        _scale: Option<ScaleTarget>,
    ) -> Result<GMImTable> {
        let mut table = GMImTable::new(ims.to_vec());
        for record in self.records(site)? {
            let in_bounds = bounds.map_or(true, |b| b.contains_mw(record.magnitude) && b.contains_rrup(record.rrup));
            if let (true, Some(row)) = (in_bounds, record.row(ims, 1.0)) {
                table.push(record.id.clone(), row, 1.0);
            }
        }
        Ok(table)
    }

    fn get_metadata_df(&self, site: &SiteInfo, ids: Option<&[String]>) -> Result<Vec<GMMetadata>> {
        Ok(filter_metadata(self.records(site)?, ids, |_| site.vs30))
    }

    fn get_waveforms(&self, ids: &[String], site: &SiteInfo, out_dir: &Path) -> Result<Vec<String>> {
        copy_waveforms(self.records(site)?, ids, out_dir)
    }
}

/// Concatenation of several datasets
pub struct MixedGMDataset {
    name: String,
    datasets: Vec<Box<dyn GMDataset>>,
}

impl MixedGMDataset {
    pub fn new(name: impl Into<String>, datasets: Vec<Box<dyn GMDataset>>) -> Self {
        Self { name: name.into(), datasets }
    }
}

impl GMDataset for MixedGMDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> GMDatasetKind {
        GMDatasetKind::Mixed
    }

    fn ims(&self) -> Vec<IM> {
        let mut iter = self.datasets.iter();
        let Some(first) = iter.next() else {
            return Vec::new();
        };
        let mut ims = first.ims();
        for ds in iter {
            let other = ds.ims();
            ims.retain(|im| other.contains(im));
        }
        ims
    }

    fn get_im_df(
        &self,
        site: &SiteInfo,
        ims: &[IM],
        bounds: Option<&CausalParamBounds>,
        scale: Option<ScaleTarget>,
    ) -> Result<GMImTable> {
        let mut table = GMImTable::new(ims.to_vec());
        for ds in &self.datasets {
            table.extend(ds.get_im_df(site, ims, bounds, scale)?)?;
        }
        Ok(table)
    }

    fn get_metadata_df(&self, site: &SiteInfo, ids: Option<&[String]>) -> Result<Vec<GMMetadata>> {
        let mut metadata = Vec::new();
        for ds in &self.datasets {
            metadata.extend(ds.get_metadata_df(site, ids)?);
        }
        Ok(metadata)
    }

    fn get_waveforms(&self, ids: &[String], site: &SiteInfo, out_dir: &Path) -> Result<Vec<String>> {
        let mut missing: Vec<String> = ids.to_vec();
        for ds in &self.datasets {
            let still_missing = ds.get_waveforms(&missing, site, out_dir)?;
            missing = still_missing;
        }
        Ok(missing)
    }
}

/// Description of a dataset to build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GMDatasetConfig {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Member datasets of a mixed dataset
    #[serde(default)]
    pub members: Vec<GMDatasetConfig>,
}

impl GMDatasetConfig {
    fn require_path(&self) -> Result<&Path> {
        self.path
            .as_deref()
            .ok_or_else(|| HazardError::InvalidConfig(format!("Dataset {} has no path", self.name)))
    }
}

pub type DatasetBuilder =
    Box<dyn Fn(&GMDatasetConfig, &GMDatasetRegistry) -> Result<Box<dyn GMDataset>> + Send + Sync>;

/// Builders of ground motion datasets, keyed by kind name
pub struct GMDatasetRegistry {
    builders: BTreeMap<String, DatasetBuilder>,
}

impl GMDatasetRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self { builders: BTreeMap::new() }
    }

    /// Registry with the historical, simulation and mixed builders
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            GMDatasetKind::Historical.as_str(),
            Box::new(|config, _| {
                Ok(Box::new(HistoricalGMDataset::load_from_json(&config.name, config.require_path()?)?))
            }),
        );
        registry.register(
            GMDatasetKind::Simulation.as_str(),
            Box::new(|config, _| {
                Ok(Box::new(SimulationGMDataset::load_from_json(&config.name, config.require_path()?)?))
            }),
        );
        registry.register(
            GMDatasetKind::Mixed.as_str(),
            Box::new(|config, registry| {
                let members = config
                    .members
                    .iter()
                    .map(|m| registry.build(m))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Box::new(MixedGMDataset::new(&config.name, members)))
            }),
        );
        registry
    }

    pub fn register(&mut self, kind: &str, builder: DatasetBuilder) {
        self.builders.insert(kind.to_string(), builder);
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(|k| k.as_str())
    }

    pub fn build(&self, config: &GMDatasetConfig) -> Result<Box<dyn GMDataset>> {
        let builder = self
            .builders
            .get(&config.kind)
            .ok_or_else(|| HazardError::UnknownDataset(format!("{} (kind {})", config.name, config.kind)))?;
        let dataset = builder(config, self)?;
        tracing::info!(name = %config.name, kind = %config.kind, "Loaded ground motion dataset");
        Ok(dataset)
    }

    /// Build the dataset described by a TOML file
    pub fn load_file(&self, path: &Path) -> Result<Box<dyn GMDataset>> {
        let content = std::fs::read_to_string(path)?;
        let config: GMDatasetConfig = toml::from_str(&content)?;
        self.build(&config)
    }
}

impl Default for GMDatasetRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
