//! Contracts of the external data collaborators
//!
//! The engine never reads files itself. IM values, rupture catalogues and
//! site-source distances come through the traits below; [`memory`] provides
//! JSON-loadable in-memory implementations.

pub mod memory;
pub mod table;

use std::sync::Arc;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::core::types::{IMDataType, TectonicType, IM};

pub use memory::{InMemoryDistanceStore, InMemoryIMStore, InMemoryRuptureStore};
pub use table::{IMTable, LnIMParams, NonParametricTable, ParametricTable};

/// One row of a rupture source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuptureRecord {
    pub name: String,
    pub annual_rec_prob: f64,
    pub magnitude: f64,
    pub tectonic_type: TectonicType,
    /// Fault the rupture belongs to; distances of fault ruptures are keyed by it
    #[serde(default)]
    pub fault_name: Option<String>,
}

impl RuptureRecord {
    /// Key used for site-source distance lookups
    pub fn distance_key(&self) -> &str {
        self.fault_name.as_deref().unwrap_or(&self.name)
    }
}

/// Site-source distance metrics (km)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SiteSourceDistance {
    pub rjb: f64,
    pub rrup: f64,
    #[serde(default)]
    pub rx: Option<f64>,
    #[serde(default)]
    pub ry: Option<f64>,
    #[serde(default)]
    pub rtvz: Option<f64>,
}

/// Provider of per-rupture IM data
pub trait IMDataProvider: Send + Sync {
    /// Parametric or non-parametric; never `Mixed`
    fn im_data_type(&self, source: &str) -> Result<IMDataType>;

    fn ims(&self, source: &str) -> Result<Vec<IM>>;

    fn stations(&self, source: &str) -> Result<Vec<String>>;

    /// IM values at a station; `Ok(None)` when the station has no data
    fn get_im_values(&self, source: &str, station: &str, ims: Option<&[IM]>) -> Result<Option<IMTable>>;
}

/// Provider of rupture catalogues, one per source file
pub trait RuptureSourceProvider: Send + Sync {
    fn ruptures(&self, source_file: &str) -> Result<Vec<RuptureRecord>>;
}

/// Provider of site-source distances
///
/// Entries missing from the returned map (e.g. beyond a cutoff radius) mean
/// "no data", never zero distance.
pub trait SiteSourceProvider: Send + Sync {
    fn distances(&self, source_file: &str, station: &str) -> Result<AHashMap<String, SiteSourceDistance>>;
}

/// The set of collaborators an ensemble reads from
#[derive(Clone)]
pub struct DataSources {
    pub im_data: Arc<dyn IMDataProvider>,
    pub ruptures: Arc<dyn RuptureSourceProvider>,
    pub distances: Arc<dyn SiteSourceProvider>,
}

impl DataSources {
    pub fn new(
        im_data: Arc<dyn IMDataProvider>,
        ruptures: Arc<dyn RuptureSourceProvider>,
        distances: Arc<dyn SiteSourceProvider>,
    ) -> Self {
        Self { im_data, ruptures, distances }
    }
}

