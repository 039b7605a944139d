//! Branch: one weighted alternative model of the logic tree

use std::cell::OnceCell;
use std::collections::BTreeSet;

use super::config::BranchConfig;
use super::get_or_try_init;
use super::leaf::Leaf;
use super::rupture::{BranchRuptureTable, RuptureCatalog};
use crate::core::error::Result;
use crate::core::types::{IMDataType, SourceType, IM};
use crate::data::IMDataProvider;

#[derive(Debug)]
pub struct Branch {
    pub name: String,
    pub weight: f64,
    pub leaves: Vec<Leaf>,
    ims: OnceCell<Vec<IM>>,
    stations: OnceCell<BTreeSet<String>>,
    rupture_table: OnceCell<BranchRuptureTable>,
}

impl Branch {
    pub fn new(name: impl Into<String>, weight: f64, leaves: Vec<Leaf>) -> Self {
        Self {
            name: name.into(),
            weight,
            leaves,
            ims: OnceCell::new(),
            stations: OnceCell::new(),
            rupture_table: OnceCell::new(),
        }
    }

    pub fn from_config(config: &BranchConfig) -> Self {
        Self::new(
            config.name.clone(),
            config.weight,
            config.leaves.iter().map(Leaf::from_config).collect(),
        )
    }

    /// IMs every leaf can answer for
    pub fn ims(&self, provider: &dyn IMDataProvider) -> Result<&[IM]> {
        get_or_try_init(&self.ims, || {
            let mut common: Option<BTreeSet<IM>> = None;
            for leaf in &self.leaves {
                let ims: BTreeSet<IM> = leaf.ims(provider)?.iter().copied().collect();
                common = Some(match common {
                    None => ims,
                    Some(prev) => prev.intersection(&ims).copied().collect(),
                });
            }
            Ok(common.unwrap_or_default().into_iter().collect())
        })
        .map(|ims| ims.as_slice())
    }

    /// Stations where every leaf has data
    pub fn stations(&self, provider: &dyn IMDataProvider) -> Result<&BTreeSet<String>> {
        get_or_try_init(&self.stations, || {
            let mut common: Option<BTreeSet<String>> = None;
            for leaf in &self.leaves {
                let stations = leaf.stations(provider)?;
                common = Some(match common {
                    None => stations.clone(),
                    Some(prev) => prev.intersection(stations).cloned().collect(),
                });
            }
            Ok(common.unwrap_or_default())
        })
    }

    /// Data type of the leaves of one source category, `None` if the branch
    /// has no such leaf
    pub fn im_data_type(&self, provider: &dyn IMDataProvider, source_type: SourceType) -> Result<Option<IMDataType>> {
        let mut result = None;
        for leaf in self.leaves.iter().filter(|l| l.source_type == source_type) {
            let leaf_type = leaf.im_data_type(provider)?;
            result = match result {
                None => Some(leaf_type),
                Some(existing) if existing == leaf_type => Some(existing),
                Some(_) => Some(IMDataType::Mixed),
            };
        }
        Ok(result)
    }

    /// Annual recurrence probabilities of every rupture reachable from the
    /// branch's rupture sources
    pub fn rupture_table(&self, catalog: &RuptureCatalog) -> Result<&BranchRuptureTable> {
        get_or_try_init(&self.rupture_table, || {
            let mut table = BranchRuptureTable::default();
            let mut seen_sources = BTreeSet::new();
            for leaf in &self.leaves {
                if !seen_sources.insert(leaf.rupture_source.as_str()) {
                    continue;
                }
                for row in catalog.source(&leaf.rupture_source)? {
                    table.insert(row.id, row.annual_rec_prob);
                }
            }
            Ok(table)
        })
    }

    pub fn clear_cache(&mut self) {
        self.ims.take();
        self.stations.take();
        self.rupture_table.take();
        for leaf in &mut self.leaves {
            leaf.clear_cache();
        }
    }
}
