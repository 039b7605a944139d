//! IMEnsemble: the weighted branches serving one IM family

use std::cell::OnceCell;
use std::collections::BTreeSet;

use super::branch::Branch;
use super::config::IMEnsembleConfig;
use super::get_or_try_init;
use crate::core::error::Result;
use crate::core::types::{IMDataType, IMType, SourceType, IM};
use crate::data::IMDataProvider;

#[derive(Debug)]
pub struct IMEnsemble {
    pub im_types: Vec<IMType>,
    branches: Vec<Branch>,
    ims: OnceCell<Vec<IM>>,
    stations: OnceCell<BTreeSet<String>>,
}

impl IMEnsemble {
    pub fn new(im_types: Vec<IMType>, branches: Vec<Branch>) -> Self {
        Self { im_types, branches, ims: OnceCell::new(), stations: OnceCell::new() }
    }

    pub fn from_config(config: &IMEnsembleConfig) -> Self {
        Self::new(
            config.im_types.clone(),
            config.branches.iter().map(Branch::from_config).collect(),
        )
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn branch(&self, name: &str) -> Option<&Branch> {
        self.branches.iter().find(|b| b.name == name)
    }

    pub fn covers(&self, im_type: IMType) -> bool {
        self.im_types.contains(&im_type)
    }

    /// Raw branch weights, in branch order
    pub fn branch_weights(&self) -> Vec<f64> {
        self.branches.iter().map(|b| b.weight).collect()
    }

    /// Branch weights divided by their sum
    pub fn normalised_weights(&self) -> Vec<f64> {
        let total: f64 = self.branches.iter().map(|b| b.weight).sum();
        self.branches.iter().map(|b| b.weight / total).collect()
    }

    /// IMs of this family offered by every branch
    ///
    /// The intersection, not the union: combining branches requires each of
    /// them to answer for every IM.
    pub fn ims(&self, provider: &dyn IMDataProvider) -> Result<&[IM]> {
        get_or_try_init(&self.ims, || {
            let mut common: Option<BTreeSet<IM>> = None;
            for branch in &self.branches {
                let ims: BTreeSet<IM> = branch
                    .ims(provider)?
                    .iter()
                    .filter(|im| self.covers(im.im_type))
                    .copied()
                    .collect();
                common = Some(match common {
                    None => ims,
                    Some(prev) => prev.intersection(&ims).copied().collect(),
                });
            }
            Ok(common.unwrap_or_default().into_iter().collect())
        })
        .map(|ims| ims.as_slice())
    }

    /// Stations supported by every branch
    pub fn stations(&self, provider: &dyn IMDataProvider) -> Result<&BTreeSet<String>> {
        get_or_try_init(&self.stations, || {
            let mut common: Option<BTreeSet<String>> = None;
            for branch in &self.branches {
                let stations = branch.stations(provider)?;
                common = Some(match common {
                    None => stations.clone(),
                    Some(prev) => prev.intersection(stations).cloned().collect(),
                });
            }
            Ok(common.unwrap_or_default())
        })
    }

    /// Data type across all branches for one source category
    ///
    /// Returns `Mixed` when branches disagree; such data is reported but never
    /// combined by ground motion selection.
    pub fn im_data_type(&self, provider: &dyn IMDataProvider, source_type: SourceType) -> Result<Option<IMDataType>> {
        let mut result = None;
        for branch in &self.branches {
            if let Some(branch_type) = branch.im_data_type(provider, source_type)? {
                result = match result {
                    None => Some(branch_type),
                    Some(existing) if existing == branch_type => Some(existing),
                    Some(_) => Some(IMDataType::Mixed),
                };
            }
        }
        if result == Some(IMDataType::Mixed) {
            tracing::warn!(
                im_types = ?self.im_types,
                %source_type,
                "Branches disagree on IM data type"
            );
        }
        Ok(result)
    }

    /// Data type over both source categories
    pub fn combined_data_type(&self, provider: &dyn IMDataProvider) -> Result<IMDataType> {
        let fault = self.im_data_type(provider, SourceType::Fault)?;
        let distributed = self.im_data_type(provider, SourceType::Distributed)?;
        Ok(match (fault, distributed) {
            (Some(a), Some(b)) if a == b => a,
            (Some(_), Some(_)) => IMDataType::Mixed,
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => IMDataType::Mixed,
        })
    }

    pub fn clear_cache(&mut self) {
        self.ims.take();
        self.stations.take();
        for branch in &mut self.branches {
            branch.clear_cache();
        }
    }
}
