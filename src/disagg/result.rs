//! Disaggregation results and their persistence

use std::path::Path;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::core::persist::{load_json, save_json};
use crate::core::stats::weighted_mean;
use crate::core::types::{RuptureId, SiteInfo, SourceType, IM};

/// Share of the exceedance at one IM value owed to one rupture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuptureContribution {
    pub rupture_id: RuptureId,
    pub rupture_name: String,
    pub source_type: SourceType,
    pub magnitude: f64,
    /// Rupture distance to the site; `None` when no distance data exists
    pub rrup: Option<f64>,
    pub contribution: f64,
    pub epsilon: f64,
}

/// Disaggregation of one branch at one IM value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchDisaggResult {
    pub branch_name: String,
    pub weight: f64,
    pub im: IM,
    pub site: SiteInfo,
    pub im_value: f64,
    /// Total annual exceedance of the branch at `im_value`
    pub exceedance: f64,
    pub contributions: Vec<RuptureContribution>,
}

impl BranchDisaggResult {
    pub fn total_contribution(&self) -> f64 {
        self.contributions.iter().map(|c| c.contribution).sum()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(self, path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

/// Contribution-weighted mean causal parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisaggMeanValues {
    pub magnitude: f64,
    /// Over ruptures with distance data only
    pub rrup: Option<f64>,
    pub epsilon: f64,
}

/// Hazard-adjusted combination of branch disaggregations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleDisaggResult {
    pub ensemble_name: String,
    pub im: IM,
    pub site: SiteInfo,
    pub im_value: f64,
    /// Target exceedance the IM value was derived from, if any
    pub target_exceedance: Option<f64>,
    /// Weighted mean ensemble exceedance at `im_value`
    pub exceedance: f64,
    pub adj_branch_weights: Vec<f64>,
    pub branches: Vec<BranchDisaggResult>,
    pub contributions: Vec<RuptureContribution>,
}

impl EnsembleDisaggResult {
    pub fn total_contribution(&self) -> f64 {
        self.contributions.iter().map(|c| c.contribution).sum()
    }

    pub fn mean_values(&self) -> DisaggMeanValues {
        let contr: Vec<f64> = self.contributions.iter().map(|c| c.contribution).collect();
        let mags: Vec<f64> = self.contributions.iter().map(|c| c.magnitude).collect();
        let eps: Vec<f64> = self.contributions.iter().map(|c| c.epsilon).collect();

        let (rrups, rrup_contr): (Vec<f64>, Vec<f64>) = self
            .contributions
            .iter()
            .filter_map(|c| c.rrup.map(|r| (r, c.contribution)))
            .unzip();
        let rrup = (!rrups.is_empty()).then(|| weighted_mean(&rrups, &rrup_contr));

        DisaggMeanValues {
            magnitude: weighted_mean(&mags, &contr),
            rrup,
            epsilon: weighted_mean(&eps, &contr),
        }
    }

    /// The `n` largest contributors, largest first
    pub fn top_contributors(&self, n: usize) -> Vec<&RuptureContribution> {
        let mut sorted: Vec<&RuptureContribution> = self.contributions.iter().collect();
        sorted.sort_by_key(|c| std::cmp::Reverse(OrderedFloat(c.contribution)));
        sorted.truncate(n);
        sorted
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(self, path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }
}
