//! Hazard results and their persistence

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::curve;
use crate::core::error::{HazardError, Result};
use crate::core::persist::{load_json, save_json};
use crate::core::types::{SiteInfo, IM};

fn out_of_range(site: &SiteInfo, im: &IM, exceedance: Option<f64>, im_value: Option<f64>) -> HazardError {
    HazardError::ExceedanceOutOfRange {
        station: site.station_name.clone(),
        im: im.to_string(),
        exceedance,
        im_value,
        branch: None,
    }
}

/// Hazard curve of one branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchHazardResult {
    pub branch_name: String,
    pub weight: f64,
    pub im: IM,
    pub site: SiteInfo,
    pub im_levels: Vec<f64>,
    /// Annual exceedance from fault ruptures
    pub fault: Vec<f64>,
    /// Annual exceedance from distributed seismicity
    pub distributed: Vec<f64>,
}

impl BranchHazardResult {
    pub fn total(&self) -> Vec<f64> {
        self.fault.iter().zip(&self.distributed).map(|(f, d)| f + d).collect()
    }

    pub fn exceedance_to_im(&self, exceedance: f64) -> Result<f64> {
        curve::exceedance_to_im(&self.im_levels, &self.total(), exceedance)
            .ok_or_else(|| out_of_range(&self.site, &self.im, Some(exceedance), None).with_branch(&self.branch_name))
    }

    pub fn im_to_exceedance(&self, im_value: f64) -> Result<f64> {
        curve::im_to_exceedance(&self.im_levels, &self.total(), im_value)
            .ok_or_else(|| out_of_range(&self.site, &self.im, None, Some(im_value)).with_branch(&self.branch_name))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(self, path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

/// Percentiles of total hazard across branches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardPercentiles {
    pub lower_percentile: f64,
    pub upper_percentile: f64,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// Weighted combination of branch hazard curves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleHazardResult {
    pub ensemble_name: String,
    pub im: IM,
    pub site: SiteInfo,
    pub im_levels: Vec<f64>,
    pub fault: Vec<f64>,
    pub distributed: Vec<f64>,
    pub branches: Vec<BranchHazardResult>,
    pub percentiles: Option<HazardPercentiles>,
}

impl EnsembleHazardResult {
    pub fn total(&self) -> Vec<f64> {
        self.fault.iter().zip(&self.distributed).map(|(f, d)| f + d).collect()
    }

    pub fn exceedance_to_im(&self, exceedance: f64) -> Result<f64> {
        curve::exceedance_to_im(&self.im_levels, &self.total(), exceedance)
            .ok_or_else(|| out_of_range(&self.site, &self.im, Some(exceedance), None))
    }

    pub fn im_to_exceedance(&self, im_value: f64) -> Result<f64> {
        curve::im_to_exceedance(&self.im_levels, &self.total(), im_value)
            .ok_or_else(|| out_of_range(&self.site, &self.im, None, Some(im_value)))
    }

    pub fn branch(&self, name: &str) -> Option<&BranchHazardResult> {
        self.branches.iter().find(|b| b.branch_name == name)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(self, path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }
}
