//! Ground motion selection result

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::causal::CausalParamBounds;
use super::dataset::{GMImTable, GMMetadata};
use super::gcim::UniLnIMiIMj;
use super::realisations::RealisationTable;
use super::weights::IMWeights;
use crate::core::error::{HazardError, Result};
use crate::core::persist::{load_json, save_json};
use crate::core::stats::percentile;
use crate::core::types::{IMDataType, SiteInfo, IM};

/// Mean, 16th and 84th percentile of a causal parameter of the selected set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamSummary {
    pub mean: f64,
    pub p16: f64,
    pub p84: f64,
}

impl ParamSummary {
    fn of(values: &[f64]) -> Self {
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Self { mean, p16: percentile(values, 16.0), p84: percentile(values, 84.0) }
    }
}

/// Summary statistics of a selection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GMSMetadata {
    pub magnitude: ParamSummary,
    pub rrup: ParamSummary,
    pub ks_critical_value: f64,
    pub n_distinct: usize,
}

/// Outcome of one ground motion selection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GMSResult {
    pub ensemble_name: String,
    pub site: SiteInfo,
    pub dataset_name: String,
    pub data_type: IMDataType,
    pub im_j: IM,
    pub im_j_value: f64,
    /// Target exceedance the conditioning value was derived from, if any
    pub target_exceedance: Option<f64>,
    pub ims: Vec<IM>,
    pub im_weights: IMWeights,
    pub selected_gms: Vec<String>,
    /// IM values (after scaling) of the selected records, in selection order
    pub selected_im_values: GMImTable,
    pub selected_gm_metadata: Vec<GMMetadata>,
    /// Realisations of the chosen replica
    pub realisations: RealisationTable,
    pub targets: BTreeMap<IM, UniLnIMiIMj>,
    pub adj_branch_weights: Vec<f64>,
    pub chosen_replica: usize,
    pub replica_residuals: Vec<f64>,
    pub replica_distinct: Vec<usize>,
    /// KS statistic of the selected set per IM, in `ims` order
    pub ks_statistics: Vec<f64>,
    pub causal_bounds: CausalParamBounds,
    pub metadata: GMSMetadata,
}

impl GMSResult {
    /// Summary statistics of magnitude and distance of the selected records
    pub fn selected_metadata(&self) -> &GMSMetadata {
        &self.metadata
    }

    pub fn n_distinct(&self) -> usize {
        self.metadata.n_distinct
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(self, path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

/// Summary of the selected records
///
/// `records` holds one entry per selected ground motion, duplicates
/// included. Fails when there is no metadata to summarise.
pub fn summarise_selection(
    records: &[GMMetadata],
    ks_critical_value: f64,
    n_distinct: usize,
) -> Result<GMSMetadata> {
    if records.is_empty() {
        return Err(HazardError::InsufficientData {
            context: "metadata of selected ground motions".into(),
            available: 0,
            required: 1,
        });
    }
    let mags: Vec<f64> = records.iter().map(|m| m.magnitude).collect();
    let rrups: Vec<f64> = records.iter().map(|m| m.rrup).collect();
    Ok(GMSMetadata {
        magnitude: ParamSummary::of(&mags),
        rrup: ParamSummary::of(&rrups),
        ks_critical_value,
        n_distinct,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_of_selected_records() {
        let records: Vec<GMMetadata> = [(6.0, 10.0), (7.0, 30.0), (7.0, 30.0)]
            .iter()
            .enumerate()
            .map(|(i, (mag, rrup))| GMMetadata {
                gm_id: format!("gm{}", i),
                magnitude: *mag,
                rrup: *rrup,
                vs30: 400.0,
            })
            .collect();
        let summary = summarise_selection(&records, 0.39, 2).unwrap();
        assert!((summary.magnitude.mean - 20.0 / 3.0).abs() < 1e-12);
        assert!(summary.rrup.p16 < summary.rrup.p84);
        assert_eq!(summary.n_distinct, 2);
    }

    #[test]
    fn test_summary_without_metadata_is_insufficient() {
        assert!(matches!(
            summarise_selection(&[], 0.39, 0),
            Err(HazardError::InsufficientData { available: 0, .. })
        ));
    }
}
