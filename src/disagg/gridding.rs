//! Magnitude / distance / epsilon binning of disaggregation contributions

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::result::RuptureContribution;
use crate::core::config::DisaggConfig;
use crate::core::error::{HazardError, Result};
use crate::core::persist::{load_json, save_json};
use crate::core::types::SourceType;

/// Gridded contributions
///
/// `fault` and `distributed` are indexed `[mag_bin][rrup_bin]`; `epsilon` is
/// indexed `[eps_bin][mag_bin][rrup_bin]` where eps bin 0 is everything below
/// the first interior edge and the last bin everything above the last one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisaggGridData {
    pub mag_edges: Vec<f64>,
    pub rrup_edges: Vec<f64>,
    pub epsilon_edges: Vec<f64>,
    pub fault: Vec<Vec<f64>>,
    pub distributed: Vec<Vec<f64>>,
    pub epsilon: Vec<Vec<Vec<f64>>>,
    /// Contribution of ruptures left out for lack of distance data
    pub dropped_contribution: f64,
    pub n_dropped: usize,
}

impl DisaggGridData {
    pub fn n_mag_bins(&self) -> usize {
        self.mag_edges.len() - 1
    }

    pub fn n_rrup_bins(&self) -> usize {
        self.rrup_edges.len() - 1
    }

    /// Sum over every magnitude/distance cell
    pub fn total_binned(&self) -> f64 {
        self.fault
            .iter()
            .chain(&self.distributed)
            .flat_map(|row| row.iter())
            .sum()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(self, path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }
}

/// Edges of `size`-wide bins aligned to multiples of `size`, covering
/// [`min`, `max`]
fn bin_edges(min: f64, max: f64, size: f64) -> Vec<f64> {
    let lo = (min / size).floor() * size;
    let mut n = ((max - lo) / size).ceil() as usize;
    if n == 0 {
        n = 1;
    }
    (0..=n).map(|i| lo + i as f64 * size).collect()
}

fn bin_index(value: f64, edges: &[f64]) -> usize {
    let size = edges[1] - edges[0];
    let n_bins = edges.len() - 1;
    (((value - edges[0]) / size).floor().max(0.0) as usize).min(n_bins - 1)
}

/// Bin contributions by magnitude and distance, mirrored by epsilon
///
/// Ruptures without distance data are dropped from the grid rather than
/// placed at zero distance.
pub fn calc_disagg_gridding(contributions: &[RuptureContribution], config: &DisaggConfig) -> Result<DisaggGridData> {
    let mut dropped_contribution = 0.0;
    let mut n_dropped = 0;
    let mut kept = Vec::with_capacity(contributions.len());
    for c in contributions {
        match c.rrup {
            Some(rrup) => kept.push((c, rrup)),
            None => {
                dropped_contribution += c.contribution;
                n_dropped += 1;
            }
        }
    }
    if n_dropped > 0 {
        tracing::debug!(n_dropped, dropped_contribution, "Dropped ruptures without distance data");
    }
    if kept.is_empty() {
        return Err(HazardError::InsufficientData {
            context: "disaggregation gridding (ruptures with distance data)".into(),
            available: 0,
            required: 1,
        });
    }

    let mag_min = kept.iter().map(|(c, _)| c.magnitude).fold(f64::INFINITY, f64::min);
    let mag_max = kept.iter().map(|(c, _)| c.magnitude).fold(f64::NEG_INFINITY, f64::max);
    let rrup_max = kept.iter().map(|(_, r)| *r).fold(0.0, f64::max);

    let mag_edges = bin_edges(mag_min, mag_max, config.mag_bin_size);
    let rrup_edges = bin_edges(0.0, rrup_max, config.rrup_bin_size);
    let (n_mag, n_rrup) = (mag_edges.len() - 1, rrup_edges.len() - 1);
    let n_eps = config.epsilon_edges.len() + 1;

    let mut fault = vec![vec![0.0; n_rrup]; n_mag];
    let mut distributed = vec![vec![0.0; n_rrup]; n_mag];
    let mut epsilon = vec![vec![vec![0.0; n_rrup]; n_mag]; n_eps];

    for (c, rrup) in kept {
        let i = bin_index(c.magnitude, &mag_edges);
        let j = bin_index(rrup, &rrup_edges);
        let k = config.epsilon_edges.partition_point(|&edge| edge <= c.epsilon);
        match c.source_type {
            SourceType::Fault => fault[i][j] += c.contribution,
            SourceType::Distributed => distributed[i][j] += c.contribution,
        }
        epsilon[k][i][j] += c.contribution;
    }

    Ok(DisaggGridData {
        mag_edges,
        rrup_edges,
        epsilon_edges: config.epsilon_edges.clone(),
        fault,
        distributed,
        epsilon,
        dropped_contribution,
        n_dropped,
    })
}
