//! Disaggregation engine
//!
//! Attributes the exceedance at one IM value to individual ruptures. Branch
//! results are combined with hazard-adjusted weights: at a fixed IM value a
//! branch with higher hazard carries proportionally more of the ensemble
//! exceedance, so its contributions are up-weighted by h_b / h_mean.

pub mod gridding;
pub mod result;

use ahash::AHashMap;

use crate::core::error::{HazardError, Result};
use crate::core::types::{RuptureId, SiteInfo, IM};
use crate::data::SiteSourceDistance;
use crate::hazard::{branch_hazard_at, run_branch_hazard, run_ensemble_hazard};
use crate::tree::{Branch, Ensemble};

pub use gridding::{calc_disagg_gridding, DisaggGridData};
pub use result::{BranchDisaggResult, DisaggMeanValues, EnsembleDisaggResult, RuptureContribution};

/// The hazard level a disaggregation is performed at
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisaggTarget {
    /// Annual exceedance, converted to an IM value through the hazard curve
    Exceedance(f64),
    IMValue(f64),
}

/// Branch weights adjusted for each branch's hazard at one IM value
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustedBranchWeights {
    pub branch_names: Vec<String>,
    pub weights: Vec<f64>,
    /// Total exceedance of each branch at the IM value
    pub branch_hazard: Vec<f64>,
    /// Weighted mean exceedance at the IM value
    pub hazard_mean: f64,
}

impl AdjustedBranchWeights {
    /// Compute `h_b * w_b / h_mean` from branch hazards and raw weights
///
/// Raw weights are normalised first, so the result sums to one.
    pub fn from_hazard(
        branch_names: Vec<String>,
        raw_weights: &[f64],
        branch_hazard: Vec<f64>,
    ) -> Option<Self> {
        let total_weight: f64 = raw_weights.iter().sum();
        if total_weight <= 0.0 {
            return None;
        }
        let norm_weights: Vec<f64> = raw_weights.iter().map(|w| w / total_weight).collect();
        let hazard_mean = branch_hazard.iter().zip(&norm_weights).map(|(h, w)| h * w).sum::<f64>();
        if !(hazard_mean > 0.0) {
            return None;
        }
        let weights = branch_hazard
            .iter()
            .zip(&norm_weights)
            .map(|(h, w)| h * w / hazard_mean)
            .collect();
        Some(Self { branch_names, weights, branch_hazard, hazard_mean })
    }
}

/// Hazard-adjusted branch weights of the IM family of `im` at `im_value`
pub fn compute_adj_branch_weights(
    ensemble: &Ensemble,
    im: &IM,
    im_value: f64,
    site: &SiteInfo,
) -> Result<AdjustedBranchWeights> {
    let im_ens = ensemble.check_station(im, &site.station_name)?;
    let branch_hazard = branch_hazard_at(ensemble, site, im, im_value)?;
    let names = im_ens.branches().iter().map(|b| b.name.clone()).collect();
    AdjustedBranchWeights::from_hazard(names, &im_ens.branch_weights(), branch_hazard).ok_or_else(|| {
        HazardError::ExceedanceOutOfRange {
            station: site.station_name.clone(),
            im: im.to_string(),
            exceedance: None,
            im_value: Some(im_value),
            branch: None,
        }
    })
}

fn branch_disagg_at(
    ensemble: &Ensemble,
    branch: &Branch,
    site: &SiteInfo,
    im: &IM,
    im_value: f64,
    distances: &AHashMap<RuptureId, SiteSourceDistance>,
) -> Result<BranchDisaggResult> {
    let catalog = ensemble.rupture_catalog()?;
    let data = ensemble.branch_im_data(branch, &site.station_name, &[*im])?;
    let column = data.column(im)?;

    let rupture_exceedance: Vec<f64> = data
        .ruptures
        .iter()
        .zip(column)
        .map(|(r, dist)| dist.exceedance(im_value) * r.annual_rec_prob)
        .collect();
    let total: f64 = rupture_exceedance.iter().sum();
    if !(total > 0.0) {
        return Err(HazardError::ExceedanceOutOfRange {
            station: site.station_name.clone(),
            im: im.to_string(),
            exceedance: None,
            im_value: Some(im_value),
            branch: Some(branch.name.clone()),
        });
    }

    let mut contributions = Vec::with_capacity(data.len());
    for ((rupture, dist), exceedance) in data.ruptures.iter().zip(column).zip(&rupture_exceedance) {
        let info = catalog.info(rupture.id).ok_or_else(|| {
            HazardError::InvariantViolation(format!("Rupture index {:?} missing from catalog", rupture.id))
        })?;
        contributions.push(RuptureContribution {
            rupture_id: rupture.id,
            rupture_name: info.name.clone(),
            source_type: rupture.source_type,
            magnitude: info.magnitude,
            rrup: distances.get(&rupture.id).map(|d| d.rrup),
            contribution: exceedance / total,
            epsilon: dist.epsilon(im_value),
        });
    }

    Ok(BranchDisaggResult {
        branch_name: branch.name.clone(),
        weight: branch.weight,
        im: *im,
        site: site.clone(),
        im_value,
        exceedance: total,
        contributions,
    })
}

/// Disaggregation of a single branch
///
/// An exceedance target is converted with the branch's own hazard curve.
pub fn run_branch_disagg(
    ensemble: &Ensemble,
    branch: &Branch,
    site: &SiteInfo,
    im: &IM,
    target: DisaggTarget,
) -> Result<BranchDisaggResult> {
    let im_value = match target {
        DisaggTarget::IMValue(v) => v,
        DisaggTarget::Exceedance(exceedance) => {
            run_branch_hazard(ensemble, branch, site, im, None)?.exceedance_to_im(exceedance)?
        }
    };
    let distances = ensemble.rupture_distances(&site.station_name)?;
    branch_disagg_at(ensemble, branch, site, im, im_value, &distances)
}

/// Ensemble disaggregation with hazard-adjusted branch weights
pub fn run_ensemble_disagg(
    ensemble: &Ensemble,
    site: &SiteInfo,
    im: &IM,
    target: DisaggTarget,
) -> Result<EnsembleDisaggResult> {
    let im_ens = ensemble.check_station(im, &site.station_name)?;
    let (im_value, target_exceedance) = match target {
        DisaggTarget::IMValue(v) => (v, None),
        DisaggTarget::Exceedance(exceedance) => {
            let hazard = run_ensemble_hazard(ensemble, site, im, None, false)?;
            (hazard.exceedance_to_im(exceedance)?, Some(exceedance))
        }
    };

    let distances = ensemble.rupture_distances(&site.station_name)?;
    let branches = im_ens
        .branches()
        .iter()
        .map(|b| branch_disagg_at(ensemble, b, site, im, im_value, &distances))
        .collect::<Result<Vec<_>>>()?;

    let adj = AdjustedBranchWeights::from_hazard(
        branches.iter().map(|b| b.branch_name.clone()).collect(),
        &im_ens.branch_weights(),
        branches.iter().map(|b| b.exceedance).collect(),
    )
    .ok_or_else(|| HazardError::ExceedanceOutOfRange {
        station: site.station_name.clone(),
        im: im.to_string(),
        exceedance: target_exceedance,
        im_value: Some(im_value),
        branch: None,
    })?;

    let contributions = combine_contributions(&branches, &adj.weights);

    tracing::debug!(
        ensemble = %ensemble.name,
        station = %site.station_name,
        %im,
        im_value,
        n_ruptures = contributions.len(),
        "Computed ensemble disaggregation"
    );

    Ok(EnsembleDisaggResult {
        ensemble_name: ensemble.name.clone(),
        im: *im,
        site: site.clone(),
        im_value,
        target_exceedance,
        exceedance: adj.hazard_mean,
        adj_branch_weights: adj.weights,
        branches,
        contributions,
    })
}

/// Sum branch contributions by rupture with the given (adjusted) weights
///
/// Epsilon is the contribution-weighted mean over branches containing the
/// rupture. Output is ordered by rupture index.
pub fn combine_contributions(branches: &[BranchDisaggResult], weights: &[f64]) -> Vec<RuptureContribution> {
    struct Acc {
        template: RuptureContribution,
        contribution: f64,
        eps_weighted: f64,
        eps_fallback: f64,
        fallback_weight: f64,
    }

    let mut by_rupture: AHashMap<RuptureId, Acc> = AHashMap::new();
    for (branch, &w) in branches.iter().zip(weights) {
        for c in &branch.contributions {
            let acc = by_rupture.entry(c.rupture_id).or_insert_with(|| Acc {
                template: c.clone(),
                contribution: 0.0,
                eps_weighted: 0.0,
                eps_fallback: 0.0,
                fallback_weight: 0.0,
            });
            acc.contribution += w * c.contribution;
            acc.eps_weighted += w * c.contribution * c.epsilon;
            acc.eps_fallback += w * c.epsilon;
            acc.fallback_weight += w;
        }
    }

    let mut combined: Vec<RuptureContribution> = by_rupture
        .into_values()
        .map(|acc| {
            let epsilon = if acc.contribution > 0.0 {
                acc.eps_weighted / acc.contribution
            } else if acc.fallback_weight > 0.0 {
                acc.eps_fallback / acc.fallback_weight
            } else {
                acc.template.epsilon
            };
            RuptureContribution { contribution: acc.contribution, epsilon, ..acc.template }
        })
        .collect();
    combined.sort_by_key(|c| c.rupture_id);
    combined
}
