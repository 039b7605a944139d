//! Hazard engine: per-branch exceedance curves and their weighted combination
//!
//! For each rupture the probability of exceeding an IM level is multiplied by
//! the rupture's annual recurrence probability and summed, split into fault
//! and distributed-seismicity totals. Ensemble curves are the normalised
//! weighted mean of the branch curves.

pub mod curve;
pub mod result;

use crate::core::config::EngineConfig;
use crate::core::error::{HazardError, Result};
use crate::core::stats::{logspace, weighted_quantile};
use crate::core::types::{SiteInfo, SourceType, IM};
use crate::tree::{Branch, BranchIMData, Ensemble};

pub use result::{BranchHazardResult, EnsembleHazardResult, HazardPercentiles};

/// Log-spaced IM levels for an IM, from the engine configuration
pub fn default_im_levels(im: &IM, config: &EngineConfig) -> Vec<f64> {
    let (lo, hi) = config.hazard.im_level_range(im.im_type);
    logspace(lo, hi, config.hazard.n_im_levels)
}

fn check_im_levels(im_levels: &[f64]) -> Result<()> {
    if im_levels.is_empty() {
        return Err(HazardError::InvalidConfig("No IM levels given".into()));
    }
    if im_levels.iter().any(|v| !(*v > 0.0)) || im_levels.windows(2).any(|w| w[0] >= w[1]) {
        return Err(HazardError::InvalidConfig(
            "IM levels must be positive and strictly increasing".into(),
        ));
    }
    Ok(())
}

/// Fault and distributed exceedance curves of one branch's IM column
pub fn hazard_curve(data: &BranchIMData, im: &IM, im_levels: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
    let column = data.column(im)?;
    let mut fault = vec![0.0; im_levels.len()];
    let mut distributed = vec![0.0; im_levels.len()];

    for (rupture, dist) in data.ruptures.iter().zip(column) {
        let target = match rupture.source_type {
            SourceType::Fault => &mut fault,
            SourceType::Distributed => &mut distributed,
        };
        for (acc, &level) in target.iter_mut().zip(im_levels) {
            *acc += dist.exceedance(level) * rupture.annual_rec_prob;
        }
    }
    Ok((fault, distributed))
}

/// Hazard curve of a single branch
pub fn run_branch_hazard(
    ensemble: &Ensemble,
    branch: &Branch,
    site: &SiteInfo,
    im: &IM,
    im_levels: Option<&[f64]>,
) -> Result<BranchHazardResult> {
    ensemble.check_station(im, &site.station_name)?;
    let im_levels = match im_levels {
        Some(levels) => levels.to_vec(),
        None => default_im_levels(im, ensemble.config()),
    };
    check_im_levels(&im_levels)?;

    let data = ensemble.branch_im_data(branch, &site.station_name, &[*im])?;
    let (fault, distributed) = hazard_curve(&data, im, &im_levels)?;

    Ok(BranchHazardResult {
        branch_name: branch.name.clone(),
        weight: branch.weight,
        im: *im,
        site: site.clone(),
        im_levels,
        fault,
        distributed,
    })
}

/// Weighted ensemble hazard, optionally with percentiles across branches
pub fn run_ensemble_hazard(
    ensemble: &Ensemble,
    site: &SiteInfo,
    im: &IM,
    im_levels: Option<&[f64]>,
    calc_percentiles: bool,
) -> Result<EnsembleHazardResult> {
    let im_ens = ensemble.check_station(im, &site.station_name)?;
    let im_levels = match im_levels {
        Some(levels) => levels.to_vec(),
        None => default_im_levels(im, ensemble.config()),
    };

    let branches = im_ens
        .branches()
        .iter()
        .map(|b| run_branch_hazard(ensemble, b, site, im, Some(&im_levels)))
        .collect::<Result<Vec<_>>>()?;
    let weights = im_ens.normalised_weights();

    let n = im_levels.len();
    let mut fault = vec![0.0; n];
    let mut distributed = vec![0.0; n];
    for (branch, w) in branches.iter().zip(&weights) {
        for i in 0..n {
            fault[i] += w * branch.fault[i];
            distributed[i] += w * branch.distributed[i];
        }
    }

    let percentiles = calc_percentiles.then(|| {
        let (lo_p, hi_p) = ensemble.config().hazard.percentiles;
        let totals: Vec<Vec<f64>> = branches.iter().map(|b| b.total()).collect();
        let at_level = |i: usize, p: f64| {
            let samples: Vec<f64> = totals.iter().map(|t| t[i]).collect();
            weighted_quantile(&samples, &weights, p / 100.0)
        };
        HazardPercentiles {
            lower_percentile: lo_p,
            upper_percentile: hi_p,
            lower: (0..n).map(|i| at_level(i, lo_p)).collect(),
            upper: (0..n).map(|i| at_level(i, hi_p)).collect(),
        }
    });

    tracing::debug!(
        ensemble = %ensemble.name,
        station = %site.station_name,
        %im,
        n_branches = branches.len(),
        "Computed ensemble hazard"
    );

    Ok(EnsembleHazardResult {
        ensemble_name: ensemble.name.clone(),
        im: *im,
        site: site.clone(),
        im_levels,
        fault,
        distributed,
        branches,
        percentiles,
    })
}

/// Exact total exceedance of every branch of an IM family at a single IM value
pub fn branch_hazard_at(ensemble: &Ensemble, site: &SiteInfo, im: &IM, im_value: f64) -> Result<Vec<f64>> {
    let im_ens = ensemble.check_station(im, &site.station_name)?;
    im_ens
        .branches()
        .iter()
        .map(|b| {
            run_branch_hazard(ensemble, b, site, im, Some(&[im_value]))
                .map(|r| r.fault[0] + r.distributed[0])
        })
        .collect()
}
