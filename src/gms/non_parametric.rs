//! GCIM from simulation-based (non-parametric) IM data
//!
//! Simulations whose IMj lies close to im_j are kept with a truncated
//! Gaussian kernel weight in ln(IMj). Targets are the weighted empirical
//! CDFs of the kept simulations, and realisations resample them.

use rand::distributions::Distribution;
use rand::Rng;

use super::gcim::UniLnIMiIMj;
use super::realisations::{weighted_index, RealisationTable};
use crate::core::config::GMSConfig;
use crate::core::error::{HazardError, Result};
use crate::core::types::{RuptureId, IM};
use crate::tree::{BranchIMData, RuptureDist};

/// A simulation kept by the kernel
#[derive(Debug, Clone, PartialEq)]
pub struct KeptSimulation {
    pub rupture_id: RuptureId,
    /// IMi values in selection order
    pub values: Vec<f64>,
    pub weight: f64,
}

/// Kernel-weighted simulations of one branch and their marginals
#[derive(Debug, Clone, PartialEq)]
pub struct NonParametricBranch {
    pub branch_name: String,
    pub rupture_ids: Vec<RuptureId>,
    /// P(rupture | IMj = im_j), the normalised kernel mass of each rupture
    pub rupture_weights: Vec<f64>,
    pub simulations: Vec<KeptSimulation>,
    pub marginals: Vec<UniLnIMiIMj>,
}

fn samples<'a>(dist: &'a RuptureDist, im: &IM, branch: &str) -> Result<&'a [f64]> {
    match dist {
        RuptureDist::Samples(s) => Ok(s),
        RuptureDist::Parametric(_) => Err(HazardError::InvariantViolation(format!(
            "Non-parametric GCIM requires simulation data for {} in branch {}",
            im, branch
        ))),
    }
}

/// Kernel weights and target CDFs of one branch
pub fn compute_np_branch(
    data: &BranchIMData,
    im_j: &IM,
    im_j_value: f64,
    ims: &[IM],
    config: &GMSConfig,
) -> Result<NonParametricBranch> {
    let column_j = data.column(im_j)?;
    let columns_i = ims.iter().map(|im| data.column(im)).collect::<Result<Vec<_>>>()?;
    let ln_target = im_j_value.ln();

    let mut simulations = Vec::new();
    let mut rupture_weights = vec![0.0; data.len()];
    for (r, rupture) in data.ruptures.iter().enumerate() {
        let sims_j = samples(&column_j[r], im_j, &data.branch_name)?;
        let sims_i = ims
            .iter()
            .zip(&columns_i)
            .map(|(im, col)| samples(&col[r], im, &data.branch_name))
            .collect::<Result<Vec<_>>>()?;
        if let Some((im, _)) = ims.iter().zip(&sims_i).find(|(_, s)| s.len() != sims_j.len()) {
            return Err(HazardError::InvariantViolation(format!(
                "Simulations of {} and {} are not aligned in branch {}",
                im, im_j, data.branch_name
            )));
        }
        if sims_j.is_empty() {
            continue;
        }

        let per_sim_rate = rupture.annual_rec_prob / sims_j.len() as f64;
        for (k, &x) in sims_j.iter().enumerate() {
            if !(x > 0.0) {
                continue;
            }
            let u = (x.ln() - ln_target) / config.kernel_bandwidth;
            if u.abs() > config.kernel_truncation {
                continue;
            }
            let weight = per_sim_rate * (-0.5 * u * u).exp();
            rupture_weights[r] += weight;
            simulations.push(KeptSimulation {
                rupture_id: rupture.id,
                values: sims_i.iter().map(|s| s[k]).collect(),
                weight,
            });
        }
    }

    if simulations.len() < config.min_simulations {
        return Err(HazardError::InsufficientData {
            context: format!("non-parametric GCIM of branch {} at {} = {:.4e}", data.branch_name, im_j, im_j_value),
            available: simulations.len(),
            required: config.min_simulations,
        });
    }

    let total: f64 = rupture_weights.iter().sum();
    rupture_weights.iter_mut().for_each(|w| *w /= total);

    let weights: Vec<f64> = simulations.iter().map(|s| s.weight).collect();
    let marginals = ims
        .iter()
        .enumerate()
        .map(|(j, im)| {
            let values: Vec<f64> = simulations.iter().map(|s| s.values[j]).collect();
            UniLnIMiIMj::from_weighted_samples(*im, *im_j, &values, &weights)
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(
        branch = %data.branch_name,
        n_kept = simulations.len(),
        "Kernel-weighted simulations for non-parametric GCIM"
    );

    Ok(NonParametricBranch {
        branch_name: data.branch_name.clone(),
        rupture_ids: data.ruptures.iter().map(|r| r.id).collect(),
        rupture_weights,
        simulations,
        marginals,
    })
}

/// Resample kept simulations: a branch by `branch_weights`, then a
/// simulation by its kernel weight
pub fn generate_np_realisations<R: Rng>(
    ims: &[IM],
    branches: &[NonParametricBranch],
    branch_weights: &[f64],
    n_gms: usize,
    n_replica: usize,
    rng: &mut R,
) -> Result<Vec<RealisationTable>> {
    let branch_dist = weighted_index(branch_weights, "branch weights")?;
    let sim_dists = branches
        .iter()
        .map(|b| {
            let weights: Vec<f64> = b.simulations.iter().map(|s| s.weight).collect();
            weighted_index(&weights, &format!("simulation weights of branch {}", b.branch_name))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut replicas = Vec::with_capacity(n_replica);
    for _ in 0..n_replica {
        let mut table = RealisationTable::new(ims.to_vec());
        for _ in 0..n_gms {
            let b = branch_dist.sample(rng);
            let sim = &branches[b].simulations[sim_dists[b].sample(rng)];
            table.push(&branches[b].branch_name, sim.rupture_id, sim.values.clone());
        }
        replicas.push(table);
    }
    Ok(replicas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{IMType, SourceType};
    use crate::tree::BranchRupture;
    use std::collections::BTreeMap;

    fn branch_data(n_sims: usize) -> BranchIMData {
        let mut data = BranchIMData::new("sims");
        data.ruptures.push(BranchRupture { id: RuptureId(0), source_type: SourceType::Fault, annual_rec_prob: 1e-3 });
        // IMj spread evenly in ln space around 0.2
        let im_j: Vec<f64> = (0..n_sims)
            .map(|k| 0.2 * (0.4 * (k as f64 / (n_sims - 1) as f64 - 0.5)).exp())
            .collect();
        let pgv: Vec<f64> = im_j.iter().map(|v| 100.0 * v).collect();
        let mut values = BTreeMap::new();
        values.insert(IM::psa(1.0), vec![RuptureDist::Samples(im_j)]);
        values.insert(IM::new(IMType::PGV), vec![RuptureDist::Samples(pgv)]);
        data.values = values;
        data
    }

    #[test]
    fn test_kernel_keeps_simulations_near_target() {
        let data = branch_data(30);
        let np = compute_np_branch(&data, &IM::psa(1.0), 0.2, &[IM::new(IMType::PGV)], &GMSConfig::default()).unwrap();
        assert_eq!(np.simulations.len(), 30);
        assert!((np.rupture_weights[0] - 1.0).abs() < 1e-12);
        let median = np.marginals[0].quantile(0.5);
        assert!((median - 20.0).abs() < 2.0);
    }

    #[test]
    fn test_too_few_simulations_is_error() {
        let data = branch_data(10);
        let err =
            compute_np_branch(&data, &IM::psa(1.0), 0.2, &[IM::new(IMType::PGV)], &GMSConfig::default()).unwrap_err();
        assert!(matches!(err, HazardError::InsufficientData { available: 10, required: 20, .. }));
    }
}
