//! Monte-Carlo realisations of the IMi vector given IMj = im_j

use nalgebra::{DMatrix, DVector};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;

use super::gcim::BranchGCIM;
use crate::core::error::{HazardError, Result};
use crate::core::types::{RuptureId, IM};

/// One replica of `n_gms` realisations, one row per realisation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealisationTable {
    pub ims: Vec<IM>,
    pub values: Vec<Vec<f64>>,
    /// Branch each realisation was drawn from
    pub branches: Vec<String>,
    /// Rupture each realisation was drawn from
    pub ruptures: Vec<RuptureId>,
}

impl RealisationTable {
    pub fn new(ims: Vec<IM>) -> Self {
        Self { ims, values: Vec::new(), branches: Vec::new(), ruptures: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn push(&mut self, branch: &str, rupture: RuptureId, row: Vec<f64>) {
        self.branches.push(branch.to_string());
        self.ruptures.push(rupture);
        self.values.push(row);
    }

    pub fn column(&self, j: usize) -> Vec<f64> {
        self.values.iter().map(|row| row[j]).collect()
    }
}

pub(crate) fn weighted_index(weights: &[f64], context: &str) -> Result<WeightedIndex<f64>> {
    WeightedIndex::new(weights.iter().copied())
        .map_err(|e| HazardError::InvalidWeights(format!("{}: {}", context, e)))
}

/// Draw `n_replica` tables of `n_gms` correlated realisations
///
/// Each realisation samples a branch by `branch_weights`, a rupture by the
/// branch's rupture weights and a vector of standard normals correlated by
/// the lower Cholesky factor `chol`, mapped through the rupture's
/// conditional lognormals.
pub fn generate_realisations<R: Rng>(
    ims: &[IM],
    branches: &[BranchGCIM],
    branch_weights: &[f64],
    chol: &DMatrix<f64>,
    n_gms: usize,
    n_replica: usize,
    rng: &mut R,
) -> Result<Vec<RealisationTable>> {
    let n_ims = ims.len();
    if chol.nrows() != n_ims || chol.ncols() != n_ims {
        return Err(HazardError::InvariantViolation(format!(
            "Correlation factor is {}x{} for {} IMs",
            chol.nrows(),
            chol.ncols(),
            n_ims
        )));
    }
    if let Some(b) = branches.iter().find(|b| b.conditionals.len() != n_ims) {
        return Err(HazardError::InvariantViolation(format!(
            "Branch {} has {} conditionals for {} IMs",
            b.branch_name,
            b.conditionals.len(),
            n_ims
        )));
    }

    let branch_dist = weighted_index(branch_weights, "branch weights")?;
    let rupture_dists = branches
        .iter()
        .map(|b| weighted_index(&b.rupture_weights, &format!("rupture weights of branch {}", b.branch_name)))
        .collect::<Result<Vec<_>>>()?;
    let normal = Normal::new(0.0, 1.0).map_err(|e| HazardError::Numerical(e.to_string()))?;

    let mut replicas = Vec::with_capacity(n_replica);
    for _ in 0..n_replica {
        let mut table = RealisationTable::new(ims.to_vec());
        for _ in 0..n_gms {
            let b = branch_dist.sample(rng);
            let branch = &branches[b];
            let r = rupture_dists[b].sample(rng);

            let u = DVector::from_iterator(n_ims, (0..n_ims).map(|_| normal.sample(rng)));
            let z = chol * u;
            let row = branch
                .conditionals
                .iter()
                .zip(z.iter())
                .map(|(cond, z_i)| (cond.mu[r] + cond.sigma[r] * z_i).exp())
                .collect();
            table.push(&branch.branch_name, branch.rupture_ids[r], row);
        }
        replicas.push(table);
    }
    Ok(replicas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::IMType;
    use crate::gms::gcim::UniLnIMiIMjRup;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn branch(name: &str, mu: f64) -> BranchGCIM {
        let cond = |im: IM| UniLnIMiIMjRup {
            im_i: im,
            im_j: IM::psa(1.0),
            rupture_ids: vec![RuptureId(0), RuptureId(1)],
            mu: vec![mu, mu + 1.0],
            sigma: vec![0.3, 0.3],
        };
        BranchGCIM {
            branch_name: name.into(),
            rupture_ids: vec![RuptureId(0), RuptureId(1)],
            rupture_weights: vec![1.0, 0.0],
            conditionals: vec![cond(IM::new(IMType::PGA)), cond(IM::psa(0.2))],
            marginals: vec![],
        }
    }

    #[test]
    fn test_realisations_are_reproducible_and_shaped() {
        let ims = vec![IM::new(IMType::PGA), IM::psa(0.2)];
        let branches = vec![branch("a", -2.0), branch("b", -1.0)];
        let chol = DMatrix::<f64>::identity(2, 2);

        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let first = generate_realisations(&ims, &branches, &[0.5, 0.5], &chol, 15, 3, &mut rng).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let second = generate_realisations(&ims, &branches, &[0.5, 0.5], &chol, 15, 3, &mut rng).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert!(first.iter().all(|t| t.len() == 15 && t.values.iter().all(|r| r.len() == 2)));
        // Zero-weight rupture is never drawn
        assert!(first.iter().flat_map(|t| &t.ruptures).all(|r| *r == RuptureId(0)));
    }

    #[test]
    fn test_zero_branch_weights_are_rejected() {
        let ims = vec![IM::new(IMType::PGA), IM::psa(0.2)];
        let branches = vec![branch("a", -2.0)];
        let chol = DMatrix::<f64>::identity(2, 2);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(generate_realisations(&ims, &branches, &[0.0], &chol, 5, 1, &mut rng).is_err());
    }
}
