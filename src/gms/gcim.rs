//! Generalised conditional intensity measure (GCIM) distributions
//!
//! `UniLnIMiIMjRup` is the lognormal distribution of IMi given IMj = im_j for
//! every rupture of a branch; `UniLnIMiIMj` is the marginal CDF of IMi given
//! IMj, obtained by summing the rupture conditionals with the rupture weights
//! and then combining branches.

use serde::{Deserialize, Serialize};

use crate::core::error::{HazardError, Result};
use crate::core::stats::{interp, norm_cdf};
use crate::core::types::{RuptureId, IM};
use crate::data::LnIMParams;
use crate::tree::{BranchIMData, RuptureDist};

/// P(rupture | IMj = im_j) for every rupture of a branch
///
/// Uses the finite difference of the rupture exceedance rates at `im_j` and
/// `im_j * (1 + delta_ratio)`, normalised to one. `None` when no rupture
/// contributes at this level.
pub fn compute_rupture_weights(
    data: &BranchIMData,
    im_j: &IM,
    im_j_value: f64,
    delta_ratio: f64,
) -> Result<Option<Vec<f64>>> {
    let column = data.column(im_j)?;
    let upper = im_j_value * (1.0 + delta_ratio);
    let mut weights: Vec<f64> = data
        .ruptures
        .iter()
        .zip(column)
        .map(|(r, dist)| ((dist.exceedance(im_j_value) - dist.exceedance(upper)) * r.annual_rec_prob).max(0.0))
        .collect();
    let total: f64 = weights.iter().sum();
    if !(total > 0.0) {
        return Ok(None);
    }
    weights.iter_mut().for_each(|w| *w /= total);
    Ok(Some(weights))
}

/// Conditional lognormal of ln(IMi) | IMj = im_j per rupture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniLnIMiIMjRup {
    pub im_i: IM,
    pub im_j: IM,
    pub rupture_ids: Vec<RuptureId>,
    pub mu: Vec<f64>,
    pub sigma: Vec<f64>,
}

fn parametric_column<'a>(data: &'a BranchIMData, im: &IM) -> Result<Vec<&'a LnIMParams>> {
    data.column(im)?
        .iter()
        .map(|dist| match dist {
            RuptureDist::Parametric(params) => Ok(params),
            RuptureDist::Samples(_) => Err(HazardError::InvariantViolation(format!(
                "Parametric GCIM requires parametric data for {} in branch {}",
                im, data.branch_name
            ))),
        })
        .collect()
}

/// Shift every rupture's ln(IMi) by its IMj residual
///
/// `mu = mu_i + sigma_i * rho * eps_j`, `sigma = sigma_i * sqrt(1 - rho^2)`
/// where `eps_j` is the residual of `im_j` under the rupture's IMj
/// distribution.
pub fn compute_lnimi_imj_rup(
    data: &BranchIMData,
    im_i: &IM,
    im_j: &IM,
    im_j_value: f64,
    rho: f64,
) -> Result<UniLnIMiIMjRup> {
    let params_i = parametric_column(data, im_i)?;
    let params_j = parametric_column(data, im_j)?;
    let cond_scale = (1.0 - rho * rho).max(0.0).sqrt();

    let (mu, sigma) = params_i
        .iter()
        .zip(&params_j)
        .map(|(pi, pj)| {
            let eps_j = pj.epsilon(im_j_value);
            (pi.mu + pi.sigma * rho * eps_j, pi.sigma * cond_scale)
        })
        .unzip();

    Ok(UniLnIMiIMjRup {
        im_i: *im_i,
        im_j: *im_j,
        rupture_ids: data.ruptures.iter().map(|r| r.id).collect(),
        mu,
        sigma,
    })
}

/// Marginal CDF of IMi | IMj, tabulated on increasing IM values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniLnIMiIMj {
    pub im_i: IM,
    pub im_j: IM,
    pub values: Vec<f64>,
    pub cdf: Vec<f64>,
}

impl UniLnIMiIMj {
    /// Weighted empirical CDF of IMi samples
    pub fn from_weighted_samples(im_i: IM, im_j: IM, samples: &[f64], weights: &[f64]) -> Result<Self> {
        let mut pairs: Vec<(f64, f64)> = samples
            .iter()
            .copied()
            .zip(weights.iter().copied())
            .filter(|(v, w)| *w > 0.0 && v.is_finite())
            .collect();
        let total: f64 = pairs.iter().map(|(_, w)| w).sum();
        if pairs.is_empty() || !(total > 0.0) {
            return Err(HazardError::InsufficientData {
                context: format!("target distribution of {}", im_i),
                available: 0,
                required: 1,
            });
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut values: Vec<f64> = Vec::with_capacity(pairs.len());
        let mut cdf: Vec<f64> = Vec::with_capacity(pairs.len());
        let mut cum = 0.0;
        for (v, w) in pairs {
            cum += w / total;
            match values.last() {
                Some(&last) if last == v => {
                    if let Some(c) = cdf.last_mut() {
                        *c = cum;
                    }
                }
                _ => {
                    values.push(v);
                    cdf.push(cum);
                }
            }
        }
        Ok(Self { im_i, im_j, values, cdf })
    }

    /// P(IMi <= x | IMj)
    pub fn cdf_at(&self, x: f64) -> f64 {
        match (self.values.first(), self.values.last()) {
            (Some(&lo), Some(&hi)) => {
                if x < lo {
                    0.0
                } else if x >= hi {
                    1.0
                } else {
                    interp(x, &self.values, &self.cdf)
                }
            }
            _ => f64::NAN,
        }
    }

    /// IM value at probability `p`
    pub fn quantile(&self, p: f64) -> f64 {
        interp(p, &self.cdf, &self.values)
    }
}

fn ln_grid(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![lo];
    }
    let step = (hi - lo) / (n - 1) as f64;
    (0..n).map(|i| lo + step * i as f64).collect()
}

/// Marginal IMi | IMj of one branch from its rupture conditionals
///
/// The CDF is evaluated on `n_points` values, evenly spaced in ln(IM), spanning
/// `n_sigma` standard deviations either side of the weighted ruptures.
pub fn compute_lnimi_imj(
    rup: &UniLnIMiIMjRup,
    rupture_weights: &[f64],
    n_points: usize,
    n_sigma: f64,
) -> Result<UniLnIMiIMj> {
    if rupture_weights.len() != rup.mu.len() {
        return Err(HazardError::InvariantViolation(format!(
            "{} rupture weights for {} ruptures",
            rupture_weights.len(),
            rup.mu.len()
        )));
    }
    let active: Vec<(f64, f64, f64)> = rup
        .mu
        .iter()
        .zip(&rup.sigma)
        .zip(rupture_weights)
        .filter(|(_, w)| **w > 0.0)
        .map(|((m, s), w)| (*m, *s, *w))
        .collect();
    let total: f64 = active.iter().map(|(_, _, w)| w).sum();
    if active.is_empty() || !(total > 0.0) {
        return Err(HazardError::InsufficientData {
            context: format!("GCIM of {} (weighted ruptures)", rup.im_i),
            available: 0,
            required: 1,
        });
    }

    let lo = active.iter().map(|(m, s, _)| m - n_sigma * s).fold(f64::INFINITY, f64::min);
    let mut hi = active.iter().map(|(m, s, _)| m + n_sigma * s).fold(f64::NEG_INFINITY, f64::max);
    if hi <= lo {
        hi = lo + 1e-6;
    }

    let grid = ln_grid(lo, hi, n_points);
    let cdf = grid
        .iter()
        .map(|&x| {
            active
                .iter()
                .map(|&(m, s, w)| {
                    let p = if s > 0.0 {
                        norm_cdf((x - m) / s)
                    } else if x >= m {
                        1.0
                    } else {
                        0.0
                    };
                    w * p
                })
                .sum::<f64>()
                / total
        })
        .collect();

    Ok(UniLnIMiIMj { im_i: rup.im_i, im_j: rup.im_j, values: grid.iter().map(|x| x.exp()).collect(), cdf })
}

/// Weighted combination of branch marginals onto a common ln(IM) grid
pub fn comb_lnimi_imj(branches: &[UniLnIMiIMj], weights: &[f64]) -> Result<UniLnIMiIMj> {
    let first = branches.first().ok_or_else(|| HazardError::InsufficientData {
        context: "GCIM branch combination".into(),
        available: 0,
        required: 1,
    })?;
    if branches.len() != weights.len() {
        return Err(HazardError::InvariantViolation(format!(
            "{} weights for {} GCIM branches",
            weights.len(),
            branches.len()
        )));
    }
    if let Some(other) = branches.iter().find(|b| b.im_i != first.im_i) {
        return Err(HazardError::InvariantViolation(format!(
            "Cannot combine GCIM of {} with {}",
            first.im_i, other.im_i
        )));
    }
    let total: f64 = weights.iter().sum();
    if !(total > 0.0) {
        return Err(HazardError::InvalidWeights("GCIM branch weights sum to zero".into()));
    }

    let lo = branches.iter().filter_map(|b| b.values.first()).fold(f64::INFINITY, |a, v| a.min(*v));
    let hi = branches.iter().filter_map(|b| b.values.last()).fold(f64::NEG_INFINITY, |a, v| a.max(*v));
    let n = branches.iter().map(|b| b.values.len()).max().unwrap_or(0);
    if !(lo > 0.0) || !(hi >= lo) || n == 0 {
        return Err(HazardError::Numerical(format!("Invalid GCIM support for {}", first.im_i)));
    }

    let values: Vec<f64> = ln_grid(lo.ln(), hi.ln(), n).into_iter().map(f64::exp).collect();
    let cdf = values
        .iter()
        .map(|&x| {
            branches
                .iter()
                .zip(weights)
                .map(|(b, w)| w * b.cdf_at(x))
                .sum::<f64>()
                / total
        })
        .collect();

    Ok(UniLnIMiIMj { im_i: first.im_i, im_j: first.im_j, values, cdf })
}

/// Everything the parametric realisation sampler needs from one branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchGCIM {
    pub branch_name: String,
    pub rupture_ids: Vec<RuptureId>,
    /// P(rupture | IMj = im_j)
    pub rupture_weights: Vec<f64>,
    /// Rupture conditionals, one per IMi in selection order
    pub conditionals: Vec<UniLnIMiIMjRup>,
    /// Branch marginals, one per IMi in selection order
    pub marginals: Vec<UniLnIMiIMj>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{IMType, SourceType};
    use crate::tree::BranchRupture;
    use std::collections::BTreeMap;

    fn branch_data() -> BranchIMData {
        let mut data = BranchIMData::new("b1");
        for (i, rate) in [1e-3, 5e-4].iter().enumerate() {
            data.ruptures.push(BranchRupture {
                id: RuptureId(i as u32),
                source_type: SourceType::Fault,
                annual_rec_prob: *rate,
            });
        }
        let mut values = BTreeMap::new();
        values.insert(
            IM::psa(1.0),
            vec![
                RuptureDist::Parametric(LnIMParams::new((0.1f64).ln(), 0.6)),
                RuptureDist::Parametric(LnIMParams::new((0.3f64).ln(), 0.6)),
            ],
        );
        values.insert(
            IM::new(IMType::PGA),
            vec![
                RuptureDist::Parametric(LnIMParams::new((0.2f64).ln(), 0.5)),
                RuptureDist::Parametric(LnIMParams::new((0.4f64).ln(), 0.5)),
            ],
        );
        data.values = values;
        data
    }

    #[test]
    fn test_rupture_weights_normalised() {
        let data = branch_data();
        let weights = compute_rupture_weights(&data, &IM::psa(1.0), 0.3, 0.001).unwrap().unwrap();
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(weights.iter().all(|w| *w > 0.0));
    }

    #[test]
    fn test_conditional_mean_shifts_with_residual() {
        let data = branch_data();
        let rup = compute_lnimi_imj_rup(&data, &IM::new(IMType::PGA), &IM::psa(1.0), 0.3, 0.5).unwrap();
        // Rupture 1 has zero residual at its median, rupture 0 a positive one
        assert!((rup.mu[1] - (0.4f64).ln()).abs() < 1e-12);
        assert!(rup.mu[0] > (0.2f64).ln());
        assert!((rup.sigma[0] - 0.5 * (0.75f64).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_marginal_is_monotone_cdf() {
        let data = branch_data();
        let rup = compute_lnimi_imj_rup(&data, &IM::new(IMType::PGA), &IM::psa(1.0), 0.3, 0.5).unwrap();
        let dist = compute_lnimi_imj(&rup, &[0.3, 0.7], 200, 4.0).unwrap();
        assert!(dist.cdf.windows(2).all(|w| w[0] <= w[1]));
        assert!(dist.cdf[0] < 1e-3 && dist.cdf[dist.cdf.len() - 1] > 0.999);
        let median = dist.quantile(0.5);
        assert!((dist.cdf_at(median) - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_combination_of_identical_branches_is_identity() {
        let data = branch_data();
        let rup = compute_lnimi_imj_rup(&data, &IM::new(IMType::PGA), &IM::psa(1.0), 0.3, 0.5).unwrap();
        let dist = compute_lnimi_imj(&rup, &[0.5, 0.5], 100, 4.0).unwrap();
        let comb = comb_lnimi_imj(&[dist.clone(), dist.clone()], &[0.2, 0.8]).unwrap();
        for x in [0.1, 0.3, 0.6] {
            assert!((comb.cdf_at(x) - dist.cdf_at(x)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_weighted_samples_cdf_reaches_one() {
        let dist = UniLnIMiIMj::from_weighted_samples(
            IM::new(IMType::PGV),
            IM::psa(1.0),
            &[3.0, 1.0, 2.0, 2.0],
            &[1.0, 1.0, 1.0, 1.0],
        )
        .unwrap();
        assert_eq!(dist.values, vec![1.0, 2.0, 3.0]);
        assert!((dist.cdf[1] - 0.75).abs() < 1e-12);
        assert_eq!(dist.cdf_at(0.5), 0.0);
        assert_eq!(dist.cdf_at(3.0), 1.0);
    }
}
