//! Residual-minimising selection and replica scoring

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use super::dataset::GMImTable;
use super::gcim::UniLnIMiIMj;
use super::realisations::RealisationTable;
use crate::core::error::{HazardError, Result};

/// Two-sided Kolmogorov-Smirnov statistic of `samples` against `cdf`
pub fn ks_statistic(samples: &[f64], cdf: impl Fn(f64) -> f64) -> f64 {
    if samples.is_empty() {
        return f64::NAN;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len() as f64;
    sorted
        .iter()
        .enumerate()
        .map(|(k, &x)| {
            let f = cdf(x);
            let above = (k + 1) as f64 / n - f;
            let below = f - k as f64 / n;
            above.max(below)
        })
        .fold(0.0, f64::max)
}

/// Asymptotic KS critical value for a sample of size `n` at significance
/// `alpha`
pub fn ks_critical_value(n: usize, alpha: f64) -> f64 {
    (-0.5 * (alpha / 2.0).ln()).sqrt() / (n as f64).sqrt()
}

/// For every realisation, the index of the candidate with the smallest
/// weighted squared ln misfit
///
/// Candidate and realisation tables must hold the same IMs in the same
/// order. Candidates with a non-positive IM value are never selected.
pub fn select_gms(pool: &GMImTable, realisations: &RealisationTable, weights: &[f64]) -> Result<Vec<usize>> {
    if pool.ims != realisations.ims || weights.len() != pool.ims.len() {
        return Err(HazardError::InvariantViolation(
            "Candidate pool, realisations and IM weights disagree on the IM vector".into(),
        ));
    }
    let ln_pool: Vec<Option<Vec<f64>>> = pool
        .values
        .iter()
        .map(|row| row.iter().map(|v| (*v > 0.0).then(|| v.ln())).collect())
        .collect();
    let n_usable = ln_pool.iter().filter(|r| r.is_some()).count();
    if n_usable == 0 {
        return Err(HazardError::InsufficientData {
            context: "ground motion selection (candidate pool)".into(),
            available: 0,
            required: 1,
        });
    }

    realisations
        .values
        .iter()
        .map(|row| {
            let ln_rel: Vec<f64> = row.iter().map(|v| v.ln()).collect();
            let best = ln_pool
                .iter()
                .enumerate()
                .filter_map(|(i, cand)| cand.as_ref().map(|c| (i, c)))
                .map(|(i, cand)| {
                    let misfit: f64 = cand
                        .iter()
                        .zip(&ln_rel)
                        .zip(weights)
                        .map(|((g, r), w)| w * (g - r).powi(2))
                        .sum();
                    (i, misfit)
                })
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(i, _)| i);
            best.ok_or_else(|| HazardError::InsufficientData {
                context: "ground motion selection (candidate pool)".into(),
                available: 0,
                required: 1,
            })
        })
        .collect()
}

/// Fit of one replica's selected set to the targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaScore {
    pub replica: usize,
    /// Indices into the candidate pool, one per realisation
    pub selected: Vec<usize>,
    /// KS statistic per IM
    pub ks: Vec<f64>,
    /// `R = sum_i w_i D_i^2`
    pub residual: f64,
    pub n_distinct: usize,
}

/// KS statistics of the selected set against every target, and their
/// weighted squared sum
pub fn score_replica(
    replica: usize,
    pool: &GMImTable,
    selected: Vec<usize>,
    targets: &[&UniLnIMiIMj],
    weights: &[f64],
) -> ReplicaScore {
    let ks: Vec<f64> = targets
        .iter()
        .enumerate()
        .map(|(j, target)| {
            let samples: Vec<f64> = selected.iter().map(|&i| pool.values[i][j]).collect();
            ks_statistic(&samples, |x| target.cdf_at(x))
        })
        .collect();
    let residual = ks.iter().zip(weights).map(|(d, w)| w * d * d).sum();
    let n_distinct = selected.iter().collect::<AHashSet<_>>().len();
    ReplicaScore { replica, selected, ks, residual, n_distinct }
}

/// Replica with the most distinct ground motions, ties broken by the
/// smallest residual
pub fn choose_replica(scores: &[ReplicaScore]) -> Option<&ReplicaScore> {
    scores.iter().min_by(|a, b| {
        b.n_distinct
            .cmp(&a.n_distinct)
            .then_with(|| a.residual.total_cmp(&b.residual))
    })
}
