//! Shared numerical helpers: normal distribution, interpolation, quantiles

use ordered_float::OrderedFloat;
use statrs::function::erf::{erfc, erfc_inv};

/// Standard normal CDF
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Standard normal survival function, accurate in the upper tail
pub fn norm_sf(x: f64) -> f64 {
    0.5 * erfc(x / std::f64::consts::SQRT_2)
}

/// Inverse of the standard normal CDF
pub fn norm_ppf(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    -std::f64::consts::SQRT_2 * erfc_inv(2.0 * p)
}

/// `n` values evenly spaced in log10 between `min` and `max` (inclusive)
pub fn logspace(min: f64, max: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![min];
    }
    let (lo, hi) = (min.log10(), max.log10());
    let step = (hi - lo) / (n - 1) as f64;
    (0..n).map(|i| 10f64.powf(lo + step * i as f64)).collect()
}

/// Piecewise-linear interpolation, clamped to the end values
///
/// `xp` must be non-decreasing.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    debug_assert_eq!(xp.len(), fp.len());
    if xp.is_empty() {
        return f64::NAN;
    }
    if x <= xp[0] {
        return fp[0];
    }
    let last = xp.len() - 1;
    if x >= xp[last] {
        return fp[last];
    }
    // First index with xp[i] > x
    let i = xp.partition_point(|&v| v <= x);
    let (x0, x1) = (xp[i - 1], xp[i]);
    let (y0, y1) = (fp[i - 1], fp[i]);
    if x1 == x0 {
        return y1;
    }
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

/// Linear-interpolated percentile of unweighted samples, `q` in [0, 100]
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by_key(|v| OrderedFloat(*v));
    let pos = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Quantile of a weighted sample, `q` in [0, 1]
///
/// Sorts the samples, builds the normalised cumulative weight curve and
/// inverts it by linear interpolation.
pub fn weighted_quantile(values: &[f64], weights: &[f64], q: f64) -> f64 {
    debug_assert_eq!(values.len(), weights.len());
    let mut pairs: Vec<(f64, f64)> = values
        .iter()
        .copied()
        .zip(weights.iter().copied())
        .filter(|(_, w)| *w > 0.0)
        .collect();
    if pairs.is_empty() {
        return f64::NAN;
    }
    pairs.sort_by_key(|(v, _)| OrderedFloat(*v));

    let total: f64 = pairs.iter().map(|(_, w)| w).sum();
    let mut cum = 0.0;
    let mut cdf = Vec::with_capacity(pairs.len());
    for (_, w) in &pairs {
        cum += w / total;
        cdf.push(cum);
    }
    let sorted_values: Vec<f64> = pairs.iter().map(|(v, _)| *v).collect();
    interp(q, &cdf, &sorted_values)
}

/// Weighted arithmetic mean; NaN when the weights sum to zero
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return f64::NAN;
    }
    values.iter().zip(weights).map(|(v, w)| v * w).sum::<f64>() / total
}

/// Empirical CDF of a set of realisations
///
/// Uses plotting positions k/(n+1) so that the CDF never reaches 0 or 1 inside
/// the observed range. Below the smallest sample the CDF is extrapolated
/// linearly down to (0, 0); above the largest sample it stays flat.
#[derive(Debug, Clone)]
pub struct EmpiricalCdf {
    values: Vec<f64>,
    probs: Vec<f64>,
}

impl EmpiricalCdf {
    pub fn new(samples: &[f64]) -> Self {
        let mut values = samples.to_vec();
        values.sort_by_key(|v| OrderedFloat(*v));
        let n = values.len() as f64;
        let probs = (1..=values.len()).map(|k| k as f64 / (n + 1.0)).collect();
        Self { values, probs }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn cdf(&self, x: f64) -> f64 {
        if self.values.is_empty() {
            return f64::NAN;
        }
        let (x0, p0) = (self.values[0], self.probs[0]);
        if x < x0 {
            if x <= 0.0 || x0 <= 0.0 {
                return 0.0;
            }
            return p0 * x / x0;
        }
        interp(x, &self.values, &self.probs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_functions() {
        assert!((norm_cdf(0.0) - 0.5).abs() < 1e-12);
        assert!((norm_cdf(1.0) - 0.841_344_746).abs() < 1e-8);
        assert!((norm_sf(1.0) - 0.158_655_254).abs() < 1e-8);
        assert!((norm_ppf(0.975) - 1.959_963_985).abs() < 1e-7);
        assert!((norm_ppf(norm_cdf(-2.3)) + 2.3).abs() < 1e-9);
    }

    #[test]
    fn test_logspace_endpoints() {
        let v = logspace(1e-3, 10.0, 5);
        assert_eq!(v.len(), 5);
        assert!((v[0] - 1e-3).abs() < 1e-15);
        assert!((v[4] - 10.0).abs() < 1e-12);
        assert!((v[1] - 1e-2).abs() < 1e-14);
    }

    #[test]
    fn test_interp_clamps() {
        let xp = [0.0, 1.0, 2.0];
        let fp = [0.0, 10.0, 30.0];
        assert_eq!(interp(-1.0, &xp, &fp), 0.0);
        assert_eq!(interp(0.5, &xp, &fp), 5.0);
        assert_eq!(interp(1.5, &xp, &fp), 20.0);
        assert_eq!(interp(3.0, &xp, &fp), 30.0);
    }

    #[test]
    fn test_percentile_matches_linear_definition() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 50.0), 2.5);
        assert_eq!(percentile(&values, 100.0), 4.0);
    }

    #[test]
    fn test_weighted_quantile_equal_weights() {
        let values = [1.0, 2.0, 3.0, 4.0];
        let weights = [0.25; 4];
        assert_eq!(weighted_quantile(&values, &weights, 0.5), 2.0);
        assert_eq!(weighted_quantile(&values, &weights, 0.0), 1.0);
        assert_eq!(weighted_quantile(&values, &weights, 1.0), 4.0);
    }

    #[test]
    fn test_weighted_quantile_skewed_weights() {
        let values = [10.0, 20.0];
        let weights = [0.9, 0.1];
        assert_eq!(weighted_quantile(&values, &weights, 0.5), 10.0);
        assert!((weighted_quantile(&values, &weights, 0.95) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_empirical_cdf_boundaries() {
        let ecdf = EmpiricalCdf::new(&[0.2, 0.4, 0.6]);
        assert_eq!(ecdf.cdf(0.0), 0.0);
        assert!((ecdf.cdf(0.1) - 0.125).abs() < 1e-12);
        assert!((ecdf.cdf(0.2) - 0.25).abs() < 1e-12);
        assert!((ecdf.cdf(0.5) - 0.625).abs() < 1e-12);
        assert!((ecdf.cdf(5.0) - 0.75).abs() < 1e-12);
    }
}
