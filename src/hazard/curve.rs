//! Inversion of monotone (IM, exceedance) curves in log-log space

use crate::core::stats::interp;

/// Points of the curve with a positive exceedance, as (ln IM, ln exceedance)
fn positive_log_points(im_levels: &[f64], exceedance: &[f64]) -> (Vec<f64>, Vec<f64>) {
    im_levels
        .iter()
        .zip(exceedance)
        .filter(|(x, y)| **x > 0.0 && **y > 0.0)
        .map(|(x, y)| (x.ln(), y.ln()))
        .unzip()
}

/// IM value at which the curve reaches `exceedance`
///
/// `None` when `exceedance` lies outside the range spanned by the positive
/// part of the curve; no extrapolation is performed.
pub fn exceedance_to_im(im_levels: &[f64], exceedance: &[f64], target: f64) -> Option<f64> {
    if !(target > 0.0) {
        return None;
    }
    let (ln_x, ln_y) = positive_log_points(im_levels, exceedance);
    if ln_x.len() < 2 {
        return None;
    }

    // Exceedance decreases with IM; reverse so the abscissa increases
    let ys: Vec<f64> = ln_y.iter().rev().copied().collect();
    let xs: Vec<f64> = ln_x.iter().rev().copied().collect();
    let ln_target = target.ln();
    if ln_target < ys[0] || ln_target > ys[ys.len() - 1] {
        return None;
    }
    Some(interp(ln_target, &ys, &xs).exp())
}

/// Exceedance of the curve at `im_value`
///
/// `None` outside the IM levels of the curve. Between the last positive
/// exceedance and the first zero the curve is interpolated linearly.
pub fn im_to_exceedance(im_levels: &[f64], exceedance: &[f64], im_value: f64) -> Option<f64> {
    let (first, last) = (*im_levels.first()?, *im_levels.last()?);
    if !(im_value >= first && im_value <= last) || im_value <= 0.0 {
        return None;
    }

    let (ln_x, ln_y) = positive_log_points(im_levels, exceedance);
    if let (Some(&x_lo), Some(&x_hi)) = (ln_x.first(), ln_x.last()) {
        let ln_im = im_value.ln();
        if ln_im >= x_lo && ln_im <= x_hi {
            return Some(interp(ln_im, &ln_x, &ln_y).exp());
        }
    }
    Some(interp(im_value, im_levels, exceedance))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn power_curve() -> (Vec<f64>, Vec<f64>) {
        // exceedance = 1e-3 * im^-2, a straight line in log-log space
        let levels = vec![0.01, 0.1, 1.0, 10.0];
        let exc = levels.iter().map(|x: &f64| 1e-3 * x.powi(-2)).collect();
        (levels, exc)
    }

    #[test]
    fn test_log_log_inversion_is_exact_for_power_law() {
        let (levels, exc) = power_curve();
        let im = exceedance_to_im(&levels, &exc, 1e-3 * 0.5f64.powi(-2)).unwrap();
        assert!((im - 0.5).abs() < 1e-12);
        let e = im_to_exceedance(&levels, &exc, 0.5).unwrap();
        assert!((e - 4e-3).abs() < 1e-15);
    }

    #[test]
    fn test_out_of_range_is_none() {
        let (levels, exc) = power_curve();
        assert!(exceedance_to_im(&levels, &exc, 1e-20).is_none());
        assert!(exceedance_to_im(&levels, &exc, 100.0).is_none());
        assert!(im_to_exceedance(&levels, &exc, 20.0).is_none());
        assert!(im_to_exceedance(&levels, &exc, 0.001).is_none());
    }

    #[test]
    fn test_zero_tail_is_ignored_for_inversion() {
        let levels = vec![0.1, 1.0, 10.0];
        let exc = vec![1e-2, 1e-4, 0.0];
        assert!(exceedance_to_im(&levels, &exc, 1e-3).is_some());
        assert!(exceedance_to_im(&levels, &exc, 1e-5).is_none());
        assert_eq!(im_to_exceedance(&levels, &exc, 10.0), Some(0.0));
    }
}
