//! Empirical inter-IM correlation models and the conditional correlation
//! matrix of the IMi vector given IMj
//!
//! - pSA / pSA (and PGA, as pSA at 0.01s): Baker & Jayaram (2008)
//! - PGV, CAV, Ds575, Ds595 against pSA: Bradley's piecewise tanh models
//! - Scalar IM pairs: constant coefficients
//!
//! Arias intensity has no model and is rejected.

use nalgebra::{DMatrix, SymmetricEigen};

use crate::core::error::{HazardError, Result};
use crate::core::types::{IMType, IM};

/// Smallest eigenvalue kept by the nearest positive-definite correction
const MIN_EIGENVALUE: f64 = 1e-6;

/// Baker & Jayaram (2008) correlation between spectral ordinates
pub fn baker_jayaram_2008(t1: f64, t2: f64) -> f64 {
    let t_min = t1.min(t2);
    let t_max = t1.max(t2);

    let c1 = 1.0 - (std::f64::consts::FRAC_PI_2 - 0.366 * (t_max / t_min.max(0.109)).ln()).cos();
    let c2 = if t_max < 0.2 {
        1.0 - 0.105 * (1.0 - 1.0 / (1.0 + (100.0 * t_max - 5.0).exp())) * (t_max - t_min) / (t_max - 0.0099)
    } else {
        0.0
    };
    let c3 = if t_max < 0.109 { c2 } else { c1 };
    let c4 = c1 + 0.5 * (c3.sqrt() - c3) * (1.0 + (std::f64::consts::PI * t_min / 0.109).cos());

    if t_max < 0.109 {
        c2
    } else if t_min > 0.109 {
        c1
    } else if t_max < 0.2 {
        c2.min(c4)
    } else {
        c4
    }
}

/// One segment of a piecewise tanh model, valid for `t < c`
#[derive(Debug, Clone, Copy)]
struct TanhSegment {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
}

const fn seg(a: f64, b: f64, c: f64, d: f64) -> TanhSegment {
    TanhSegment { a, b, c, d }
}

const PGV_PSA: [TanhSegment; 4] = [
    seg(0.73, 0.54, 0.045, 1.8),
    seg(0.54, 0.81, 0.28, 1.5),
    seg(0.80, 0.76, 1.1, 3.0),
    seg(0.76, 0.70, 5.0, 3.2),
];

const CAV_PSA: [TanhSegment; 3] = [
    seg(0.698, 0.79, 0.2, 1.0),
    seg(0.79, 0.72, 1.5, 1.4),
    seg(0.72, 0.56, 10.0, 2.0),
];

const DS575_PSA: [TanhSegment; 5] = [
    seg(-0.45, -0.39, 0.09, 0.0),
    seg(-0.39, -0.39, 0.30, 0.0),
    seg(-0.39, -0.06, 1.40, 1.5),
    seg(-0.06, 0.16, 6.50, 2.0),
    seg(0.16, 0.00, 10.0, 1.5),
];

const DS595_PSA: [TanhSegment; 6] = [
    seg(-0.41, -0.41, 0.04, 0.0),
    seg(-0.41, -0.38, 0.08, 3.0),
    seg(-0.38, -0.35, 0.26, 3.2),
    seg(-0.35, -0.02, 1.40, 1.4),
    seg(-0.02, 0.23, 6.00, 1.6),
    seg(0.23, 0.02, 10.0, 1.8),
];

/// Lower period bound of the first segment of every tanh model
const TANH_T0: f64 = 0.01;

fn tanh_model(segments: &[TanhSegment], period: f64) -> f64 {
    let mut lower = TANH_T0;
    let mut chosen = segments[segments.len() - 1];
    for s in segments {
        if period < s.c {
            chosen = *s;
            break;
        }
        lower = s.c;
    }
    let ratio = (period.max(TANH_T0) / lower).ln();
    (chosen.a + chosen.b) / 2.0 - (chosen.a - chosen.b) / 2.0 * (chosen.d * ratio).tanh()
}

/// Correlation between two non-spectral IM types
fn scalar_correlation(a: IMType, b: IMType) -> Option<f64> {
    use IMType::*;
    let rho = match (a.min(b), a.max(b)) {
        (PGA, PGV) => 0.733,
        (PGA, CAV) => 0.698,
        (PGA, Ds575) => -0.442,
        (PGA, Ds595) => -0.405,
        (PGV, CAV) => 0.691,
        (PGV, Ds575) => -0.259,
        (PGV, Ds595) => -0.211,
        (CAV, Ds575) => 0.077,
        (CAV, Ds595) => 0.163,
        (Ds575, Ds595) => 0.843,
        _ => return None,
    };
    Some(rho)
}

fn unsupported(im: &IM) -> HazardError {
    HazardError::UnsupportedIM { im: im.to_string(), context: "the IM correlation models".into() }
}

/// Correlation coefficient between the within-event residuals of two IMs
pub fn get_im_correlation(im1: &IM, im2: &IM) -> Result<f64> {
    for im in [im1, im2] {
        if im.im_type == IMType::AI {
            return Err(unsupported(im));
        }
    }
    if im1.im_type == im2.im_type && im1.period == im2.period {
        return Ok(1.0);
    }

    let spectral = |im: &IM| im.is_psa() || im.im_type == IMType::PGA;
    if spectral(im1) && spectral(im2) {
        let t1 = im1.correlation_period().ok_or_else(|| unsupported(im1))?;
        let t2 = im2.correlation_period().ok_or_else(|| unsupported(im2))?;
        return Ok(baker_jayaram_2008(t1, t2));
    }

    // One spectral ordinate and one scalar IM
    let (psa, other) = match (im1.is_psa(), im2.is_psa()) {
        (true, false) => (im1, im2),
        (false, true) => (im2, im1),
        _ => return scalar_correlation(im1.im_type, im2.im_type).ok_or_else(|| unsupported(im1)),
    };
    let period = psa.period().ok_or_else(|| unsupported(psa))?;
    let segments: &[TanhSegment] = match other.im_type {
        IMType::PGV => &PGV_PSA,
        IMType::CAV => &CAV_PSA,
        IMType::Ds575 => &DS575_PSA,
        IMType::Ds595 => &DS595_PSA,
        _ => return Err(unsupported(other)),
    };
    Ok(tanh_model(segments, period))
}

/// Correlation matrix of `ims` conditioned on `im_j`
///
/// `rho_ik|j = (rho_ik - rho_ij rho_kj) / sqrt((1 - rho_ij^2) (1 - rho_kj^2))`
pub fn conditional_correlation_matrix(ims: &[IM], im_j: &IM) -> Result<DMatrix<f64>> {
    let rho_j = ims
        .iter()
        .map(|im| get_im_correlation(im, im_j))
        .collect::<Result<Vec<_>>>()?;
    if let Some((im, _)) = ims.iter().zip(&rho_j).find(|&(_, &r)| 1.0 - r * r <= 0.0) {
        return Err(HazardError::Numerical(format!(
            "{} is perfectly correlated with the conditioning IM {}",
            im, im_j
        )));
    }

    let n = ims.len();
    let mut matrix = DMatrix::<f64>::identity(n, n);
    for i in 0..n {
        for k in (i + 1)..n {
            let rho_ik = get_im_correlation(&ims[i], &ims[k])?;
            let value = (rho_ik - rho_j[i] * rho_j[k])
                / ((1.0 - rho_j[i] * rho_j[i]) * (1.0 - rho_j[k] * rho_j[k])).sqrt();
            matrix[(i, k)] = value;
            matrix[(k, i)] = value;
        }
    }
    Ok(matrix)
}

/// Nearest positive-definite correlation matrix
///
/// Clips the eigenvalues at a small positive floor and rescales back to a
/// unit diagonal. Returns the matrix and whether a correction was needed.
pub fn nearest_pd(matrix: &DMatrix<f64>) -> (DMatrix<f64>, bool) {
    let eigen = SymmetricEigen::new(matrix.clone());
    if eigen.eigenvalues.iter().all(|&l| l > MIN_EIGENVALUE) {
        return (matrix.clone(), false);
    }

    let clipped = eigen.eigenvalues.map(|l| l.max(MIN_EIGENVALUE));
    let q = &eigen.eigenvectors;
    let mut corrected = q * DMatrix::from_diagonal(&clipped) * q.transpose();

    let n = corrected.nrows();
    let scale: Vec<f64> = (0..n).map(|i| corrected[(i, i)].sqrt()).collect();
    for i in 0..n {
        for k in 0..n {
            corrected[(i, k)] /= scale[i] * scale[k];
        }
    }
    // Restore exact symmetry lost to rounding
    let corrected = (&corrected + corrected.transpose()) * 0.5;
    (corrected, true)
}

/// Lower Cholesky factor of the nearest positive-definite version of `matrix`
pub fn correlated_cholesky(matrix: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let (pd, corrected) = nearest_pd(matrix);
    if corrected {
        tracing::warn!(n = pd.nrows(), "Correlation matrix not positive definite, using nearest PD approximation");
    }
    pd.cholesky()
        .map(|c| c.l())
        .ok_or_else(|| HazardError::Numerical("Cholesky decomposition of the correlation matrix failed".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baker_jayaram_identity_and_decay() {
        assert!((baker_jayaram_2008(1.0, 1.0) - 1.0).abs() < 1e-12);
        let near = baker_jayaram_2008(1.0, 1.5);
        let far = baker_jayaram_2008(1.0, 5.0);
        assert!(near > far);
        assert!(far > 0.0 && near < 1.0);
        assert!((baker_jayaram_2008(0.5, 2.0) - baker_jayaram_2008(2.0, 0.5)).abs() < 1e-15);
    }

    #[test]
    fn test_pga_is_short_period_psa() {
        let pga = IM::new(IMType::PGA);
        let rho = get_im_correlation(&pga, &IM::psa(0.01)).unwrap();
        assert!((rho - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_scalar_pairs_are_symmetric() {
        let a = IM::new(IMType::Ds575);
        let b = IM::new(IMType::Ds595);
        assert_eq!(get_im_correlation(&a, &b).unwrap(), 0.843);
        assert_eq!(get_im_correlation(&b, &a).unwrap(), 0.843);
        let pgv = IM::new(IMType::PGV);
        assert!(
            (get_im_correlation(&pgv, &IM::psa(1.0)).unwrap() - get_im_correlation(&IM::psa(1.0), &pgv).unwrap())
                .abs()
                < 1e-15
        );
    }

    #[test]
    fn test_arias_intensity_is_unsupported() {
        let ai = IM::new(IMType::AI);
        assert!(matches!(
            get_im_correlation(&ai, &IM::psa(1.0)),
            Err(HazardError::UnsupportedIM { .. })
        ));
    }

    #[test]
    fn test_conditional_matrix_has_unit_diagonal() {
        let ims = vec![IM::psa(0.2), IM::psa(0.5), IM::psa(2.0), IM::new(IMType::PGV)];
        let m = conditional_correlation_matrix(&ims, &IM::psa(1.0)).unwrap();
        for i in 0..ims.len() {
            assert_eq!(m[(i, i)], 1.0);
            for k in 0..ims.len() {
                assert_eq!(m[(i, k)], m[(k, i)]);
            }
        }
        assert!(correlated_cholesky(&m).is_ok());
    }

    #[test]
    fn test_conditioning_im_in_matrix_is_rejected() {
        let ims = vec![IM::psa(0.5), IM::psa(1.0)];
        assert!(matches!(
            conditional_correlation_matrix(&ims, &IM::psa(1.0)),
            Err(HazardError::Numerical(_))
        ));
    }

    #[test]
    fn test_nearest_pd_repairs_indefinite_matrix() {
        let m = DMatrix::from_row_slice(3, 3, &[1.0, 0.9, -0.9, 0.9, 1.0, 0.9, -0.9, 0.9, 1.0]);
        let (pd, corrected) = nearest_pd(&m);
        assert!(corrected);
        for i in 0..3 {
            assert!((pd[(i, i)] - 1.0).abs() < 1e-9);
        }
        assert!(pd.cholesky().is_some());
    }
}
