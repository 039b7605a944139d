//! Hazard engine integration tests
//!
//! Branch and ensemble exceedance curves over the shared two-branch fixture.

mod common;

use common::*;
use proptest::prelude::*;
use seismic_hazard::core::stats::norm_sf;
use seismic_hazard::core::{HazardError, IMType, SiteInfo, IM};
use seismic_hazard::hazard::{branch_hazard_at, run_branch_hazard, run_ensemble_hazard};

/// Exceedance of a single lognormal rupture at `v`
fn lognormal_exceedance(median: f64, sigma: f64, v: f64) -> f64 {
    norm_sf((v.ln() - median.ln()) / sigma)
}

#[test]
fn test_branch_hazard_matches_hand_computation() {
    let ens = ensemble();
    let im_ens = ens.check_station(&pga(), STATION).unwrap();
    let branch = &im_ens.branches()[0];
    let levels = [0.05, 0.2, 1.0];

    let result = run_branch_hazard(&ens, branch, &site(), &pga(), Some(&levels)).unwrap();
    assert_eq!(result.branch_name, "A");

    let medians = [0.3, 0.1, 0.5];
    for (i, &v) in levels.iter().enumerate() {
        let expected: f64 = RUPTURES
            .iter()
            .zip(medians)
            .map(|((_, rate, _, _), m)| rate * lognormal_exceedance(m, 0.6, v))
            .sum();
        assert!((result.fault[i] - expected).abs() <= 1e-12 * expected);
        assert_eq!(result.distributed[i], 0.0);
    }
}

#[test]
fn test_ensemble_is_weighted_mean_of_branches() {
    let ens = ensemble();
    let result = run_ensemble_hazard(&ens, &site(), &psa1(), None, true).unwrap();

    let a = result.branch("A").unwrap().total();
    let b = result.branch("B").unwrap().total();
    for (i, total) in result.total().iter().enumerate() {
        assert!((total - 0.5 * (a[i] + b[i])).abs() <= 1e-15 + 1e-12 * total);
    }

    // Branch B is uniformly stronger, so the 84th percentile follows it
    let percentiles = result.percentiles.as_ref().unwrap();
    assert_eq!(percentiles.lower_percentile, 16.0);
    for i in 0..result.im_levels.len() {
        assert!(percentiles.lower[i] <= percentiles.upper[i]);
        assert!(percentiles.upper[i] <= b[i] + 1e-18);
    }
}

#[test]
fn test_exceedance_to_im_round_trips_through_curve() {
    let ens = ensemble();
    let result = run_ensemble_hazard(&ens, &site(), &pga(), None, false).unwrap();
    assert!(result.percentiles.is_none());

    let im_value = result.exceedance_to_im(1e-4).unwrap();
    assert!(im_value > 0.05 && im_value < 2.0);
    let back = result.im_to_exceedance(im_value).unwrap();
    assert!((back - 1e-4).abs() / 1e-4 < 1e-3);
}

#[test]
fn test_out_of_range_exceedance_is_recoverable_error() {
    let ens = ensemble();
    let result = run_ensemble_hazard(&ens, &site(), &pga(), None, false).unwrap();
    let err = result.exceedance_to_im(1e-20).unwrap_err();
    assert!(matches!(err, HazardError::ExceedanceOutOfRange { exceedance: Some(_), .. }));
    assert!(err.is_recoverable());

    // Above the total rupture rate nothing can be exceeded that often
    assert!(result.exceedance_to_im(1e-2).is_err());
}

#[test]
fn test_branch_hazard_at_single_value() {
    let ens = ensemble();
    let hazard = branch_hazard_at(&ens, &site(), &pga(), 0.3).unwrap();
    assert_eq!(hazard.len(), 2);
    assert!(hazard[1] > hazard[0]);

    let curve = run_ensemble_hazard(&ens, &site(), &pga(), Some(&[0.3]), false).unwrap();
    assert!((curve.total()[0] - 0.5 * (hazard[0] + hazard[1])).abs() < 1e-18);
}

#[test]
fn test_unsupported_im_and_station() {
    let ens = ensemble();
    let err = run_ensemble_hazard(&ens, &site(), &IM::new(IMType::CAV), None, false).unwrap_err();
    assert!(matches!(err, HazardError::UnsupportedIM { .. }));

    let err = run_ensemble_hazard(&ens, &site(), &IM::psa(3.0), None, false).unwrap_err();
    assert!(matches!(err, HazardError::UnsupportedIM { .. }));

    let elsewhere = SiteInfo::new("WELL", -41.3, 174.8, 300.0);
    let err = run_ensemble_hazard(&ens, &elsewhere, &pga(), None, false).unwrap_err();
    assert!(matches!(err, HazardError::UnsupportedStation { .. }));
}

#[test]
fn test_invalid_im_levels_rejected() {
    let ens = ensemble();
    let err = run_ensemble_hazard(&ens, &site(), &pga(), Some(&[0.2, 0.1]), false).unwrap_err();
    assert!(matches!(err, HazardError::InvalidConfig(_)));
}

#[test]
fn test_cross_family_hazard_uses_own_branches() {
    let ens = ensemble();
    let result = run_ensemble_hazard(&ens, &site(), &pgv(), None, false).unwrap();
    assert_eq!(result.branches.len(), 2);
    assert!(result.exceedance_to_im(1e-4).unwrap() > 1.0);
}

proptest! {
    #[test]
    fn hazard_is_non_increasing(mut levels in prop::collection::vec(1e-3f64..5.0, 2..20)) {
        levels.sort_by(|a, b| a.partial_cmp(b).unwrap());
        levels.dedup();
        prop_assume!(levels.len() >= 2);

        let ens = ensemble();
        let result = run_ensemble_hazard(&ens, &site(), &pga(), Some(&levels), false).unwrap();
        let total = result.total();
        for w in total.windows(2) {
            prop_assert!(w[1] <= w[0]);
        }
        let max_rate: f64 = RUPTURES.iter().map(|r| r.1).sum();
        prop_assert!(total[0] <= max_rate);
    }
}
