//! Causal parameter bounds used to filter the candidate ground motion pool

use serde::{Deserialize, Serialize};

use crate::core::config::CausalConfig;
use crate::core::error::{HazardError, Result};
use crate::core::stats::weighted_quantile;
use crate::core::types::{SiteInfo, IM};
use crate::disagg::{EnsembleDisaggResult, RuptureContribution};

/// Magnitude, distance, Vs30 and scale factor ranges of acceptable records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalParamBounds {
    pub im_j: IM,
    pub im_j_value: f64,
    pub site: SiteInfo,
    pub mw_low: f64,
    pub mw_high: f64,
    pub rrup_low: f64,
    pub rrup_high: f64,
    pub vs30_low: f64,
    pub vs30_high: f64,
    pub sf_low: f64,
    pub sf_high: f64,
    /// Disaggregation contributions the bounds were derived from
    pub contributions: Vec<RuptureContribution>,
}

impl CausalParamBounds {
    pub fn contains_mw(&self, mw: f64) -> bool {
        mw >= self.mw_low && mw <= self.mw_high
    }

    pub fn contains_rrup(&self, rrup: f64) -> bool {
        rrup >= self.rrup_low && rrup <= self.rrup_high
    }

    pub fn contains_vs30(&self, vs30: f64) -> bool {
        vs30 >= self.vs30_low && vs30 <= self.vs30_high
    }

    pub fn contains_sf(&self, sf: f64) -> bool {
        sf >= self.sf_low && sf <= self.sf_high
    }
}

/// Bounds from the contribution-weighted 1/10/90/99th percentiles of a
/// disaggregation
///
/// Mw spans at least [p10 - pad, p90 + pad] and Rrup at least
/// [f_lo * p10, f_hi * p90]; the 1st/99th percentiles widen either end.
/// Ruptures without distance data are ignored for the Rrup range.
pub fn default_causal_params(
    disagg: &EnsembleDisaggResult,
    site: &SiteInfo,
    config: &CausalConfig,
    sf_bounds: Option<(f64, f64)>,
) -> Result<CausalParamBounds> {
    let contributions = &disagg.contributions;
    let mags: Vec<f64> = contributions.iter().map(|c| c.magnitude).collect();
    let weights: Vec<f64> = contributions.iter().map(|c| c.contribution).collect();
    if !(weights.iter().sum::<f64>() > 0.0) {
        return Err(HazardError::InsufficientData {
            context: "causal bounds (contributing ruptures)".into(),
            available: 0,
            required: 1,
        });
    }

    let (rrups, rrup_weights): (Vec<f64>, Vec<f64>) = contributions
        .iter()
        .filter_map(|c| c.rrup.map(|r| (r, c.contribution)))
        .unzip();
    if rrups.is_empty() {
        return Err(HazardError::InsufficientData {
            context: "causal bounds (ruptures with distance data)".into(),
            available: 0,
            required: 1,
        });
    }

    let mag_q = |q: f64| weighted_quantile(&mags, &weights, q);
    let rrup_q = |q: f64| weighted_quantile(&rrups, &rrup_weights, q);

    let mw_low = mag_q(0.01).min(mag_q(0.10) - config.mag_pad);
    let mw_high = mag_q(0.99).max(mag_q(0.90) + config.mag_pad);
    let rrup_low = rrup_q(0.01).min(config.rrup_factors.0 * rrup_q(0.10));
    let rrup_high = rrup_q(0.99).max(config.rrup_factors.1 * rrup_q(0.90));
    let (sf_low, sf_high) = sf_bounds.unwrap_or(config.sf_bounds);

    tracing::debug!(
        station = %site.station_name,
        mw_low, mw_high, rrup_low, rrup_high,
        "Derived causal parameter bounds"
    );

    Ok(CausalParamBounds {
        im_j: disagg.im,
        im_j_value: disagg.im_value,
        site: site.clone(),
        mw_low,
        mw_high,
        rrup_low,
        rrup_high,
        vs30_low: site.vs30 * config.vs30_factors.0,
        vs30_high: site.vs30 * config.vs30_factors.1,
        sf_low,
        sf_high,
        contributions: contributions.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{RuptureId, SourceType};

    fn disagg(rows: &[(f64, Option<f64>, f64)]) -> EnsembleDisaggResult {
        let contributions = rows
            .iter()
            .enumerate()
            .map(|(i, (mag, rrup, contr))| RuptureContribution {
                rupture_id: RuptureId(i as u32),
                rupture_name: format!("r{}", i),
                source_type: SourceType::Fault,
                magnitude: *mag,
                rrup: *rrup,
                contribution: *contr,
                epsilon: 0.0,
            })
            .collect();
        EnsembleDisaggResult {
            ensemble_name: "test".into(),
            im: IM::psa(1.0),
            site: SiteInfo::new("SITE", -43.5, 172.6, 400.0),
            im_value: 0.3,
            target_exceedance: None,
            exceedance: 1e-3,
            adj_branch_weights: vec![1.0],
            branches: Vec::new(),
            contributions,
        }
    }

    #[test]
    fn test_single_dominant_rupture_gets_padded_bounds() {
        let d = disagg(&[(7.0, Some(20.0), 1.0)]);
        let bounds = default_causal_params(&d, &d.site, &CausalConfig::default(), None).unwrap();
        assert!((bounds.mw_low - 6.5).abs() < 1e-12);
        assert!((bounds.mw_high - 7.5).abs() < 1e-12);
        assert!((bounds.rrup_low - 10.0).abs() < 1e-12);
        assert!((bounds.rrup_high - 30.0).abs() < 1e-12);
        assert!((bounds.vs30_low - 200.0).abs() < 1e-12);
        assert!((bounds.vs30_high - 600.0).abs() < 1e-12);
        assert_eq!((bounds.sf_low, bounds.sf_high), (0.3, 3.0));
    }

    #[test]
    fn test_bounds_cover_contributing_range() {
        let d = disagg(&[(5.5, Some(5.0), 0.3), (6.5, Some(30.0), 0.4), (7.8, None, 0.3)]);
        let bounds = default_causal_params(&d, &d.site, &CausalConfig::default(), Some((0.5, 2.0))).unwrap();
        assert!(bounds.contains_mw(5.5) && bounds.contains_mw(7.8));
        assert!(bounds.contains_rrup(30.0));
        assert!(!bounds.contains_sf(2.5));
    }

    #[test]
    fn test_no_distance_data_is_error() {
        let d = disagg(&[(6.0, None, 1.0)]);
        assert!(default_causal_params(&d, &d.site, &CausalConfig::default(), None).is_err());
    }
}
