//! Engine configuration with documented defaults
//!
//! Every tunable number used by the hazard, disaggregation and ground-motion
//! selection engines lives here. The configuration is passed explicitly to
//! [`crate::tree::Ensemble::new`]; there is no process-wide instance.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{HazardError, Result};
use crate::core::types::IMType;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub hazard: HazardConfig,
    pub disagg: DisaggConfig,
    pub gms: GMSConfig,
    pub causal: CausalConfig,
}

/// Hazard curve settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HazardConfig {
    /// Number of log-spaced IM levels in a default hazard curve
    pub n_im_levels: usize,
    /// IM level range (min, max) for acceleration IMs (PGA, pSA) in g
    pub acceleration_range: (f64, f64),
    /// IM level range for PGV in cm/s
    pub velocity_range: (f64, f64),
    /// IM level range for cumulative IMs (CAV in g.s, AI in m/s)
    pub cumulative_range: (f64, f64),
    /// IM level range for significant durations in seconds
    pub duration_range: (f64, f64),
    /// Lower and upper percentiles computed across branches
    pub percentiles: (f64, f64),
}

impl Default for HazardConfig {
    fn default() -> Self {
        Self {
            n_im_levels: 100,
            acceleration_range: (1e-4, 10.0),
            velocity_range: (1e-3, 1e3),
            cumulative_range: (1e-4, 100.0),
            duration_range: (0.1, 200.0),
            percentiles: (16.0, 84.0),
        }
    }
}

impl HazardConfig {
    pub fn im_level_range(&self, im_type: IMType) -> (f64, f64) {
        match im_type {
            IMType::PGA | IMType::PSA => self.acceleration_range,
            IMType::PGV => self.velocity_range,
            IMType::CAV | IMType::AI => self.cumulative_range,
            IMType::Ds575 | IMType::Ds595 => self.duration_range,
        }
    }
}

/// Disaggregation gridding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisaggConfig {
    /// Magnitude bin width
    pub mag_bin_size: f64,
    /// Rupture distance bin width (km)
    pub rrup_bin_size: f64,
    /// Interior epsilon bin edges; the outer bins are open-ended
    pub epsilon_edges: Vec<f64>,
}

impl Default for DisaggConfig {
    fn default() -> Self {
        Self {
            mag_bin_size: 0.25,
            rrup_bin_size: 10.0,
            epsilon_edges: vec![-2.0, -1.0, -0.5, 0.0, 0.5, 1.0, 2.0],
        }
    }
}

/// Ground motion selection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GMSConfig {
    /// Number of independent realisation replicas
    pub n_replica: usize,
    /// Relative IM step used for the finite-difference rupture weights
    ///
    /// P(Rup | IMj = im_j) is taken from the exceedance difference between
    /// im_j and im_j * (1 + ratio).
    pub im_j_delta_ratio: f64,
    /// Number of points of a non-parametric GCIM CDF
    pub gcim_n_points: usize,
    /// Number of standard deviations covered either side of the GCIM CDF
    pub gcim_n_sigma: f64,
    /// Gaussian kernel bandwidth in ln(IMj) for the non-parametric path
    pub kernel_bandwidth: f64,
    /// Kernel truncation in bandwidths
    pub kernel_truncation: f64,
    /// Minimum usable simulations for a non-parametric target
    pub min_simulations: usize,
    /// Significance level of the reported KS critical value
    pub ks_alpha: f64,
    /// Seed of the realisation RNG
    pub seed: u64,
}

impl Default for GMSConfig {
    fn default() -> Self {
        Self {
            n_replica: 10,
            im_j_delta_ratio: 0.001,
            gcim_n_points: 500,
            gcim_n_sigma: 4.0,
            kernel_bandwidth: 0.15,
            kernel_truncation: 3.0,
            min_simulations: 20,
            ks_alpha: 0.1,
            seed: 0,
        }
    }
}

/// Default causal parameter bound settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CausalConfig {
    /// Fixed magnitude pad around the 10th/90th percentiles
    pub mag_pad: f64,
    /// Multipliers applied to the 10th/90th distance percentiles
    pub rrup_factors: (f64, f64),
    /// Multipliers applied to the site Vs30
    pub vs30_factors: (f64, f64),
    /// Default amplitude scale factor bounds
    pub sf_bounds: (f64, f64),
}

impl Default for CausalConfig {
    fn default() -> Self {
        Self {
            mag_pad: 0.5,
            rrup_factors: (0.5, 1.5),
            vs30_factors: (0.5, 1.5),
            sf_bounds: (0.3, 3.0),
        }
    }
}

impl EngineConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from a TOML string; missing fields take defaults
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a TOML file
    pub fn load_from_toml(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(HazardError::InvalidConfig(msg));

        if self.hazard.n_im_levels < 2 {
            return invalid(format!("n_im_levels ({}) must be at least 2", self.hazard.n_im_levels));
        }
        for (name, (lo, hi)) in [
            ("acceleration_range", self.hazard.acceleration_range),
            ("velocity_range", self.hazard.velocity_range),
            ("cumulative_range", self.hazard.cumulative_range),
            ("duration_range", self.hazard.duration_range),
        ] {
            if !(lo > 0.0 && hi > lo) {
                return invalid(format!("{} ({}, {}) must be positive and increasing", name, lo, hi));
            }
        }
        let (p_lo, p_hi) = self.hazard.percentiles;
        if !(0.0 < p_lo && p_lo < p_hi && p_hi < 100.0) {
            return invalid(format!("percentiles ({}, {}) must satisfy 0 < lo < hi < 100", p_lo, p_hi));
        }

        if self.disagg.mag_bin_size <= 0.0 || self.disagg.rrup_bin_size <= 0.0 {
            return invalid("Disaggregation bin sizes must be positive".into());
        }
        if self.disagg.epsilon_edges.windows(2).any(|w| w[0] >= w[1]) {
            return invalid("epsilon_edges must be strictly increasing".into());
        }

        if self.gms.n_replica == 0 {
            return invalid("n_replica must be at least 1".into());
        }
        if !(self.gms.im_j_delta_ratio > 0.0) {
            return invalid("im_j_delta_ratio must be positive".into());
        }
        if self.gms.gcim_n_points < 10 {
            return invalid("gcim_n_points must be at least 10".into());
        }
        if self.gms.kernel_bandwidth <= 0.0 || self.gms.kernel_truncation <= 0.0 {
            return invalid("Kernel bandwidth and truncation must be positive".into());
        }
        if !(0.0 < self.gms.ks_alpha && self.gms.ks_alpha < 1.0) {
            return invalid(format!("ks_alpha ({}) must be in (0, 1)", self.gms.ks_alpha));
        }

        let (sf_lo, sf_hi) = self.causal.sf_bounds;
        if !(sf_lo > 0.0 && sf_hi > sf_lo) {
            return invalid(format!("sf_bounds ({}, {}) must be positive and increasing", sf_lo, sf_hi));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::parse_toml(
            r#"
            [gms]
            n_replica = 4
            seed = 7

            [disagg]
            mag_bin_size = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.gms.n_replica, 4);
        assert_eq!(config.gms.seed, 7);
        assert_eq!(config.gms.min_simulations, 20);
        assert_eq!(config.disagg.mag_bin_size, 0.5);
        assert_eq!(config.hazard.n_im_levels, 100);
    }

    #[test]
    fn test_invalid_percentiles_rejected() {
        let mut config = EngineConfig::default();
        config.hazard.percentiles = (84.0, 16.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unsorted_epsilon_edges_rejected() {
        let result = EngineConfig::parse_toml("[disagg]\nepsilon_edges = [0.0, -1.0]\n");
        assert!(result.is_err());
    }
}
