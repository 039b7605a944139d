//! TOML description of a logic tree
//!
//! ```toml
//! name = "v21p1"
//!
//! [[im_ensembles]]
//! im_types = ["PGA", "pSA"]
//!
//! [[im_ensembles.branches]]
//! name = "A_GMM1"
//! weight = 0.5
//!
//! [[im_ensembles.branches.leaves]]
//! source_type = "fault"
//! rupture_source = "flt_erf_v1"
//! im_sources = ["flt_gmm1"]
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{HazardError, Result};
use crate::core::types::{IMType, SourceType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleConfig {
    pub name: String,
    pub im_ensembles: Vec<IMEnsembleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IMEnsembleConfig {
    pub im_types: Vec<IMType>,
    pub branches: Vec<BranchConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchConfig {
    pub name: String,
    pub weight: f64,
    pub leaves: Vec<LeafConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeafConfig {
    pub source_type: SourceType,
    /// Rupture source file (seismicity model) this leaf's ruptures come from
    pub rupture_source: String,
    /// IM data sources; together they cover the leaf's stations
    pub im_sources: Vec<String>,
}

impl EnsembleConfig {
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: EnsembleConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_toml(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(HazardError::InvalidConfig(msg));

        if self.im_ensembles.is_empty() {
            return invalid(format!("Ensemble {} has no IM ensembles", self.name));
        }

        let mut seen_types = HashSet::new();
        for im_ens in &self.im_ensembles {
            if im_ens.im_types.is_empty() {
                return invalid(format!("Ensemble {}: IM ensemble without IM types", self.name));
            }
            for im_type in &im_ens.im_types {
                if !seen_types.insert(*im_type) {
                    return invalid(format!(
                        "Ensemble {}: IM type {} appears in more than one IM ensemble",
                        self.name, im_type
                    ));
                }
            }
            if im_ens.branches.is_empty() {
                return invalid(format!("Ensemble {}: IM ensemble without branches", self.name));
            }

            let mut names = HashSet::new();
            for branch in &im_ens.branches {
                if !names.insert(branch.name.as_str()) {
                    return invalid(format!("Duplicate branch name {}", branch.name));
                }
                if !(branch.weight >= 0.0 && branch.weight.is_finite()) {
                    return invalid(format!("Branch {} has invalid weight {}", branch.name, branch.weight));
                }
                if branch.leaves.is_empty() {
                    return invalid(format!("Branch {} has no leaves", branch.name));
                }
                for leaf in &branch.leaves {
                    if leaf.im_sources.is_empty() {
                        return invalid(format!(
                            "Branch {}: {} leaf has no IM sources",
                            branch.name, leaf.source_type
                        ));
                    }
                }
            }

            let total: f64 = im_ens.branches.iter().map(|b| b.weight).sum();
            if total <= 0.0 {
                return invalid(format!("Ensemble {}: branch weights sum to zero", self.name));
            }
        }
        Ok(())
    }
}
