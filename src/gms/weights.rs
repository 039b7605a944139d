//! IM weighting used by the selection misfit and the replica residual

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::error::{HazardError, Result};
use crate::core::types::IM;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;
const PSA_SHARE: f64 = 0.7;

/// Non-negative weights over the IMi vector, summing to one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<IM, f64>", into = "BTreeMap<IM, f64>")]
pub struct IMWeights {
    weights: BTreeMap<IM, f64>,
}

impl IMWeights {
    pub fn new(weights: BTreeMap<IM, f64>) -> Result<Self> {
        if weights.is_empty() {
            return Err(HazardError::InvalidWeights("No IMs given".into()));
        }
        if let Some((im, w)) = weights.iter().find(|(_, w)| !(**w >= 0.0) || !w.is_finite()) {
            return Err(HazardError::InvalidWeights(format!("Weight of {} is {}", im, w)));
        }
        let sum: f64 = weights.values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(HazardError::InvalidWeights(format!("Weights sum to {}, expected 1.0", sum)));
        }
        Ok(Self { weights })
    }

    pub fn get(&self, im: &IM) -> Option<f64> {
        self.weights.get(im).copied()
    }

    pub fn ims(&self) -> impl Iterator<Item = &IM> {
        self.weights.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IM, &f64)> {
        self.weights.iter()
    }

    /// Weights in the order of `ims`
    ///
    /// Errors when the two IM sets differ.
    pub fn aligned(&self, ims: &[IM]) -> Result<Vec<f64>> {
        if ims.len() != self.weights.len() {
            return Err(HazardError::InvalidWeights(format!(
                "{} weights given for {} IMs",
                self.weights.len(),
                ims.len()
            )));
        }
        ims.iter()
            .map(|im| {
                self.get(im)
                    .ok_or_else(|| HazardError::InvalidWeights(format!("No weight given for {}", im)))
            })
            .collect()
    }
}

impl TryFrom<BTreeMap<IM, f64>> for IMWeights {
    type Error = HazardError;

    fn try_from(weights: BTreeMap<IM, f64>) -> Result<Self> {
        Self::new(weights)
    }
}

impl From<IMWeights> for BTreeMap<IM, f64> {
    fn from(weights: IMWeights) -> Self {
        weights.weights
    }
}

/// Default weights for selecting on `ims` conditioned on `im_j`
///
/// When conditioning on pSA, 70% is spread uniformly over the pSA IMs and
/// 30% over the rest; if either group is empty the other takes everything.
/// Any other conditioning IM gets uniform weights.
pub fn default_im_weights(im_j: &IM, ims: &[IM]) -> Result<IMWeights> {
    let ims: Vec<IM> = ims.iter().filter(|im| *im != im_j).copied().collect();
    if ims.is_empty() {
        return Err(HazardError::InvalidConfig(
            "At least one IM besides the conditioning IM is required".into(),
        ));
    }

    let weights = if im_j.is_psa() {
        let n_psa = ims.iter().filter(|im| im.is_psa()).count();
        let n_other = ims.len() - n_psa;
        let (psa_share, other_share) = match (n_psa, n_other) {
            (0, _) => (0.0, 1.0),
            (_, 0) => (1.0, 0.0),
            _ => (PSA_SHARE, 1.0 - PSA_SHARE),
        };
        ims.iter()
            .map(|im| {
                let w = if im.is_psa() {
                    psa_share / n_psa as f64
                } else {
                    other_share / n_other as f64
                };
                (*im, w)
            })
            .collect()
    } else {
        let w = 1.0 / ims.len() as f64;
        ims.iter().map(|im| (*im, w)).collect()
    };
    IMWeights::new(weights)
}
