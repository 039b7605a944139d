//! Per-branch view of IM data, aligned by rupture

use std::collections::BTreeMap;

use ahash::AHashSet;

use crate::core::error::{HazardError, Result};
use crate::core::stats::EmpiricalCdf;
use crate::core::types::{IMDataType, RuptureId, SourceType, IM};
use crate::data::{IMTable, LnIMParams};

/// Distribution of an IM for one rupture
#[derive(Debug, Clone, PartialEq)]
pub enum RuptureDist {
    /// Lognormal parameters of ln(IM)
    Parametric(LnIMParams),
    /// Realisations of IM, one per simulation of the rupture
    Samples(Vec<f64>),
}

impl RuptureDist {
    /// P(IM > im_value | rupture)
    pub fn exceedance(&self, im_value: f64) -> f64 {
        match self {
            RuptureDist::Parametric(params) => params.exceedance(im_value),
            RuptureDist::Samples(samples) => {
                if samples.is_empty() {
                    return 0.0;
                }
                samples.iter().filter(|&&v| v > im_value).count() as f64 / samples.len() as f64
            }
        }
    }

    /// Standardised residual implied by the exceedance probability under the
    /// rupture's own distribution
    pub fn epsilon(&self, im_value: f64) -> f64 {
        match self {
            RuptureDist::Parametric(params) => params.epsilon(im_value),
            RuptureDist::Samples(samples) => {
                let p = EmpiricalCdf::new(samples).cdf(im_value);
                crate::core::stats::norm_ppf(p)
            }
        }
    }

    pub fn data_type(&self) -> IMDataType {
        match self {
            RuptureDist::Parametric(_) => IMDataType::Parametric,
            RuptureDist::Samples(_) => IMDataType::NonParametric,
        }
    }
}

/// A rupture as seen by one branch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchRupture {
    pub id: RuptureId,
    pub source_type: SourceType,
    pub annual_rec_prob: f64,
}

/// IM data of every rupture of a branch at one station
#[derive(Debug, Clone)]
pub struct BranchIMData {
    pub branch_name: String,
    pub ruptures: Vec<BranchRupture>,
    pub values: BTreeMap<IM, Vec<RuptureDist>>,
}

impl BranchIMData {
    pub fn new(branch_name: &str) -> Self {
        Self { branch_name: branch_name.to_string(), ruptures: Vec::new(), values: BTreeMap::new() }
    }

    pub fn len(&self) -> usize {
        self.ruptures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ruptures.is_empty()
    }

    pub fn column(&self, im: &IM) -> Result<&[RuptureDist]> {
        self.values
            .get(im)
            .map(|c| c.as_slice())
            .ok_or_else(|| HazardError::UnsupportedIM {
                im: im.to_string(),
                context: format!("branch {}", self.branch_name),
            })
    }

    /// Data type of the IM column across all ruptures
    pub fn data_type(&self, im: &IM) -> Result<IMDataType> {
        let column = self.column(im)?;
        let mut result = None;
        for dist in column {
            let dt = dist.data_type();
            result = match result {
                None => Some(dt),
                Some(existing) if existing == dt => Some(existing),
                Some(_) => return Ok(IMDataType::Mixed),
            };
        }
        Ok(result.unwrap_or(IMDataType::Parametric))
    }

    /// Append the rows of one leaf table
    ///
    /// `resolve` maps a rupture name to its index and annual recurrence
    /// probability in this branch. A rupture appearing twice in the branch
    /// would be counted twice and is rejected.
    pub(crate) fn extend_from_table(
        &mut self,
        table: &IMTable,
        source_type: SourceType,
        ims: &[IM],
        seen: &mut AHashSet<RuptureId>,
        resolve: impl Fn(&str) -> Result<(RuptureId, f64)>,
    ) -> Result<()> {
        let mut push_rupture = |this: &mut Self, name: &str| -> Result<()> {
            let (id, rate) = resolve(name)?;
            if !seen.insert(id) {
                return Err(HazardError::InvariantViolation(format!(
                    "Rupture {} appears more than once in branch {}",
                    name, this.branch_name
                )));
            }
            this.ruptures.push(BranchRupture { id, source_type, annual_rec_prob: rate });
            Ok(())
        };

        let missing = |im: &IM, branch: &str| HazardError::UnsupportedIM {
            im: im.to_string(),
            context: format!("branch {}", branch),
        };

        match table {
            IMTable::Parametric(t) => {
                for name in &t.ruptures {
                    push_rupture(self, name)?;
                }
                for im in ims {
                    let column = t.columns.get(im).ok_or_else(|| missing(im, &self.branch_name))?;
                    self.values
                        .entry(*im)
                        .or_default()
                        .extend(column.iter().map(|p| RuptureDist::Parametric(*p)));
                }
            }
            IMTable::NonParametric(t) => {
                let groups = t.groups();
                for group in &groups {
                    push_rupture(self, group.rupture)?;
                }
                for im in ims {
                    let column = t.columns.get(im).ok_or_else(|| missing(im, &self.branch_name))?;
                    let target = self.values.entry(*im).or_default();
                    for group in &groups {
                        target.push(RuptureDist::Samples(group.rows.iter().map(|&r| column[r]).collect()));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_exceedance_is_fraction() {
        let dist = RuptureDist::Samples(vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(dist.exceedance(0.25), 0.5);
        assert_eq!(dist.exceedance(1.0), 0.0);
        assert_eq!(dist.exceedance(0.0), 1.0);
    }

    #[test]
    fn test_parametric_epsilon() {
        let dist = RuptureDist::Parametric(LnIMParams::new(0.0, 0.5));
        assert!((dist.epsilon(1f64.exp()) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_sample_epsilon_is_finite_above_range() {
        let dist = RuptureDist::Samples(vec![0.1, 0.2, 0.3]);
        let eps = dist.epsilon(10.0);
        assert!(eps.is_finite());
        assert!(eps > 0.0);
    }
}
