//! IM value tables returned by an IM data provider

use std::collections::BTreeMap;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::error::{HazardError, Result};
use crate::core::stats::norm_sf;
use crate::core::types::{IMDataType, IM};

/// Lognormal parameters of an IM for one rupture: mean and standard
/// deviation of ln(IM)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LnIMParams {
    pub mu: f64,
    pub sigma: f64,
}

impl LnIMParams {
    pub fn new(mu: f64, sigma: f64) -> Self {
        Self { mu, sigma }
    }

    /// P(IM > im_value)
    pub fn exceedance(&self, im_value: f64) -> f64 {
        if im_value <= 0.0 {
            return 1.0;
        }
        if self.sigma <= 0.0 {
            return if im_value.ln() < self.mu { 1.0 } else { 0.0 };
        }
        norm_sf((im_value.ln() - self.mu) / self.sigma)
    }

    /// Standardised residual of ln(im_value)
    pub fn epsilon(&self, im_value: f64) -> f64 {
        (im_value.ln() - self.mu) / self.sigma
    }
}

/// Per-rupture lognormal parameters, one column per IM
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParametricTable {
    pub ruptures: Vec<String>,
    pub columns: BTreeMap<IM, Vec<LnIMParams>>,
}

/// Per-realisation IM values, one row per (rupture, realisation)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NonParametricTable {
    pub ruptures: Vec<String>,
    pub realisations: Vec<u32>,
    pub columns: BTreeMap<IM, Vec<f64>>,
}

/// Rows belonging to one rupture in a non-parametric table
#[derive(Debug, Clone)]
pub struct RuptureGroup<'a> {
    pub rupture: &'a str,
    pub rows: Vec<usize>,
}

impl NonParametricTable {
    /// Group row indices by rupture, in order of first appearance
    pub fn groups(&self) -> Vec<RuptureGroup<'_>> {
        let mut index: AHashMap<&str, usize> = AHashMap::new();
        let mut groups: Vec<RuptureGroup<'_>> = Vec::new();
        for (row, name) in self.ruptures.iter().enumerate() {
            let slot = *index.entry(name.as_str()).or_insert_with(|| {
                groups.push(RuptureGroup { rupture: name.as_str(), rows: Vec::new() });
                groups.len() - 1
            });
            groups[slot].rows.push(row);
        }
        groups
    }
}

/// IM data for one station from one data source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IMTable {
    Parametric(ParametricTable),
    NonParametric(NonParametricTable),
}

impl IMTable {
    pub fn data_type(&self) -> IMDataType {
        match self {
            IMTable::Parametric(_) => IMDataType::Parametric,
            IMTable::NonParametric(_) => IMDataType::NonParametric,
        }
    }

    pub fn ims(&self) -> Vec<IM> {
        match self {
            IMTable::Parametric(t) => t.columns.keys().copied().collect(),
            IMTable::NonParametric(t) => t.columns.keys().copied().collect(),
        }
    }

    pub fn has_im(&self, im: &IM) -> bool {
        match self {
            IMTable::Parametric(t) => t.columns.contains_key(im),
            IMTable::NonParametric(t) => t.columns.contains_key(im),
        }
    }

    /// Keep only the requested IM columns
    pub fn select(&self, ims: &[IM]) -> Result<IMTable> {
        let missing = |im: &IM| HazardError::UnsupportedIM {
            im: im.to_string(),
            context: "IM table".into(),
        };
        Ok(match self {
            IMTable::Parametric(t) => {
                let mut columns = BTreeMap::new();
                for im in ims {
                    columns.insert(*im, t.columns.get(im).ok_or_else(|| missing(im))?.clone());
                }
                IMTable::Parametric(ParametricTable { ruptures: t.ruptures.clone(), columns })
            }
            IMTable::NonParametric(t) => {
                let mut columns = BTreeMap::new();
                for im in ims {
                    columns.insert(*im, t.columns.get(im).ok_or_else(|| missing(im))?.clone());
                }
                IMTable::NonParametric(NonParametricTable {
                    ruptures: t.ruptures.clone(),
                    realisations: t.realisations.clone(),
                    columns,
                })
            }
        })
    }

    /// Check that every column has one entry per row
    pub fn validate(&self) -> Result<()> {
        let (n_rows, lengths): (usize, Vec<(IM, usize)>) = match self {
            IMTable::Parametric(t) => {
                (t.ruptures.len(), t.columns.iter().map(|(im, c)| (*im, c.len())).collect())
            }
            IMTable::NonParametric(t) => {
                if t.realisations.len() != t.ruptures.len() {
                    return Err(HazardError::InvariantViolation(format!(
                        "Non-parametric table has {} rupture labels but {} realisation labels",
                        t.ruptures.len(),
                        t.realisations.len()
                    )));
                }
                (t.ruptures.len(), t.columns.iter().map(|(im, c)| (*im, c.len())).collect())
            }
        };
        for (im, len) in lengths {
            if len != n_rows {
                return Err(HazardError::InvariantViolation(format!(
                    "IM column {} has {} rows, expected {}",
                    im, len, n_rows
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::IMType;

    #[test]
    fn test_exceedance_at_median_is_half() {
        let params = LnIMParams::new(0.1f64.ln(), 0.6);
        assert!((params.exceedance(0.1) - 0.5).abs() < 1e-12);
        assert!(params.exceedance(1.0) < params.exceedance(0.05));
        assert_eq!(params.exceedance(0.0), 1.0);
    }

    #[test]
    fn test_groups_preserve_first_appearance() {
        let table = NonParametricTable {
            ruptures: vec!["b".into(), "a".into(), "b".into(), "a".into(), "c".into()],
            realisations: vec![0, 0, 1, 1, 0],
            columns: BTreeMap::new(),
        };
        let groups = table.groups();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].rupture, "b");
        assert_eq!(groups[0].rows, vec![0, 2]);
        assert_eq!(groups[1].rows, vec![1, 3]);
        assert_eq!(groups[2].rows, vec![4]);
    }

    #[test]
    fn test_select_missing_im_is_error() {
        let table = IMTable::Parametric(ParametricTable::default());
        assert!(table.select(&[IM::new(IMType::PGA)]).is_err());
    }

    #[test]
    fn test_validate_detects_ragged_columns() {
        let mut columns = BTreeMap::new();
        columns.insert(IM::new(IMType::PGA), vec![LnIMParams::new(0.0, 0.5)]);
        let table = IMTable::Parametric(ParametricTable {
            ruptures: vec!["r1".into(), "r2".into()],
            columns,
        });
        assert!(table.validate().is_err());
    }
}
