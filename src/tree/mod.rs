//! Logic tree model: Ensemble -> IMEnsemble -> Branch -> Leaf
//!
//! Discovery of stations, IMs and rupture tables is lazy and memoised per
//! object; `clear_cache` on the ensemble resets the whole tree.

pub mod branch;
pub mod config;
pub mod ensemble;
pub mod im_data;
pub mod im_ensemble;
pub mod leaf;
pub mod rupture;

use std::cell::OnceCell;

use crate::core::error::Result;

pub use branch::Branch;
pub use config::{BranchConfig, EnsembleConfig, IMEnsembleConfig, LeafConfig};
pub use ensemble::Ensemble;
pub use im_data::{BranchIMData, BranchRupture, RuptureDist};
pub use im_ensemble::IMEnsemble;
pub use leaf::Leaf;
pub use rupture::{BranchRuptureTable, RuptureCatalog, RuptureInfo};

/// Fallible `OnceCell::get_or_init`
pub(crate) fn get_or_try_init<T>(cell: &OnceCell<T>, init: impl FnOnce() -> Result<T>) -> Result<&T> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = init()?;
    Ok(cell.get_or_init(|| value))
}
