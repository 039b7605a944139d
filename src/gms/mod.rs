//! Ground motion selection conditioned on a hazard level (GCIM)
//!
//! 1. Resolve the conditioning value im_j from the ensemble hazard
//! 2. Weight ruptures by P(rupture | IMj = im_j) in every branch
//! 3. Build per-IMi targets and combine branches with hazard-adjusted weights
//! 4. Draw `n_replica` sets of `n_gms` correlated realisations
//! 5. Pick the nearest candidate record for every realisation
//! 6. Keep the replica with the most distinct records, then the best KS fit

pub mod causal;
pub mod correlation;
pub mod dataset;
pub mod gcim;
pub mod non_parametric;
pub mod realisations;
pub mod result;
pub mod selection;
pub mod weights;

use std::collections::BTreeMap;

use ahash::AHashMap;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::core::config::GMSConfig;
use crate::core::error::{HazardError, Result};
use crate::core::types::{IMDataType, SiteInfo, IM};
use crate::disagg::{compute_adj_branch_weights, run_ensemble_disagg, DisaggTarget};
use crate::hazard::run_ensemble_hazard;
use crate::tree::{Branch, BranchIMData, Ensemble, RuptureDist};

pub use causal::{default_causal_params, CausalParamBounds};
pub use correlation::{conditional_correlation_matrix, get_im_correlation, nearest_pd};
pub use dataset::{
    GMDataset, GMDatasetConfig, GMDatasetKind, GMDatasetRegistry, GMImTable, GMMetadata, GMRecord,
    HistoricalGMDataset, MixedGMDataset, ScaleTarget, SimulationGMDataset,
};
pub use gcim::{comb_lnimi_imj, compute_lnimi_imj, compute_lnimi_imj_rup, compute_rupture_weights, BranchGCIM};
pub use gcim::{UniLnIMiIMj, UniLnIMiIMjRup};
pub use realisations::{generate_realisations, RealisationTable};
pub use result::{GMSMetadata, GMSResult, ParamSummary};
pub use selection::{ks_critical_value, ks_statistic};
pub use weights::{default_im_weights, IMWeights};

/// The hazard level selection is conditioned on
pub type ConditioningLevel = DisaggTarget;

/// Parameters of one selection run
///
/// Unset options fall back to the engine's [`GMSConfig`] and to the default
/// IM weights and causal bounds.
#[derive(Debug, Clone)]
pub struct GMSRequest {
    pub im_j: IM,
    pub level: ConditioningLevel,
    pub ims: Vec<IM>,
    pub n_gms: usize,
    pub n_replica: Option<usize>,
    pub im_weights: Option<IMWeights>,
    pub cs_param_bounds: Option<CausalParamBounds>,
    pub seed: Option<u64>,
}

impl GMSRequest {
    pub fn new(im_j: IM, level: ConditioningLevel, ims: Vec<IM>, n_gms: usize) -> Self {
        Self { im_j, level, ims, n_gms, n_replica: None, im_weights: None, cs_param_bounds: None, seed: None }
    }

    pub fn with_im_weights(mut self, weights: IMWeights) -> Self {
        self.im_weights = Some(weights);
        self
    }

    pub fn with_bounds(mut self, bounds: CausalParamBounds) -> Self {
        self.cs_param_bounds = Some(bounds);
        self
    }

    pub fn with_n_replica(mut self, n_replica: usize) -> Self {
        self.n_replica = Some(n_replica);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// IM value of the conditioning level, and the exceedance it came from
pub fn resolve_conditioning_level(
    ensemble: &Ensemble,
    site: &SiteInfo,
    im_j: &IM,
    level: ConditioningLevel,
) -> Result<(f64, Option<f64>)> {
    match level {
        DisaggTarget::IMValue(v) => Ok((v, None)),
        DisaggTarget::Exceedance(exceedance) => {
            let hazard = run_ensemble_hazard(ensemble, site, im_j, None, false)?;
            Ok((hazard.exceedance_to_im(exceedance)?, Some(exceedance)))
        }
    }
}

/// IM data of `im_j` and every IMi for one branch, aligned by rupture
///
/// IMs outside the conditioning IM's family come from the branch of the
/// same name in their own IM ensemble.
fn gms_branch_data(ensemble: &Ensemble, branch: &Branch, station: &str, im_j: &IM, ims: &[IM]) -> Result<BranchIMData> {
    let im_j_ens = ensemble.get_im_ensemble(im_j.im_type)?;
    let (same, other): (Vec<IM>, Vec<IM>) = ims.iter().partition(|im| im_j_ens.covers(im.im_type));

    let mut family = vec![*im_j];
    family.extend(same);
    let mut data = ensemble.branch_im_data(branch, station, &family)?;

    let mut by_family: BTreeMap<usize, Vec<IM>> = BTreeMap::new();
    for im in other {
        let idx = ensemble
            .im_ensembles()
            .iter()
            .position(|e| e.covers(im.im_type))
            .ok_or_else(|| HazardError::UnsupportedIM { im: im.to_string(), context: ensemble.name.clone() })?;
        by_family.entry(idx).or_default().push(im);
    }

    let row_of: AHashMap<_, usize> = data.ruptures.iter().enumerate().map(|(i, r)| (r.id, i)).collect();
    for (idx, family_ims) in by_family {
        let other_branch = ensemble.im_ensembles()[idx].branch(&branch.name).ok_or_else(|| {
            HazardError::InvariantViolation(format!(
                "Branch {} has no counterpart for {}",
                branch.name, family_ims[0].im_type
            ))
        })?;
        let other_data = ensemble.branch_im_data(other_branch, station, &family_ims)?;
        for im in &family_ims {
            let column = other_data.column(im)?;
            let mut aligned: Vec<Option<RuptureDist>> = vec![None; data.len()];
            for (rupture, dist) in other_data.ruptures.iter().zip(column) {
                if let Some(&i) = row_of.get(&rupture.id) {
                    aligned[i] = Some(dist.clone());
                }
            }
            let aligned = aligned.into_iter().collect::<Option<Vec<_>>>().ok_or_else(|| {
                HazardError::InvariantViolation(format!(
                    "Branch {} lacks {} data for some ruptures of {}",
                    branch.name, im, im_j
                ))
            })?;
            data.values.insert(*im, aligned);
        }
    }
    Ok(data)
}

/// Common data type of the conditioning IM and every IMi across branches
fn gms_data_type(branches: &[BranchIMData], im_j: &IM, ims: &[IM]) -> Result<IMDataType> {
    let mut result: Option<IMDataType> = None;
    for data in branches {
        for im in std::iter::once(im_j).chain(ims) {
            let dt = data.data_type(im)?;
            match result {
                None => result = Some(dt),
                Some(existing) if existing == dt => {}
                Some(_) => result = Some(IMDataType::Mixed),
            }
        }
    }
    match result {
        Some(IMDataType::Mixed) | None => Err(HazardError::InvariantViolation(format!(
            "IM data for selection conditioned on {} mixes parametric and non-parametric branches",
            im_j
        ))),
        Some(dt) => Ok(dt),
    }
}

struct GcimRun<'a, R: Rng> {
    site: &'a SiteInfo,
    im_j: &'a IM,
    im_j_value: f64,
    ims: &'a [IM],
    branch_weights: &'a [f64],
    config: &'a GMSConfig,
    n_gms: usize,
    n_replica: usize,
    rng: &'a mut R,
}

fn combine_targets(ims: &[IM], marginals: &[&[UniLnIMiIMj]], weights: &[f64]) -> Result<Vec<UniLnIMiIMj>> {
    (0..ims.len())
        .map(|j| {
            let branch_dists: Vec<UniLnIMiIMj> = marginals.iter().map(|m| m[j].clone()).collect();
            comb_lnimi_imj(&branch_dists, weights)
        })
        .collect()
}

fn parametric_gcim<R: Rng>(
    run: GcimRun<'_, R>,
    branch_data: &[BranchIMData],
) -> Result<(Vec<UniLnIMiIMj>, Vec<RealisationTable>)> {
    let rho = run
        .ims
        .iter()
        .map(|im| get_im_correlation(im, run.im_j))
        .collect::<Result<Vec<_>>>()?;

    let mut branches = Vec::with_capacity(branch_data.len());
    for data in branch_data {
        let rupture_weights = compute_rupture_weights(data, run.im_j, run.im_j_value, run.config.im_j_delta_ratio)?
            .ok_or_else(|| HazardError::ExceedanceOutOfRange {
                station: run.site.station_name.clone(),
                im: run.im_j.to_string(),
                exceedance: None,
                im_value: Some(run.im_j_value),
                branch: Some(data.branch_name.clone()),
            })?;
        let conditionals = run
            .ims
            .iter()
            .zip(&rho)
            .map(|(im, r)| compute_lnimi_imj_rup(data, im, run.im_j, run.im_j_value, *r))
            .collect::<Result<Vec<_>>>()?;
        let marginals = conditionals
            .iter()
            .map(|c| compute_lnimi_imj(c, &rupture_weights, run.config.gcim_n_points, run.config.gcim_n_sigma))
            .collect::<Result<Vec<_>>>()?;
        branches.push(BranchGCIM {
            branch_name: data.branch_name.clone(),
            rupture_ids: data.ruptures.iter().map(|r| r.id).collect(),
            rupture_weights,
            conditionals,
            marginals,
        });
    }

    let marginals: Vec<&[UniLnIMiIMj]> = branches.iter().map(|b| b.marginals.as_slice()).collect();
    let targets = combine_targets(run.ims, &marginals, run.branch_weights)?;

    let corr = conditional_correlation_matrix(run.ims, run.im_j)?;
    let chol = correlation::correlated_cholesky(&corr)?;
    let replicas =
        generate_realisations(run.ims, &branches, run.branch_weights, &chol, run.n_gms, run.n_replica, run.rng)?;
    Ok((targets, replicas))
}

fn non_parametric_gcim<R: Rng>(
    run: GcimRun<'_, R>,
    branch_data: &[BranchIMData],
) -> Result<(Vec<UniLnIMiIMj>, Vec<RealisationTable>)> {
    let branches = branch_data
        .iter()
        .map(|data| non_parametric::compute_np_branch(data, run.im_j, run.im_j_value, run.ims, run.config))
        .collect::<Result<Vec<_>>>()?;

    let marginals: Vec<&[UniLnIMiIMj]> = branches.iter().map(|b| b.marginals.as_slice()).collect();
    let targets = combine_targets(run.ims, &marginals, run.branch_weights)?;
    let replicas = non_parametric::generate_np_realisations(
        run.ims,
        &branches,
        run.branch_weights,
        run.n_gms,
        run.n_replica,
        run.rng,
    )?;
    Ok((targets, replicas))
}

/// Select `n_gms` ground motions from `dataset` for a site
pub fn run_ensemble_gms(
    ensemble: &Ensemble,
    site: &SiteInfo,
    dataset: &dyn GMDataset,
    request: &GMSRequest,
) -> Result<GMSResult> {
    let config = &ensemble.config().gms;
    let station = site.station_name.as_str();
    let im_j = request.im_j;
    if request.n_gms == 0 {
        return Err(HazardError::InvalidConfig("n_gms must be positive".into()));
    }

    let mut ims: Vec<IM> = Vec::with_capacity(request.ims.len());
    for im in &request.ims {
        if *im != im_j && !ims.contains(im) {
            ims.push(*im);
        }
    }
    if ims.is_empty() {
        return Err(HazardError::InvalidConfig(
            "At least one IM besides the conditioning IM is required".into(),
        ));
    }

    let im_j_ens = ensemble.check_station(&im_j, station)?;
    for im in &ims {
        ensemble.check_station(im, station)?;
    }
    let im_weights = match &request.im_weights {
        Some(w) => w.clone(),
        None => default_im_weights(&im_j, &ims)?,
    };
    let weight_vec = im_weights.aligned(&ims)?;

    let (im_j_value, target_exceedance) = resolve_conditioning_level(ensemble, site, &im_j, request.level)?;
    let adj = compute_adj_branch_weights(ensemble, &im_j, im_j_value, site)?;

    let branch_data = im_j_ens
        .branches()
        .iter()
        .map(|b| gms_branch_data(ensemble, b, station, &im_j, &ims))
        .collect::<Result<Vec<_>>>()?;
    let data_type = gms_data_type(&branch_data, &im_j, &ims)?;

    let bounds = match &request.cs_param_bounds {
        Some(bounds) => bounds.clone(),
        None => {
            let disagg = run_ensemble_disagg(ensemble, site, &im_j, DisaggTarget::IMValue(im_j_value))?;
            default_causal_params(&disagg, site, &ensemble.config().causal, None)?
        }
    };

    let n_replica = request.n_replica.unwrap_or(config.n_replica).max(1);
    let mut rng = ChaCha8Rng::seed_from_u64(request.seed.unwrap_or(config.seed));
    let run = GcimRun {
        site,
        im_j: &im_j,
        im_j_value,
        ims: &ims,
        branch_weights: &adj.weights,
        config,
        n_gms: request.n_gms,
        n_replica,
        rng: &mut rng,
    };
    let (targets, mut replicas) = match data_type {
        IMDataType::Parametric => parametric_gcim(run, &branch_data)?,
        IMDataType::NonParametric => non_parametric_gcim(run, &branch_data)?,
        IMDataType::Mixed => {
            return Err(HazardError::InvariantViolation("Mixed IM data cannot be combined".into()));
        }
    };

    let pool = dataset.get_im_df(site, &ims, Some(&bounds), Some(ScaleTarget { im: im_j, value: im_j_value }))?;
    if pool.is_empty() {
        return Err(HazardError::InsufficientData {
            context: format!("candidate pool of dataset {} within causal bounds", dataset.name()),
            available: 0,
            required: 1,
        });
    }

    let target_refs: Vec<&UniLnIMiIMj> = targets.iter().collect();
    let scores = replicas
        .iter()
        .enumerate()
        .map(|(i, rep)| {
            let selected = selection::select_gms(&pool, rep, &weight_vec)?;
            Ok(selection::score_replica(i, &pool, selected, &target_refs, &weight_vec))
        })
        .collect::<Result<Vec<_>>>()?;
    let best = selection::choose_replica(&scores)
        .ok_or_else(|| HazardError::InvariantViolation("No replica to choose from".into()))?;

    let selected_im_values = pool.select(&best.selected);
    let selected_gms = selected_im_values.ids.clone();
    let mut unique_ids = selected_gms.clone();
    unique_ids.sort();
    unique_ids.dedup();
    let metadata_by_id: AHashMap<String, GMMetadata> = dataset
        .get_metadata_df(site, Some(&unique_ids))?
        .into_iter()
        .map(|m| (m.gm_id.clone(), m))
        .collect();
    let selected_gm_metadata: Vec<GMMetadata> =
        selected_gms.iter().filter_map(|id| metadata_by_id.get(id).cloned()).collect();
    if selected_gm_metadata.len() != selected_gms.len() {
        tracing::warn!(
            dataset = dataset.name(),
            missing = selected_gms.len() - selected_gm_metadata.len(),
            "Selected ground motions without metadata"
        );
    }
    let metadata = result::summarise_selection(
        &selected_gm_metadata,
        ks_critical_value(request.n_gms, config.ks_alpha),
        best.n_distinct,
    )?;

    tracing::info!(
        ensemble = %ensemble.name,
        station,
        %im_j,
        im_j_value,
        replica = best.replica,
        residual = best.residual,
        n_distinct = best.n_distinct,
        "Selected ground motions"
    );

    let chosen_replica = best.replica;
    let ks_statistics = best.ks.clone();
    let realisations = replicas.swap_remove(chosen_replica);

    Ok(GMSResult {
        ensemble_name: ensemble.name.clone(),
        site: site.clone(),
        dataset_name: dataset.name().to_string(),
        data_type,
        im_j,
        im_j_value,
        target_exceedance,
        ims: ims.clone(),
        im_weights,
        selected_gms,
        selected_im_values,
        selected_gm_metadata,
        realisations,
        targets: ims.iter().copied().zip(targets).collect(),
        adj_branch_weights: adj.weights,
        chosen_replica,
        replica_residuals: scores.iter().map(|s| s.residual).collect(),
        replica_distinct: scores.iter().map(|s| s.n_distinct).collect(),
        ks_statistics,
        causal_bounds: bounds,
        metadata,
    })
}
