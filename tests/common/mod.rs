//! Shared fixtures for integration tests
//!
//! One station (CCCC), one fault rupture source with three ruptures and two
//! GMM branches A and B. PGA and pSA_1.0 live in one IM family, PGV and AI in
//! another with the same branch names.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use seismic_hazard::core::{EngineConfig, IMDataType, IMType, SiteInfo, TectonicType, IM};
use seismic_hazard::data::{
    DataSources, IMTable, InMemoryDistanceStore, InMemoryIMStore, InMemoryRuptureStore, LnIMParams,
    NonParametricTable, ParametricTable, RuptureRecord, SiteSourceDistance,
};
use seismic_hazard::gms::{GMRecord, HistoricalGMDataset};
use seismic_hazard::tree::{Ensemble, EnsembleConfig};

pub const STATION: &str = "CCCC";
pub const RUPTURE_SOURCE: &str = "flt_erf";

/// (name, annual rate, magnitude, rrup)
pub const RUPTURES: [(&str, f64, f64, f64); 3] =
    [("AlpineF2K", 1e-4, 7.5, 10.0), ("Hope1888", 2e-4, 6.5, 30.0), ("Wellington", 5e-5, 8.0, 20.0)];

pub fn site() -> SiteInfo {
    SiteInfo::new(STATION, -43.53, 172.63, 400.0)
}

pub fn pga() -> IM {
    IM::new(IMType::PGA)
}

pub fn psa1() -> IM {
    IM::psa(1.0)
}

pub fn pgv() -> IM {
    IM::new(IMType::PGV)
}

pub fn ai() -> IM {
    IM::new(IMType::AI)
}

pub const ENSEMBLE_TOML: &str = r#"
name = "test_v1"

[[im_ensembles]]
im_types = ["PGA", "pSA"]

[[im_ensembles.branches]]
name = "A"
weight = 0.5

[[im_ensembles.branches.leaves]]
source_type = "fault"
rupture_source = "flt_erf"
im_sources = ["gmm_a"]

[[im_ensembles.branches]]
name = "B"
weight = 0.5

[[im_ensembles.branches.leaves]]
source_type = "fault"
rupture_source = "flt_erf"
im_sources = ["gmm_b"]

[[im_ensembles]]
im_types = ["PGV", "AI"]

[[im_ensembles.branches]]
name = "A"
weight = 0.5

[[im_ensembles.branches.leaves]]
source_type = "fault"
rupture_source = "flt_erf"
im_sources = ["gmm_a_vel"]

[[im_ensembles.branches]]
name = "B"
weight = 0.5

[[im_ensembles.branches.leaves]]
source_type = "fault"
rupture_source = "flt_erf"
im_sources = ["gmm_b_vel"]
"#;

pub fn ensemble_config() -> EnsembleConfig {
    EnsembleConfig::parse_toml(ENSEMBLE_TOML).unwrap()
}

fn rupture_names() -> Vec<String> {
    RUPTURES.iter().map(|r| r.0.to_string()).collect()
}

fn ln_column(medians: [f64; 3], sigma: f64) -> Vec<LnIMParams> {
    medians.iter().map(|m| LnIMParams::new(m.ln(), sigma)).collect()
}

fn parametric_source(store: &mut InMemoryIMStore, source: &str, columns: BTreeMap<IM, Vec<LnIMParams>>) {
    let ims: Vec<IM> = columns.keys().copied().collect();
    store.add_source(source, IMDataType::Parametric, ims).unwrap();
    store
        .insert_station(source, STATION, IMTable::Parametric(ParametricTable { ruptures: rupture_names(), columns }))
        .unwrap();
}

/// Parametric IM data; branch B medians are 20% above branch A
pub fn parametric_store() -> InMemoryIMStore {
    let mut store = InMemoryIMStore::new();
    for (suffix, factor) in [("a", 1.0), ("b", 1.2)] {
        let mut acc = BTreeMap::new();
        acc.insert(pga(), ln_column([0.3 * factor, 0.1 * factor, 0.5 * factor], 0.6));
        acc.insert(psa1(), ln_column([0.2 * factor, 0.05 * factor, 0.4 * factor], 0.7));
        parametric_source(&mut store, &format!("gmm_{}", suffix), acc);

        let mut vel = BTreeMap::new();
        vel.insert(pgv(), ln_column([30.0 * factor, 10.0 * factor, 50.0 * factor], 0.6));
        vel.insert(ai(), ln_column([0.5 * factor, 0.1 * factor, 1.0 * factor], 1.0));
        parametric_source(&mut store, &format!("gmm_{}_vel", suffix), vel);
    }
    store
}

pub fn rupture_store() -> InMemoryRuptureStore {
    let mut store = InMemoryRuptureStore::new();
    store.insert(
        RUPTURE_SOURCE,
        RUPTURES
            .iter()
            .map(|(name, rate, mag, _)| RuptureRecord {
                name: name.to_string(),
                annual_rec_prob: *rate,
                magnitude: *mag,
                tectonic_type: TectonicType::ActiveShallow,
                fault_name: None,
            })
            .collect(),
    );
    store
}

/// Distances for every rupture except those named in `missing`
pub fn distance_store_without(missing: &[&str]) -> InMemoryDistanceStore {
    let mut store = InMemoryDistanceStore::new();
    for (name, _, _, rrup) in RUPTURES.iter().filter(|r| !missing.contains(&r.0)) {
        store.insert(
            RUPTURE_SOURCE,
            STATION,
            name,
            SiteSourceDistance { rjb: rrup - 2.0, rrup: *rrup, rx: None, ry: None, rtvz: None },
        );
    }
    store
}

pub fn data_sources() -> DataSources {
    DataSources::new(
        Arc::new(parametric_store()),
        Arc::new(rupture_store()),
        Arc::new(distance_store_without(&[])),
    )
}

pub fn ensemble() -> Ensemble {
    Ensemble::new(&ensemble_config(), data_sources(), EngineConfig::default()).unwrap()
}

/// Single-branch ensemble over simulated (non-parametric) IM data
pub const SIM_ENSEMBLE_TOML: &str = r#"
name = "sims_v1"

[[im_ensembles]]
im_types = ["PGA", "pSA"]

[[im_ensembles.branches]]
name = "S"
weight = 1.0

[[im_ensembles.branches.leaves]]
source_type = "fault"
rupture_source = "flt_erf"
im_sources = ["sims"]
"#;

pub const N_SIMS: usize = 40;

/// 40 realisations per rupture, lognormal around fixed medians
pub fn simulation_store() -> InMemoryIMStore {
    let medians = [0.2, 0.1, 0.3];
    let mut ruptures = Vec::new();
    let mut realisations = Vec::new();
    let mut psa = Vec::new();
    let mut acc = Vec::new();
    for (r, (name, ..)) in RUPTURES.iter().enumerate() {
        for i in 0..N_SIMS {
            let z = -2.0 + 4.0 * i as f64 / (N_SIMS - 1) as f64;
            let value = medians[r] * (0.6 * z).exp();
            ruptures.push(name.to_string());
            realisations.push(i as u32);
            psa.push(value);
            acc.push(1.3 * value);
        }
    }
    let mut columns = BTreeMap::new();
    columns.insert(psa1(), psa);
    columns.insert(pga(), acc);

    let mut store = InMemoryIMStore::new();
    store.add_source("sims", IMDataType::NonParametric, vec![pga(), psa1()]).unwrap();
    store
        .insert_station("sims", STATION, IMTable::NonParametric(NonParametricTable { ruptures, realisations, columns }))
        .unwrap();
    store
}

pub fn simulation_ensemble(config: EngineConfig) -> Ensemble {
    let data = DataSources::new(
        Arc::new(simulation_store()),
        Arc::new(rupture_store()),
        Arc::new(distance_store_without(&[])),
    );
    Ensemble::new(&EnsembleConfig::parse_toml(SIM_ENSEMBLE_TOML).unwrap(), data, config).unwrap()
}

fn frac(x: f64) -> f64 {
    x - x.floor()
}

/// Deterministic pool of 80 historical records covering M6-8.5, 5-55 km
pub fn historical_dataset() -> HistoricalGMDataset {
    let records = (0..80)
        .map(|i| {
            let x = i as f64;
            let sa = (0.05f64.ln() + 20.0f64.ln() * frac(x * 0.7548)).exp();
            let mut im_values = BTreeMap::new();
            im_values.insert(psa1(), sa);
            im_values.insert(pga(), sa * (1.2 + 0.6 * frac(x * 0.5710)));
            im_values.insert(pgv(), 60.0 * sa * (0.8 + 0.5 * frac(x * 0.3301)));
            im_values.insert(ai(), sa * sa * (0.5 + frac(x * 0.1234)));
            GMRecord {
                id: format!("gm_{:03}", i),
                magnitude: 6.0 + 2.5 * frac(x * 0.6180),
                rrup: 5.0 + 50.0 * frac(x * 0.3820),
                vs30: 300.0 + 200.0 * frac(x * 0.2137),
                im_values,
                waveform: None,
            }
        })
        .collect();
    HistoricalGMDataset::new("nga_subset", records)
}
