//! Criterion benchmarks for the hazard and disaggregation engines.
//!
//! Benchmarks:
//!   - ensemble hazard curve over 2000 ruptures x 3 branches, 100 IM levels
//!   - ensemble disaggregation at a single exceedance
//!   - nearest positive-definite correction of a 10x10 correlation matrix
//!
//! Run with: cargo bench --bench hazard_bench

use std::collections::BTreeMap;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::DMatrix;

use seismic_hazard::core::{EngineConfig, IMDataType, IMType, SiteInfo, TectonicType, IM};
use seismic_hazard::data::{
    DataSources, IMTable, InMemoryDistanceStore, InMemoryIMStore, InMemoryRuptureStore, LnIMParams, ParametricTable,
    RuptureRecord, SiteSourceDistance,
};
use seismic_hazard::disagg::{run_ensemble_disagg, DisaggTarget};
use seismic_hazard::gms::nearest_pd;
use seismic_hazard::hazard::run_ensemble_hazard;
use seismic_hazard::tree::{Ensemble, EnsembleConfig};

const N_RUPTURES: usize = 2000;
const STATION: &str = "CCCC";

fn ensemble_toml() -> String {
    let mut toml = String::from("name = \"bench\"\n\n[[im_ensembles]]\nim_types = [\"PGA\"]\n");
    for b in 0..3 {
        toml.push_str(&format!(
            "\n[[im_ensembles.branches]]\nname = \"B{b}\"\nweight = {w}\n\n\
             [[im_ensembles.branches.leaves]]\nsource_type = \"fault\"\nrupture_source = \"erf\"\n\
             im_sources = [\"gmm_{b}\"]\n",
            b = b,
            w = [0.5, 0.3, 0.2][b]
        ));
    }
    toml
}

fn build_ensemble() -> Ensemble {
    let names: Vec<String> = (0..N_RUPTURES).map(|i| format!("rup_{}", i)).collect();
    let pga = IM::new(IMType::PGA);

    let mut im_store = InMemoryIMStore::new();
    for b in 0..3 {
        let source = format!("gmm_{}", b);
        let column = (0..N_RUPTURES)
            .map(|i| LnIMParams::new((0.02 + 0.5 * (i % 97) as f64 / 97.0).ln() + 0.1 * b as f64, 0.6))
            .collect();
        let mut columns = BTreeMap::new();
        columns.insert(pga, column);
        im_store.add_source(&source, IMDataType::Parametric, vec![pga]).unwrap();
        im_store
            .insert_station(&source, STATION, IMTable::Parametric(ParametricTable { ruptures: names.clone(), columns }))
            .unwrap();
    }

    let mut rupture_store = InMemoryRuptureStore::new();
    let mut distance_store = InMemoryDistanceStore::new();
    let records = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let rrup = 5.0 + (i % 150) as f64;
            distance_store.insert(
                "erf",
                STATION,
                name,
                SiteSourceDistance { rjb: rrup, rrup, rx: None, ry: None, rtvz: None },
            );
            RuptureRecord {
                name: name.clone(),
                annual_rec_prob: 1e-6 * (1 + i % 13) as f64,
                magnitude: 5.5 + 3.0 * (i % 31) as f64 / 31.0,
                tectonic_type: TectonicType::ActiveShallow,
                fault_name: None,
            }
        })
        .collect();
    rupture_store.insert("erf", records);

    let data = DataSources::new(Arc::new(im_store), Arc::new(rupture_store), Arc::new(distance_store));
    let config = EnsembleConfig::parse_toml(&ensemble_toml()).unwrap();
    Ensemble::new(&config, data, EngineConfig::default()).unwrap()
}

fn bench_hazard(c: &mut Criterion) {
    let mut group = c.benchmark_group("hazard");
    group.sample_size(20);

    let ens = build_ensemble();
    let site = SiteInfo::new(STATION, -43.5, 172.6, 400.0);
    let pga = IM::new(IMType::PGA);

    group.bench_function("ensemble_curve_2000_ruptures", |b| {
        b.iter(|| black_box(run_ensemble_hazard(&ens, &site, &pga, None, true).unwrap()));
    });

    group.bench_function("ensemble_disagg_2000_ruptures", |b| {
        b.iter(|| black_box(run_ensemble_disagg(&ens, &site, &pga, DisaggTarget::Exceedance(1e-4)).unwrap()));
    });

    group.finish();
}

fn bench_correlation(c: &mut Criterion) {
    let mut group = c.benchmark_group("correlation");

    // Slightly inconsistent correlations, as produced by mixing models
    let n = 10;
    let matrix = DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            1.0
        } else {
            0.9 - 0.05 * (i as f64 - j as f64).abs() + if (i + j) % 4 == 0 { 0.12 } else { 0.0 }
        }
    });

    group.bench_function("nearest_pd_10x10", |b| {
        b.iter(|| black_box(nearest_pd(black_box(&matrix))));
    });

    group.finish();
}

criterion_group!(benches, bench_hazard, bench_correlation);
criterion_main!(benches);
