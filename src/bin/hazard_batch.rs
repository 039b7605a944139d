//! Hazard Batch Runner
//!
//! Runs hazard, disaggregation and ground motion selection over a list of
//! sites on a worker pool and writes one JSON result per task.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use seismic_hazard::batch::{BatchRunner, BatchSummary, TaskOutcome};
use seismic_hazard::core::error::Result;
use seismic_hazard::core::persist::load_json;
use seismic_hazard::core::{EngineConfig, SiteInfo, IM};
use seismic_hazard::data::{DataSources, InMemoryDistanceStore, InMemoryIMStore, InMemoryRuptureStore};
use seismic_hazard::disagg::{calc_disagg_gridding, run_ensemble_disagg, DisaggTarget};
use seismic_hazard::gms::{run_ensemble_gms, GMDataset, GMDatasetRegistry, GMSRequest};
use seismic_hazard::hazard::run_ensemble_hazard;
use seismic_hazard::tree::{Ensemble, EnsembleConfig};
use tracing_subscriber::EnvFilter;

/// Batch PSHA runner over a logic tree ensemble
#[derive(Parser, Debug)]
#[command(name = "hazard_batch")]
#[command(about = "Compute hazard, disaggregation and ground motion selection for many sites")]
struct Args {
    /// Logic tree description (TOML)
    #[arg(long)]
    ensemble: PathBuf,

    /// Engine configuration (TOML); defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// IM data store (JSON)
    #[arg(long)]
    im_data: PathBuf,

    /// Rupture catalogues (JSON)
    #[arg(long)]
    ruptures: PathBuf,

    /// Site-source distances (JSON)
    #[arg(long)]
    distances: PathBuf,

    /// Sites to process (JSON list)
    #[arg(long)]
    sites: PathBuf,

    /// IMs to compute hazard for, e.g. PGA,pSA_1.0
    #[arg(long, value_delimiter = ',', required = true)]
    ims: Vec<IM>,

    /// Annual exceedance rates to disaggregate at
    #[arg(long, value_delimiter = ',')]
    exceedances: Vec<f64>,

    /// Ground motion dataset description (TOML); enables selection
    #[arg(long)]
    gm_dataset: Option<PathBuf>,

    /// IMs to select on, besides the conditioning IM
    #[arg(long, value_delimiter = ',')]
    gms_ims: Vec<IM>,

    /// Number of ground motions to select
    #[arg(long, default_value_t = 30)]
    n_gms: usize,

    /// Worker threads (0 = one per core)
    #[arg(long, short = 'j', default_value_t = 0)]
    workers: usize,

    /// Output directory
    #[arg(long, short = 'o', default_value = "hazard_output")]
    output: PathBuf,
}

#[derive(Debug, Clone)]
enum TaskKind {
    Hazard,
    Disagg { exceedance: f64 },
    Gms { exceedance: f64 },
}

#[derive(Debug, Clone)]
struct Task {
    site: SiteInfo,
    im: IM,
    kind: TaskKind,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TaskKind::Hazard => write!(f, "hazard {} {}", self.site.station_name, self.im),
            TaskKind::Disagg { exceedance } => {
                write!(f, "disagg {} {} @ {:e}", self.site.station_name, self.im, exceedance)
            }
            TaskKind::Gms { exceedance } => write!(f, "gms {} {} @ {:e}", self.site.station_name, self.im, exceedance),
        }
    }
}

impl Task {
    fn output_path(&self, root: &Path) -> PathBuf {
        let dir = root.join(&self.site.station_name);
        match self.kind {
            TaskKind::Hazard => dir.join(format!("hazard_{}.json", self.im)),
            TaskKind::Disagg { exceedance } => dir.join(format!("disagg_{}_{:e}.json", self.im, exceedance)),
            TaskKind::Gms { exceedance } => dir.join(format!("gms_{}_{:e}.json", self.im, exceedance)),
        }
    }
}

/// Inputs shared by every task of the batch
struct BatchContext {
    ensemble_config: EnsembleConfig,
    data: DataSources,
    engine_config: EngineConfig,
    dataset: Option<Box<dyn GMDataset>>,
    gms_ims: Vec<IM>,
    n_gms: usize,
    output: PathBuf,
}

impl BatchContext {
    fn run_task(&self, task: &Task) -> Result<PathBuf> {
        // One ensemble per task, so caches are never shared between workers
        let ensemble = Ensemble::new(&self.ensemble_config, self.data.clone(), self.engine_config.clone())?;
        let path = task.output_path(&self.output);
        match task.kind {
            TaskKind::Hazard => {
                run_ensemble_hazard(&ensemble, &task.site, &task.im, None, true)?.save(&path)?;
            }
            TaskKind::Disagg { exceedance } => {
                let target = DisaggTarget::Exceedance(exceedance);
                let disagg = run_ensemble_disagg(&ensemble, &task.site, &task.im, target)?;
                disagg.save(&path)?;
                let grid = calc_disagg_gridding(&disagg.contributions, &self.engine_config.disagg)?;
                grid.save(&path.with_extension("grid.json"))?;
            }
            TaskKind::Gms { exceedance } => {
                if let Some(dataset) = &self.dataset {
                    let target = DisaggTarget::Exceedance(exceedance);
                    let request = GMSRequest::new(task.im, target, self.gms_ims.clone(), self.n_gms);
                    run_ensemble_gms(&ensemble, &task.site, dataset.as_ref(), &request)?.save(&path)?;
                }
            }
        }
        Ok(path)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();

    let engine_config = match &args.config {
        Some(path) => EngineConfig::load_from_toml(path)?,
        None => EngineConfig::default(),
    };
    let ensemble_config = EnsembleConfig::load_from_toml(&args.ensemble)?;
    let data = DataSources::new(
        Arc::new(InMemoryIMStore::load_from_json(&args.im_data)?),
        Arc::new(InMemoryRuptureStore::load_from_json(&args.ruptures)?),
        Arc::new(InMemoryDistanceStore::load_from_json(&args.distances)?),
    );
    let sites: Vec<SiteInfo> = load_json(&args.sites)?;
    let dataset = match &args.gm_dataset {
        Some(path) => Some(GMDatasetRegistry::with_defaults().load_file(path)?),
        None => None,
    };

    let mut tasks = Vec::new();
    for site in &sites {
        for im in &args.ims {
            tasks.push(Task { site: site.clone(), im: *im, kind: TaskKind::Hazard });
            for &exceedance in &args.exceedances {
                tasks.push(Task { site: site.clone(), im: *im, kind: TaskKind::Disagg { exceedance } });
                if dataset.is_some() {
                    tasks.push(Task { site: site.clone(), im: *im, kind: TaskKind::Gms { exceedance } });
                }
            }
        }
    }

    tracing::info!(
        ensemble = %ensemble_config.name,
        n_sites = sites.len(),
        n_tasks = tasks.len(),
        "Starting batch"
    );

    let context = BatchContext {
        ensemble_config,
        data,
        engine_config,
        dataset,
        gms_ims: args.gms_ims,
        n_gms: args.n_gms,
        output: args.output,
    };
    let runner = BatchRunner::new(args.workers)?;
    let reports = runner.run(tasks, |task| context.run_task(task));

    for report in &reports {
        match &report.outcome {
            TaskOutcome::Completed(path) => println!("done     {} -> {}", report.task, path.display()),
            TaskOutcome::Skipped(reason) => println!("skipped  {}: {}", report.task, reason),
            TaskOutcome::Failed(reason) => println!("FAILED   {}: {}", report.task, reason),
        }
    }
    let summary = BatchSummary::of(&reports);
    println!(
        "\n{} completed, {} skipped, {} failed",
        summary.completed, summary.skipped, summary.failed
    );
    Ok(())
}
