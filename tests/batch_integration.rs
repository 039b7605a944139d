//! Batch runner over (station, IM, level) tasks

mod common;

use std::fmt;

use common::*;
use seismic_hazard::batch::{BatchRunner, BatchSummary, TaskOutcome};
use seismic_hazard::core::{EngineConfig, IM};
use seismic_hazard::disagg::{run_ensemble_disagg, DisaggTarget};
use seismic_hazard::tree::Ensemble;

#[derive(Debug, Clone)]
struct DisaggTask {
    im: IM,
    exceedance: f64,
}

impl fmt::Display for DisaggTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {:e}", self.im, self.exceedance)
    }
}

#[test]
fn test_batch_disagg_skips_out_of_range_levels() {
    let config = ensemble_config();
    let data = data_sources();
    let tasks: Vec<DisaggTask> = [pga(), psa1(), pgv()]
        .into_iter()
        .flat_map(|im| [2e-4, 1e-4, 1e-20].into_iter().map(move |exceedance| DisaggTask { im, exceedance }))
        .collect();

    let runner = BatchRunner::new(3).unwrap();
    assert_eq!(runner.n_workers(), 3);
    let reports = runner.run(tasks, |task| {
        let ens = Ensemble::new(&config, data.clone(), EngineConfig::default())?;
        let disagg = run_ensemble_disagg(&ens, &site(), &task.im, DisaggTarget::Exceedance(task.exceedance))?;
        Ok(disagg.total_contribution())
    });

    assert_eq!(reports.len(), 9);
    for report in &reports {
        match report.task.exceedance {
            e if e == 1e-20 => assert!(matches!(report.outcome, TaskOutcome::Skipped(_)), "{}", report.task),
            _ => {
                let total = report.outcome.completed().copied().unwrap();
                assert!((total - 1.0).abs() < 1e-9);
            }
        }
    }
    assert_eq!(BatchSummary::of(&reports), BatchSummary { completed: 6, skipped: 3, failed: 0 });
}

#[test]
fn test_batch_configuration_errors_fail_without_stopping() {
    let config = ensemble_config();
    let data = data_sources();
    let tasks = vec![
        DisaggTask { im: pga(), exceedance: 1e-4 },
        DisaggTask { im: IM::psa(10.0), exceedance: 1e-4 },
        DisaggTask { im: pgv(), exceedance: 1e-4 },
    ];

    let reports = BatchRunner::new(2).unwrap().run(tasks, |task| {
        let ens = Ensemble::new(&config, data.clone(), EngineConfig::default())?;
        run_ensemble_disagg(&ens, &site(), &task.im, DisaggTarget::Exceedance(task.exceedance)).map(|d| d.im_value)
    });

    assert!(reports[0].outcome.is_completed());
    assert!(matches!(reports[1].outcome, TaskOutcome::Failed(_)));
    assert!(reports[2].outcome.is_completed());
}
