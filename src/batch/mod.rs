//! Batch runner: independent (station, IM) or (station, selection) tasks on
//! a worker pool
//!
//! Every task owns whatever it computes with, including its own `Ensemble`
//! and IM cache. Results stream back over a channel and are returned in task
//! order. Recoverable range errors skip the task; anything else fails it
//! without stopping the batch.

use std::fmt;
use std::sync::mpsc;

use serde::{Deserialize, Serialize};

use crate::core::error::{ErrorKind, HazardError, Result};

/// What happened to one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskOutcome<T> {
    Completed(T),
    /// The requested level lies outside the computed hazard range
    Skipped(String),
    Failed(String),
}

impl<T> TaskOutcome<T> {
    fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => TaskOutcome::Completed(value),
            Err(e) if e.is_recoverable() => TaskOutcome::Skipped(e.to_string()),
            Err(e) => TaskOutcome::Failed(e.to_string()),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed(_))
    }

    pub fn completed(&self) -> Option<&T> {
        match self {
            TaskOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport<K, T> {
    /// Position of the task in the submitted list
    pub index: usize,
    pub task: K,
    pub outcome: TaskOutcome<T>,
}

/// Completed / skipped / failed counts of a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn of<K, T>(reports: &[TaskReport<K, T>]) -> Self {
        let mut summary = Self::default();
        for report in reports {
            match report.outcome {
                TaskOutcome::Completed(_) => summary.completed += 1,
                TaskOutcome::Skipped(_) => summary.skipped += 1,
                TaskOutcome::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }
}

fn log_outcome<K: fmt::Display>(task: &K, error: &HazardError) {
    match error.kind() {
        ErrorKind::Range => tracing::info!(%task, %error, "Skipping task"),
        ErrorKind::Invariant => tracing::error!(%task, %error, "Task failed"),
        _ => tracing::warn!(%task, %error, "Task failed"),
    }
}

/// Worker pool for independent tasks
pub struct BatchRunner {
    pool: rayon::ThreadPool,
}

impl BatchRunner {
    /// Pool with `n_workers` threads; 0 uses rayon's default
    pub fn new(n_workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_workers)
            .thread_name(|i| format!("hazard-worker-{}", i))
            .build()
            .map_err(|e| HazardError::InvalidConfig(format!("Failed to build worker pool: {}", e)))?;
        Ok(Self { pool })
    }

    pub fn n_workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `f` on every task, reporting outcomes in task order
    pub fn run<K, T, F>(&self, tasks: Vec<K>, f: F) -> Vec<TaskReport<K, T>>
    where
        K: fmt::Display + Send,
        T: Send,
        F: Fn(&K) -> Result<T> + Sync,
    {
        let n_tasks = tasks.len();
        let (tx, rx) = mpsc::channel();
        let f = &f;

        self.pool.scope(|s| {
            for (index, task) in tasks.into_iter().enumerate() {
                let tx = tx.clone();
                s.spawn(move |_| {
                    let result = f(&task);
                    if let Err(e) = &result {
                        log_outcome(&task, e);
                    }
                    let outcome = TaskOutcome::from_result(result);
                    // Receiver outlives the scope
                    let _ = tx.send(TaskReport { index, task, outcome });
                });
            }
        });
        drop(tx);

        let mut reports: Vec<TaskReport<K, T>> = rx.into_iter().collect();
        reports.sort_by_key(|r| r.index);

        let summary = BatchSummary::of(&reports);
        tracing::info!(
            n_tasks,
            completed = summary.completed,
            skipped = summary.skipped,
            failed = summary.failed,
            "Batch finished"
        );
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_follow_task_order_and_classify_errors() {
        let runner = BatchRunner::new(4).unwrap();
        let tasks: Vec<u32> = (0..20).collect();
        let reports = runner.run(tasks, |&t| match t % 5 {
            3 => Err(HazardError::ExceedanceOutOfRange {
                station: "S".into(),
                im: "PGA".into(),
                exceedance: Some(1e-20),
                im_value: None,
                branch: None,
            }),
            4 => Err(HazardError::InvalidConfig("bad".into())),
            _ => Ok(t * 2),
        });

        assert_eq!(reports.len(), 20);
        assert!(reports.iter().enumerate().all(|(i, r)| r.index == i && r.task == i as u32));
        assert_eq!(reports[2].outcome, TaskOutcome::Completed(4));
        assert!(matches!(reports[3].outcome, TaskOutcome::Skipped(_)));
        assert!(matches!(reports[4].outcome, TaskOutcome::Failed(_)));

        let summary = BatchSummary::of(&reports);
        assert_eq!(summary, BatchSummary { completed: 12, skipped: 4, failed: 4 });
    }
}
