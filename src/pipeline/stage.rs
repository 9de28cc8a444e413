//! Stage runner: apply one transform to every pending unit in a directory.
//!
//! This is the pipeline's workhorse. One invocation turns an input
//! directory into an output directory by fanning the pending units out over
//! a bounded number of concurrent transform calls and joining on all of
//! them before returning.
//!
//! ## Resumability contract
//!
//! * A unit whose output file already exists is reported [`StageOutcome::Skipped`]
//!   and never re-submitted (unless `overwrite` is set). A unit whose
//!   output was replaced by `_partNN` children (the long-unit splitter
//!   deletes the original) counts as done too — its first part stands in
//!   for the missing output file, so re-runs never re-clean a page that
//!   was split after cleaning.
//! * A failed transform writes **nothing** — the absent output file is the
//!   retry trigger for the next invocation of the same stage.
//! * Units are independent: no cross-unit state, so concurrent workers
//!   never target the same output path and no locking is needed.
//!
//! Completion order under concurrency is nondeterministic, but the report
//! lists units in input (lexicographic id) order so logs stay comparable
//! across runs.

use crate::error::{PipelineError, UnitError};
use crate::progress::StageProgressCallback;
use crate::store::{self, WorkUnit};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-unit outcome of one stage invocation.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    /// Transform succeeded and the output file was written.
    Completed,
    /// Output file already existed; the unit was not re-processed.
    Skipped,
    /// Transform (or the output write) failed; no output file exists.
    Failed(UnitError),
}

impl StageOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed(_))
    }
}

/// Aggregated result of one stage invocation, in input order.
#[derive(Debug)]
pub struct StageReport {
    /// Stage name, for logs.
    pub stage: String,
    /// Per-unit outcomes, ordered by unit id.
    pub results: Vec<(String, StageOutcome)>,
}

impl StageReport {
    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, StageOutcome::Completed))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, StageOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| o.is_failed())
    }

    /// The unit errors, in input order.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &UnitError)> {
        self.results.iter().filter_map(|(id, outcome)| match outcome {
            StageOutcome::Failed(e) => Some((id.as_str(), e)),
            _ => None,
        })
    }

    fn count(&self, pred: impl Fn(&StageOutcome) -> bool) -> usize {
        self.results.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Knobs for one stage invocation.
#[derive(Clone)]
pub struct StageOptions {
    /// Stage name used in logs and progress events.
    pub stage: String,
    /// Bounded worker count for concurrent transform calls.
    pub concurrency: usize,
    /// Re-process units whose output already exists.
    pub overwrite: bool,
    /// Optional per-unit progress events.
    pub progress: Option<Arc<dyn StageProgressCallback>>,
}

impl StageOptions {
    pub fn new(stage: impl Into<String>, concurrency: usize) -> Self {
        Self {
            stage: stage.into(),
            concurrency: concurrency.max(1),
            overwrite: false,
            progress: None,
        }
    }

    pub fn overwrite(mut self, v: bool) -> Self {
        self.overwrite = v;
        self
    }

    pub fn progress(mut self, callback: Option<Arc<dyn StageProgressCallback>>) -> Self {
        self.progress = callback;
        self
    }
}

/// Run one transformation stage over every unit in `input_dir`.
///
/// For each unit whose `output_dir/<id>.txt` does not exist (or with
/// `overwrite`), `transform` is submitted to a pool bounded by
/// `opts.concurrency`; its `Ok` text is written to the output path. A
/// unit's failure is isolated and recorded — it never aborts the stage.
///
/// Returns `Err` only for stage-level problems: unreadable input
/// directory, or an output directory that cannot be created.
pub async fn run_stage<F, Fut>(
    input_dir: &Path,
    output_dir: &Path,
    opts: &StageOptions,
    transform: F,
) -> Result<StageReport, PipelineError>
where
    F: Fn(WorkUnit) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, UnitError>> + Send,
{
    let units = store::list_units(input_dir)?;
    std::fs::create_dir_all(output_dir).map_err(|source| PipelineError::OutputWrite {
        path: output_dir.to_path_buf(),
        source,
    })?;

    info!(
        "[{}] {} units: {} → {}",
        opts.stage,
        units.len(),
        input_dir.display(),
        output_dir.display()
    );
    if let Some(cb) = &opts.progress {
        cb.on_stage_start(&opts.stage, units.len());
    }

    // Pre-sized so each unit lands at its input-order slot regardless of
    // completion order.
    let mut ordered: Vec<Option<(String, StageOutcome)>> = Vec::new();
    ordered.resize_with(units.len(), || None);

    let mut pending: Vec<(usize, WorkUnit)> = Vec::new();
    for (idx, unit) in units.into_iter().enumerate() {
        // The first _partNN child marks a unit whose output was re-split
        // in place; the original file is gone but the work is done.
        let done = store::unit_path(output_dir, &unit.id).exists()
            || store::unit_path(output_dir, &unit.part_id(1)).exists();
        if !opts.overwrite && done {
            debug!("[{}] {} already done, skipping", opts.stage, unit.id);
            if let Some(cb) = &opts.progress {
                cb.on_unit_skipped(&opts.stage, &unit.id);
            }
            ordered[idx] = Some((unit.id, StageOutcome::Skipped));
        } else {
            pending.push((idx, unit));
        }
    }

    let transform = &transform;
    let resolved: Vec<(usize, String, StageOutcome)> =
        stream::iter(pending.into_iter().map(|(idx, unit)| {
            let stage = opts.stage.as_str();
            let progress = opts.progress.clone();
            async move {
                let id = unit.id.clone();
                if let Some(cb) = &progress {
                    cb.on_unit_start(stage, &id);
                }
                let outcome = match transform(unit).await {
                    Ok(content) => {
                        let len = content.len();
                        match store::write_unit(output_dir, &WorkUnit::new(id.clone(), content)) {
                            Ok(()) => {
                                if let Some(cb) = &progress {
                                    cb.on_unit_complete(stage, &id, len);
                                }
                                StageOutcome::Completed
                            }
                            Err(e) => {
                                let err = UnitError::Io {
                                    unit: id.clone(),
                                    detail: e.to_string(),
                                };
                                warn!("[{stage}] {err}");
                                if let Some(cb) = &progress {
                                    cb.on_unit_error(stage, &id, &err.to_string());
                                }
                                StageOutcome::Failed(err)
                            }
                        }
                    }
                    Err(err) => {
                        warn!("[{stage}] {err}");
                        if let Some(cb) = &progress {
                            cb.on_unit_error(stage, &id, &err.to_string());
                        }
                        StageOutcome::Failed(err)
                    }
                };
                (idx, id, outcome)
            }
        }))
        .buffer_unordered(opts.concurrency)
        .collect()
        .await;

    for (idx, id, outcome) in resolved {
        ordered[idx] = Some((id, outcome));
    }

    let report = StageReport {
        stage: opts.stage.clone(),
        results: ordered.into_iter().flatten().collect(),
    };

    info!(
        "[{}] done: {} completed, {} skipped, {} failed",
        report.stage,
        report.completed(),
        report.skipped(),
        report.failed()
    );
    if let Some(cb) = &opts.progress {
        cb.on_stage_complete(
            &report.stage,
            report.completed(),
            report.skipped(),
            report.failed(),
        );
    }
    Ok(report)
}
