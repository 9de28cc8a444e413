//! Classifier router: partition units into labeled output directories.
//!
//! A specialisation of the stage runner where the transform returns a
//! *label* instead of new content. The unit's excerpt is written unchanged
//! into `output_root/<label>/<id>.txt`, so the cleaning and translation
//! stages can apply per-section prompts by pointing at one label directory.
//!
//! ## Fail-soft routing
//!
//! Classification is advisory, never load-bearing: a misclassified page is
//! cleaned with a suboptimal prompt, which is recoverable; a page dropped
//! on the floor is not. So any `label_fn` error, and any label outside the
//! known set, routes to [`Label::Body`] — every input unit ends up routed
//! exactly once and the pipeline never stalls on a bad classification.

use crate::error::{PipelineError, UnitError};
use crate::progress::StageProgressCallback;
use crate::store::{self, Label, WorkUnit};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Per-unit routing result.
#[derive(Debug)]
pub struct RoutedUnit {
    pub id: String,
    pub label: Label,
    /// Present when the unit was routed by fallback rather than by a valid
    /// model response.
    pub fallback_reason: Option<String>,
}

/// Aggregated result of a classification pass.
#[derive(Debug)]
pub struct ClassifyReport {
    pub routed: Vec<RoutedUnit>,
    /// Units whose routed excerpt could not be written. Their source files
    /// are untouched, so the next pass picks them up again.
    pub failed: Vec<UnitError>,
}

impl ClassifyReport {
    /// Count of units routed to `label`.
    pub fn count(&self, label: Label) -> usize {
        self.routed.iter().filter(|r| r.label == label).count()
    }

    /// Units that fell back to the default label.
    pub fn fallbacks(&self) -> usize {
        self.routed.iter().filter(|r| r.fallback_reason.is_some()).count()
    }
}

/// Options for a classification pass.
#[derive(Clone)]
pub struct ClassifyOptions {
    pub concurrency: usize,
    /// How many characters of each unit are classified and routed.
    pub excerpt_chars: usize,
    pub progress: Option<Arc<dyn StageProgressCallback>>,
}

impl ClassifyOptions {
    pub fn new(concurrency: usize, excerpt_chars: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            excerpt_chars,
            progress: None,
        }
    }

    pub fn progress(mut self, callback: Option<Arc<dyn StageProgressCallback>>) -> Self {
        self.progress = callback;
        self
    }
}

const STAGE: &str = "classify";

/// Classify every unit in `input_dir` and route it into a per-label
/// subdirectory of `output_root`.
///
/// `label_fn` receives the unit excerpt and returns the model's raw label
/// response. All four label directories are created up front so downstream
/// stages can iterate them unconditionally.
pub async fn classify_units<F, Fut>(
    input_dir: &Path,
    output_root: &Path,
    opts: &ClassifyOptions,
    label_fn: F,
) -> Result<ClassifyReport, PipelineError>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, UnitError>> + Send,
{
    for label in Label::ALL {
        let dir = output_root.join(label.as_str());
        std::fs::create_dir_all(&dir)
            .map_err(|source| PipelineError::OutputWrite { path: dir, source })?;
    }

    let units = store::list_units(input_dir)?;
    info!("[{STAGE}] {} units from {}", units.len(), input_dir.display());
    if let Some(cb) = &opts.progress {
        cb.on_stage_start(STAGE, units.len());
    }

    let label_fn = &label_fn;
    let mut routed: Vec<(usize, Result<RoutedUnit, UnitError>)> =
        stream::iter(units.into_iter().enumerate().map(|(idx, unit)| {
            let progress = opts.progress.clone();
            let excerpt_chars = opts.excerpt_chars;
            async move {
                let id = unit.id.clone();
                if let Some(cb) = &progress {
                    cb.on_unit_start(STAGE, &id);
                }
                let excerpt = truncate_chars(&unit.content, excerpt_chars);

                let (label, fallback_reason) = match label_fn(excerpt.clone()).await {
                    Ok(response) => match Label::parse(&response) {
                        Some(label) => (label, None),
                        None => (
                            Label::Body,
                            Some(format!("unknown label {:?}", response.trim())),
                        ),
                    },
                    Err(e) => (Label::Body, Some(e.to_string())),
                };
                if let Some(reason) = &fallback_reason {
                    warn!("[{STAGE}] {id}: {reason}; routing to body");
                }

                let target = output_root.join(label.as_str());
                let result = match store::write_unit(&target, &WorkUnit::new(id.clone(), excerpt))
                {
                    Ok(()) => {
                        if let Some(cb) = &progress {
                            cb.on_unit_complete(STAGE, &id, label.as_str().len());
                        }
                        Ok(RoutedUnit {
                            id,
                            label,
                            fallback_reason,
                        })
                    }
                    Err(e) => {
                        let err = UnitError::Io {
                            unit: id.clone(),
                            detail: e.to_string(),
                        };
                        warn!("[{STAGE}] {err}");
                        if let Some(cb) = &progress {
                            cb.on_unit_error(STAGE, &id, &err.to_string());
                        }
                        Err(err)
                    }
                };
                (idx, result)
            }
        }))
        .buffer_unordered(opts.concurrency)
        .collect()
        .await;

    routed.sort_by_key(|(idx, _)| *idx);

    let mut report = ClassifyReport {
        routed: Vec::new(),
        failed: Vec::new(),
    };
    for (_, result) in routed {
        match result {
            Ok(unit) => report.routed.push(unit),
            Err(e) => report.failed.push(e),
        }
    }
    info!(
        "[{STAGE}] routed: {} body, {} toc, {} bibliography, {} index ({} fallbacks, {} failed)",
        report.count(Label::Body),
        report.count(Label::Toc),
        report.count(Label::Bibliography),
        report.count(Label::Index),
        report.fallbacks(),
        report.failed.len()
    );
    if let Some(cb) = &opts.progress {
        cb.on_stage_complete(STAGE, report.routed.len(), 0, report.failed.len());
    }
    Ok(report)
}

/// First `n` characters of `s`, respecting char boundaries.
fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}
