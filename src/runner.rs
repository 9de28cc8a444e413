//! Pipeline orchestrator: run the full scanned-book conversion end to end.
//!
//! [`PipelineRunner`] sequences the stages over one project's directory
//! layout. Every stage reads the previous stage's persisted output
//! directory, so a crashed or interrupted run resumes by simply running
//! again: completed units are skipped, failed ones are retried.
//!
//! Stage plan (toggles in [`RunOptions`]):
//!
//! ```text
//! split → classify → clean → [translate] → combine → [epub]
//!                                │
//!                                └─▶ audio rewrite → narration → [synthesize]
//! ```
//!
//! When a translation target is configured the combine, export and
//! narration steps operate on the *target-language* layout; otherwise on
//! the source layout.

use crate::config::{language_name, PipelineConfig};
use crate::error::PipelineError;
use crate::export;
use crate::llm;
use crate::pipeline::classify::{classify_units, ClassifyOptions, ClassifyReport};
use crate::pipeline::combine::combine_to_file;
use crate::pipeline::split::{batch_sentences, split_text_into_units};
use crate::pipeline::stage::StageReport;
use crate::pipeline::transform::{clean_units, rewrite_audio_units, translate_units};
use crate::project::ProjectLayout;
use crate::prompts;
use crate::store::{self, Label, WorkUnit};
use crate::tts::{generate_audio_units, HttpSpeechClient, PollPolicy, SpeechSynthesizer};
use edgequake_llm::LLMProvider;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Stage toggles for one run. Defaults run the full text pipeline and
/// leave audio synthesis (which needs a service endpoint) off.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Route pages into section directories.
    pub classify: bool,
    /// LLM-clean each section.
    pub clean: bool,
    /// Translate into `config.target_language`, when set.
    pub translate: bool,
    /// Export the combined Markdown to EPUB via pandoc.
    pub epub: bool,
    /// Rewrite body text for narration and build the narration script.
    pub audio: bool,
    /// Synthesize narration audio; requires `config.tts_endpoint`.
    pub synthesize_audio: bool,
    /// Re-process units whose outputs already exist.
    pub overwrite: bool,
    /// Re-split over-budget cleaned body pages on sentence boundaries.
    pub split_long: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            classify: true,
            clean: true,
            translate: true,
            epub: true,
            audio: true,
            synthesize_audio: false,
            overwrite: false,
            split_long: true,
        }
    }
}

/// What one [`PipelineRunner::run`] produced.
#[derive(Debug)]
pub struct RunSummary {
    pub project: String,
    /// Per-stage unit reports, in execution order.
    pub stages: Vec<StageReport>,
    pub classification: Option<ClassifyReport>,
    pub combined_md: Option<PathBuf>,
    pub epub: Option<PathBuf>,
    pub narration_md: Option<PathBuf>,
}

/// One document's fate in a batch run.
#[derive(Debug)]
pub enum BatchOutcome {
    /// Already processed (narration script exists) and `force` was not set.
    Skipped,
    Ran(RunSummary),
    Failed(PipelineError),
}

/// Orchestrates the conversion stages over a project layout.
pub struct PipelineRunner {
    config: PipelineConfig,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
}

impl PipelineRunner {
    /// Validates language codes up front so a bad `--to es-XX` fails before
    /// any OCR or LLM work is spent.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        language_name(&config.language)?;
        if let Some(target) = &config.target_language {
            language_name(target)?;
        }
        Ok(Self {
            config,
            synthesizer: None,
        })
    }

    /// Replace the speech-synthesis client (defaults to
    /// [`HttpSpeechClient`] on `config.tts_endpoint`).
    pub fn with_synthesizer(mut self, synth: Arc<dyn SpeechSynthesizer>) -> Self {
        self.synthesizer = Some(synth);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Source-language layout for `project`.
    pub fn layout(&self, project: &str) -> ProjectLayout {
        ProjectLayout::new(&self.config.projects_root, project, &self.config.language)
    }

    /// Project name from an input file: the stem, minus a trailing `_ocr`.
    pub fn project_name(input_file: &Path) -> String {
        let stem = input_file
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("project");
        stem.strip_suffix("_ocr").unwrap_or(stem).to_string()
    }

    /// Run the full pipeline for one raw OCR text file.
    pub async fn run(
        &self,
        input_file: &Path,
        opts: &RunOptions,
    ) -> Result<RunSummary, PipelineError> {
        let project = Self::project_name(input_file);
        let layout = self.layout(&project);
        layout.ensure_dirs()?;

        info!("=== {project}: pipeline start ({}) ===", self.config.language);

        let mut summary = RunSummary {
            project: project.clone(),
            stages: Vec::new(),
            classification: None,
            combined_md: None,
            epub: None,
            narration_md: None,
        };

        // Stage 1: split raw text into page units.
        self.ingest(input_file, &layout)?;
        let pages =
            split_text_into_units(&layout.ocr_text(), &layout.ocr_chunks(), &self.config.page_break_pattern)?;
        info!("[split] {project}: {pages} pages");

        let needs_llm = opts.classify
            || opts.clean
            || (opts.translate && self.config.target_language.is_some())
            || opts.audio;
        let provider = if needs_llm {
            Some(llm::resolve_provider(&self.config)?)
        } else {
            None
        };

        // Stage 2: classify pages into section directories.
        if opts.classify {
            let provider = provider
                .as_ref()
                .ok_or_else(|| PipelineError::Internal("LLM provider not resolved".into()))?;
            summary.classification =
                Some(self.classify(&layout, provider, opts.overwrite).await?);
        }

        // Stage 3: clean each section with its prompt.
        if opts.clean {
            let provider = provider
                .as_ref()
                .ok_or_else(|| PipelineError::Internal("LLM provider not resolved".into()))?;
            for label in Label::ALL {
                let report = clean_units(
                    &layout.classified_dir(label),
                    &layout.cleaned_dir(label),
                    label,
                    provider,
                    &self.config,
                    opts.overwrite,
                )
                .await?;
                summary.stages.push(report);
            }
            if opts.split_long {
                let parts = self.resplit_body(&layout)?;
                if parts > 0 {
                    info!("[split-long] {project}: {parts} pages re-split");
                }
            }
        }

        // Stage 4: translate into the target-language layout.
        let out_layout = match (&self.config.target_language, opts.translate) {
            (Some(target), true) => {
                let provider = provider
                    .as_ref()
                    .ok_or_else(|| PipelineError::Internal("LLM provider not resolved".into()))?;
                let target_layout =
                    ProjectLayout::new(&self.config.projects_root, &project, target);
                let target_name = language_name(target)?;
                for label in Label::ALL {
                    let light = matches!(label, Label::Bibliography | Label::Index);
                    let report = translate_units(
                        &layout.cleaned_dir(label),
                        &target_layout.translated_dir(label),
                        target_name,
                        light,
                        provider,
                        &self.config,
                        opts.overwrite,
                    )
                    .await?;
                    summary.stages.push(report);
                }
                target_layout
            }
            _ => layout.clone(),
        };
        let translated = out_layout.root() != layout.root();

        // Stage 5: ordered combine, heading dedup, then export.
        let text_dir = |label: Label| {
            if translated {
                out_layout.translated_dir(label)
            } else {
                out_layout.cleaned_dir(label)
            }
        };
        let order: Vec<PathBuf> = [Label::Toc, Label::Body, Label::Bibliography, Label::Index]
            .iter()
            .map(|l| text_dir(*l))
            .collect();
        combine_to_file(&order, &out_layout.combined_md())?;
        info!("[combine] {project}: {}", out_layout.combined_md().display());
        summary.combined_md = Some(out_layout.combined_md());

        if opts.epub {
            // A missing pandoc must not cost the narration and audio work
            // that follows; the combined Markdown is already on disk.
            match export::generate_epub(
                &out_layout.combined_md(),
                &out_layout.final_epub(),
                &self.config.pandoc_path,
            )
            .await
            {
                Ok(()) => summary.epub = Some(out_layout.final_epub()),
                Err(e) => warn!("[export] {project}: {e} (continuing)"),
            }
        }

        // Stage 6: narration rewrite, script, and optional synthesis.
        if opts.audio {
            let provider = provider
                .as_ref()
                .ok_or_else(|| PipelineError::Internal("LLM provider not resolved".into()))?;
            let report = rewrite_audio_units(
                &text_dir(Label::Body),
                &out_layout.audiobook_chunks(),
                provider,
                &self.config,
                opts.overwrite,
            )
            .await?;
            summary.stages.push(report);

            combine_to_file(
                &[out_layout.audiobook_chunks()],
                &out_layout.narration_md(),
            )?;
            summary.narration_md = Some(out_layout.narration_md());

            if opts.synthesize_audio {
                let report = self.synthesize(&out_layout).await?;
                summary.stages.push(report);
            }
        }

        info!("=== {project}: pipeline done ===");
        Ok(summary)
    }

    /// Run the pipeline over many input files, skipping documents whose
    /// narration script already exists unless `force` is set.
    pub async fn run_batch(
        &self,
        inputs: &[PathBuf],
        opts: &RunOptions,
        force: bool,
    ) -> Result<Vec<(String, BatchOutcome)>, PipelineError> {
        let mut outcomes = Vec::with_capacity(inputs.len());
        for input in inputs {
            let project = Self::project_name(input);
            info!("──────── batch: {project} ────────");

            let done_layout = match &self.config.target_language {
                Some(target) => {
                    ProjectLayout::new(&self.config.projects_root, &project, target)
                }
                None => self.layout(&project),
            };
            if done_layout.is_processed() && !force {
                info!("{project}: already processed, skipping (use force to re-run)");
                outcomes.push((project, BatchOutcome::Skipped));
                continue;
            }

            // One bad document must not sink the rest of the batch.
            match self.run(input, opts).await {
                Ok(summary) => outcomes.push((project, BatchOutcome::Ran(summary))),
                Err(e) => {
                    warn!("{project}: pipeline failed: {e}");
                    outcomes.push((project, BatchOutcome::Failed(e)));
                }
            }
        }
        Ok(outcomes)
    }

    /// The `.txt` files directly under `dir`, sorted, as batch inputs.
    pub fn collect_batch_inputs(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
        let entries = std::fs::read_dir(dir).map_err(|source| PipelineError::InputRead {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut inputs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("txt"))
            .collect();
        inputs.sort();
        Ok(inputs)
    }

    /// Copy the raw OCR text into the project layout (no-op if the input
    /// already is the layout's own `ocr_text.txt`).
    fn ingest(&self, input_file: &Path, layout: &ProjectLayout) -> Result<(), PipelineError> {
        if !input_file.exists() {
            return Err(PipelineError::SourceNotFound {
                path: input_file.to_path_buf(),
            });
        }
        let target = layout.ocr_text();
        if input_file == target {
            return Ok(());
        }
        std::fs::copy(input_file, &target).map_err(|source| PipelineError::OutputWrite {
            path: target,
            source,
        })?;
        Ok(())
    }

    async fn classify(
        &self,
        layout: &ProjectLayout,
        provider: &Arc<dyn LLMProvider>,
        overwrite: bool,
    ) -> Result<ClassifyReport, PipelineError> {
        // Classification is cheap but not free; when every page is already
        // routed from a previous run, don't re-ask the model.
        if !overwrite && self.all_routed(layout)? {
            info!("[classify] all pages already routed, skipping");
            return Ok(ClassifyReport {
                routed: Vec::new(),
                failed: Vec::new(),
            });
        }

        let opts = ClassifyOptions::new(
            self.config.classify_concurrency,
            self.config.classify_excerpt_chars,
        )
        .progress(self.config.progress.clone());

        let config = &self.config;
        classify_units(
            &layout.ocr_chunks(),
            &layout.classified_chunks(),
            &opts,
            |excerpt| {
                let provider = Arc::clone(provider);
                let config = config.clone();
                async move {
                    llm::transform_text(
                        &provider,
                        "classify",
                        prompts::CLASSIFY_PROMPT,
                        &excerpt,
                        &config,
                    )
                    .await
                }
            },
        )
        .await
    }

    /// Whether every page unit already sits in some label directory.
    fn all_routed(&self, layout: &ProjectLayout) -> Result<bool, PipelineError> {
        let ids = store::list_unit_ids(&layout.ocr_chunks())?;
        if ids.is_empty() {
            return Ok(false);
        }
        let mut routed = std::collections::HashSet::new();
        for label in Label::ALL {
            routed.extend(store::list_unit_ids(&layout.classified_dir(label))?);
        }
        Ok(ids.iter().all(|id| routed.contains(id)))
    }

    /// Re-split over-budget body pages in place: parts replace the long
    /// original so the combine order stays `page_0003_part01 < page_0004`.
    fn resplit_body(&self, layout: &ProjectLayout) -> Result<usize, PipelineError> {
        let dir = layout.cleaned_dir(Label::Body);
        let units = store::list_units(&dir)?;
        let mut resplit = 0usize;

        for unit in &units {
            let batches = batch_sentences(unit.content.trim(), self.config.max_unit_words);
            if batches.len() <= 1 {
                continue;
            }
            for (i, batch) in batches.iter().enumerate() {
                store::write_unit(&dir, &WorkUnit::new(unit.part_id(i + 1), batch))?;
            }
            let original = store::unit_path(&dir, &unit.id);
            std::fs::remove_file(&original).map_err(|source| PipelineError::OutputWrite {
                path: original,
                source,
            })?;
            resplit += 1;
        }
        Ok(resplit)
    }

    async fn synthesize(&self, layout: &ProjectLayout) -> Result<StageReport, PipelineError> {
        let synth: Arc<dyn SpeechSynthesizer> = match &self.synthesizer {
            Some(s) => Arc::clone(s),
            None => {
                let endpoint = self.config.tts_endpoint.as_deref().ok_or_else(|| {
                    PipelineError::InvalidConfig(
                        "Audio synthesis requires a tts_endpoint".into(),
                    )
                })?;
                Arc::new(HttpSpeechClient::new(endpoint)?)
            }
        };
        let policy = PollPolicy::new(
            self.config.tts_poll_interval_secs,
            self.config.tts_max_wait_secs,
        );
        generate_audio_units(
            &layout.audiobook_chunks(),
            &layout.audio_dir(),
            synth.as_ref(),
            &self.config.voice,
            &self.config.language,
            &policy,
            self.config.progress.clone(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_name_strips_ocr_suffix() {
        assert_eq!(
            PipelineRunner::project_name(Path::new("in/meditations_ocr.txt")),
            "meditations"
        );
        assert_eq!(
            PipelineRunner::project_name(Path::new("in/meditations.txt")),
            "meditations"
        );
    }

    #[test]
    fn new_rejects_unknown_languages() {
        let config = PipelineConfig::builder().language("xx").build().unwrap();
        assert!(matches!(
            PipelineRunner::new(config),
            Err(PipelineError::UnsupportedLanguage { .. })
        ));

        let config = PipelineConfig::builder()
            .language("en")
            .target_language("zz")
            .build()
            .unwrap();
        assert!(matches!(
            PipelineRunner::new(config),
            Err(PipelineError::UnsupportedLanguage { .. })
        ));
    }

    #[test]
    fn batch_inputs_are_sorted_txt_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        for name in ["b_ocr.txt", "a_ocr.txt", "cover.png"] {
            std::fs::write(tmp.path().join(name), "x").unwrap();
        }
        let inputs = PipelineRunner::collect_batch_inputs(tmp.path()).unwrap();
        let names: Vec<&str> = inputs
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a_ocr.txt", "b_ocr.txt"]);
    }
}
