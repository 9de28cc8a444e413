//! LLM-backed transformation stages: clean, translate, rewrite-for-audio.
//!
//! Each function here is a thin composition: pick the prompt for the
//! section, then hand the directory pair to the stage runner with
//! [`crate::llm::transform_text`] as the per-unit transform. Skip/retry
//! semantics come entirely from the stage runner.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::llm;
use crate::pipeline::stage::{run_stage, StageOptions, StageReport};
use crate::prompts;
use crate::store::Label;
use edgequake_llm::LLMProvider;
use std::path::Path;
use std::sync::Arc;

/// Clean one label directory of OCRed units into Markdown.
///
/// Body pages get the full cleaning prompt (headings, footnotes, the
/// empty-page sentinel); bibliography and index pages get the light
/// structure-preserving prompt. Toc pages are cleaned like body text.
pub async fn clean_units(
    input_dir: &Path,
    output_dir: &Path,
    label: Label,
    provider: &Arc<dyn LLMProvider>,
    config: &PipelineConfig,
    overwrite: bool,
) -> Result<StageReport, PipelineError> {
    let prompt = match label {
        Label::Bibliography | Label::Index => prompts::LIGHT_CLEAN_PROMPT,
        Label::Body | Label::Toc => prompts::BODY_CLEAN_PROMPT,
    };
    let opts = StageOptions::new(format!("clean:{label}"), config.transform_concurrency)
        .overwrite(overwrite)
        .progress(config.progress.clone());

    run_stage(input_dir, output_dir, &opts, |unit| {
        let provider = Arc::clone(provider);
        let config = config.clone();
        async move {
            llm::transform_text(&provider, &unit.id, prompt, &unit.content, &config).await
        }
    })
    .await
}

/// Translate one label directory into the target language.
///
/// `light` switches to the entry-preserving prompt used for bibliography
/// and index sections.
pub async fn translate_units(
    input_dir: &Path,
    output_dir: &Path,
    target_language: &str,
    light: bool,
    provider: &Arc<dyn LLMProvider>,
    config: &PipelineConfig,
    overwrite: bool,
) -> Result<StageReport, PipelineError> {
    let prompt = if light {
        prompts::translate_light_prompt(target_language)
    } else {
        prompts::translate_prompt(target_language)
    };
    let opts = StageOptions::new("translate", config.transform_concurrency)
        .overwrite(overwrite)
        .progress(config.progress.clone());

    let prompt = &prompt;
    run_stage(input_dir, output_dir, &opts, |unit| {
        let provider = Arc::clone(provider);
        let config = config.clone();
        async move {
            llm::transform_text(&provider, &unit.id, prompt, &unit.content, &config).await
        }
    })
    .await
}

/// Rewrite cleaned body units into narratable spoken prose.
pub async fn rewrite_audio_units(
    input_dir: &Path,
    output_dir: &Path,
    provider: &Arc<dyn LLMProvider>,
    config: &PipelineConfig,
    overwrite: bool,
) -> Result<StageReport, PipelineError> {
    let opts = StageOptions::new("audio-rewrite", config.transform_concurrency)
        .overwrite(overwrite)
        .progress(config.progress.clone());

    run_stage(input_dir, output_dir, &opts, |unit| {
        let provider = Arc::clone(provider);
        let config = config.clone();
        async move {
            llm::transform_text(
                &provider,
                &unit.id,
                prompts::AUDIO_REWRITE_PROMPT,
                &unit.content,
                &config,
            )
            .await
        }
    })
    .await
}
