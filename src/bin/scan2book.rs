//! CLI binary for scan2book.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` and drives the runner.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use scan2book::{
    BatchOutcome, OcrOptions, PipelineConfig, PipelineRunner, RunOptions, StageProgressCallback,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one live bar per stage plus per-unit log
/// lines. Works correctly when units complete out-of-order (concurrent
/// stages).
struct CliProgress {
    bar: Mutex<Option<ProgressBar>>,
    errors: AtomicUsize,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Some(bar) = self.bar.lock().unwrap().as_ref() {
            f(bar);
        }
    }
}

impl StageProgressCallback for CliProgress {
    fn on_stage_start(&self, stage: &str, total_units: usize) {
        let bar = ProgressBar::new(total_units as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} units  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix(stage.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        *self.bar.lock().unwrap() = Some(bar);
    }

    fn on_unit_start(&self, _stage: &str, unit: &str) {
        self.with_bar(|bar| bar.set_message(unit.to_string()));
    }

    fn on_unit_skipped(&self, _stage: &str, _unit: &str) {
        self.with_bar(|bar| bar.inc(1));
    }

    fn on_unit_complete(&self, _stage: &str, unit: &str, output_len: usize) {
        self.with_bar(|bar| {
            bar.println(format!(
                "  {} {:<24} {}",
                green("✓"),
                unit,
                dim(&format!("{output_len:>6} chars"))
            ));
            bar.inc(1);
        });
    }

    fn on_unit_error(&self, _stage: &str, unit: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = truncate_message(error);
        self.with_bar(|bar| {
            bar.println(format!("  {} {:<24} {}", red("✗"), unit, red(&msg)));
            bar.inc(1);
        });
    }

    fn on_stage_complete(&self, stage: &str, completed: usize, skipped: usize, failed: usize) {
        if let Some(bar) = self.bar.lock().unwrap().take() {
            bar.finish_and_clear();
        }
        let tick = if failed == 0 { green("✔") } else { cyan("⚠") };
        eprintln!(
            "{tick} {}  {} done, {} skipped{}",
            bold(stage),
            completed,
            skipped,
            if failed > 0 {
                format!(", {}", red(&format!("{failed} failed")))
            } else {
                String::new()
            }
        );
    }
}

/// Truncate very long error messages to keep output tidy.
///
/// Counts chars, not bytes: provider errors carry arbitrary text and a cut
/// inside a multibyte character must not panic the process.
fn truncate_message(error: &str) -> String {
    if error.chars().count() > 80 {
        let truncated: String = error.chars().take(79).collect();
        format!("{truncated}\u{2026}")
    } else {
        error.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Full pipeline: clean, combine, export EPUB, write narration script
  scan2book run input/meditations_ocr.txt

  # Clean and translate to Spanish
  scan2book run --to es input/meditations_ocr.txt

  # Resume an interrupted run (completed units are skipped automatically)
  scan2book run input/meditations_ocr.txt

  # Also synthesize narration audio via a speech job service
  scan2book run --synthesize --tts-endpoint http://localhost:8900 input/book_ocr.txt

  # Process every *.txt in a directory, skipping already-finished books
  scan2book batch input/

  # Re-process everything in the directory
  scan2book batch --force input/

  # OCR a directory of page scans into pipeline input
  scan2book ocr scans/meditations/ -o input/meditations_ocr.txt

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, ollama, ...)
  EDGEQUAKE_MODEL         Override model ID

SETUP:
  1. Set API key:     export OPENAI_API_KEY=sk-...
  2. Run:             scan2book run input/book_ocr.txt
"#;

/// Convert scanned-book OCR text into e-books and audiobook narration.
#[derive(Parser, Debug)]
#[command(
    name = "scan2book",
    version,
    about = "Convert scanned-book OCR text into cleaned e-books and audiobook narration",
    long_about = "Clean raw OCR text with LLMs, classify pages into sections, optionally \
translate, merge into Markdown, export EPUB via pandoc, and rewrite the text for audiobook \
narration. Every stage checkpoints to disk, so interrupted runs resume where they stopped.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Root directory for project working files.
    #[arg(long, env = "SCAN2BOOK_PROJECTS", default_value = "projects", global = true)]
    projects: PathBuf,

    /// LLM model ID (e.g. gpt-4o, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL", global = true)]
    model: Option<String>,

    /// LLM provider: openai, anthropic, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER", global = true)]
    provider: Option<String>,

    /// Concurrent LLM calls for cleaning/translation/rewriting.
    #[arg(short, long, env = "SCAN2BOOK_CONCURRENCY", default_value_t = 25, global = true)]
    concurrency: usize,

    /// Retries per unit on LLM failure.
    #[arg(long, env = "SCAN2BOOK_MAX_RETRIES", default_value_t = 3, global = true)]
    max_retries: u32,

    /// Disable progress bars.
    #[arg(long, env = "SCAN2BOOK_NO_PROGRESS", global = true)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCAN2BOOK_VERBOSE", global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SCAN2BOOK_QUIET", global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline on one OCR text file.
    Run {
        /// Raw OCR text file with page-break markers.
        input: PathBuf,

        /// Source language code (en, es, fr, de, ca, la, pt, gr).
        #[arg(long, default_value = "en")]
        lang: String,

        /// Translate into this language code.
        #[arg(long = "to")]
        target: Option<String>,

        /// Skip the classification stage (reuse existing routing).
        #[arg(long)]
        no_classify: bool,

        /// Skip EPUB export.
        #[arg(long)]
        no_epub: bool,

        /// Skip the narration rewrite and script.
        #[arg(long)]
        no_audio: bool,

        /// Synthesize narration audio; requires --tts-endpoint.
        #[arg(long)]
        synthesize: bool,

        /// Base URL of the speech-synthesis job API.
        #[arg(long, env = "SCAN2BOOK_TTS_ENDPOINT")]
        tts_endpoint: Option<String>,

        /// Voice id for speech synthesis.
        #[arg(long, default_value = "Joanna")]
        voice: String,

        /// Re-process units whose outputs already exist.
        #[arg(long)]
        overwrite: bool,
    },

    /// Run the pipeline over every .txt file in a directory.
    Batch {
        /// Directory of raw OCR text files.
        input_dir: PathBuf,

        /// Source language code.
        #[arg(long, default_value = "en")]
        lang: String,

        /// Translate into this language code.
        #[arg(long = "to")]
        target: Option<String>,

        /// Re-process documents whose narration script already exists.
        #[arg(long)]
        force: bool,
    },

    /// OCR a directory of page images into one pipeline input file.
    Ocr {
        /// Directory of page scans (.png, .jpg, .jpeg), processed in name order.
        images_dir: PathBuf,

        /// Write the page-break separated text here.
        #[arg(short, long)]
        output: PathBuf,

        /// Tesseract language code(s), e.g. "eng" or "lat+cat".
        #[arg(long, default_value = "eng")]
        ocr_lang: String,

        /// Path to the tesseract executable.
        #[arg(long, default_value = "tesseract")]
        tesseract: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Suppress INFO-level library logs when progress bars are active; the
    // bars provide the feedback that matters.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Run {
            input,
            lang,
            target,
            no_classify,
            no_epub,
            no_audio,
            synthesize,
            tts_endpoint,
            voice,
            overwrite,
        } => {
            let mut builder = PipelineConfig::builder()
                .projects_root(&cli.projects)
                .language(lang)
                .transform_concurrency(cli.concurrency)
                .max_retries(cli.max_retries)
                .voice(voice);
            if let Some(target) = target {
                builder = builder.target_language(target);
            }
            if let Some(model) = &cli.model {
                builder = builder.model(model);
            }
            if let Some(provider) = &cli.provider {
                builder = builder.provider_name(provider);
            }
            if let Some(endpoint) = tts_endpoint {
                builder = builder.tts_endpoint(endpoint);
            }
            if show_progress {
                builder = builder.progress(CliProgress::new());
            }
            let config = builder.build().context("Invalid configuration")?;

            let opts = RunOptions {
                classify: !no_classify,
                epub: !no_epub,
                audio: !no_audio,
                synthesize_audio: *synthesize,
                overwrite: *overwrite,
                ..RunOptions::default()
            };

            let runner = PipelineRunner::new(config)?;
            let summary = runner.run(input, &opts).await.context("Pipeline failed")?;

            if !cli.quiet {
                if let Some(md) = &summary.combined_md {
                    eprintln!("{} e-book markdown  →  {}", green("✔"), bold(&md.display().to_string()));
                }
                if let Some(epub) = &summary.epub {
                    eprintln!("{} epub             →  {}", green("✔"), bold(&epub.display().to_string()));
                }
                if let Some(script) = &summary.narration_md {
                    eprintln!("{} narration        →  {}", green("✔"), bold(&script.display().to_string()));
                }
                let failed: usize = summary.stages.iter().map(|s| s.failed()).sum();
                if failed > 0 {
                    eprintln!(
                        "{} {} units failed; re-run to retry them",
                        cyan("⚠"),
                        red(&failed.to_string())
                    );
                }
            }
        }

        Command::Batch {
            input_dir,
            lang,
            target,
            force,
        } => {
            let mut builder = PipelineConfig::builder()
                .projects_root(&cli.projects)
                .language(lang)
                .transform_concurrency(cli.concurrency)
                .max_retries(cli.max_retries);
            if let Some(target) = target {
                builder = builder.target_language(target);
            }
            if let Some(model) = &cli.model {
                builder = builder.model(model);
            }
            if let Some(provider) = &cli.provider {
                builder = builder.provider_name(provider);
            }
            if show_progress {
                builder = builder.progress(CliProgress::new());
            }
            let config = builder.build().context("Invalid configuration")?;

            let inputs = PipelineRunner::collect_batch_inputs(input_dir)
                .with_context(|| format!("Failed to list {}", input_dir.display()))?;
            if inputs.is_empty() {
                anyhow::bail!("No .txt files found in {}", input_dir.display());
            }

            let runner = PipelineRunner::new(config)?;
            let outcomes = runner
                .run_batch(&inputs, &RunOptions::default(), *force)
                .await?;

            if !cli.quiet {
                let mut ran = 0usize;
                let mut skipped = 0usize;
                let mut failed = 0usize;
                for (project, outcome) in &outcomes {
                    match outcome {
                        BatchOutcome::Ran(_) => {
                            ran += 1;
                            eprintln!("{} {}", green("✔"), project);
                        }
                        BatchOutcome::Skipped => {
                            skipped += 1;
                            eprintln!("{} {} {}", dim("•"), project, dim("(already processed)"));
                        }
                        BatchOutcome::Failed(e) => {
                            failed += 1;
                            eprintln!("{} {}  {}", red("✗"), project, red(&e.to_string()));
                        }
                    }
                }
                eprintln!(
                    "{} {} processed, {} skipped, {} failed",
                    if failed == 0 { green("✔") } else { cyan("⚠") },
                    ran,
                    skipped,
                    failed
                );
            }
        }

        Command::Ocr {
            images_dir,
            output,
            ocr_lang,
            tesseract,
        } => {
            let opts = OcrOptions {
                tesseract_path: tesseract.clone(),
                language: ocr_lang.clone(),
                ..OcrOptions::default()
            };
            let report = scan2book::ocr::ocr_images(images_dir, output, &opts)
                .await
                .context("OCR failed")?;

            if !cli.quiet {
                eprintln!(
                    "{} {} pages  →  {}",
                    if report.failures.is_empty() {
                        green("✔")
                    } else {
                        cyan("⚠")
                    },
                    report.pages,
                    bold(&output.display().to_string())
                );
                for failure in &report.failures {
                    eprintln!("  {} {}", red("✗"), failure);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_error_messages_pass_through() {
        assert_eq!(truncate_message("HTTP 429"), "HTTP 429");
    }

    #[test]
    fn long_multibyte_messages_truncate_on_char_boundaries() {
        // 40 three-byte chars: 120 bytes, 40 chars under the limit.
        let cjk = "页".repeat(40);
        assert_eq!(truncate_message(&cjk), cjk);

        // 120 chars of multibyte text must truncate without panicking.
        let long = "页".repeat(120);
        let msg = truncate_message(&long);
        assert_eq!(msg.chars().count(), 80);
        assert!(msg.ends_with('\u{2026}'));
    }

    #[test]
    fn unit_error_callback_survives_multibyte_errors() {
        let cb = CliProgress::new();
        cb.on_unit_error("clean", "page_0001", &"页".repeat(120));
        assert_eq!(cb.errors.load(Ordering::SeqCst), 1);
    }
}
