//! # scan2book
//!
//! Convert scanned books into cleaned e-books and audiobooks.
//!
//! The input is raw OCR text with page-break markers; the output is a
//! combined Markdown document, an EPUB, a narration script, and optionally
//! per-chunk audio. In between, the text moves through a fixed plan of
//! stages, each one persisting its output as one file per page unit:
//!
//! ```text
//! split → classify → clean → [translate] → combine → epub
//!                      │
//!                      └─▶ audio rewrite → narration → [synthesize]
//! ```
//!
//! Because every stage's output lives on disk and a unit whose output file
//! exists is skipped, any interrupted run resumes from where it stopped by
//! simply running again. A unit that fails is isolated, reported, and
//! retried on the next run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scan2book::{PipelineConfig, PipelineRunner, RunOptions};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::builder()
//!     .language("en")
//!     .target_language("es")
//!     .build()?;
//!
//! let runner = PipelineRunner::new(config)?;
//! let summary = runner
//!     .run(Path::new("input/meditations_ocr.txt"), &RunOptions::default())
//!     .await?;
//! println!("combined: {:?}", summary.combined_md);
//! # Ok(())
//! # }
//! ```
//!
//! LLM access goes through [`edgequake_llm`]; the provider is resolved
//! from the config or the environment (see [`llm::resolve_provider`]).
//! OCR (tesseract) and EPUB export (pandoc) are external child processes;
//! speech synthesis is a job-based HTTP service behind the
//! [`tts::SpeechSynthesizer`] trait.

pub mod config;
pub mod error;
pub mod export;
pub mod llm;
pub mod ocr;
pub mod pipeline;
pub mod progress;
pub mod project;
pub mod prompts;
pub mod runner;
pub mod store;
pub mod tts;

pub use config::{language_name, PipelineConfig, PipelineConfigBuilder};
pub use error::{PipelineError, UnitError};
pub use ocr::{OcrOptions, OcrReport};
pub use pipeline::classify::{ClassifyOptions, ClassifyReport, RoutedUnit};
pub use pipeline::stage::{run_stage, StageOptions, StageOutcome, StageReport};
pub use progress::{NoopProgress, StageProgressCallback};
pub use project::ProjectLayout;
pub use runner::{BatchOutcome, PipelineRunner, RunOptions, RunSummary};
pub use store::{Label, UnitStatus, WorkUnit};
pub use tts::{HttpSpeechClient, PollPolicy, SpeechSynthesizer};
