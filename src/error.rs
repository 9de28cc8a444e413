//! Error types for the scan2book library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PipelineError`] — **Fatal**: the pipeline (or one whole stage) cannot
//!   proceed at all (missing source file, unsupported language, provider not
//!   configured, external tool missing). Returned as `Err(PipelineError)`
//!   from the orchestrator and stage entry points.
//!
//! * [`UnitError`] — **Non-fatal**: a single work unit failed (one LLM call
//!   errored, one synthesis job timed out) but all other units are fine.
//!   Stored inside [`crate::pipeline::stage::StageOutcome::Failed`] so
//!   callers can inspect partial success rather than losing a whole stage to
//!   one bad page. A failed unit leaves no output file, so the next run of
//!   the same stage retries exactly that unit.
//!
//! The separation lets callers decide their own tolerance: abort on the
//! first unit failure, log and continue, or collect all failures for a
//! post-run report.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the scan2book library.
///
/// Per-unit failures use [`UnitError`] and are stored in stage reports
/// rather than propagated here.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source text file was not found at the given path.
    #[error("Source file not found: '{path}'\nCheck the path exists and is readable.")]
    SourceNotFound { path: PathBuf },

    /// A language code that the pipeline has no display name for.
    #[error("Unsupported language code '{code}'.\nKnown codes: en, es, fr, de, ca, la, pt, gr.")]
    UnsupportedLanguage { code: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── External tool errors ──────────────────────────────────────────────
    /// An external executable (pandoc, tesseract) is missing or exited
    /// non-zero. Fatal to the stage that invoked it, not to the program.
    #[error("External tool '{tool}' failed: {detail}")]
    ExternalTool { tool: String, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create a directory or write an output artifact.
    #[error("Failed to write '{path}': {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not read a stage directory or unit file.
    #[error("Failed to read '{path}': {source}")]
    InputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single work unit.
///
/// Stored inside the stage report when a unit fails. The stage continues
/// processing the remaining units; the failed unit's output file is not
/// written, which makes it the retry set for the next invocation.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum UnitError {
    /// LLM transformation failed after all retries.
    #[error("{unit}: transform failed after {retries} retries: {detail}")]
    Transform {
        unit: String,
        retries: u32,
        detail: String,
    },

    /// Reading or writing the unit file failed.
    #[error("{unit}: I/O error: {detail}")]
    Io { unit: String, detail: String },

    /// Speech-synthesis job was rejected or reported failure.
    #[error("{unit}: synthesis failed: {detail}")]
    Synthesis { unit: String, detail: String },

    /// Speech-synthesis job did not reach a terminal state in time.
    #[error("{unit}: synthesis timed out after {secs}s")]
    Timeout { unit: String, secs: u64 },
}

impl UnitError {
    /// The id of the unit this error belongs to.
    pub fn unit(&self) -> &str {
        match self {
            UnitError::Transform { unit, .. }
            | UnitError::Io { unit, .. }
            | UnitError::Synthesis { unit, .. }
            | UnitError::Timeout { unit, .. } => unit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_language_display() {
        let e = PipelineError::UnsupportedLanguage { code: "xx".into() };
        assert!(e.to_string().contains("'xx'"));
    }

    #[test]
    fn external_tool_display() {
        let e = PipelineError::ExternalTool {
            tool: "pandoc".into(),
            detail: "exit status 2".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("pandoc"));
        assert!(msg.contains("exit status 2"));
    }

    #[test]
    fn unit_error_carries_unit_id() {
        let e = UnitError::Transform {
            unit: "page_0007".into(),
            retries: 3,
            detail: "HTTP 429".into(),
        };
        assert_eq!(e.unit(), "page_0007");
        assert!(e.to_string().contains("page_0007"));
        assert!(e.to_string().contains("3 retries"));
    }

    #[test]
    fn transform_retry_count_is_not_truncated() {
        let e = UnitError::Transform {
            unit: "page_0001".into(),
            retries: 300,
            detail: "HTTP 503".into(),
        };
        assert!(e.to_string().contains("300 retries"));
    }

    #[test]
    fn timeout_display() {
        let e = UnitError::Timeout {
            unit: "page_0001".into(),
            secs: 600,
        };
        assert!(e.to_string().contains("600s"));
    }
}
