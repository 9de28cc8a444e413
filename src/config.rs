//! Configuration types for the scan-to-book pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built
//! via its [`PipelineConfigBuilder`] and passed by reference into the
//! orchestrator at startup. Keeping every knob in one explicitly
//! constructed struct (instead of a lazily cached global) makes it trivial
//! to share configs across tasks, diff two runs, and test stages in
//! isolation.

use crate::error::PipelineError;
use crate::progress::StageProgressCallback;
use crate::prompts::{CLASSIFY_EXCERPT_CHARS, DEFAULT_PAGE_BREAK_PATTERN};
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Display names for supported language codes.
///
/// Translation and narration prompts embed the *name* ("Spanish"), while
/// the directory layout is keyed by the *code* ("es").
pub fn language_name(code: &str) -> Result<&'static str, PipelineError> {
    match code {
        "en" => Ok("English"),
        "es" => Ok("Spanish"),
        "fr" => Ok("French"),
        "de" => Ok("German"),
        "ca" => Ok("Catalan"),
        "la" => Ok("Latin"),
        "pt" => Ok("Portuguese"),
        "gr" => Ok("Greek"),
        _ => Err(PipelineError::UnsupportedLanguage { code: code.into() }),
    }
}

/// Configuration for one pipeline run.
///
/// Built via [`PipelineConfig::builder()`] or [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use scan2book::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .language("en")
///     .target_language("es")
///     .transform_concurrency(16)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Root directory that holds one subdirectory per project. Default: `projects`.
    pub projects_root: PathBuf,

    /// Language code of the source document. Default: "en".
    pub language: String,

    /// Target language code for the translation stage, if any.
    pub target_language: Option<String>,

    /// Case-insensitive regex marking page boundaries in the raw OCR text.
    pub page_break_pattern: String,

    /// Word budget for the long-unit splitter. Default: 1200.
    ///
    /// Cleaned pages occasionally balloon (appendices, dense footnotes) past
    /// what one translation call handles reliably. Units above this budget
    /// are re-split on sentence boundaries into `_partNN` children.
    pub max_unit_words: usize,

    /// Concurrent LLM calls for classification. Default: 8.
    ///
    /// Classification requests are tiny (2 KB excerpt in, one token out),
    /// so a modest fan-out already saturates the useful throughput.
    pub classify_concurrency: usize,

    /// Concurrent LLM calls for cleaning/translation/rewriting. Default: 25.
    ///
    /// These calls are slow and rate-limited; the stage is network-bound,
    /// not CPU-bound. Lower this if the provider returns 429s.
    pub transform_concurrency: usize,

    /// How many characters of a unit the classifier sees. Default: 2000.
    pub classify_excerpt_chars: usize,

    /// LLM model identifier, e.g. "gpt-4o". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for LLM calls. Default: 0.3.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per unit. Default: 4096.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient LLM failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s. Backoff avoids the
    /// thundering-herd problem where 25 concurrent workers retry
    /// simultaneously against a recovering API endpoint.
    pub retry_backoff_ms: u64,

    /// Voice id for speech synthesis. Default: "Joanna".
    pub voice: String,

    /// Base URL of the speech-synthesis job API, if audio is generated.
    pub tts_endpoint: Option<String>,

    /// Seconds between synthesis-job status polls. Default: 5.
    pub tts_poll_interval_secs: u64,

    /// Ceiling on total polling time per synthesis job. Default: 900.
    ///
    /// Long-form narration jobs legitimately run for minutes; a ceiling
    /// turns a stuck job into a retryable per-unit `Timeout` instead of a
    /// worker that never returns.
    pub tts_max_wait_secs: u64,

    /// Path to the pandoc executable. Default: "pandoc".
    pub pandoc_path: PathBuf,

    /// Path to the tesseract executable. Default: "tesseract".
    pub tesseract_path: PathBuf,

    /// Tesseract language code(s), e.g. "eng" or "lat+cat". Default: "eng".
    pub ocr_language: String,

    /// Tesseract page-segmentation mode. Default: 6 (uniform text block).
    pub ocr_psm: u32,

    /// Optional progress callback receiving per-unit stage events.
    pub progress: Option<Arc<dyn StageProgressCallback>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            projects_root: PathBuf::from("projects"),
            language: "en".to_string(),
            target_language: None,
            page_break_pattern: DEFAULT_PAGE_BREAK_PATTERN.to_string(),
            max_unit_words: 1200,
            classify_concurrency: 8,
            transform_concurrency: 25,
            classify_excerpt_chars: CLASSIFY_EXCERPT_CHARS,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.3,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            voice: "Joanna".to_string(),
            tts_endpoint: None,
            tts_poll_interval_secs: 5,
            tts_max_wait_secs: 900,
            pandoc_path: PathBuf::from("pandoc"),
            tesseract_path: PathBuf::from("tesseract"),
            ocr_language: "eng".to_string(),
            ocr_psm: 6,
            progress: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("projects_root", &self.projects_root)
            .field("language", &self.language)
            .field("target_language", &self.target_language)
            .field("page_break_pattern", &self.page_break_pattern)
            .field("max_unit_words", &self.max_unit_words)
            .field("classify_concurrency", &self.classify_concurrency)
            .field("transform_concurrency", &self.transform_concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_retries", &self.max_retries)
            .field("voice", &self.voice)
            .field("tts_endpoint", &self.tts_endpoint)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn projects_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.projects_root = root.into();
        self
    }

    pub fn language(mut self, code: impl Into<String>) -> Self {
        self.config.language = code.into();
        self
    }

    pub fn target_language(mut self, code: impl Into<String>) -> Self {
        self.config.target_language = Some(code.into());
        self
    }

    pub fn page_break_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.page_break_pattern = pattern.into();
        self
    }

    pub fn max_unit_words(mut self, n: usize) -> Self {
        self.config.max_unit_words = n.max(1);
        self
    }

    pub fn classify_concurrency(mut self, n: usize) -> Self {
        self.config.classify_concurrency = n.max(1);
        self
    }

    pub fn transform_concurrency(mut self, n: usize) -> Self {
        self.config.transform_concurrency = n.max(1);
        self
    }

    pub fn classify_excerpt_chars(mut self, n: usize) -> Self {
        self.config.classify_excerpt_chars = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.config.voice = voice.into();
        self
    }

    pub fn tts_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.tts_endpoint = Some(url.into());
        self
    }

    pub fn tts_poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.tts_poll_interval_secs = secs.max(1);
        self
    }

    pub fn tts_max_wait_secs(mut self, secs: u64) -> Self {
        self.config.tts_max_wait_secs = secs;
        self
    }

    pub fn pandoc_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pandoc_path = path.into();
        self
    }

    pub fn tesseract_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_path = path.into();
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn ocr_psm(mut self, psm: u32) -> Self {
        self.config.ocr_psm = psm;
        self
    }

    pub fn progress(mut self, callback: Arc<dyn StageProgressCallback>) -> Self {
        self.config.progress = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.language.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "Language code must not be empty".into(),
            ));
        }
        if let Some(target) = &c.target_language {
            if *target == c.language {
                return Err(PipelineError::InvalidConfig(
                    "Source and target languages must be different".into(),
                ));
            }
        }
        if regex::Regex::new(&c.page_break_pattern).is_err() {
            return Err(PipelineError::InvalidConfig(format!(
                "Invalid page-break pattern: {:?}",
                c.page_break_pattern
            )));
        }
        if c.classify_concurrency == 0 || c.transform_concurrency == 0 {
            return Err(PipelineError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_constants() {
        let c = PipelineConfig::default();
        assert_eq!(c.max_unit_words, 1200);
        assert_eq!(c.classify_concurrency, 8);
        assert_eq!(c.transform_concurrency, 25);
        assert_eq!(c.tts_poll_interval_secs, 5);
        assert_eq!(c.ocr_psm, 6);
    }

    #[test]
    fn builder_rejects_same_source_and_target() {
        let err = PipelineConfig::builder()
            .language("en")
            .target_language("en")
            .build()
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_bad_page_break_pattern() {
        let err = PipelineConfig::builder()
            .page_break_pattern("([unclosed")
            .build()
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn language_name_lookup() {
        assert_eq!(language_name("es").unwrap(), "Spanish");
        assert_eq!(language_name("la").unwrap(), "Latin");
        assert!(matches!(
            language_name("xx"),
            Err(PipelineError::UnsupportedLanguage { .. })
        ));
    }

    #[test]
    fn concurrency_floors_at_one() {
        let c = PipelineConfig::builder()
            .transform_concurrency(0)
            .build()
            .unwrap();
        assert_eq!(c.transform_concurrency, 1);
    }
}
