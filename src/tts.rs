//! Speech synthesis: long-form narration via an asynchronous job API.
//!
//! Long-form text-to-speech services don't answer synchronously — the
//! contract is a three-phase RPC: submit a job, poll its status until it
//! reaches a terminal state, then fetch the result blob. The
//! [`SpeechSynthesizer`] trait captures exactly that contract, which keeps
//! the poll driver ([`synthesize`]) testable against a mock and lets the
//! HTTP client ([`HttpSpeechClient`]) stay a dumb JSON adapter.
//!
//! ## Bounded polling
//!
//! The poll loop backs off exponentially from the configured interval
//! (capped per-sleep at 60 s) and gives up once the configured max wait is
//! exceeded, returning [`UnitError::Timeout`]. A stuck job therefore
//! becomes a retryable per-unit failure instead of a worker that never
//! returns.

use crate::error::{PipelineError, UnitError};
use crate::pipeline::stage::{StageOutcome, StageReport};
use crate::progress::StageProgressCallback;
use crate::store;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Opaque id of a submitted synthesis job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobId(pub String);

/// Status of a synthesis job as reported by the service.
#[derive(Debug, Clone)]
pub enum SynthesisStatus {
    /// Still queued or rendering.
    InProgress,
    /// Terminal: audio is ready at `output_url`.
    Completed { output_url: String },
    /// Terminal: the service gave up on the job.
    Failed { reason: String },
}

/// Error from the synthesis service adapter.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct SynthesisError(String);

impl SynthesisError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Narrow contract over a long-form text-to-speech service.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Start a synthesis job for `text`.
    async fn submit(&self, text: &str, voice: &str, language: &str)
        -> Result<JobId, SynthesisError>;

    /// Current status of a previously submitted job.
    async fn status(&self, job: &JobId) -> Result<SynthesisStatus, SynthesisError>;

    /// Download the finished audio blob.
    async fn fetch(&self, output_url: &str) -> Result<Vec<u8>, SynthesisError>;
}

/// Polling knobs for [`synthesize`].
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    /// Delay before the first status check; doubles on each subsequent one.
    pub interval: Duration,
    /// Ceiling on total time spent waiting for a terminal status.
    pub max_wait: Duration,
}

impl PollPolicy {
    pub fn new(interval_secs: u64, max_wait_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs.max(1)),
            max_wait: Duration::from_secs(max_wait_secs),
        }
    }
}

/// Largest single sleep between polls; long jobs don't need finer checks.
const MAX_POLL_SLEEP: Duration = Duration::from_secs(60);

/// Drive one synthesis job to completion: submit, poll, fetch.
pub async fn synthesize(
    synth: &dyn SpeechSynthesizer,
    unit_id: &str,
    text: &str,
    voice: &str,
    language: &str,
    policy: &PollPolicy,
) -> Result<Vec<u8>, UnitError> {
    let as_unit_err = |e: SynthesisError| UnitError::Synthesis {
        unit: unit_id.to_string(),
        detail: e.to_string(),
    };

    let job = synth.submit(text, voice, language).await.map_err(as_unit_err)?;
    debug!("{unit_id}: submitted synthesis job {}", job.0);

    let start = tokio::time::Instant::now();
    let mut delay = policy.interval;

    loop {
        if start.elapsed() >= policy.max_wait {
            return Err(UnitError::Timeout {
                unit: unit_id.to_string(),
                secs: policy.max_wait.as_secs(),
            });
        }
        tokio::time::sleep(delay.min(MAX_POLL_SLEEP)).await;
        delay = delay.saturating_mul(2);

        match synth.status(&job).await.map_err(as_unit_err)? {
            SynthesisStatus::InProgress => continue,
            SynthesisStatus::Completed { output_url } => {
                debug!("{unit_id}: job {} completed", job.0);
                return synth.fetch(&output_url).await.map_err(as_unit_err);
            }
            SynthesisStatus::Failed { reason } => {
                return Err(UnitError::Synthesis {
                    unit: unit_id.to_string(),
                    detail: reason,
                });
            }
        }
    }
}

/// Generate one audio file per text unit in `input_dir`.
///
/// Units run sequentially: long-form jobs are minutes each and the service
/// queues them anyway, so fan-out buys nothing and risks rate limits. A
/// unit whose `<id>.mp3` already exists is skipped; a failed unit writes
/// nothing and is retried on the next invocation.
pub async fn generate_audio_units(
    input_dir: &Path,
    output_dir: &Path,
    synth: &dyn SpeechSynthesizer,
    voice: &str,
    language: &str,
    policy: &PollPolicy,
    progress: Option<Arc<dyn StageProgressCallback>>,
) -> Result<StageReport, PipelineError> {
    const STAGE: &str = "synthesize";

    std::fs::create_dir_all(output_dir).map_err(|source| PipelineError::OutputWrite {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let units = store::list_units(input_dir)?;
    info!("[{STAGE}] {} units from {}", units.len(), input_dir.display());
    if let Some(cb) = &progress {
        cb.on_stage_start(STAGE, units.len());
    }

    let mut results = Vec::with_capacity(units.len());
    for unit in units {
        let audio_path = output_dir.join(format!("{}.mp3", unit.id));
        if audio_path.exists() {
            if let Some(cb) = &progress {
                cb.on_unit_skipped(STAGE, &unit.id);
            }
            results.push((unit.id, StageOutcome::Skipped));
            continue;
        }

        if let Some(cb) = &progress {
            cb.on_unit_start(STAGE, &unit.id);
        }
        match synthesize(synth, &unit.id, &unit.content, voice, language, policy).await {
            Ok(audio) => {
                let len = audio.len();
                match std::fs::write(&audio_path, &audio) {
                    Ok(()) => {
                        if let Some(cb) = &progress {
                            cb.on_unit_complete(STAGE, &unit.id, len);
                        }
                        results.push((unit.id, StageOutcome::Completed));
                    }
                    Err(e) => {
                        let err = UnitError::Io {
                            unit: unit.id.clone(),
                            detail: e.to_string(),
                        };
                        warn!("[{STAGE}] {err}");
                        if let Some(cb) = &progress {
                            cb.on_unit_error(STAGE, &unit.id, &err.to_string());
                        }
                        results.push((unit.id, StageOutcome::Failed(err)));
                    }
                }
            }
            Err(err) => {
                warn!("[{STAGE}] {err}");
                if let Some(cb) = &progress {
                    cb.on_unit_error(STAGE, &unit.id, &err.to_string());
                }
                results.push((unit.id, StageOutcome::Failed(err)));
            }
        }
    }

    let report = StageReport {
        stage: STAGE.to_string(),
        results,
    };
    info!(
        "[{STAGE}] done: {} completed, {} skipped, {} failed",
        report.completed(),
        report.skipped(),
        report.failed()
    );
    if let Some(cb) = &progress {
        cb.on_stage_complete(STAGE, report.completed(), report.skipped(), report.failed());
    }
    Ok(report)
}

// ── HTTP adapter ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SubmitRequest<'a> {
    text: &'a str,
    voice: &'a str,
    language: &'a str,
    output_format: &'a str,
}

#[derive(Deserialize)]
struct SubmitResponse {
    job_id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
    output_url: Option<String>,
    reason: Option<String>,
}

/// JSON client for a job-based speech-synthesis HTTP API.
///
/// Wire shape: `POST {base}/jobs` with text/voice/language returns a
/// `job_id`; `GET {base}/jobs/{id}` reports `queued`/`in_progress`/
/// `completed`/`failed` plus an `output_url` when done; the url serves the
/// raw mp3 bytes.
pub struct HttpSpeechClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSpeechClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| PipelineError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechClient {
    async fn submit(
        &self,
        text: &str,
        voice: &str,
        language: &str,
    ) -> Result<JobId, SynthesisError> {
        let body = SubmitRequest {
            text,
            voice,
            language,
            output_format: "mp3",
        };
        let response = self
            .client
            .post(format!("{}/jobs", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| SynthesisError::new(format!("submit: {e}")))?;

        if !response.status().is_success() {
            return Err(SynthesisError::new(format!(
                "submit: HTTP {}",
                response.status()
            )));
        }
        let parsed: SubmitResponse = response
            .json()
            .await
            .map_err(|e| SynthesisError::new(format!("submit response: {e}")))?;
        Ok(JobId(parsed.job_id))
    }

    async fn status(&self, job: &JobId) -> Result<SynthesisStatus, SynthesisError> {
        let response = self
            .client
            .get(format!("{}/jobs/{}", self.base_url, job.0))
            .send()
            .await
            .map_err(|e| SynthesisError::new(format!("status: {e}")))?;

        if !response.status().is_success() {
            return Err(SynthesisError::new(format!(
                "status: HTTP {}",
                response.status()
            )));
        }
        let parsed: StatusResponse = response
            .json()
            .await
            .map_err(|e| SynthesisError::new(format!("status response: {e}")))?;

        match parsed.status.as_str() {
            "completed" => {
                let output_url = parsed
                    .output_url
                    .ok_or_else(|| SynthesisError::new("completed job without output_url"))?;
                Ok(SynthesisStatus::Completed { output_url })
            }
            "failed" => Ok(SynthesisStatus::Failed {
                reason: parsed.reason.unwrap_or_else(|| "unspecified".to_string()),
            }),
            _ => Ok(SynthesisStatus::InProgress),
        }
    }

    async fn fetch(&self, output_url: &str) -> Result<Vec<u8>, SynthesisError> {
        let response = self
            .client
            .get(output_url)
            .send()
            .await
            .map_err(|e| SynthesisError::new(format!("fetch: {e}")))?;

        if !response.status().is_success() {
            return Err(SynthesisError::new(format!(
                "fetch: HTTP {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SynthesisError::new(format!("fetch body: {e}")))?;
        Ok(bytes.to_vec())
    }
}
