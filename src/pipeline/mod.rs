//! Pipeline stages for scanned-book conversion.
//!
//! Each submodule implements exactly one transformation step. Keeping
//! stages separate makes each independently testable and lets us swap
//! implementations without touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! raw OCR text ──▶ split ──▶ classify ──▶ clean ──▶ [translate] ──▶ combine
//!  (one file)     (pages)   (label dirs)  (LLM)       (LLM)       (markdown)
//!                                           │
//!                                           └──▶ audio rewrite ──▶ narration
//! ```
//!
//! 1. [`split`]     — page-break and sentence-boundary splitting; pure text
//! 2. [`stage`]     — the generic skip/fan-out/join runner all LLM stages use
//! 3. [`classify`]  — route units into labeled directories, fail-soft
//! 4. [`transform`] — clean / translate / rewrite-for-audio prompts over [`stage`]
//! 5. [`combine`]   — ordered merge with cross-page heading dedup
//!
//! Stages run strictly sequentially: each one's input directory is the
//! previous one's persisted output, which is what makes any stage
//! independently re-runnable.

pub mod classify;
pub mod combine;
pub mod split;
pub mod stage;
pub mod transform;
