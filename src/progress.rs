//! Progress-callback trait for per-unit stage events.
//!
//! Inject an `Arc<dyn StageProgressCallback>` via
//! [`crate::config::PipelineConfigBuilder::progress`] to receive real-time
//! events as each stage works through its units.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers
//! can forward events to a channel, a log sink, or a terminal progress bar
//! without the library knowing anything about how the host application
//! communicates. The trait is `Send + Sync` because units within a stage
//! are processed concurrently.

/// Called by a stage runner as it processes each work unit.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. When a stage runs with concurrency > 1, the
/// per-unit methods may be called from different tasks simultaneously;
/// implementations must protect shared mutable state accordingly.
pub trait StageProgressCallback: Send + Sync {
    /// Called once when a stage begins, with the stage name and the number
    /// of input units (including ones that will be skipped).
    fn on_stage_start(&self, stage: &str, total_units: usize) {
        let _ = (stage, total_units);
    }

    /// Called just before a unit's transform is submitted.
    fn on_unit_start(&self, stage: &str, unit: &str) {
        let _ = (stage, unit);
    }

    /// Called when a unit's output file already existed and was skipped.
    fn on_unit_skipped(&self, stage: &str, unit: &str) {
        let _ = (stage, unit);
    }

    /// Called when a unit completes and its output is written.
    fn on_unit_complete(&self, stage: &str, unit: &str, output_len: usize) {
        let _ = (stage, unit, output_len);
    }

    /// Called when a unit fails after all retries are exhausted.
    fn on_unit_error(&self, stage: &str, unit: &str, error: &str) {
        let _ = (stage, unit, error);
    }

    /// Called once after every unit has resolved.
    fn on_stage_complete(&self, stage: &str, completed: usize, skipped: usize, failed: usize) {
        let _ = (stage, completed, skipped, failed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgress;

impl StageProgressCallback for NoopProgress {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counting {
        starts: AtomicUsize,
        completes: AtomicUsize,
        skips: AtomicUsize,
        errors: AtomicUsize,
    }

    impl StageProgressCallback for Counting {
        fn on_unit_start(&self, _stage: &str, _unit: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        fn on_unit_skipped(&self, _stage: &str, _unit: &str) {
            self.skips.fetch_add(1, Ordering::SeqCst);
        }
        fn on_unit_complete(&self, _stage: &str, _unit: &str, _len: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }
        fn on_unit_error(&self, _stage: &str, _unit: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgress;
        cb.on_stage_start("clean", 3);
        cb.on_unit_start("clean", "page_0001");
        cb.on_unit_skipped("clean", "page_0002");
        cb.on_unit_complete("clean", "page_0001", 42);
        cb.on_unit_error("clean", "page_0003", "boom");
        cb.on_stage_complete("clean", 1, 1, 1);
    }

    #[test]
    fn counting_callback_receives_events() {
        let cb = Counting {
            starts: AtomicUsize::new(0),
            completes: AtomicUsize::new(0),
            skips: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        };
        cb.on_unit_start("translate", "page_0001");
        cb.on_unit_complete("translate", "page_0001", 100);
        cb.on_unit_skipped("translate", "page_0002");
        cb.on_unit_error("translate", "page_0003", "HTTP 500");

        assert_eq!(cb.starts.load(Ordering::SeqCst), 1);
        assert_eq!(cb.completes.load(Ordering::SeqCst), 1);
        assert_eq!(cb.skips.load(Ordering::SeqCst), 1);
        assert_eq!(cb.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Arc<dyn StageProgressCallback>>();
    }
}
