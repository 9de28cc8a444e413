//! Offline integration tests for the scan2book pipeline.
//!
//! These run the full text plumbing — split, classify, clean, combine —
//! against a temp directory, with closure transforms standing in for the
//! LLM so no API key or network access is needed. Live-LLM behaviour is
//! covered by the per-module unit tests of the retry and provider logic.
//!
//! Run with:
//!   cargo test --test pipeline

use scan2book::pipeline::classify::{classify_units, ClassifyOptions};
use scan2book::pipeline::combine::combine_to_file;
use scan2book::pipeline::split::{split_long_units, split_text_into_units};
use scan2book::pipeline::stage::{run_stage, StageOptions};
use scan2book::store::{self, Label, WorkUnit};
use scan2book::{PipelineConfig, PipelineRunner, ProjectLayout, RunOptions, UnitError};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

const RAW_BOOK: &str = "\
Contents
Chapter I .......... 1
Chapter II ......... 9
--- PAGE BREAK ---
# Chapter I

It was a bright cold day in April. The clocks were striking thirteen.
--- PAGE BREAK ---
# Chapter I

He went on reading. The hallway smelt of boiled cabbage.
--- page break ---
Bibliography
Orwell, G. (1949). Nineteen Eighty-Four.
";

/// Deterministic stand-in for the classifier model: looks at the excerpt
/// the way the real prompt would.
fn fake_label(excerpt: &str) -> &'static str {
    if excerpt.starts_with("Contents") {
        "toc"
    } else if excerpt.starts_with("Bibliography") {
        "bibliography"
    } else {
        "body"
    }
}

fn write_input(dir: &Path) -> PathBuf {
    let input = dir.join("nineteen_ocr.txt");
    std::fs::write(&input, RAW_BOOK).unwrap();
    input
}

// ── Split → classify → clean → combine ───────────────────────────────────────

#[tokio::test]
async fn full_text_pipeline_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let input = write_input(tmp.path());
    let chunks = tmp.path().join("ocr_chunks");
    let classified = tmp.path().join("classified_chunks");
    let cleaned = tmp.path().join("cleaned_chunks");

    // Split: 3 markers → 4 pages, case-insensitive marker.
    let pages =
        split_text_into_units(&input, &chunks, scan2book::prompts::DEFAULT_PAGE_BREAK_PATTERN)
            .unwrap();
    assert_eq!(pages, 4);
    assert!(store::unit_path(&chunks, "page_0001").exists());
    assert!(store::unit_path(&chunks, "page_0004").exists());

    // Classify: routed per excerpt, all label dirs exist afterwards.
    let report = classify_units(
        &chunks,
        &classified,
        &ClassifyOptions::new(4, 2000),
        |excerpt| async move { Ok(fake_label(&excerpt).to_string()) },
    )
    .await
    .unwrap();
    assert_eq!(report.count(Label::Toc), 1);
    assert_eq!(report.count(Label::Body), 2);
    assert_eq!(report.count(Label::Bibliography), 1);
    assert_eq!(report.fallbacks(), 0);
    for label in Label::ALL {
        assert!(classified.join(label.as_str()).is_dir());
    }

    // Clean each section with a closure transform.
    for label in Label::ALL {
        run_stage(
            &classified.join(label.as_str()),
            &cleaned.join(label.as_str()),
            &StageOptions::new(format!("clean:{label}"), 4),
            |unit| async move { Ok(unit.content.trim().to_string()) },
        )
        .await
        .unwrap();
    }

    // Combine in reading order; duplicate chapter heading appears once.
    let combined = tmp.path().join("book_combined.md");
    let order: Vec<PathBuf> = [Label::Toc, Label::Body, Label::Bibliography, Label::Index]
        .iter()
        .map(|l| cleaned.join(l.as_str()))
        .collect();
    combine_to_file(&order, &combined).unwrap();

    let text = std::fs::read_to_string(&combined).unwrap();
    assert_eq!(text.matches("# Chapter I").count(), 1);
    let toc_pos = text.find("Contents").unwrap();
    let body_pos = text.find("bright cold day").unwrap();
    let bib_pos = text.find("Orwell").unwrap();
    assert!(toc_pos < body_pos && body_pos < bib_pos);
}

// ── Resumability ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn interrupted_stage_resumes_without_rework() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("in");
    let output = tmp.path().join("out");
    for i in 1..=5 {
        store::write_unit(&input, &WorkUnit::new(format!("page_{i:04}"), "text")).unwrap();
    }

    // First pass dies on pages 2 and 4.
    let opts = StageOptions::new("clean", 4);
    let report = run_stage(&input, &output, &opts, |unit| async move {
        if unit.id == "page_0002" || unit.id == "page_0004" {
            Err(UnitError::Transform {
                unit: unit.id,
                retries: 3,
                detail: "connection reset".into(),
            })
        } else {
            Ok(format!("cleaned {}", unit.id))
        }
    })
    .await
    .unwrap();
    assert_eq!(report.completed(), 3);
    assert_eq!(report.failed(), 2);

    // Second pass: only the two failed pages are processed, and the
    // surviving outputs are byte-identical to the first pass.
    let before = std::fs::read_to_string(store::unit_path(&output, "page_0001")).unwrap();
    let report = run_stage(&input, &output, &opts, |unit| async move {
        Ok(format!("cleaned {}", unit.id))
    })
    .await
    .unwrap();
    assert_eq!(report.completed(), 2);
    assert_eq!(report.skipped(), 3);
    assert_eq!(report.failed(), 0);
    let after = std::fs::read_to_string(store::unit_path(&output, "page_0001")).unwrap();
    assert_eq!(before, after);
    assert!(store::unit_path(&output, "page_0002").exists());
    assert!(store::unit_path(&output, "page_0004").exists());
}

#[tokio::test]
async fn resplit_pages_are_not_recleaned_on_the_next_run() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let tmp = TempDir::new().unwrap();
    let classified = tmp.path().join("classified_body");
    let cleaned = tmp.path().join("cleaned_body");
    store::write_unit(&classified, &WorkUnit::new("page_0003", "very long page")).unwrap();
    store::write_unit(&classified, &WorkUnit::new("page_0004", "short page")).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&calls);
    run_stage(&classified, &cleaned, &StageOptions::new("clean", 2), |unit| {
        let count = Arc::clone(&count);
        async move {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(unit.content)
        }
    })
    .await
    .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // The long-unit splitter replaced page_0003 with its parts.
    let unit = WorkUnit::new("page_0003", "");
    store::write_unit(&cleaned, &WorkUnit::new(unit.part_id(1), "very long")).unwrap();
    store::write_unit(&cleaned, &WorkUnit::new(unit.part_id(2), "page")).unwrap();
    std::fs::remove_file(store::unit_path(&cleaned, "page_0003")).unwrap();

    // A second run must spend zero transform calls: both pages are done.
    let count = Arc::clone(&calls);
    let report = run_stage(&classified, &cleaned, &StageOptions::new("clean", 2), |unit| {
        let count = Arc::clone(&count);
        async move {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(unit.content)
        }
    })
    .await
    .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(report.skipped(), 2);
    assert_eq!(
        std::fs::read_to_string(store::unit_path(&cleaned, "page_0003_part01")).unwrap(),
        "very long"
    );
}

// ── Classifier fail-soft ─────────────────────────────────────────────────────

#[tokio::test]
async fn classifier_errors_never_drop_pages() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("in");
    let routed = tmp.path().join("routed");
    for i in 1..=3 {
        store::write_unit(&input, &WorkUnit::new(format!("page_{i:04}"), "some text")).unwrap();
    }

    let report = classify_units(
        &input,
        &routed,
        &ClassifyOptions::new(2, 2000),
        |_| async move {
            Err(UnitError::Transform {
                unit: "?".into(),
                retries: 3,
                detail: "model unavailable".into(),
            })
        },
    )
    .await
    .unwrap();

    // Every page landed in body, none lost.
    assert_eq!(report.count(Label::Body), 3);
    assert_eq!(report.fallbacks(), 3);
    assert_eq!(store::list_units(&routed.join("body")).unwrap().len(), 3);
}

// ── Long-unit splitting ──────────────────────────────────────────────────────

#[test]
fn oversized_pages_split_on_sentence_boundaries() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("in");
    let output = tmp.path().join("out");

    let long: String = (0..200)
        .map(|i| format!("Sentence number {i} rambles on for a good dozen words before it stops. "))
        .collect();
    store::write_unit(&input, &WorkUnit::new("page_0001", long.trim())).unwrap();
    store::write_unit(&input, &WorkUnit::new("page_0002", "Short page.")).unwrap();

    split_long_units(&input, &output, 300).unwrap();

    // The short page keeps its id; the long one became parts.
    assert!(store::unit_path(&output, "page_0002").exists());
    assert!(!store::unit_path(&output, "page_0001").exists());
    let parts: Vec<String> = store::list_unit_ids(&output)
        .unwrap()
        .into_iter()
        .filter(|id| id.starts_with("page_0001_part"))
        .collect();
    assert!(parts.len() > 1);
    assert_eq!(parts[0], "page_0001_part01");

    // Every part respects the word budget (a single sentence may exceed it,
    // but these don't).
    for id in &parts {
        let text =
            std::fs::read_to_string(store::unit_path(&output, id)).unwrap();
        assert!(text.split_whitespace().count() <= 300, "{id} over budget");
    }
}

// ── Batch mode ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_skips_processed_documents_unless_forced() {
    let tmp = TempDir::new().unwrap();
    let projects = tmp.path().join("projects");
    let input = write_input(tmp.path());

    // Mark the project as already processed: the narration script exists.
    let layout = ProjectLayout::new(&projects, "nineteen", "en");
    std::fs::create_dir_all(layout.root()).unwrap();
    std::fs::write(layout.narration_md(), "narration").unwrap();

    let config = PipelineConfig::builder()
        .projects_root(&projects)
        .language("en")
        .build()
        .unwrap();
    let runner = PipelineRunner::new(config).unwrap();

    let outcomes = runner
        .run_batch(&[input], &RunOptions::default(), false)
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].0, "nineteen");
    assert!(matches!(
        outcomes[0].1,
        scan2book::BatchOutcome::Skipped
    ));
}
