//! Splitter: divide a document into ordered, bounded-size work units.
//!
//! Two levels of splitting exist because two different limits bite at two
//! different points in the pipeline:
//!
//! 1. **Page splitting** ([`split_pages`]) runs once at the start, on the
//!    raw OCR text. The OCR step joins pages with an explicit marker
//!    (`--- PAGE BREAK ---`), so one regex split recovers page boundaries
//!    exactly and gives every downstream stage a natural unit size.
//!
//! 2. **Long-unit splitting** ([`split_long_units`]) runs on cleaned or
//!    translated chunks that outgrew the per-call word budget. It splits on
//!    sentence boundaries and greedily packs sentences into batches, so no
//!    batch ever cuts mid-sentence.
//!
//! Both are pure text processing — no external calls, only I/O can fail.

use crate::error::PipelineError;
use crate::store::{self, WorkUnit};
use regex::RegexBuilder;
use std::path::Path;
use tracing::{debug, info};

/// Split raw OCR text on the page-break marker into ordered work units.
///
/// The marker regex is matched case-insensitively. A text with k markers
/// produces exactly k+1 units, ids `page_0001` onwards; each segment is
/// trimmed of surrounding whitespace.
pub fn split_pages(text: &str, pattern: &str) -> Result<Vec<WorkUnit>, PipelineError> {
    let re = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| PipelineError::InvalidConfig(format!("page-break pattern: {e}")))?;

    Ok(re
        .split(text)
        .enumerate()
        .map(|(i, segment)| WorkUnit::new(format!("page_{:04}", i + 1), segment.trim()))
        .collect())
}

/// Split a source text file into per-page unit files under `output_dir`.
pub fn split_text_into_units(
    input_file: &Path,
    output_dir: &Path,
    pattern: &str,
) -> Result<usize, PipelineError> {
    if !input_file.exists() {
        return Err(PipelineError::SourceNotFound {
            path: input_file.to_path_buf(),
        });
    }
    let text =
        std::fs::read_to_string(input_file).map_err(|source| PipelineError::InputRead {
            path: input_file.to_path_buf(),
            source,
        })?;

    let units = split_pages(&text, pattern)?;
    for unit in &units {
        store::write_unit(output_dir, unit)?;
    }
    info!("Split {} into {} page units", input_file.display(), units.len());
    Ok(units.len())
}

/// Split one unit's text into sentence-packed batches of at most
/// `max_words` words.
///
/// Sentence boundaries are punctuation (`.`, `!`, `?`) followed by
/// whitespace and a capital letter or opening quote. The regex crate has no
/// lookbehind, so instead of splitting directly we scan boundary candidates
/// and cut at the start of the following sentence, keeping the punctuation
/// with the sentence it ends.
///
/// A unit with zero sentence boundaries still yields one (possibly empty)
/// batch.
pub fn batch_sentences(text: &str, max_words: usize) -> Vec<String> {
    let sentences = split_sentences(text);

    let mut batches: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_words = 0usize;

    for sentence in &sentences {
        let words = sentence.split_whitespace().count();
        if current_words + words > max_words && !current.is_empty() {
            batches.push(current.join(" ").trim().to_string());
            current = vec![sentence];
            current_words = words;
        } else {
            current.push(sentence);
            current_words += words;
        }
    }
    if !current.is_empty() || batches.is_empty() {
        batches.push(current.join(" ").trim().to_string());
    }
    batches
}

/// Split text on sentence boundaries, keeping terminal punctuation.
fn split_sentences(text: &str) -> Vec<&str> {
    static BOUNDARY: once_cell::sync::Lazy<regex::Regex> =
        once_cell::sync::Lazy::new(|| regex::Regex::new(r"[.!?]\s+").unwrap());

    let mut parts = Vec::new();
    let mut start = 0usize;
    for m in BOUNDARY.find_iter(text) {
        let next = &text[m.end()..];
        let opens_sentence = next
            .chars()
            .next()
            .map(|c| c.is_uppercase() || c == '“' || c == '"')
            .unwrap_or(false);
        if opens_sentence {
            // Keep the punctuation (one ASCII byte) with the left sentence;
            // drop the separating whitespace like the boundary split does.
            parts.push(&text[start..m.start() + 1]);
            start = m.end();
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Re-split every unit in `input_dir` whose text exceeds `max_words` into
/// `_partNN` children under `output_dir`.
///
/// A unit that already fits is copied through under its original id, so
/// downstream merge order is unchanged for units that didn't need
/// splitting.
pub fn split_long_units(
    input_dir: &Path,
    output_dir: &Path,
    max_words: usize,
) -> Result<usize, PipelineError> {
    let units = store::list_units(input_dir)?;
    let mut written = 0usize;

    for unit in &units {
        let batches = batch_sentences(unit.content.trim(), max_words);
        if batches.len() == 1 {
            store::write_unit(output_dir, &WorkUnit::new(unit.id.clone(), &batches[0]))?;
            written += 1;
        } else {
            debug!("Split {} into {} parts", unit.id, batches.len());
            for (i, batch) in batches.iter().enumerate() {
                store::write_unit(output_dir, &WorkUnit::new(unit.part_id(i + 1), batch))?;
                written += 1;
            }
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::DEFAULT_PAGE_BREAK_PATTERN;
    use tempfile::TempDir;

    #[test]
    fn two_pages_from_one_marker() {
        let units = split_pages("A\n--- PAGE BREAK ---\nB", DEFAULT_PAGE_BREAK_PATTERN).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0], WorkUnit::new("page_0001", "A"));
        assert_eq!(units[1], WorkUnit::new("page_0002", "B"));
    }

    #[test]
    fn k_markers_give_k_plus_one_units() {
        let text = "one\n--- PAGE BREAK ---\ntwo\n--- page break ---\nthree";
        let units = split_pages(text, DEFAULT_PAGE_BREAK_PATTERN).unwrap();
        assert_eq!(units.len(), 3);
        // Case-insensitive marker, trimmed segments, content round-trips.
        let joined: Vec<&str> = units.iter().map(|u| u.content.as_str()).collect();
        assert_eq!(joined, vec!["one", "two", "three"]);
    }

    #[test]
    fn no_marker_is_single_unit() {
        let units = split_pages("just one page", DEFAULT_PAGE_BREAK_PATTERN).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].id, "page_0001");
    }

    #[test]
    fn ids_are_zero_padded_for_lexicographic_order() {
        let text = vec!["x"; 12].join("\n--- PAGE BREAK ---\n");
        let units = split_pages(&text, DEFAULT_PAGE_BREAK_PATTERN).unwrap();
        assert_eq!(units[9].id, "page_0010");
        let mut ids: Vec<&String> = units.iter().map(|u| &u.id).collect();
        let sorted = ids.clone();
        ids.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn sentences_split_on_capital_after_punctuation() {
        let parts = split_sentences("First one. Second one! Not this. lowercase continues. Third?");
        assert_eq!(
            parts,
            vec![
                "First one.",
                "Second one!",
                "Not this. lowercase continues.",
                "Third?"
            ]
        );
    }

    #[test]
    fn empty_text_is_one_empty_batch() {
        let batches = batch_sentences("", 100);
        assert_eq!(batches, vec![String::new()]);
    }

    #[test]
    fn batches_respect_word_budget() {
        // Ten 5-word sentences, 12-word budget → two sentences per batch.
        let text = (0..10)
            .map(|i| format!("Sentence number {i} has five. "))
            .collect::<String>();
        let batches = batch_sentences(text.trim(), 12);
        assert_eq!(batches.len(), 5);
        for b in &batches {
            assert!(b.split_whitespace().count() <= 12, "batch too big: {b}");
        }
    }

    #[test]
    fn oversize_single_sentence_still_emits_one_batch() {
        let text = "word ".repeat(50);
        let batches = batch_sentences(text.trim(), 10);
        assert_eq!(batches.len(), 1);
    }

    #[test]
    fn long_units_get_part_suffixes_short_units_keep_id() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");

        let long: String = (0..8)
            .map(|i| format!("Long sentence number {i} with several words here. "))
            .collect();
        store::write_unit(&input, &WorkUnit::new("page_0001", "Short page.")).unwrap();
        store::write_unit(&input, &WorkUnit::new("page_0002", long.trim())).unwrap();

        split_long_units(&input, &output, 16).unwrap();

        let ids = store::list_unit_ids(&output).unwrap();
        assert!(ids.contains(&"page_0001".to_string()));
        assert!(ids.contains(&"page_0002_part01".to_string()));
        assert!(ids.iter().filter(|id| id.starts_with("page_0002_part")).count() >= 2);
        assert!(!ids.contains(&"page_0002".to_string()));
    }

    #[test]
    fn split_missing_source_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = split_text_into_units(
            &dir.path().join("missing.txt"),
            &dir.path().join("out"),
            DEFAULT_PAGE_BREAK_PATTERN,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::SourceNotFound { .. }));
    }
}
