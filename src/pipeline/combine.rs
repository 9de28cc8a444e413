//! Combiner: merge ordered unit directories into one document.
//!
//! This is the one place in the pipeline where unit independence is
//! intentionally broken: heading deduplication carries a seen-set across
//! pages, so the result depends on processing order. Determinism therefore
//! comes from a fixed, reproducible order — directories in the order given
//! by the caller, units within a directory in lexicographic id order —
//! never from wall-clock completion order.

use crate::error::PipelineError;
use crate::prompts::EMPTY_SENTINEL;
use crate::store;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#+)\s+(.*)").unwrap());

/// Merge all units from `input_dirs` (in that order) into one document.
///
/// Pages containing the empty-page sentinel are dropped entirely. Heading
/// lines (`# Title`, `## Title`, …) whose normalised title was already seen
/// earlier in the concatenation are dropped; every other line is kept
/// verbatim. A blank separator line follows each page.
pub fn combine_dirs(input_dirs: &[PathBuf]) -> Result<String, PipelineError> {
    let mut pages: Vec<String> = Vec::new();
    for dir in input_dirs {
        for unit in store::list_units(dir)? {
            if unit.content.contains(EMPTY_SENTINEL) {
                continue;
            }
            pages.push(unit.content);
        }
    }
    Ok(remove_redundant_headers(&pages))
}

/// Single streaming pass dropping heading lines already seen.
///
/// Titles are compared trimmed and lowercased, so cleaning variations in
/// case or spacing still dedupe. Heading *level* is ignored on purpose: a
/// chapter re-emitted as `## Chapter` on a continuation page is the same
/// chapter.
fn remove_redundant_headers(pages: &[String]) -> String {
    let mut combined: Vec<&str> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for page in pages {
        for line in page.lines() {
            if let Some(caps) = HEADING.captures(line) {
                let title = caps[2].trim().to_lowercase();
                if !seen.insert(title) {
                    continue;
                }
            }
            combined.push(line);
        }
        combined.push("");
    }
    combined.join("\n")
}

/// Combine `input_dirs` and write the document to `output_file`.
pub fn combine_to_file(
    input_dirs: &[PathBuf],
    output_file: &Path,
) -> Result<(), PipelineError> {
    let combined = combine_dirs(input_dirs)?;
    if let Some(parent) = output_file.parent() {
        std::fs::create_dir_all(parent).map_err(|source| PipelineError::OutputWrite {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(output_file, &combined).map_err(|source| PipelineError::OutputWrite {
        path: output_file.to_path_buf(),
        source,
    })?;
    info!("[combine] wrote {}", output_file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::WorkUnit;
    use tempfile::TempDir;

    fn seed(dir: &Path, pairs: &[(&str, &str)]) {
        for (id, content) in pairs {
            store::write_unit(dir, &WorkUnit::new(*id, *content)).unwrap();
        }
    }

    #[test]
    fn duplicate_heading_appears_once() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("body");
        seed(
            &dir,
            &[
                ("page_0001", "# Intro\nFirst page text."),
                ("page_0002", "#  intro \nSecond page text."),
            ],
        );

        let out = combine_dirs(&[dir]).unwrap();
        let intro_lines = out
            .lines()
            .filter(|l| l.trim_start_matches('#').trim().eq_ignore_ascii_case("intro"))
            .count();
        assert_eq!(intro_lines, 1);
        assert!(out.contains("First page text."));
        assert!(out.contains("Second page text."));
    }

    #[test]
    fn heading_level_is_ignored_for_dedup() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("body");
        seed(
            &dir,
            &[("page_0001", "# Methods\nA."), ("page_0002", "## Methods\nB.")],
        );

        let out = combine_dirs(&[dir]).unwrap();
        assert_eq!(out.matches("Methods").count(), 1);
    }

    #[test]
    fn empty_sentinel_pages_are_dropped() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("body");
        seed(
            &dir,
            &[
                ("page_0001", "Real content."),
                ("page_0002", "--- EMPTY ---"),
                ("page_0003", "More content."),
            ],
        );

        let out = combine_dirs(&[dir]).unwrap();
        assert!(!out.contains("EMPTY"));
        assert!(out.contains("Real content."));
        assert!(out.contains("More content."));
    }

    #[test]
    fn directory_order_then_id_order() {
        let tmp = TempDir::new().unwrap();
        let toc = tmp.path().join("toc");
        let body = tmp.path().join("body");
        seed(&toc, &[("page_0002", "toc two"), ("page_0001", "toc one")]);
        seed(&body, &[("page_0003", "body three")]);

        let out = combine_dirs(&[toc, body]).unwrap();
        let a = out.find("toc one").unwrap();
        let b = out.find("toc two").unwrap();
        let c = out.find("body three").unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn determinism_depends_only_on_directory_and_id_order() {
        // Write the same units in two different wall-clock orders; the
        // combined output must be byte-identical.
        let make = |order: &[(&str, &str)]| {
            let tmp = TempDir::new().unwrap();
            let dir = tmp.path().join("body");
            seed(&dir, order);
            (combine_dirs(&[dir]).unwrap(), tmp)
        };

        let (a, _ta) = make(&[("page_0001", "# One\nx"), ("page_0002", "# Two\ny")]);
        let (b, _tb) = make(&[("page_0002", "# Two\ny"), ("page_0001", "# One\nx")]);
        assert_eq!(a, b);
    }

    #[test]
    fn blank_separator_after_each_page() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("body");
        seed(&dir, &[("page_0001", "alpha"), ("page_0002", "beta")]);

        let out = combine_dirs(&[dir]).unwrap();
        assert_eq!(out, "alpha\n\nbeta\n");
    }

    #[test]
    fn non_heading_lines_are_kept_verbatim_even_when_repeated() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("body");
        seed(&dir, &[("page_0001", "same line"), ("page_0002", "same line")]);

        let out = combine_dirs(&[dir]).unwrap();
        assert_eq!(out.matches("same line").count(), 2);
    }

    #[test]
    fn combine_to_file_creates_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("body");
        seed(&dir, &[("page_0001", "content")]);
        let out = tmp.path().join("nested/out/combined.md");

        combine_to_file(&[dir], &out).unwrap();
        assert!(std::fs::read_to_string(&out).unwrap().contains("content"));
    }
}
