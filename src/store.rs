//! Work-unit store: directory-addressed chunks of text.
//!
//! Every stage reads its input as a directory of `*.txt` files and writes
//! its output as another directory of `*.txt` files, keyed by the unit id
//! (the file stem, e.g. `page_0042`). Lexicographic id order IS pipeline
//! order, so ids use zero-padded ordinals. The directory tree is the only
//! persisted pipeline state: a unit whose output file exists is done, one
//! without is pending. [`scan_status`] makes that implicit state machine
//! explicit for reporting and resume decisions.

use crate::error::PipelineError;
use std::path::{Path, PathBuf};

/// An ordered, named piece of text flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    /// Stable id, unique within a stage directory; determines merge order.
    pub id: String,
    /// Text payload.
    pub content: String,
}

impl WorkUnit {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }

    /// Derived id for the n-th part of a unit split by the long-unit
    /// splitter (1-based, matching `page_0003_part02`).
    pub fn part_id(&self, part: usize) -> String {
        format!("{}_part{:02}", self.id, part)
    }
}

/// Completion status of a unit, computed from a directory scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    /// No output file yet; the unit will be processed on the next stage run.
    Pending,
    /// Output file exists; the unit is skipped on re-runs.
    Done,
}

/// Path of the unit file for `id` inside `dir`.
pub fn unit_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{id}.txt"))
}

/// List all units in a stage directory, sorted by id.
///
/// A missing directory yields an empty list: a label directory with no
/// routed units is a normal state, not an error.
pub fn list_units(dir: &Path) -> Result<Vec<WorkUnit>, PipelineError> {
    let ids = list_unit_ids(dir)?;
    let mut units = Vec::with_capacity(ids.len());
    for id in ids {
        let path = unit_path(dir, &id);
        let content = std::fs::read_to_string(&path)
            .map_err(|source| PipelineError::InputRead { path, source })?;
        units.push(WorkUnit::new(id, content));
    }
    Ok(units)
}

/// List unit ids in a stage directory, sorted lexicographically.
pub fn list_unit_ids(dir: &Path) -> Result<Vec<String>, PipelineError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(dir).map_err(|source| PipelineError::InputRead {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut ids: Vec<String> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| PipelineError::InputRead {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            ids.push(stem.to_string());
        }
    }
    ids.sort();
    Ok(ids)
}

/// Write a unit's content into a stage directory, creating it if needed.
pub fn write_unit(dir: &Path, unit: &WorkUnit) -> Result<(), PipelineError> {
    std::fs::create_dir_all(dir).map_err(|source| PipelineError::OutputWrite {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = unit_path(dir, &unit.id);
    std::fs::write(&path, &unit.content)
        .map_err(|source| PipelineError::OutputWrite { path, source })
}

/// Compute per-unit status for a stage: which input ids already have an
/// output file and which are still pending.
pub fn scan_status(
    input_dir: &Path,
    output_dir: &Path,
) -> Result<Vec<(String, UnitStatus)>, PipelineError> {
    let ids = list_unit_ids(input_dir)?;
    Ok(ids
        .into_iter()
        .map(|id| {
            let status = if unit_path(output_dir, &id).exists() {
                UnitStatus::Done
            } else {
                UnitStatus::Pending
            };
            (id, status)
        })
        .collect())
}

// ── Labels ───────────────────────────────────────────────────────────────

/// Category assigned to a page by classification, used to route units to
/// different cleaning/translation prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Body,
    Toc,
    Bibliography,
    Index,
}

impl Label {
    /// All labels, in routing-directory order.
    pub const ALL: [Label; 4] = [Label::Body, Label::Toc, Label::Bibliography, Label::Index];

    /// Directory/display name of the label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Body => "body",
            Label::Toc => "toc",
            Label::Bibliography => "bibliography",
            Label::Index => "index",
        }
    }

    /// Parse a model response into a label. Trims and lowercases first;
    /// anything outside the four known labels is `None` (the classifier
    /// router substitutes [`Label::Body`]).
    pub fn parse(s: &str) -> Option<Label> {
        match s.trim().to_lowercase().as_str() {
            "body" => Some(Label::Body),
            "toc" => Some(Label::Toc),
            "bibliography" => Some(Label::Bibliography),
            "index" => Some(Label::Index),
            _ => None,
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn list_units_sorted_by_id() {
        let dir = TempDir::new().unwrap();
        for id in ["page_0003", "page_0001", "page_0002"] {
            write_unit(dir.path(), &WorkUnit::new(id, id)).unwrap();
        }
        // A stray non-txt file must be ignored.
        std::fs::write(dir.path().join("notes.md"), "ignore me").unwrap();

        let units = list_units(dir.path()).unwrap();
        let ids: Vec<&str> = units.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["page_0001", "page_0002", "page_0003"]);
    }

    #[test]
    fn missing_directory_is_empty_not_error() {
        let dir = TempDir::new().unwrap();
        let units = list_units(&dir.path().join("no_such_label")).unwrap();
        assert!(units.is_empty());
    }

    #[test]
    fn scan_status_reports_done_and_pending() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        write_unit(&input, &WorkUnit::new("page_0001", "a")).unwrap();
        write_unit(&input, &WorkUnit::new("page_0002", "b")).unwrap();
        write_unit(&output, &WorkUnit::new("page_0001", "A")).unwrap();

        let status = scan_status(&input, &output).unwrap();
        assert_eq!(
            status,
            vec![
                ("page_0001".to_string(), UnitStatus::Done),
                ("page_0002".to_string(), UnitStatus::Pending),
            ]
        );
    }

    #[test]
    fn part_id_is_zero_padded() {
        let u = WorkUnit::new("page_0003", "");
        assert_eq!(u.part_id(1), "page_0003_part01");
        assert_eq!(u.part_id(12), "page_0003_part12");
    }

    #[test]
    fn label_parse_is_case_and_whitespace_insensitive() {
        assert_eq!(Label::parse("  Body \n"), Some(Label::Body));
        assert_eq!(Label::parse("TOC"), Some(Label::Toc));
        assert_eq!(Label::parse("bibliography"), Some(Label::Bibliography));
        assert_eq!(Label::parse("appendix"), None);
        assert_eq!(Label::parse(""), None);
    }
}
