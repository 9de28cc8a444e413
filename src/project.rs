//! Project layout: the persisted directory tree of one book conversion.
//!
//! The layout IS the pipeline's checkpoint format. Every stage writes into
//! a fixed, named subdirectory of `projects/<name>/<lang>/`, and
//! resumability works by pointing a stage at the same directories again —
//! so these names must never change between runs.
//!
//! ```text
//! projects/<name>/<lang>/
//! ├── ocr_text.txt                 raw OCR output, page-break separated
//! ├── ocr_chunks/                  one file per page
//! ├── classified_chunks/{body,toc,bibliography,index}/
//! ├── cleaned_chunks/{body,toc,bibliography,index}/
//! ├── translated_chunks/{body,toc,bibliography,index}/
//! ├── audiobook_chunks/            narration-rewritten body pages
//! ├── audio/                       one mp3 per narration unit
//! ├── <name>_combined.md           merged e-book Markdown
//! ├── <name>.epub                  exported e-book
//! └── <name>_narration.md          merged narration script
//! ```

use crate::error::PipelineError;
use crate::store::Label;
use std::path::{Path, PathBuf};

/// Paths for one project in one language.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
    name: String,
}

impl ProjectLayout {
    /// Layout rooted at `projects_root/name/lang`.
    pub fn new(projects_root: &Path, name: impl Into<String>, lang: &str) -> Self {
        let name = name.into();
        Self {
            root: projects_root.join(&name).join(lang),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ocr_text(&self) -> PathBuf {
        self.root.join("ocr_text.txt")
    }

    pub fn ocr_chunks(&self) -> PathBuf {
        self.root.join("ocr_chunks")
    }

    pub fn classified_chunks(&self) -> PathBuf {
        self.root.join("classified_chunks")
    }

    pub fn classified_dir(&self, label: Label) -> PathBuf {
        self.classified_chunks().join(label.as_str())
    }

    pub fn cleaned_chunks(&self) -> PathBuf {
        self.root.join("cleaned_chunks")
    }

    pub fn cleaned_dir(&self, label: Label) -> PathBuf {
        self.cleaned_chunks().join(label.as_str())
    }

    pub fn translated_chunks(&self) -> PathBuf {
        self.root.join("translated_chunks")
    }

    pub fn translated_dir(&self, label: Label) -> PathBuf {
        self.translated_chunks().join(label.as_str())
    }

    pub fn audiobook_chunks(&self) -> PathBuf {
        self.root.join("audiobook_chunks")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.root.join("audio")
    }

    pub fn combined_md(&self) -> PathBuf {
        self.root.join(format!("{}_combined.md", self.name))
    }

    pub fn final_epub(&self) -> PathBuf {
        self.root.join(format!("{}.epub", self.name))
    }

    pub fn narration_md(&self) -> PathBuf {
        self.root.join(format!("{}_narration.md", self.name))
    }

    /// Combine order for the e-book: toc first, then body, back matter last.
    pub fn combine_order(&self) -> Vec<PathBuf> {
        [Label::Toc, Label::Body, Label::Bibliography, Label::Index]
            .iter()
            .map(|label| self.cleaned_dir(*label))
            .collect()
    }

    /// Create every stage directory this layout names.
    pub fn ensure_dirs(&self) -> Result<(), PipelineError> {
        let mut dirs = vec![self.ocr_chunks(), self.audiobook_chunks(), self.audio_dir()];
        for label in Label::ALL {
            dirs.push(self.classified_dir(label));
            dirs.push(self.cleaned_dir(label));
        }
        for dir in dirs {
            std::fs::create_dir_all(&dir)
                .map_err(|source| PipelineError::OutputWrite { path: dir.clone(), source })?;
        }
        Ok(())
    }

    /// Whether this project has already been fully processed.
    ///
    /// The narration script is the last artifact the pipeline writes, so
    /// its existence is the batch-mode "done" predicate.
    pub fn is_processed(&self) -> bool {
        self.narration_md().exists()
    }
}
