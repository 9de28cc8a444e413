//! System prompts and pipeline text constants.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing how a stage instructs the model
//!    (e.g. tightening the cleaning rules) requires editing exactly one place.
//!
//! 2. **Testability** — unit tests can import and inspect prompts directly
//!    without spinning up a real LLM, making prompt regressions easy to catch.

/// Sentinel emitted by the cleaning prompt for pages with no usable content.
///
/// Pages containing this token are excluded by the combiner, not the
/// splitter — the per-unit file still exists so re-runs stay idempotent.
pub const EMPTY_SENTINEL: &str = "--- EMPTY ---";

/// Default page-break marker inserted between OCRed pages.
///
/// Matched case-insensitively; surrounding whitespace is consumed so split
/// segments start and end clean.
pub const DEFAULT_PAGE_BREAK_PATTERN: &str = r"\s*--- PAGE BREAK ---\s*";

/// How much of a unit the classifier sees (and routes). OCR page type is
/// obvious from the first couple of thousand characters; sending whole pages
/// just burns tokens.
pub const CLASSIFY_EXCERPT_CHARS: usize = 2000;

/// Classification prompt: the model must answer with a single label token.
pub const CLASSIFY_PROMPT: &str = "You are a classification assistant. Given a page of OCRed text, classify it into one of the \
following types: 'body', 'toc', 'bibliography', 'index'. Respond with only the label.";

/// Cleaning prompt for main body pages.
pub const BODY_CLEAN_PROMPT: &str = "You are a text-cleaning assistant. Clean this OCRed body text: fix line breaks, remove headers, \
preserve paragraph structure, and output clean Markdown. \
Preserve all chapter headings as '# [chapter title]' and all section titles as '## [section title]', \
using the original text for each heading. Place footnotes at the end of each section. \
If the input is empty, meaningless, or contains no usable content, output only this token: --- EMPTY ---";

/// Cleaning prompt for bibliography and index pages: structure-preserving.
pub const LIGHT_CLEAN_PROMPT: &str = "You are a light-formatting assistant. This is a bibliography or index. Preserve structure, fix OCR errors, \
but do not merge or reformat entries. Output as a Markdown list.";

/// Rewrite prompt turning cleaned Markdown into narratable prose.
pub const AUDIO_REWRITE_PROMPT: &str = "You are preparing this text for audiobook narration. \
Remove all footnotes, citation markers, bibliographic references, and lists of tables or contents. \
Convert it into clean, natural, spoken prose.";

/// Build the translation prompt for body text.
pub fn translate_prompt(target_language: &str) -> String {
    format!("Translate the following text into {target_language}. Preserve Markdown formatting.")
}

/// Build the translation prompt for bibliography/index sections.
///
/// Entries must survive translation one-to-one, so the instruction forbids
/// merging or reformatting.
pub fn translate_light_prompt(target_language: &str) -> String {
    format!(
        "Translate the following bibliography or index into {target_language}. \
Preserve structure, fix OCR errors, do not merge or reformat entries. Output as a Markdown list."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_prompt_names_all_labels() {
        for label in ["body", "toc", "bibliography", "index"] {
            assert!(CLASSIFY_PROMPT.contains(label), "missing label {label}");
        }
    }

    #[test]
    fn body_prompt_carries_empty_sentinel() {
        assert!(BODY_CLEAN_PROMPT.contains(EMPTY_SENTINEL));
    }

    #[test]
    fn translate_prompts_embed_language() {
        assert!(translate_prompt("Spanish").contains("Spanish"));
        assert!(translate_light_prompt("Catalan").contains("Catalan"));
    }
}
