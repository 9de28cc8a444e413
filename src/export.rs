//! Document export: combined Markdown → EPUB via pandoc.
//!
//! A single synchronous external-process invocation. A missing executable
//! or a non-zero exit is fatal to the export stage only — the orchestrator
//! logs it and carries on with narration and audio, since the combined
//! Markdown (the input to pandoc) is already persisted and the user can
//! re-run the export once pandoc is installed.

use crate::error::PipelineError;
use std::path::Path;
use tokio::process::Command;
use tracing::info;

/// Convert a Markdown file to EPUB using pandoc.
pub async fn generate_epub(
    input_md: &Path,
    output_epub: &Path,
    pandoc_path: &Path,
) -> Result<(), PipelineError> {
    if !input_md.exists() {
        return Err(PipelineError::SourceNotFound {
            path: input_md.to_path_buf(),
        });
    }
    if let Some(parent) = output_epub.parent() {
        std::fs::create_dir_all(parent).map_err(|source| PipelineError::OutputWrite {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let output = Command::new(pandoc_path)
        .arg(input_md)
        .arg("-o")
        .arg(output_epub)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::ExternalTool {
                    tool: "pandoc".to_string(),
                    detail: format!(
                        "executable not found at '{}'; install pandoc or specify its full path",
                        pandoc_path.display()
                    ),
                }
            } else {
                PipelineError::ExternalTool {
                    tool: "pandoc".to_string(),
                    detail: e.to_string(),
                }
            }
        })?;

    if !output.status.success() {
        return Err(PipelineError::ExternalTool {
            tool: "pandoc".to_string(),
            detail: format!(
                "exit {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    info!("[export] EPUB created: {}", output_epub.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_input_is_source_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = generate_epub(
            &tmp.path().join("missing.md"),
            &tmp.path().join("book.epub"),
            Path::new("pandoc"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn missing_pandoc_is_external_tool_error() {
        let tmp = TempDir::new().unwrap();
        let md = tmp.path().join("book.md");
        std::fs::write(&md, "# Title\n").unwrap();

        let err = generate_epub(
            &md,
            &tmp.path().join("book.epub"),
            &tmp.path().join("no-such-pandoc"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::ExternalTool { .. }));
        assert!(err.to_string().contains("pandoc"));
    }
}
