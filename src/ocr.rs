//! OCR adapter: turn scanned page images into the raw pipeline input.
//!
//! The OCR engine is an external collaborator — `tesseract` is invoked
//! once per page image as a child process, stdout captured. The page texts
//! are joined with the page-break marker so the result is exactly what
//! [`crate::pipeline::split::split_text_into_units`] expects.
//!
//! A page that fails OCR is reported and contributes an empty segment —
//! keeping its slot means downstream page ordinals stay aligned with the
//! physical scan order. A *missing* tesseract binary is fatal: no page
//! could possibly succeed.

use crate::error::{PipelineError, UnitError};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

/// Options for one OCR pass.
#[derive(Debug, Clone)]
pub struct OcrOptions {
    /// Path to the tesseract executable.
    pub tesseract_path: PathBuf,
    /// Tesseract language code(s), e.g. "eng" or "lat+cat".
    pub language: String,
    /// Page-segmentation mode; 6 assumes a uniform block of text.
    pub psm: u32,
    /// Marker inserted between page texts in the joined output.
    pub page_break: String,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            tesseract_path: PathBuf::from("tesseract"),
            language: "eng".to_string(),
            psm: 6,
            page_break: "\n\n--- PAGE BREAK ---\n\n".to_string(),
        }
    }
}

/// Outcome of an OCR pass over an image directory.
#[derive(Debug)]
pub struct OcrReport {
    pub pages: usize,
    pub failures: Vec<UnitError>,
}

/// Run OCR on one image, returning the recognised text.
pub async fn recognize_image(image: &Path, opts: &OcrOptions) -> Result<String, PipelineError> {
    let output = Command::new(&opts.tesseract_path)
        .arg(image)
        .arg("stdout")
        .arg("-l")
        .arg(&opts.language)
        .arg("--psm")
        .arg(opts.psm.to_string())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipelineError::ExternalTool {
                    tool: "tesseract".to_string(),
                    detail: format!(
                        "executable not found at '{}'; install tesseract or set the path",
                        opts.tesseract_path.display()
                    ),
                }
            } else {
                PipelineError::ExternalTool {
                    tool: "tesseract".to_string(),
                    detail: e.to_string(),
                }
            }
        })?;

    if !output.status.success() {
        return Err(PipelineError::ExternalTool {
            tool: "tesseract".to_string(),
            detail: format!(
                "exit {:?} on {}: {}",
                output.status.code(),
                image.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// OCR every page image in `images_dir` (sorted) and write the joined text
/// to `output_file`, pages separated by the page-break marker.
pub async fn ocr_images(
    images_dir: &Path,
    output_file: &Path,
    opts: &OcrOptions,
) -> Result<OcrReport, PipelineError> {
    let images = list_images(images_dir)?;
    info!("OCR: {} page images in {}", images.len(), images_dir.display());

    let mut texts: Vec<String> = Vec::with_capacity(images.len());
    let mut failures: Vec<UnitError> = Vec::new();

    for image in &images {
        match recognize_image(image, opts).await {
            Ok(text) => texts.push(text),
            // Missing binary: abort, nothing else can succeed.
            Err(e @ PipelineError::ExternalTool { .. })
                if e.to_string().contains("not found") =>
            {
                return Err(e)
            }
            Err(e) => {
                let unit = image
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("unknown")
                    .to_string();
                let err = UnitError::Io {
                    unit,
                    detail: e.to_string(),
                };
                warn!("OCR: {err}");
                failures.push(err);
                texts.push(String::new());
            }
        }
    }

    if let Some(parent) = output_file.parent() {
        std::fs::create_dir_all(parent).map_err(|source| PipelineError::OutputWrite {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(output_file, texts.join(&opts.page_break)).map_err(|source| {
        PipelineError::OutputWrite {
            path: output_file.to_path_buf(),
            source,
        }
    })?;

    Ok(OcrReport {
        pages: images.len(),
        failures,
    })
}

/// Sorted page images (`.png`, `.jpg`, `.jpeg`) under `dir`.
fn list_images(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = std::fs::read_dir(dir).map_err(|source| PipelineError::InputRead {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut images: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("png") | Some("jpg") | Some("jpeg")
            )
        })
        .collect();
    images.sort();
    Ok(images)
}
