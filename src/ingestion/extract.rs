//! Plain-text extraction for the supported upload formats.

use std::path::Path;
use thiserror::Error;

/// Errors raised while pulling text out of an uploaded file.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The file extension is not one of the supported formats.
    #[error("Unsupported file type: {0}. Only .pdf and .txt are supported.")]
    UnsupportedFormat(String),
    /// The file could not be read from disk.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path we attempted to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The PDF parser rejected the document.
    #[error("Failed to parse PDF: {0}")]
    Pdf(String),
    /// Blocking extraction task panicked or was cancelled.
    #[error("Extraction task aborted: {0}")]
    TaskAborted(String),
}

/// Document formats accepted by the upload endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Portable Document Format.
    Pdf,
    /// UTF-8 (or close enough) plain text.
    Txt,
}

impl DocumentFormat {
    /// Resolve the format from a filename, matching the extension case-insensitively.
    pub fn from_filename(filename: &str) -> Result<Self, ExtractionError> {
        let extension = file_extension(filename);
        match extension.as_str() {
            ".pdf" => Ok(Self::Pdf),
            ".txt" => Ok(Self::Txt),
            _ => Err(ExtractionError::UnsupportedFormat(extension)),
        }
    }
}

/// Lower-cased extension including the leading dot, or an empty string when absent.
pub fn file_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

/// Read `path` and return its normalized text content.
///
/// PDF parsing is CPU-bound and runs on the blocking pool.
pub async fn extract_text(path: &Path, format: DocumentFormat) -> Result<String, ExtractionError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| ExtractionError::Io {
            path: path.display().to_string(),
            source,
        })?;

    let raw = match format {
        DocumentFormat::Txt => String::from_utf8_lossy(&bytes).into_owned(),
        DocumentFormat::Pdf => tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&bytes)
                .map_err(|error| ExtractionError::Pdf(error.to_string()))
        })
        .await
        .map_err(|error| ExtractionError::TaskAborted(error.to_string()))??,
    };

    Ok(normalize_text(&raw))
}

/// Strip NUL bytes, collapse trailing whitespace per line, and squeeze runs of blank lines.
pub(crate) fn normalize_text(raw: &str) -> String {
    let mut normalized = String::with_capacity(raw.len());
    let mut blank_run = 0;

    for line in raw.replace('\0', "").replace('\u{00A0}', " ").lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        normalized.push_str(line);
        normalized.push('\n');
    }

    normalized.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_matches_extension_case_insensitively() {
        assert_eq!(
            DocumentFormat::from_filename("Notes.PDF").unwrap(),
            DocumentFormat::Pdf
        );
        assert_eq!(
            DocumentFormat::from_filename("chapter1.txt").unwrap(),
            DocumentFormat::Txt
        );
    }

    #[test]
    fn unsupported_extension_reports_extension() {
        let error = DocumentFormat::from_filename("slides.pptx").unwrap_err();
        assert_eq!(
            error.to_string(),
            "Unsupported file type: .pptx. Only .pdf and .txt are supported."
        );
        assert!(matches!(
            DocumentFormat::from_filename("README").unwrap_err(),
            ExtractionError::UnsupportedFormat(ext) if ext.is_empty()
        ));
    }

    #[test]
    fn normalize_collapses_blank_lines_and_nuls() {
        let text = "Title\0  \n\n\n\nBody line   \n\u{00A0}\nEnd";
        assert_eq!(normalize_text(text), "Title\n\nBody line\n\nEnd");
    }

    #[tokio::test]
    async fn extracts_plain_text_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "Cells are the unit of life.\n\n\n").unwrap();

        let text = extract_text(&path, DocumentFormat::Txt).await.unwrap();
        assert_eq!(text, "Cells are the unit of life.");
    }

    #[tokio::test]
    async fn invalid_pdf_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not really a pdf").unwrap();

        let error = extract_text(&path, DocumentFormat::Pdf).await.unwrap_err();
        assert!(matches!(
            error,
            ExtractionError::Pdf(_) | ExtractionError::TaskAborted(_)
        ));
    }
}
