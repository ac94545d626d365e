//! PDF loading, one [`PageDocument`] per page.
//!
//! Text is pulled page by page with `lopdf`, so every chunk can be traced
//! back to the page it came from. Page numbers are zero-based.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::models::PageDocument;

/// Errors from reading a single PDF.
#[derive(Debug, Error)]
pub enum PdfError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse PDF {path}: {message}")]
    Parse { path: String, message: String },
}

/// Returns true when `bytes` starts with a PDF header.
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

/// Extract the text of every page from in-memory PDF bytes.
///
/// A page whose content cannot be decoded yields empty text rather than
/// failing the whole document.
pub fn extract_pages(bytes: &[u8], source: &str) -> Result<Vec<PageDocument>, PdfError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| PdfError::Parse {
        path: source.to_string(),
        message: e.to_string(),
    })?;

    let mut pages = Vec::new();
    for (index, page_number) in doc.get_pages().keys().enumerate() {
        let text = match doc.extract_text(&[*page_number]) {
            Ok(t) => t,
            Err(e) => {
                warn!(source, page = index, "failed to extract page text: {}", e);
                String::new()
            }
        };
        pages.push(PageDocument {
            source: source.to_string(),
            page: index as u32,
            text,
        });
    }

    Ok(pages)
}

/// Read a PDF file from disk and extract its pages.
pub fn load_pdf(path: &Path) -> Result<Vec<PageDocument>, PdfError> {
    let source = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|e| PdfError::Io {
        path: source.clone(),
        source: e,
    })?;
    extract_pages(&bytes, &source)
}

/// Load every PDF under `dir` matching `include_globs`, in path order.
///
/// Files that fail to parse are logged and skipped.
pub fn load_documents(dir: &Path, include_globs: &[String]) -> Result<Vec<PageDocument>> {
    if !dir.exists() {
        anyhow::bail!("Source directory does not exist: {}", dir.display());
    }

    let include_set = build_globset(include_globs)?;

    let mut paths = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        if include_set.is_match(relative) {
            paths.push(entry.path().to_path_buf());
        }
    }
    paths.sort();

    let mut pages = Vec::new();
    for path in &paths {
        match load_pdf(path) {
            Ok(mut doc_pages) => {
                debug!(path = %path.display(), pages = doc_pages.len(), "loaded pdf");
                pages.append(&mut doc_pages);
            }
            Err(e) => warn!("skipping {}: {}", path.display(), e),
        }
    }

    Ok(pages)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_header_check() {
        assert!(looks_like_pdf(b"%PDF-1.4\n..."));
        assert!(!looks_like_pdf(b"PK\x03\x04"));
        assert!(!looks_like_pdf(b""));
    }

    #[test]
    fn test_invalid_pdf_returns_parse_error() {
        let err = extract_pages(b"not a pdf", "bad.pdf").unwrap_err();
        assert!(matches!(err, PdfError::Parse { .. }));
    }

    #[test]
    fn test_missing_file_returns_io_error() {
        let err = load_pdf(Path::new("/nonexistent/file.pdf")).unwrap_err();
        assert!(matches!(err, PdfError::Io { .. }));
    }

    #[test]
    fn test_missing_dir_is_an_error() {
        let err = load_documents(Path::new("/nonexistent/dir"), &["**/*.pdf".to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_non_pdf_files_ignored() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "plain text").unwrap();
        std::fs::write(tmp.path().join("broken.pdf"), "garbage").unwrap();
        let pages = load_documents(tmp.path(), &["**/*.pdf".to_string()]).unwrap();
        assert!(pages.is_empty());
    }
}
