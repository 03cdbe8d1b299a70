use std::fs;
use std::io::Read;
use std::path::Path;

use dotext::MsDoc;
use thiserror::Error;

use crate::constants::{MAX_CV_BYTES, MIN_CV_BYTES};

const MAX_PDF_PAGES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CvFormat {
    Pdf,
    Docx,
    Doc,
}

#[derive(Debug, Error)]
pub enum CvExtractError {
    #[error("file is {0} bytes, outside the [{MIN_CV_BYTES}, {MAX_CV_BYTES}] byte range")]
    SizeOutOfRange(usize),
    #[error("unsupported document format")]
    UnsupportedFormat,
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("pdf extraction failed: {0}")]
    Pdf(String),
    #[error("docx extraction failed: {0}")]
    Docx(String),
}

/// Detects the document format by magic bytes first, falling back to the file
/// extension when the bytes are ambiguous. A DOCX is a ZIP archive that contains
/// a `word/` entry; since checking the archive's table of contents is the only
/// reliable signal short of a full ZIP parse, and the queue payload already
/// carries the original filename, the ZIP-magic case defers to the extension.
pub fn detect_format(bytes: &[u8], original_filename: &str) -> Option<CvFormat> {
    if bytes.starts_with(b"%PDF") {
        return Some(CvFormat::Pdf);
    }

    let is_zip = bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(b"PK\x05\x06");
    let extension = Path::new(original_filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("pdf") => Some(CvFormat::Pdf),
        Some("docx") if is_zip => Some(CvFormat::Docx),
        Some("doc") => Some(CvFormat::Doc),
        _ if is_zip => Some(CvFormat::Docx),
        _ => None,
    }
}

pub fn validate_size(size: usize) -> Result<(), CvExtractError> {
    if size < MIN_CV_BYTES || size > MAX_CV_BYTES {
        return Err(CvExtractError::SizeOutOfRange(size));
    }
    Ok(())
}

/// Extracts raw text from a CV stored on disk. PDFs are capped at the first 10
/// pages with no image rendering; DOCX/DOC extraction is raw text only, no
/// style maps, to bound memory on large résumés.
pub fn extract_text(path: &Path, format: CvFormat) -> Result<String, CvExtractError> {
    match format {
        CvFormat::Pdf => extract_pdf_text(path),
        CvFormat::Docx => extract_docx_text(path),
        CvFormat::Doc => extract_doc_text(path),
    }
}

fn extract_pdf_text(path: &Path) -> Result<String, CvExtractError> {
    let pages = pdf_extract::extract_text_by_pages(path).map_err(|err| CvExtractError::Pdf(err.to_string()))?;
    Ok(pages.into_iter().take(MAX_PDF_PAGES).collect::<Vec<_>>().join("\n"))
}

fn extract_docx_text(path: &Path) -> Result<String, CvExtractError> {
    let mut file = dotext::Docx::open(path).map_err(|err| CvExtractError::Docx(err.to_string()))?;
    let mut text = String::new();
    file.read_to_string(&mut text).map_err(|err| CvExtractError::Docx(err.to_string()))?;
    Ok(text)
}

fn extract_doc_text(path: &Path) -> Result<String, CvExtractError> {
    let mut file = dotext::Docx::open(path).map_err(|err| CvExtractError::Docx(err.to_string()))?;
    let mut text = String::new();
    file.read_to_string(&mut text).map_err(|err| CvExtractError::Docx(err.to_string()))?;
    Ok(text)
}

pub fn read_bytes(path: &Path) -> Result<Vec<u8>, CvExtractError> {
    Ok(fs::read(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_pdf_by_magic_bytes() {
        let bytes = b"%PDF-1.4 rest of file";
        assert_eq!(detect_format(bytes, "resume.bin"), Some(CvFormat::Pdf));
    }

    #[test]
    fn detects_docx_by_zip_magic_and_extension() {
        let bytes = b"PK\x03\x04 rest of archive";
        assert_eq!(detect_format(bytes, "resume.docx"), Some(CvFormat::Docx));
    }

    #[test]
    fn falls_back_to_extension_for_legacy_doc() {
        let bytes = b"\xd0\xcf\x11\xe0 legacy ole header";
        assert_eq!(detect_format(bytes, "resume.doc"), Some(CvFormat::Doc));
    }

    #[test]
    fn unrecognized_bytes_and_extension_are_unsupported() {
        let bytes = b"just some text";
        assert_eq!(detect_format(bytes, "resume.txt"), None);
    }

    #[test]
    fn validate_size_rejects_too_small_and_too_large() {
        assert!(validate_size(10).is_err());
        assert!(validate_size(MAX_CV_BYTES + 1).is_err());
        assert!(validate_size(MIN_CV_BYTES).is_ok());
    }
}
