pub mod clean;
pub mod extract;
pub mod identity;

use std::path::Path;

use thiserror::Error;

pub use clean::{MIN_CLEANED_TEXT_LEN, clean_text, is_too_short};
pub use extract::{CvExtractError, CvFormat, detect_format, extract_text, read_bytes, validate_size};
pub use identity::{ExtractedIdentity, extract_identity};

#[derive(Debug, Error)]
pub enum CvProcessingError {
    #[error(transparent)]
    Extract(#[from] CvExtractError),
    #[error("text is too short after cleaning")]
    TooShort,
}

/// Runs the full pipeline a worker needs: detect format, extract text, and
/// normalize whitespace, without touching identity (callers decide whether to
/// extract identity, since only the application worker re-derives it).
pub fn process_cv(path: &Path, original_filename: &str) -> Result<String, CvProcessingError> {
    let bytes = read_bytes(path)?;
    validate_size(bytes.len())?;
    let format = detect_format(&bytes, original_filename).ok_or(CvExtractError::UnsupportedFormat)?;
    let raw_text = extract_text(path, format)?;
    let cleaned = clean_text(&raw_text);
    if is_too_short(&cleaned) {
        return Err(CvProcessingError::TooShort);
    }
    Ok(cleaned)
}
