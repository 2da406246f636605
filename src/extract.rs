//! Plain-text extraction for stored document bytes.
//!
//! Connectivity is mime-driven: PDF goes through `pdf-extract`, any
//! `text/*` type is decoded as UTF-8, and everything else is a permanent
//! [`ExtractError::UnsupportedMimeType`].

use crate::error::ExtractError;

/// Supported binary mime type.
pub const MIME_PDF: &str = "application/pdf";

/// Turns stored bytes plus a mime type into plain UTF-8 text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], mime_type: &str) -> Result<String, ExtractError>;
}

/// Default extractor: PDF via `pdf-extract`, `text/*` as raw UTF-8.
pub struct DefaultExtractor;

impl TextExtractor for DefaultExtractor {
    fn extract(&self, bytes: &[u8], mime_type: &str) -> Result<String, ExtractError> {
        if mime_type == MIME_PDF {
            return extract_pdf(bytes);
        }
        if mime_type.starts_with("text/") {
            return std::str::from_utf8(bytes)
                .map(|s| s.to_string())
                .map_err(|e| ExtractError::Decode(e.to_string()));
        }
        Err(ExtractError::UnsupportedMimeType(mime_type.to_string()))
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}
