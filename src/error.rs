//! Error taxonomy for the engine.
//!
//! Parsing and search errors are recovered wherever the downstream step
//! can proceed with degraded functionality; only provider exhaustion
//! ([`EngineError::GenerationUnavailable`]) surfaces as a hard failure
//! to the enclosing request.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Declared type is not one of pdf, docx, txt, html. Rejects the upload.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Library-level decode failure with all encodings/pages exhausted.
    /// Rejects the upload.
    #[error("parse failure: {0}")]
    ParseFailure(String),

    /// Extraction produced zero-length text. A warning, not a rejection:
    /// some files are legitimately image-only.
    #[error("extracted content is empty")]
    EmptyContent,

    /// Upload exceeds the configured size ceiling; checked before any
    /// parsing begins.
    #[error("payload of {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Knowledge store failure (timeout, connection error). Propagated as
    /// "search degraded", never fatal to the enclosing request.
    #[error("knowledge store unavailable: {0}")]
    StoreUnavailable(String),

    /// Both the primary and fallback AI providers failed.
    #[error("generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// Malformed boundary input (bad base64, missing fields, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Requested document does not exist for this tenant.
    #[error("document not found: {0}")]
    NotFound(String),
}

impl EngineError {
    /// Machine-readable code used in HTTP error bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::UnsupportedFormat(_) => "unsupported_format",
            EngineError::ParseFailure(_) => "parse_failure",
            EngineError::EmptyContent => "empty_content",
            EngineError::PayloadTooLarge { .. } => "payload_too_large",
            EngineError::StoreUnavailable(_) => "store_unavailable",
            EngineError::GenerationUnavailable(_) => "generation_unavailable",
            EngineError::InvalidRequest(_) => "invalid_request",
            EngineError::NotFound(_) => "not_found",
        }
    }
}
