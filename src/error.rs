//! Error types for the academic-reader service.
//!
//! Two distinct error types reflect two distinct audiences:
//!
//! * [`ReaderError`] — **Request-facing**: everything that can fail an upload
//!   request or service setup. Each variant maps to one HTTP status through
//!   [`ReaderError::status`], and [`ReaderError::public_detail`] yields the
//!   sanitized message that is safe to send back to a client.
//!
//! * [`EngineError`] — **Engine-internal**: failures raised by a
//!   [`crate::engine::ConversionEngine`]. The converter logs them in full and
//!   wraps them into [`ReaderError::Conversion`] before they leave the crate.

use axum::http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the request-facing API of the service.
#[derive(Debug, Error)]
pub enum ReaderError {
    // ── Validation errors (user-correctable) ──────────────────────────────
    /// The declared content type of the upload is not PDF.
    #[error("Unsupported media type '{content_type}': only application/pdf is accepted")]
    UnsupportedMediaType { content_type: String },

    /// The upload exceeds the configured byte limit.
    #[error("Upload of {size} bytes exceeds the {limit}-byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    /// The request could not be read (bad multipart framing, missing field).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The conversion engine failed to produce a structured document.
    #[error("PDF conversion failed: {detail}")]
    Conversion { detail: String },

    /// The conversion did not finish within the configured budget.
    #[error("PDF conversion timed out after {secs}s")]
    ConversionTimeout { secs: u64 },

    // ── Storage errors ────────────────────────────────────────────────────
    /// A filesystem operation failed while persisting a document.
    #[error("Storage I/O failed at '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A figure could not be encoded as PNG.
    #[error("Failed to encode figure '{figure}' as PNG: {source}")]
    Encode {
        figure: String,
        #[source]
        source: image::ImageError,
    },

    /// The metadata record could not be serialised or parsed.
    #[error("Invalid document metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReaderError {
    /// HTTP status code for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ReaderError::UnsupportedMediaType { .. } | ReaderError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ReaderError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ReaderError::Conversion { .. }
            | ReaderError::ConversionTimeout { .. }
            | ReaderError::Storage { .. }
            | ReaderError::Encode { .. }
            | ReaderError::Metadata(_)
            | ReaderError::InvalidConfig(_)
            | ReaderError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human-readable detail that is safe to return to a client.
    ///
    /// Storage and internal failures collapse to a fixed message: their
    /// `Display` output carries filesystem paths and OS error text, which
    /// stay in the server log.
    pub fn public_detail(&self) -> String {
        match self {
            ReaderError::UnsupportedMediaType { .. } => {
                "Only PDF files (application/pdf) are supported".to_string()
            }
            ReaderError::PayloadTooLarge { limit, .. } => format!(
                "File size exceeds the upload limit ({}MB)",
                limit / 1024 / 1024
            ),
            ReaderError::InvalidRequest(reason) => format!("Invalid request: {reason}"),
            ReaderError::Conversion { detail } => format!("PDF parsing failed: {detail}"),
            ReaderError::ConversionTimeout { secs } => {
                format!("PDF parsing failed: conversion did not finish within {secs}s")
            }
            ReaderError::Storage { .. } | ReaderError::Encode { .. } | ReaderError::Metadata(_) => {
                "Failed to store the parsed document".to_string()
            }
            ReaderError::InvalidConfig(_) | ReaderError::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }

    /// Shorthand for wrapping an I/O failure at `path`.
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReaderError::Storage {
            path: path.into(),
            source,
        }
    }
}

/// A failure raised inside a conversion engine.
///
/// Messages are single-line and free of filesystem paths so the converter can
/// forward them as the cause description of [`ReaderError::Conversion`].
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The backend library could not be loaded or initialised.
    #[error("conversion engine unavailable: {0}")]
    Unavailable(String),

    /// The input bytes are not a document the engine can parse.
    #[error("document '{name}' could not be parsed: {detail}")]
    InvalidDocument { name: String, detail: String },

    /// Content extraction failed on a specific page (1-indexed).
    #[error("extraction failed on page {page}: {detail}")]
    Extraction { page: usize, detail: String },

    /// The engine panicked or its worker task was aborted.
    #[error("conversion task aborted: {0}")]
    Panicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_too_large_reports_limit_in_megabytes() {
        let e = ReaderError::PayloadTooLarge {
            size: 50 * 1024 * 1024 + 1,
            limit: 50 * 1024 * 1024,
        };
        assert_eq!(e.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(e.public_detail().contains("50MB"), "got: {}", e.public_detail());
    }

    #[test]
    fn unsupported_media_type_is_bad_request() {
        let e = ReaderError::UnsupportedMediaType {
            content_type: "text/plain".into(),
        };
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
        assert!(e.to_string().contains("text/plain"));
    }

    #[test]
    fn storage_detail_hides_path() {
        let e = ReaderError::storage(
            "/srv/storage/academic/abc/content.md",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(e.to_string().contains("/srv/storage"));
        assert!(!e.public_detail().contains("/srv/storage"));
        assert!(!e.public_detail().contains("denied"));
    }

    #[test]
    fn conversion_detail_carries_cause() {
        let cause = EngineError::InvalidDocument {
            name: "input.pdf".into(),
            detail: "FormatError".into(),
        };
        let e = ReaderError::Conversion {
            detail: cause.to_string(),
        };
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(e.public_detail().contains("FormatError"));
    }

    #[test]
    fn timeout_display() {
        let e = ReaderError::ConversionTimeout { secs: 30 };
        assert!(e.to_string().contains("30s"));
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
