//! Ingestion service: validation, conversion, storage, and response assembly
//! for one upload.
//!
//! Validation runs before any engine or storage work. Engine and storage
//! failures are logged here in full and leave as a [`ReaderError`] whose
//! [`ReaderError::public_detail`] is safe to return to the client.

use crate::converter::Converter;
use crate::error::ReaderError;
use crate::store::DocumentStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// The only media type accepted for uploads.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// One uploaded file as received from the transport.
#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    /// Client-supplied file name, if any.
    pub filename: Option<String>,
    /// Declared content type, if any.
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// One figure in the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FigureRef {
    pub id: String,
    pub label: String,
    pub url: String,
}

/// Success response for an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseResponse {
    pub filename: String,
    /// Character count (not bytes) of `content`.
    pub text_length: usize,
    pub content: String,
    /// Figures in stored order.
    pub images: Vec<FigureRef>,
}

/// Whether a declared content type names PDF.
///
/// Compares the media-type essence case-insensitively, so parameters such
/// as `; name=paper.pdf` are tolerated.
pub fn is_pdf_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|essence| essence.eq_ignore_ascii_case(PDF_MEDIA_TYPE))
}

/// Reject a declared content type that is not PDF.
pub fn check_content_type(content_type: Option<&str>) -> Result<(), ReaderError> {
    match content_type {
        Some(ct) if is_pdf_content_type(ct) => Ok(()),
        other => Err(ReaderError::UnsupportedMediaType {
            content_type: other.unwrap_or_default().to_string(),
        }),
    }
}

/// Reject a body larger than `limit` bytes.
pub fn check_size(size: usize, limit: usize) -> Result<(), ReaderError> {
    if size > limit {
        return Err(ReaderError::PayloadTooLarge { size, limit });
    }
    Ok(())
}

/// The ingestion service.
#[derive(Debug, Clone)]
pub struct IngestionService {
    converter: Arc<Converter>,
    store: Arc<DocumentStore>,
    max_upload_bytes: usize,
}

impl IngestionService {
    pub fn new(converter: Arc<Converter>, store: Arc<DocumentStore>, max_upload_bytes: usize) -> Self {
        Self {
            converter,
            store,
            max_upload_bytes,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// Handle one upload end to end.
    pub async fn handle_upload(&self, file: UploadedFile) -> Result<ParseResponse, ReaderError> {
        let filename = file.filename.unwrap_or_default();

        if let Err(e) = check_content_type(file.content_type.as_deref())
            .and_then(|()| check_size(file.bytes.len(), self.max_upload_bytes))
        {
            warn!("Rejected upload '{}': {}", filename, e);
            return Err(e);
        }

        let start = Instant::now();
        info!("Parsing '{}' ({} bytes)", filename, file.bytes.len());

        // Conversion failures are logged in full by the converter.
        let parsed = self.converter.convert(file.bytes).await?;

        let store = Arc::clone(&self.store);
        let markdown = parsed.markdown;
        let (markdown, meta) = tokio::task::spawn_blocking(move || {
            let meta = store.save(&markdown, &parsed.images);
            (markdown, meta)
        })
        .await
        .map_err(|e| {
            error!("Storage task for '{}' panicked: {}", filename, e);
            ReaderError::Internal(format!("storage task failed: {e}"))
        })?;
        let meta = meta.map_err(|e| {
            error!("Failed to store '{}': {:?}", filename, e);
            e
        })?;

        let images = meta
            .images
            .iter()
            .map(|fig| FigureRef {
                id: fig.id.clone(),
                label: fig.label.clone(),
                url: self.store.build_figure_url(meta.id.as_str(), &fig.filename),
            })
            .collect::<Vec<_>>();

        info!(
            "Parsed '{}' as document {} in {}ms ({} figures)",
            filename,
            meta.id,
            start.elapsed().as_millis(),
            images.len()
        );

        Ok(ParseResponse {
            filename,
            text_length: markdown.chars().count(),
            content: markdown,
            images,
        })
    }
}
