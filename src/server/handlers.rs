//! HTTP request handlers.

use crate::error::ReaderError;
use crate::server::AppState;
use crate::service::{check_content_type, ParseResponse, UploadedFile};
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Multipart field carrying the PDF.
pub const FILE_FIELD: &str = "file";

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
    /// `cold` until the conversion engine has been constructed.
    pub engine: String,
}

/// JSON error body: `{"detail": "..."}`.
#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ReaderError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(ErrorBody {
                detail: self.public_detail(),
            }),
        )
            .into_response()
    }
}

/// Liveness and service info.
pub async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        message: "Academic Reader API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        engine: state.converter.readiness().as_str().to_string(),
    })
}

/// Parse an uploaded academic paper.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8000/api/academic/parse \
///   -F "file=@paper.pdf;type=application/pdf"
/// ```
pub async fn parse_academic(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ParseResponse>, ReaderError> {
    let mut multipart = multipart.map_err(|e| {
        warn!("Rejected non-multipart upload: {}", e.body_text());
        ReaderError::InvalidRequest(e.body_text())
    })?;

    let limit = state.service.max_upload_bytes();
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    let upload = read_upload(&mut multipart, limit, declared).await?;
    let response = state.service.handle_upload(upload).await?;
    Ok(Json(response))
}

/// Read the `file` field. The content type is checked before the field body
/// is buffered, so a non-PDF upload is rejected without reading it.
async fn read_upload(
    multipart: &mut Multipart,
    limit: usize,
    declared: Option<usize>,
) -> Result<UploadedFile, ReaderError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit, declared))?
    {
        if field.name() != Some(FILE_FIELD) {
            debug!("Skipping multipart field {:?}", field.name());
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        check_content_type(content_type.as_deref()).inspect_err(|e| {
            warn!("Rejected upload {:?}: {}", filename, e);
        })?;

        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, limit, declared))?;
        return Ok(UploadedFile {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    Err(ReaderError::InvalidRequest(format!(
        "missing multipart field '{FILE_FIELD}'"
    )))
}

fn multipart_error(e: MultipartError, limit: usize, declared: Option<usize>) -> ReaderError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        // The body was cut off at the limit; report the declared length when known.
        let size = declared.unwrap_or_else(|| limit.saturating_add(1));
        warn!("Rejected upload of {} bytes (limit {})", size, limit);
        ReaderError::PayloadTooLarge { size, limit }
    } else {
        ReaderError::InvalidRequest(e.body_text())
    }
}
