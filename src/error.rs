//! Request-path error taxonomy.
//! Every handler failure maps to one variant; the HTTP mapping logs full
//! diagnostic detail for the operator and returns only a short
//! human-readable message to the caller.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::vision::VisionError;

/// How much raw model text an error message may carry. Full text goes to
/// the log only.
const RAW_PREVIEW_LEN: usize = 200;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Empty or missing upload data.
    #[error("{0}")]
    InvalidInput(String),

    /// No cached board image for the requested device.
    #[error("{0}")]
    NotFound(String),

    /// Upload bytes did not decode as a raster image.
    #[error("could not decode {kind} image: {source}")]
    InvalidImage {
        kind: &'static str,
        #[source]
        source: image::ImageError,
    },

    /// The vision model call failed (after any quota fallback).
    #[error("vision model call failed: {0}")]
    Upstream(#[from] VisionError),

    /// Model text contained no recoverable JSON object.
    #[error("model response did not contain a JSON object (starts with: {preview:?})")]
    ResponseParse { preview: String, raw: String },
}

impl RelayError {
    pub fn response_parse(raw: String) -> Self {
        let preview: String = raw.chars().take(RAW_PREVIEW_LEN).collect();
        RelayError::ResponseParse { preview, raw }
    }

    fn status(&self) -> StatusCode {
        match self {
            RelayError::InvalidInput(_) | RelayError::InvalidImage { .. } => {
                StatusCode::BAD_REQUEST
            }
            RelayError::NotFound(_) => StatusCode::NOT_FOUND,
            RelayError::Upstream(_) | RelayError::ResponseParse { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            // The full raw model text is operator-only.
            RelayError::ResponseParse { raw, .. } => {
                tracing::error!(status = %status, raw_response = %raw, "request failed: {self}");
            }
            RelayError::Upstream(source) => {
                tracing::error!(status = %status, error = ?source, "request failed: {self}");
            }
            _ => {
                tracing::warn!(status = %status, "request failed: {self}");
            }
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
