// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use agentgate_store::GateError;

/// Wrapper making [`GateError`] an axum response with the wire shape
/// `{error: <kind>, message: <human text>}`.
pub struct ApiError(pub GateError);

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        Self(err)
    }
}

pub fn status_for(err: &GateError) -> StatusCode {
    match err {
        GateError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        GateError::Forbidden(_) | GateError::MessagingDisabled => StatusCode::FORBIDDEN,
        GateError::NotFound(_) => StatusCode::NOT_FOUND,
        GateError::BadRequest(_) => StatusCode::BAD_REQUEST,
        GateError::IllegalState(_) => StatusCode::CONFLICT,
        GateError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        GateError::Db(_) | GateError::Serde(_) | GateError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "internal error");
        }
        let body = json!({
            "error": self.0.kind(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

// ─── Unit tests ──────────────────────────────────────────────────────────────
