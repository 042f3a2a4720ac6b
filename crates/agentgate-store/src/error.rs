// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Error kinds shared by every gateway subsystem.
///
/// The HTTP edge maps each kind to a status code and the JSON shape
/// `{error, message}`; tool replies wrap the same kinds with an `isError`
/// marker.  Upstream failures never surface here — they stay inside a queue
/// entry's aligned `results` array.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    IllegalState(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("messaging is disabled")]
    MessagingDisabled,

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GateError>;

impl GateError {
    /// Short machine-readable kind used in the wire error shape.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not-found",
            Self::BadRequest(_) => "bad-request",
            Self::IllegalState(_) => "illegal-state",
            Self::ServiceUnavailable(_) => "service-unavailable",
            Self::MessagingDisabled => "messaging-disabled",
            Self::Db(_) | Self::Serde(_) | Self::Internal(_) => "internal",
        }
    }
}
