// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The server's error taxonomy and its mapping onto HTTP.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use foreman_storage::{BlobError, StoreError};
use foreman_wire::Envelope;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad input: missing field, invalid name, bad enum.
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    AuthMissing(String),
    #[error("{0}")]
    AuthInvalid(String),
    /// Authenticated but not allowed.
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    /// Duplicate run, incomplete build on promote, and friends.
    #[error("{0}")]
    Conflict(String),
    /// Blob backend still down after the bounded retry.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    /// Anything else; detail is logged, never sent to the caller.
    #[error("{message}")]
    Unexpected {
        message: String,
        detail: String,
        /// Points the caller at a diagnostic artifact (the synthetic
        /// build-failure run's console log).
        location: Option<String>,
    },
}

impl ApiError {
    pub fn unexpected(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Unexpected { message: message.into(), detail: detail.into(), location: None }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Conflict(_) => StatusCode::BAD_REQUEST,
            Self::AuthMissing(_) | Self::AuthInvalid(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::StorageUnavailable(_) | Self::Unexpected { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(kind, key) => Self::NotFound(format!("{kind} not found: {key}")),
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::Wal(err) => {
                Self::unexpected("An unexpected error occurred", err.to_string())
            }
        }
    }
}

impl From<BlobError> for ApiError {
    fn from(e: BlobError) -> Self {
        match e {
            BlobError::NotFound(key) => Self::NotFound(format!("Not found: {key}")),
            BlobError::Unavailable(err) => Self::StorageUnavailable(err.to_string()),
            BlobError::Io(err) => Self::unexpected("An unexpected error occurred", err.to_string()),
        }
    }
}

impl From<foreman_projdef::DefinitionError> for ApiError {
    fn from(e: foreman_projdef::DefinitionError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // The detail (traceback equivalent) is logged, never sent to the
        // caller.
        let body: Envelope<()> = match &self {
            ApiError::Unexpected { message, detail, .. } => {
                tracing::error!(%detail, "unexpected error");
                Envelope::error(message.clone())
            }
            other => Envelope::error(other.to_string()),
        };
        let mut resp = (status, Json(body)).into_response();
        if let ApiError::Unexpected { location: Some(loc), .. } = &self {
            if let Ok(value) = header::HeaderValue::from_str(loc) {
                resp.headers_mut().insert(header::LOCATION, value);
            }
        }
        resp
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
