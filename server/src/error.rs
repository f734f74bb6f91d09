// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use axum::{
    extract::Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Domain failures raised by the database layer.
///
/// They travel inside `anyhow::Error` and are turned back into a precise
/// status code by [`AppError`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// A quota or the daily allocation cap would be exceeded.
    #[error("{0}")]
    Rejected(String),
}

/// Our custom error type for the application.
#[derive(Debug)]
pub struct AppError {
    pub(crate) code: StatusCode,
    pub(crate) message: String,
}

impl AppError {
    pub fn new(code: StatusCode, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

/// Maps errors coming from `database.rs`. Domain failures keep their message,
/// anything else becomes an opaque 500.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(ledger) = err.downcast_ref::<LedgerError>() {
            let code = match ledger {
                LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
                LedgerError::Conflict(_) => StatusCode::CONFLICT,
                LedgerError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            };
            return Self::new(code, &ledger.to_string());
        }

        tracing::error!("Internal server error: {:?}", err);
        Self {
            code: StatusCode::INTERNAL_SERVER_ERROR,
            message: "An internal error occurred.".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(
            "Responding with error: status_code={}, message={}",
            self.code.as_u16(),
            self.message
        );
        (
            self.code,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}
