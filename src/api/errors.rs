//! API Error Handling
//!
//! Engine errors become structured JSON responses carrying the request id.

use crate::errors::{BingoError, ErrorKind};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable code (NOT_FOUND, CONFLICT, INSUFFICIENT_FUNDS, ...)
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub request_id: String,
}

impl ApiError {
    pub fn new(request_id: String, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            request_id,
        }
    }

    pub fn from_bingo(request_id: String, error: BingoError) -> Self {
        let kind = error.kind();
        if kind == ErrorKind::Internal {
            tracing::error!(request_id = %request_id, error = %error, "Request failed");
        }
        Self::new(request_id, kind, error.to_string())
    }

    pub fn bad_request(request_id: String, message: impl Into<String>) -> Self {
        Self::new(request_id, ErrorKind::Validation, message)
    }

    pub fn internal_error(request_id: String, message: impl Into<String>) -> Self {
        Self::new(request_id, ErrorKind::Internal, message)
    }

    pub fn status(&self) -> StatusCode {
        status_for(self.kind)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::ResourceExhausted => StatusCode::CONFLICT,
        ErrorKind::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
        ErrorKind::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.request_id, self.kind.code(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorResponse {
            request_id: self.request_id,
            error: ErrorBody {
                code: self.kind.code().to_string(),
                message: self.message,
                details: None,
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{LedgerError, RoomError, SessionError};

    #[test]
    fn test_kinds_map_to_statuses() {
        let cases = [
            (BingoError::from(RoomError::RoomNotFound("x".into())), StatusCode::NOT_FOUND),
            (
                BingoError::from(LedgerError::InsufficientFunds {
                    user_id: 1,
                    balance: 10,
                    required: 100,
                }),
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                BingoError::from(SessionError::GameNotOngoing {
                    game_id: "g".into(),
                    status: crate::games::types::GameStatus::Completed,
                }),
                StatusCode::PRECONDITION_FAILED,
            ),
            (BingoError::from(RoomError::FormationInProgress("x".into())), StatusCode::CONFLICT),
            (BingoError::from(LedgerError::InvalidAmount(0)), StatusCode::BAD_REQUEST),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from_bingo("req".into(), error).status(), status);
        }
    }

    #[test]
    fn test_display_includes_request_id() {
        let error = ApiError::bad_request("req-1".into(), "bad palette");
        assert_eq!(error.to_string(), "[req-1] VALIDATION: bad palette");
    }
}
