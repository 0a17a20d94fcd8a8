//! Classification of failed responses
//!
//! Error bodies look like `{"data": {"error": "...", "message": "...", "code": 25}}`.
//! The numeric service code decides the [`ApiErrorCode`]; the HTTP status is
//! only consulted for authentication failures and bare 404s.

use driftsync_core::ports::{ApiError, ApiErrorCode};
use reqwest::StatusCode;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    data: Option<ErrorData>,
}

#[derive(Debug, Deserialize)]
struct ErrorData {
    error: Option<String>,
    message: Option<String>,
    code: Option<i64>,
}

/// Maps a numeric service error code
fn code_from_service(code: i64) -> Option<ApiErrorCode> {
    match code {
        19 => Some(ApiErrorCode::AlreadyExists),
        // node itself or an ancestor is flagged readonly
        25 => Some(ApiErrorCode::NodeReadOnly),
        // delete, update and create inside a read-only share
        34 | 35 | 38 => Some(ApiErrorCode::ReadOnlyShare),
        54 => Some(ApiErrorCode::DestinationNotFound),
        93 => Some(ApiErrorCode::ShareCantBeChildOfShare),
        _ => None,
    }
}

/// Builds the [`ApiError`] for a non-2xx response
pub fn classify(status: StatusCode, body: &str) -> ApiError {
    if status == StatusCode::UNAUTHORIZED {
        return ApiError::new(ApiErrorCode::Unauthorized, "user is not authenticated");
    }

    let data = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.data);

    let mut message = format!("unknown API error with status code {}", status.as_u16());
    let mut service_code = None;

    if let Some(data) = data {
        if let Some(error) = data.error {
            message = error;
        }
        if let Some(detail) = data.message {
            message = format!("{message} ({detail})");
        }
        service_code = data.code;
    }

    let code = match service_code.and_then(code_from_service) {
        Some(code) => code,
        None if service_code.is_none() && status == StatusCode::NOT_FOUND => ApiErrorCode::NotFound,
        None => ApiErrorCode::Unknown,
    };

    ApiError::new(code, message)
}

/// Wraps a connection-level failure
pub fn transport(err: reqwest::Error) -> ApiError {
    ApiError::new(ApiErrorCode::Transport, err.to_string())
}

/// Wraps a response body that did not match the expected shape
pub fn invalid_response(err: impl std::fmt::Display) -> ApiError {
    ApiError::new(ApiErrorCode::Unknown, format!("invalid response: {err}"))
}
