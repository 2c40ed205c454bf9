//! # Error Handling
//!
//! This module defines the error type returned by HTTP handlers and how it is
//! converted to an HTTP response.
//!
//! ## Key Rust Concepts for Error Handling:
//!
//! ### Enums for Error Types
//! - **Variants**: Each enum variant represents a different kind of failure
//! - **Pattern matching**: `match` maps each variant to a status code
//!
//! ### Traits for Error Conversion
//! - **From trait**: lets `?` turn library errors into an `AppError`
//! - **ResponseError trait**: actix calls this to render the error
//! - **Display trait**: how the error reads in logs
//!
//! ## Scope:
//! Only the HTTP boundary uses `AppError`. The feedback generator never fails;
//! its own failures are folded into fallback records before they get here.

use crate::audio::NormalizeError;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Errors an HTTP handler can return.
///
/// ## Error Categories:
/// - **Internal**: Server-side problems (500)
/// - **BadRequest**: Client sent invalid data (400)
/// - **ValidationError**: Well-formed input that failed a rule (400)
/// - **Upstream**: The language-model service failed (500)
/// - **AudioProcessing**: Normalization or transcription failed (500)
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(AppError::BadRequest("No audio file provided".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    Internal(String),
    BadRequest(String),
    ValidationError(String),
    Upstream(String),
    AudioProcessing(String),
}

impl AppError {
    /// The client-facing message without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            AppError::Internal(msg)
            | AppError::BadRequest(msg)
            | AppError::ValidationError(msg)
            | AppError::Upstream(msg)
            | AppError::AudioProcessing(msg) => msg,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "internal_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::ValidationError(_) => "validation_error",
            AppError::Upstream(_) => "upstream_error",
            AppError::AudioProcessing(_) => "audio_processing_error",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Upstream(msg) => write!(f, "Upstream error: {}", msg),
            AppError::AudioProcessing(msg) => write!(f, "Audio processing error: {}", msg),
        }
    }
}

/// Renders every error as JSON with a consistent structure:
///
/// ```json
/// {
///   "error": {
///     "type": "bad_request",
///     "message": "Invalid STT model: huge",
///     "timestamp": "2025-01-01T12:00:00Z"
///   },
///   "detail": "Invalid STT model: huge"
/// }
/// ```
///
/// `detail` carries the same message for clients that only read that field.
impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;

        match self {
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_)
            | AppError::Upstream(_)
            | AppError::AudioProcessing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": self.error_type(),
                "message": self.message(),
                "timestamp": chrono::Utc::now().to_rfc3339()
            },
            "detail": self.message()
        }))
    }
}

impl From<NormalizeError> for AppError {
    fn from(err: NormalizeError) -> Self {
        AppError::AudioProcessing(format!("Error processing audio: {}", err))
    }
}

pub type AppResult<T> = Result<T, AppError>;
