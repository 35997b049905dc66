//! Error taxonomy and the single translator from failures to HTTP responses.
//!
//! Every pipeline stage returns `Result<_, AppError>` and propagates with `?`.
//! Nothing else in the crate builds an error body: the `IntoResponse` impl below
//! decides what the client sees, and it is also the only place where an unexpected
//! failure is logged and replaced by the generic body.

use std::any::Any;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::repository::RepositoryError;

/// Result alias used by handlers and pipeline stages.
pub type ApiResult<T> = Result<T, AppError>;

/// Body message for any failure that is not a recognised domain error.
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong.";

/// Machine-readable error kind, serialized as `errorCode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthenticated,
    InvalidAccess,
    NotFound,
    MethodNotAllowed,
    Unexpected,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Unauthenticated => "Unauthenticated",
            ErrorKind::InvalidAccess => "InvalidAccessError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::MethodNotAllowed => "MethodNotAllowedError",
            ErrorKind::Unexpected => "error",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::InvalidAccess => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorKind::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// AppError
///
/// A failure raised somewhere in the request pipeline. Created at the point of
/// failure and consumed exactly once by the translator.
#[derive(Debug, Error)]
pub enum AppError {
    /// One or more request fields were missing or malformed. Carries every
    /// field message found, in declaration order.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("authentication required")]
    Unauthenticated,

    #[error("access denied")]
    InvalidAccess,

    #[error("resource not found")]
    NotFound,

    /// The path exists but does not accept the request method.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// Anything the pipeline did not anticipate (persistence outage, bug, panic).
    /// The source is logged, never sent to the client.
    #[error("unexpected failure: {0}")]
    Unexpected(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl AppError {
    pub fn validation(messages: Vec<String>) -> Self {
        AppError::Validation(messages)
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        AppError::Unexpected(message.into().into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Unauthenticated => ErrorKind::Unauthenticated,
            AppError::InvalidAccess => ErrorKind::InvalidAccess,
            AppError::NotFound => ErrorKind::NotFound,
            AppError::MethodNotAllowed => ErrorKind::MethodNotAllowed,
            AppError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.kind().status()
    }

    /// Client-facing messages. Unexpected failures only ever expose the generic one.
    pub fn messages(&self) -> Vec<String> {
        match self {
            AppError::Validation(messages) => messages.clone(),
            AppError::Unauthenticated => vec!["Authentication required.".to_string()],
            AppError::InvalidAccess => vec!["Not enough permission.".to_string()],
            AppError::NotFound => vec!["Not found.".to_string()],
            AppError::MethodNotAllowed => vec!["Method not allowed.".to_string()],
            AppError::Unexpected(_) => vec![GENERIC_ERROR_MESSAGE.to_string()],
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            // A unique column collided: the client can fix this by resending.
            RepositoryError::Conflict { field } => {
                AppError::Validation(vec![format!("body.{field} is already in use")])
            }
            other => AppError::Unexpected(Box::new(other)),
        }
    }
}

/// ErrorBody
///
/// The stable failure shape: `{ "error": [..], "errorCode": ".." }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ErrorBody {
    pub error: Vec<String>,
    pub error_code: String,
}

impl ErrorBody {
    fn from_error(err: &AppError) -> Self {
        Self {
            error: err.messages(),
            error_code: err.kind().code().to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Unexpected(source) => {
                // Operators get the real cause; the client gets the fixed body.
                tracing::error!(error = %source, details = ?source, "unexpected failure while handling request");
            }
            known => {
                tracing::debug!(error_code = known.kind().code(), "request rejected");
            }
        }

        (self.status(), Json(ErrorBody::from_error(&self))).into_response()
    }
}

/// Router fallback: unknown routes are reported like any missing resource.
pub async fn route_not_found() -> AppError {
    AppError::NotFound
}

/// Router fallback for a known path called with a method it does not serve.
pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

/// handle_panic
///
/// Used by `CatchPanicLayer`. A panicking handler is an unexpected failure like any
/// other, so it goes through the same translator.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else {
        "non-string panic payload".to_string()
    };

    AppError::unexpected(format!("handler panicked: {detail}")).into_response()
}
