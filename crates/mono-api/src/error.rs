//! Translation of service failures into error envelopes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mono_db::{DbError, ValidationError};
use tracing::{error, warn};

use crate::{
    envelope::{Envelope, ErrorCode, ErrorDetail},
    middleware::RequestId,
};

pub type ApiResult<T> = Result<T, ApiError>;

const INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: ErrorCode,
    message: String,
    details: Vec<ErrorDetail>,
    request_id: Option<RequestId>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: Vec::new(),
            request_id: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorCode::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorCode::NotFound, message)
    }

    pub fn validation(err: ValidationError) -> Self {
        let details = err.violations.into_iter().map(ErrorDetail::from).collect();
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::ValidationError,
            err.message,
        )
        .with_details(details)
    }

    /// Logs `err` and hides it behind a generic message.
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        error!(error = %err, "internal error");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalError,
            INTERNAL_MESSAGE,
        )
    }

    pub fn with_details(mut self, details: Vec<ErrorDetail>) -> Self {
        self.details = details;
        self
    }

    pub fn with_request_id(mut self, request_id: &RequestId) -> Self {
        self.request_id = Some(request_id.clone());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::validation(err)
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { .. } => Self::not_found(err.to_string()),
            DbError::Conflict {
                field, ref value, ..
            } => {
                let message = err.to_string();
                let detail =
                    ErrorDetail::new(ErrorCode::Conflict, Some(field.to_string()), &message)
                        .with_value(value.clone());
                Self::new(StatusCode::CONFLICT, ErrorCode::Conflict, message)
                    .with_details(vec![detail])
            }
            DbError::Validation(inner) => Self::validation(inner),
            DbError::PoolTimeout { .. } | DbError::Sqlx(_) | DbError::Decode { .. } => {
                Self::internal(err)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = self.request_id.unwrap_or_else(RequestId::generate);
        if self.status.is_server_error() {
            error!(request_id = %request_id, status = %self.status, "request failed");
        } else {
            warn!(
                request_id = %request_id,
                status = %self.status,
                message = %self.message,
                "request rejected"
            );
        }
        let body = Envelope::error(self.code, self.message, &request_id, self.details);
        (self.status, Json(body)).into_response()
    }
}

/// Attaches the current request id to any error convertible into
/// [`ApiError`].
pub trait ForRequest<T> {
    fn for_request(self, request_id: &RequestId) -> ApiResult<T>;
}

impl<T, E> ForRequest<T> for Result<T, E>
where
    E: Into<ApiError>,
{
    fn for_request(self, request_id: &RequestId) -> ApiResult<T> {
        self.map_err(|err| err.into().with_request_id(request_id))
    }
}
