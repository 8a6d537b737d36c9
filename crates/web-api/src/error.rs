use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::DomainError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        match &error {
            ApplicationError::Domain(DomainError::InvalidInput { field, reason }) => {
                ApiError::new(
                    StatusCode::BAD_REQUEST,
                    "INVALID_INPUT",
                    format!("{}: {}", field, reason),
                )
            }
            ApplicationError::Domain(DomainError::Forbidden { action }) => {
                ApiError::new(StatusCode::FORBIDDEN, "FORBIDDEN", action.clone())
            }
            ApplicationError::Domain(DomainError::NotFound { resource, id }) => ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{} {}", resource, id),
            ),
            ApplicationError::Domain(DomainError::InvalidState { reason }) => {
                ApiError::new(StatusCode::CONFLICT, "INVALID_STATE", reason.clone())
            }
            ApplicationError::Store(err) => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "STORE_UNAVAILABLE",
                err.to_string(),
            ),
            ApplicationError::Repository(err) => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "STORAGE_UNAVAILABLE",
                err.to_string(),
            ),
            ApplicationError::Dispatch(err) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "DISPATCH_FAILED",
                err.to_string(),
            ),
        }
    }
}

impl From<application::DispatchError> for ApiError {
    fn from(error: application::DispatchError) -> Self {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "DISPATCH_FAILED",
            error.to_string(),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
