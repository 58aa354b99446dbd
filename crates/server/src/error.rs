use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

use helpdesk_core::errors::{ApplicationError, InterfaceError};
use helpdesk_db::repositories::RepositoryError;

pub type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

/// An interface-layer failure rendered as `{error, correlation_id}` with the matching status.
#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    pub fn new(error: impl Into<ApplicationError>, correlation_id: &str) -> Self {
        let interface = error.into().into_interface(correlation_id);
        match &interface {
            InterfaceError::ServiceUnavailable { message, .. }
            | InterfaceError::Internal { message, .. } => error!(
                event_name = "api.request.failed",
                correlation_id = %correlation_id,
                error = %message,
                "request failed"
            ),
            other => warn!(
                event_name = "api.request.rejected",
                correlation_id = %correlation_id,
                error = %other,
                "request rejected"
            ),
        }
        Self(interface)
    }

    pub fn status(&self) -> StatusCode {
        match self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.0.public_message(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Storage failures keep their meaning: conflicts stay conflicts, missing rows stay missing.
pub fn storage(error: RepositoryError) -> ApplicationError {
    match error {
        RepositoryError::Conflict(message) => ApplicationError::Conflict(message),
        RepositoryError::NotFound(what) => ApplicationError::NotFound(what),
        other => ApplicationError::Persistence(other.to_string()),
    }
}

pub fn bad_request(message: impl Into<String>) -> ApplicationError {
    ApplicationError::Domain(helpdesk_core::errors::DomainError::InvariantViolation(message.into()))
}

pub fn new_correlation_id() -> String {
    format!("req-{}", Uuid::new_v4())
}
