//! Mapping from domain failures to JSON error responses.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use todo_core::validation::NOTHING_TO_UPDATE;
use todo_core::{ErrorBody, ValidationError};

use crate::repository::RepositoryError;

/// Status plus the `{error, message, statusCode, details}` envelope.
#[derive(Debug, Clone)]
pub struct ApiErrorResponse {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiErrorResponse {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: status.canonical_reason().unwrap_or("Error").to_string(),
                message: Some(message.into()),
                status_code: Some(status.as_u16()),
                details: None,
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal_error() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "An internal error occurred")
    }

    pub fn validation(error: ValidationError) -> Self {
        let mut response = Self::bad_request(error.to_string());
        response.body.details = serde_json::to_value(&error.errors).ok();
        response
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<ValidationError> for ApiErrorResponse {
    fn from(error: ValidationError) -> Self {
        Self::validation(error)
    }
}

impl From<RepositoryError> for ApiErrorResponse {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound(_) => Self::not_found("Todo not found"),
            RepositoryError::NothingToUpdate => {
                Self::validation(ValidationError::single("", NOTHING_TO_UPDATE))
            }
            RepositoryError::Conflict(message) => Self::conflict(message),
            RepositoryError::InvalidReference(message) => Self::bad_request(message),
            RepositoryError::Database(message) => {
                tracing::error!(%message, "database failure");
                Self::internal_error()
            }
        }
    }
}

impl From<JsonRejection> for ApiErrorResponse {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiErrorResponse {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn envelope_carries_reason_and_status() {
        let response = ApiErrorResponse::from(RepositoryError::NotFound(Uuid::nil()));
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        let json = serde_json::to_value(&response.body).unwrap();
        assert_eq!(json["error"], "Not Found");
        assert_eq!(json["message"], "Todo not found");
        assert_eq!(json["statusCode"], 404);
        assert!(json.get("details").is_none());
    }

    #[test]
    fn validation_lists_field_paths() {
        let error = ValidationError::new(vec![
            todo_core::FieldError::new("title", "is required"),
            todo_core::FieldError::new("priority", "must be one of low, medium, high"),
        ]);
        let response = ApiErrorResponse::from(error);
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        let details = response.body.details.unwrap();
        assert_eq!(details[0]["path"], "title");
        assert_eq!(details[1]["path"], "priority");
    }

    #[test]
    fn storage_errors_are_not_exposed() {
        let response = ApiErrorResponse::from(RepositoryError::Database("disk I/O error".to_string()));
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body.message.as_deref(), Some("An internal error occurred"));
    }

    #[test]
    fn conflict_and_reference_statuses() {
        assert_eq!(
            ApiErrorResponse::from(RepositoryError::Conflict("dup".into())).status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiErrorResponse::from(RepositoryError::InvalidReference("fk".into())).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiErrorResponse::from(RepositoryError::NothingToUpdate).status,
            StatusCode::BAD_REQUEST
        );
    }
}
