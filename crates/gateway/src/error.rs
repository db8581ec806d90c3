//! JSON error responses: `{ "error": msg, "details"?: [..] }`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tpforge_core::error::{StoreError, ValidationError};
use tpforge_pipeline::ServiceError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: error.into(),
                details: None,
            },
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, what)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.body.error, "Request failed");
        }
        (self.status, Json(self.body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse {
                error: "Validation error".into(),
                details: Some(e.details()),
            },
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => Self::not_found(e.to_string()),
            StoreError::Conflict { .. } => Self::new(StatusCode::CONFLICT, e.to_string()),
            other => Self::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::NotFound { .. } => Self::not_found(e.to_string()),
            ServiceError::Forbidden(msg) => Self::new(StatusCode::FORBIDDEN, msg),
            ServiceError::Conflict(msg) => Self::new(StatusCode::CONFLICT, msg),
            ServiceError::Validation(v) => v.into(),
            ServiceError::Store(s) => s.into(),
            ServiceError::Run(r) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, r.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_statuses() {
        let cases = [
            (ServiceError::NotFound { entity: "Policy", id: 4 }, StatusCode::NOT_FOUND),
            (ServiceError::Forbidden("locked".into()), StatusCode::FORBIDDEN),
            (ServiceError::Conflict("busy".into()), StatusCode::CONFLICT),
            (ServiceError::Validation(ValidationError::new()), StatusCode::BAD_REQUEST),
            (
                ServiceError::Store(StoreError::Storage("disk".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ServiceError::from(StoreError::Conflict { entity: "Policy", id: 4 }),
                StatusCode::CONFLICT,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn validation_details_are_listed() {
        let mut v = ValidationError::new();
        v.push("name", "must not be empty");
        v.push("tax_id", "must not be empty");
        let err = ApiError::from(v);
        assert_eq!(err.body.error, "Validation error");
        assert_eq!(
            err.body.details,
            Some(vec!["name: must not be empty".into(), "tax_id: must not be empty".into()])
        );
    }
}
