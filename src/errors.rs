use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{error::DbErr, SqlErr};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Not Found",
    "message": "Not found: Order 550e8400-e29b-41d4-a716-446655440000 not found",
    "request_id": "req-abc123xyz",
    "timestamp": "2026-01-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable message the admin UI shows verbatim
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Reward already issued for referral {0}")]
    RewardAlreadyIssued(Uuid),

    #[error("Referral {0} has not completed a purchase")]
    PurchaseNotCompleted(Uuid),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Payment gateway error: {0}")]
    GatewayError(String),

    #[error("Queue error: {0}")]
    QueueError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        ServiceError::ValidationError(rejection.body_text())
    }
}

impl ServiceError {
    /// Maps a write failure to `Conflict` when the store reports a unique-key
    /// violation, otherwise to `DatabaseError`.
    pub fn from_write(err: DbErr, conflict_message: impl Into<String>) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                ServiceError::Conflict(conflict_message.into())
            }
            _ => ServiceError::DatabaseError(err),
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::RewardAlreadyIssued(_)
            | Self::PurchaseNotCompleted(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::GatewayError(_) => StatusCode::BAD_GATEWAY,
            Self::DatabaseError(_)
            | Self::QueueError(_)
            | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::QueueError(_) | Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: None,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::body::to_bytes;
    use rstest::rstest;

    #[tokio::test]
    async fn error_response_carries_request_id() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("req-123"), async {
                ServiceError::NotFound("missing".into()).into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
        assert_eq!(payload.message, "Not found: missing");
    }

    #[rstest]
    #[case::validation(ServiceError::ValidationError("x".into()), StatusCode::BAD_REQUEST)]
    #[case::already_issued(ServiceError::RewardAlreadyIssued(Uuid::nil()), StatusCode::BAD_REQUEST)]
    #[case::no_purchase(ServiceError::PurchaseNotCompleted(Uuid::nil()), StatusCode::BAD_REQUEST)]
    #[case::unauthorized(ServiceError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED)]
    #[case::forbidden(ServiceError::Forbidden("x".into()), StatusCode::FORBIDDEN)]
    #[case::not_found(ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND)]
    #[case::conflict(ServiceError::Conflict("x".into()), StatusCode::CONFLICT)]
    #[case::rate_limited(ServiceError::RateLimitExceeded, StatusCode::TOO_MANY_REQUESTS)]
    #[case::gateway(ServiceError::GatewayError("x".into()), StatusCode::BAD_GATEWAY)]
    #[case::queue(ServiceError::QueueError("x".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn status_code_mapping(#[case] error: ServiceError, #[case] expected: StatusCode) {
        assert_eq!(error.status_code(), expected);
    }

    #[test]
    fn internal_details_are_hidden() {
        assert_eq!(
            ServiceError::QueueError("mailer queue closed".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("connection reset".into()))
                .response_message(),
            "Database error"
        );
        assert_eq!(
            ServiceError::ValidationError("Invalid status".into()).response_message(),
            "Validation error: Invalid status"
        );
    }

    #[test]
    fn non_unique_write_errors_stay_database_errors() {
        let err = ServiceError::from_write(DbErr::Custom("boom".into()), "duplicate");
        assert_matches!(err, ServiceError::DatabaseError(_));
    }
}
