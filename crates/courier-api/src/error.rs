//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps lifecycle, repository, and domain errors to HTTP status codes and a
//! JSON body carrying an error code, message, and optional details.
//! Internal error details are logged and never returned to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use courier_state::{PaymentError, RejectionKind, TransitionError};

use crate::lifecycle::LifecycleError;
use crate::repo::RepositoryError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "PAYMENT_REQUIRED").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Status change not allowed from the current status (400).
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Caller lacks the role or relationship the operation needs (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The shipment has no completed payment (402).
    #[error("payment required: {0}")]
    PaymentRequired(String),

    /// Conflict with current resource state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A required integration is not configured (503).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::InvalidTransition(_) => (StatusCode::BAD_REQUEST, "INVALID_TRANSITION"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::PaymentRequired(_) => (StatusCode::PAYMENT_REQUIRED, "PAYMENT_REQUIRED"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<courier_core::ValidationError> for AppError {
    fn from(err: courier_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        match err.kind() {
            RejectionKind::InvalidTransition => Self::InvalidTransition(err.to_string()),
            RejectionKind::Unauthorized => Self::Forbidden(err.to_string()),
            RejectionKind::PaymentRequired => Self::PaymentRequired(err.to_string()),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match &err {
            PaymentError::NotAccepted { .. } => Self::InvalidTransition(err.to_string()),
            PaymentError::Duplicate { .. } | PaymentError::InvalidStatusChange { .. } => {
                Self::Conflict(err.to_string())
            }
            PaymentError::InvalidInitialStatus(_) => Self::Validation(err.to_string()),
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => Self::NotFound(what),
            RepositoryError::Rejected(e) => e.into(),
            RepositoryError::Payment(e) => e.into(),
            RepositoryError::Validation(e) => e.into(),
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            RepositoryError::Database(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotFound(what) => Self::NotFound(what),
            LifecycleError::Forbidden(msg) => Self::Forbidden(msg),
            LifecycleError::Validation(e) => e.into(),
            LifecycleError::Rejected(e) => e.into(),
            LifecycleError::Payment(e) => e.into(),
            LifecycleError::Conflict(msg) => Self::Conflict(msg),
            LifecycleError::Storage(msg) => Self::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_state::{PaymentStatus, ShipmentStatus};

    #[test]
    fn status_codes() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (
                AppError::Validation("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
            ),
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            (
                AppError::InvalidTransition("x".into()),
                StatusCode::BAD_REQUEST,
                "INVALID_TRANSITION",
            ),
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN, "FORBIDDEN"),
            (
                AppError::PaymentRequired("x".into()),
                StatusCode::PAYMENT_REQUIRED,
                "PAYMENT_REQUIRED",
            ),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT, "CONFLICT"),
            (
                AppError::ServiceUnavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
            ),
            (
                AppError::Internal("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status_and_code(), (status, code), "{err:?}");
        }
    }

    #[test]
    fn transition_errors_map_by_kind() {
        let same = AppError::from(TransitionError::SameStatus {
            status: ShipmentStatus::Accepted,
        });
        assert!(matches!(same, AppError::InvalidTransition(_)));

        let final_state = AppError::from(TransitionError::FinalState {
            status: ShipmentStatus::Delivered,
        });
        assert!(matches!(final_state, AppError::InvalidTransition(_)));

        let unauthorized = AppError::from(TransitionError::Unauthorized("nope".into()));
        assert!(matches!(unauthorized, AppError::Forbidden(_)));

        let unpaid = AppError::from(TransitionError::PaymentRequired {
            to: ShipmentStatus::InTransit,
        });
        assert!(matches!(unpaid, AppError::PaymentRequired(_)));
    }

    #[test]
    fn payment_errors_map_to_client_statuses() {
        let dup = AppError::from(PaymentError::Duplicate {
            status: PaymentStatus::Completed,
        });
        assert!(matches!(dup, AppError::Conflict(_)));

        let early = AppError::from(PaymentError::NotAccepted {
            status: ShipmentStatus::Pending,
        });
        assert!(matches!(early, AppError::InvalidTransition(_)));

        let failed = AppError::from(PaymentError::InvalidInitialStatus(PaymentStatus::Failed));
        assert!(matches!(failed, AppError::Validation(_)));
    }

    #[test]
    fn repository_rejection_unwraps_to_domain_status() {
        let err = RepositoryError::Rejected(TransitionError::PaymentRequired {
            to: ShipmentStatus::Delivered,
        });
        let (status, _) = AppError::from(err).status_and_code();
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn validation_error_from_courier_core() {
        let core_err = courier_core::ValidationError::UnknownRole("pilot".to_string());
        match AppError::from(core_err) {
            AppError::Validation(msg) => assert!(msg.contains("pilot"), "got: {msg}"),
            other => panic!("expected Validation, got: {other:?}"),
        }
    }

    #[test]
    fn error_body_skips_empty_details() {
        let body = ErrorBody {
            error: ErrorDetail {
                code: "TEST".to_string(),
                message: "test message".to_string(),
                details: None,
            },
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("test message"));
        assert!(!json.contains("details"));
    }

    // ── into_response tests ──────────────────────────────────────

    use http_body_util::BodyExt;

    async fn response_parts(err: AppError) -> (StatusCode, ErrorBody) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        (status, body)
    }

    #[tokio::test]
    async fn into_response_payment_required() {
        let (status, body) =
            response_parts(AppError::PaymentRequired("pay first".into())).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body.error.code, "PAYMENT_REQUIRED");
        assert!(body.error.message.contains("pay first"));
    }

    #[tokio::test]
    async fn into_response_internal_hides_details() {
        let (status, body) =
            response_parts(AppError::Internal("db connection failed".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error.message, "An internal error occurred");
        assert!(body.error.details.is_none());
    }
}
