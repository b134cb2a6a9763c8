//! # Payments API
//!
//! ## Endpoints
//!
//! - `POST /v1/payments` — record a payment for an ACCEPTED shipment
//! - `GET /v1/payments` — payments on visible shipments, `?shipment_id=&status=`
//! - `GET /v1/payments/:id` — get payment
//! - `PATCH /v1/payments/:id/status` — administrative status change

use std::str::FromStr;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use courier_core::Timestamp;
use courier_state::{NewPayment, Payment, PaymentMethod, PaymentStatus, PaymentUpdate};

use super::{package_id, payment_id, shipment_id};
use crate::auth::Authenticated;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query, extract_validated_json, Validate};
use crate::state::AppState;

// ── Request/Response DTOs ───────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePaymentRequest {
    pub shipment_id: i64,
    pub package_id: i64,
    #[schema(value_type = String, example = "ONLINE")]
    pub payment_method: PaymentMethod,
    /// Defaults to `PENDING`.
    #[schema(value_type = Option<String>, example = "PENDING")]
    pub payment_status: Option<PaymentStatus>,
    /// RFC 3339.
    pub payment_date: Option<String>,
    pub gateway_order_id: Option<String>,
}

impl Validate for CreatePaymentRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(order) = &self.gateway_order_id {
            if order.trim().is_empty() {
                return Err("gateway_order_id must not be blank".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListPaymentsQuery {
    pub shipment_id: Option<i64>,
    /// `PENDING`, `COMPLETED` or `FAILED`.
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePaymentStatusRequest {
    #[schema(value_type = String, example = "COMPLETED")]
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentStatusChange {
    #[schema(value_type = Object)]
    pub payment: Payment,
    /// False when the payment already had the requested status.
    pub changed: bool,
}

// ── Router ──────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/payments", get(list_payments).post(create_payment))
        .route("/v1/payments/:id", get(get_payment))
        .route("/v1/payments/:id/status", patch(update_payment_status))
}

// ── Handlers ────────────────────────────────────────────────────────

/// POST /v1/payments — Record a payment.
#[utoipa::path(
    post,
    path = "/v1/payments",
    request_body = CreatePaymentRequest,
    responses(
        (status = 201, description = "Payment created", body = serde_json::Value),
        (status = 400, description = "Shipment is not ACCEPTED", body = crate::error::ErrorBody),
        (status = 403, description = "Caller may not pay for this shipment", body = crate::error::ErrorBody),
        (status = 409, description = "A pending or completed payment already exists", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "payments"
)]
pub async fn create_payment(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    body: Result<Json<CreatePaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    let req = extract_validated_json(body)?;
    let new = NewPayment {
        shipment_id: shipment_id(req.shipment_id)?,
        package_id: package_id(req.package_id)?,
        payment_method: req.payment_method,
        payment_status: req.payment_status.unwrap_or(PaymentStatus::Pending),
        payment_date: req.payment_date.as_deref().map(Timestamp::parse).transpose()?,
        gateway_order_id: req.gateway_order_id,
    };
    let payment = state.lifecycle.create_payment(&caller, new).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// GET /v1/payments — List payments.
#[utoipa::path(
    get,
    path = "/v1/payments",
    params(ListPaymentsQuery),
    responses(
        (status = 200, description = "Payments", body = serde_json::Value),
        (status = 422, description = "Unknown status filter", body = crate::error::ErrorBody),
    ),
    tag = "payments"
)]
pub async fn list_payments(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    query: Result<Query<ListPaymentsQuery>, QueryRejection>,
) -> Result<Json<Vec<Payment>>, AppError> {
    let query = extract_query(query)?;
    let shipment = query.shipment_id.map(shipment_id).transpose()?;
    let status = query
        .status
        .as_deref()
        .map(PaymentStatus::from_str)
        .transpose()?;
    Ok(Json(
        state
            .lifecycle
            .list_payments(&caller, shipment, status)
            .await?,
    ))
}

/// GET /v1/payments/:id — Get a payment.
#[utoipa::path(
    get,
    path = "/v1/payments/{id}",
    params(("id" = i64, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment found", body = serde_json::Value),
        (status = 404, description = "Payment not found", body = crate::error::ErrorBody),
    ),
    tag = "payments"
)]
pub async fn get_payment(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<Payment>, AppError> {
    let id = payment_id(id)?;
    Ok(Json(state.lifecycle.get_payment(&caller, id).await?))
}

/// PATCH /v1/payments/:id/status — Change a payment's status (super admin).
///
/// PENDING may become COMPLETED or FAILED, FAILED may become COMPLETED.
/// Setting the current status again is a no-op.
#[utoipa::path(
    patch,
    path = "/v1/payments/{id}/status",
    params(("id" = i64, Path, description = "Payment ID")),
    request_body = UpdatePaymentStatusRequest,
    responses(
        (status = 200, description = "Status applied", body = PaymentStatusChange),
        (status = 403, description = "Caller is not a super admin", body = crate::error::ErrorBody),
        (status = 404, description = "Payment not found", body = crate::error::ErrorBody),
        (status = 409, description = "Status change not allowed", body = crate::error::ErrorBody),
    ),
    tag = "payments"
)]
pub async fn update_payment_status(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<i64>,
    body: Result<Json<UpdatePaymentStatusRequest>, JsonRejection>,
) -> Result<Json<PaymentStatusChange>, AppError> {
    let id = payment_id(id)?;
    let req = extract_json(body)?;
    let (payment, update) = state
        .lifecycle
        .set_payment_status(&caller, id, req.payment_status)
        .await?;
    Ok(Json(PaymentStatusChange {
        payment,
        changed: update == PaymentUpdate::Applied,
    }))
}
