//! # Payment Gateway API
//!
//! ## Endpoints
//!
//! - `POST /v1/gateway/orders` — open a checkout: a PENDING online payment
//!   bound to a fresh gateway order id
//! - `POST /v1/gateway/verify` — checkout confirmation from the client;
//!   a valid signature marks the matching payment COMPLETED
//! - `POST /v1/gateway/webhook` — server-to-server events; mounted outside
//!   bearer auth and authenticated by body signature when configured

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use courier_state::{
    GatewayEvent, NewPayment, Payment, PaymentMethod, PaymentStatus, PaymentUpdate,
};

use super::payments::PaymentStatusChange;
use super::{package_id, shipment_id};
use crate::auth::Authenticated;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, Validate};
use crate::gateway::{self, SIGNATURE_HEADER};
use crate::state::AppState;

// ── Request/Response DTOs ───────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub shipment_id: i64,
    pub package_id: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateOrderResponse {
    /// Pass to the gateway checkout; it comes back on verify and webhooks.
    pub order_id: String,
    #[schema(value_type = Object)]
    pub payment: Payment,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyPaymentRequest {
    pub order_id: String,
    pub payment_id: String,
    /// Lowercase hex HMAC-SHA256 of `"{order_id}|{payment_id}"`.
    pub signature: String,
}

impl Validate for VerifyPaymentRequest {
    fn validate(&self) -> Result<(), String> {
        if self.order_id.trim().is_empty() || self.payment_id.trim().is_empty() {
            return Err("order_id and payment_id must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub status: String,
}

// ── Router ──────────────────────────────────────────────────────────

/// Authenticated gateway routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/gateway/orders", post(create_order))
        .route("/v1/gateway/verify", post(verify_payment))
}

/// Webhook route. Callers must not wrap this in bearer auth.
pub fn webhook_router() -> Router<AppState> {
    Router::new().route("/v1/gateway/webhook", post(receive_webhook))
}

// ── Handlers ────────────────────────────────────────────────────────

/// POST /v1/gateway/orders — Open a gateway checkout.
///
/// Records a PENDING online payment carrying a new order id, under the same
/// rules as `POST /v1/payments`.
#[utoipa::path(
    post,
    path = "/v1/gateway/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = CreateOrderResponse),
        (status = 400, description = "Shipment is not ACCEPTED", body = crate::error::ErrorBody),
        (status = 403, description = "Caller may not pay for this shipment", body = crate::error::ErrorBody),
        (status = 409, description = "A pending or completed payment already exists", body = crate::error::ErrorBody),
    ),
    tag = "gateway"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), AppError> {
    let req = extract_json(body)?;
    let order_id = gateway::new_order_id();
    let new = NewPayment {
        shipment_id: shipment_id(req.shipment_id)?,
        package_id: package_id(req.package_id)?,
        payment_method: PaymentMethod::Online,
        payment_status: PaymentStatus::Pending,
        payment_date: None,
        gateway_order_id: Some(order_id.clone()),
    };
    let payment = state.lifecycle.create_payment(&caller, new).await?;
    tracing::info!(order_id = %order_id, payment_id = %payment.id, "gateway order created");
    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse { order_id, payment }),
    ))
}

/// POST /v1/gateway/verify — Verify a checkout signature.
#[utoipa::path(
    post,
    path = "/v1/gateway/verify",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Payment completed", body = PaymentStatusChange),
        (status = 400, description = "Signature mismatch", body = crate::error::ErrorBody),
        (status = 404, description = "No payment for this order", body = crate::error::ErrorBody),
        (status = 409, description = "Shipment already paid by another payment", body = crate::error::ErrorBody),
        (status = 503, description = "Gateway key secret not configured", body = crate::error::ErrorBody),
    ),
    tag = "gateway"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    body: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> Result<Json<PaymentStatusChange>, AppError> {
    let req = extract_validated_json(body)?;
    let secret = state.config.gateway.key_secret.as_deref().ok_or_else(|| {
        AppError::ServiceUnavailable("payment verification is not configured".into())
    })?;
    if !gateway::verify_checkout_signature(secret, &req.order_id, &req.payment_id, &req.signature)
    {
        tracing::warn!(
            order_id = %req.order_id,
            user_id = ?caller.user_id,
            "checkout signature mismatch"
        );
        return Err(AppError::BadRequest("invalid payment signature".into()));
    }

    let event = GatewayEvent::Captured {
        order_id: Some(req.order_id.clone()),
        payment_id: req.payment_id,
    };
    let (payment, update) = state
        .lifecycle
        .apply_gateway_event(&event)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("payment for order {}", req.order_id)))?;
    if update == PaymentUpdate::Superseded {
        return Err(AppError::Conflict(format!(
            "shipment {} is already paid by another payment",
            payment.shipment_id
        )));
    }
    Ok(Json(PaymentStatusChange {
        payment,
        changed: update == PaymentUpdate::Applied,
    }))
}

/// POST /v1/gateway/webhook — Receive a gateway event.
///
/// Unknown, malformed, unmatched, and superseded events are acknowledged so
/// the gateway stops redelivering them.
#[utoipa::path(
    post,
    path = "/v1/gateway/webhook",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 401, description = "Missing or invalid body signature", body = crate::error::ErrorBody),
    ),
    tag = "gateway"
)]
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    if let Some(secret) = state.config.gateway.webhook_secret.as_deref() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing webhook signature".into()))?;
        if !gateway::verify_webhook_signature(secret, &body, signature) {
            tracing::warn!("gateway webhook signature mismatch");
            return Err(AppError::Unauthorized("invalid webhook signature".into()));
        }
    }

    if let Some(event) = gateway::parse_webhook(&body) {
        state.lifecycle.apply_gateway_event(&event).await?;
    }
    Ok(Json(WebhookAck {
        status: "ok".to_string(),
    }))
}
