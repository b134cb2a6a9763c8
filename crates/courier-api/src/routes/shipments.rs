//! # Shipments API
//!
//! Shipment records plus everything that reads or writes the status ledger.
//!
//! ## Endpoints
//!
//! - `POST /v1/shipments` — create a shipment and its initial PENDING event
//! - `GET /v1/shipments` — role-scoped listing, optional `?status=`
//! - `GET /v1/shipments/:id` — detail with timeline and payment status
//! - `PATCH /v1/shipments/:id` — sender edit of the supplied fields
//! - `PUT /v1/shipments/:id` — sender replacement of every editable field
//! - `GET /v1/shipments/:id/status` — latest ledger event
//! - `GET /v1/shipments/:id/history` — live events, newest first
//! - `GET /v1/shipments/:id/timeline` — events in pipeline order
//! - `GET /v1/shipments/:id/payment-status` — whether payment is complete
//! - `POST /v1/shipments/:id/actions/:action` — guarded status change
//! - `POST /v1/shipments/:id/cancel` — sender cancellation
//! - `PUT /v1/shipments/:id/estimated-delivery` — ETA while in transit
//! - `PATCH /v1/shipments/:id/status-events/latest` — location / delivered flag

use std::str::FromStr;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use courier_core::{Timestamp, UserId};
use courier_state::{
    EventAnnotation, NewShipment, Shipment, ShipmentDetails, ShipmentEdit, ShipmentPatch,
    ShipmentStatus, ShipmentType, StatusEvent, TimelineEntry, TransitionAction,
};

use super::{caller_user, package_id, shipment_id};
use crate::auth::Authenticated;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query};
use crate::lifecycle::{ShipmentDetail, ShipmentSummary};
use crate::state::AppState;

// ── Request/Response DTOs ───────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateShipmentRequest {
    pub sender_name: String,
    pub sender_phone: String,
    pub sender_email: Option<String>,
    pub pickup_address: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub recipient_email: Option<String>,
    pub delivery_address: Option<String>,
    /// User id of the assigned supplier.
    pub courier_id: i64,
    pub package_id: i64,
    #[serde(default)]
    #[schema(value_type = String, example = "standard")]
    pub shipment_type: ShipmentType,
    /// RFC 3339.
    pub pickup_date: Option<String>,
    pub special_instructions: Option<String>,
    #[serde(default)]
    pub insurance_required: bool,
    #[serde(default)]
    pub signature_required: bool,
}

/// Fields to change; omitted fields keep their stored value. Sender,
/// supplier, and package cannot be changed.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateShipmentRequest {
    pub sender_name: Option<String>,
    pub sender_phone: Option<String>,
    pub sender_email: Option<String>,
    pub pickup_address: Option<String>,
    pub recipient_name: Option<String>,
    pub recipient_phone: Option<String>,
    pub recipient_email: Option<String>,
    pub delivery_address: Option<String>,
    #[schema(value_type = Option<String>, example = "express")]
    pub shipment_type: Option<ShipmentType>,
    /// RFC 3339.
    pub pickup_date: Option<String>,
    pub special_instructions: Option<String>,
    pub insurance_required: Option<bool>,
    pub signature_required: Option<bool>,
}

/// Every editable field. Omitted optional fields are cleared.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplaceShipmentRequest {
    pub sender_name: String,
    pub sender_phone: String,
    pub sender_email: Option<String>,
    pub pickup_address: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub recipient_email: Option<String>,
    pub delivery_address: Option<String>,
    #[serde(default)]
    #[schema(value_type = String, example = "standard")]
    pub shipment_type: ShipmentType,
    /// RFC 3339.
    pub pickup_date: Option<String>,
    pub special_instructions: Option<String>,
    #[serde(default)]
    pub insurance_required: bool,
    #[serde(default)]
    pub signature_required: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateShipmentResponse {
    #[schema(value_type = Object)]
    pub shipment: Shipment,
    #[schema(value_type = Object)]
    pub status_event: StatusEvent,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListShipmentsQuery {
    /// Only shipments whose current status matches, e.g. `IN_TRANSIT`.
    pub status: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentStatusResponse {
    pub shipment_id: i64,
    pub is_payment_complete: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EstimatedDeliveryRequest {
    /// RFC 3339.
    pub estimated_delivery: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AnnotateEventRequest {
    pub current_location: Option<String>,
    pub is_delivered: Option<bool>,
}

// ── Router ──────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/shipments", get(list_shipments).post(create_shipment))
        .route(
            "/v1/shipments/:id",
            get(get_shipment)
                .patch(update_shipment)
                .put(replace_shipment),
        )
        .route("/v1/shipments/:id/status", get(get_current_status))
        .route("/v1/shipments/:id/history", get(get_history))
        .route("/v1/shipments/:id/timeline", get(get_timeline))
        .route("/v1/shipments/:id/payment-status", get(get_payment_status))
        .route("/v1/shipments/:id/actions/:action", post(apply_action))
        .route("/v1/shipments/:id/cancel", post(cancel_shipment))
        .route(
            "/v1/shipments/:id/estimated-delivery",
            put(update_estimated_delivery),
        )
        .route(
            "/v1/shipments/:id/status-events/latest",
            patch(annotate_latest_event),
        )
}

// ── Handlers ────────────────────────────────────────────────────────

/// POST /v1/shipments — Create a shipment.
///
/// The caller becomes the sender. The shipment and its PENDING event are
/// written together.
#[utoipa::path(
    post,
    path = "/v1/shipments",
    request_body = CreateShipmentRequest,
    responses(
        (status = 201, description = "Shipment created", body = CreateShipmentResponse),
        (status = 403, description = "Caller is not an importer/exporter", body = crate::error::ErrorBody),
        (status = 404, description = "Package not found", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "shipments"
)]
pub async fn create_shipment(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    body: Result<Json<CreateShipmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateShipmentResponse>), AppError> {
    let req = extract_json(body)?;
    let pickup_date = req.pickup_date.as_deref().map(Timestamp::parse).transpose()?;
    let new = NewShipment {
        sender_id: caller_user(&caller)?,
        sender_name: req.sender_name,
        sender_phone: req.sender_phone,
        sender_email: req.sender_email,
        pickup_address: req.pickup_address,
        recipient_name: req.recipient_name,
        recipient_phone: req.recipient_phone,
        recipient_email: req.recipient_email,
        delivery_address: req.delivery_address,
        courier_id: UserId::new(req.courier_id)?,
        shipment_type: req.shipment_type,
        package_id: package_id(req.package_id)?,
        pickup_date,
        special_instructions: req.special_instructions,
        insurance_required: req.insurance_required,
        signature_required: req.signature_required,
    };
    let (shipment, status_event) = state.lifecycle.create_shipment(&caller, new).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateShipmentResponse {
            shipment,
            status_event,
        }),
    ))
}

/// GET /v1/shipments — List shipments visible to the caller, newest first.
#[utoipa::path(
    get,
    path = "/v1/shipments",
    params(ListShipmentsQuery),
    responses(
        (status = 200, description = "Shipments", body = Vec<ShipmentSummary>),
        (status = 422, description = "Unknown status filter", body = crate::error::ErrorBody),
    ),
    tag = "shipments"
)]
pub async fn list_shipments(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    query: Result<Query<ListShipmentsQuery>, QueryRejection>,
) -> Result<Json<Vec<ShipmentSummary>>, AppError> {
    let query = extract_query(query)?;
    let status = query
        .status
        .as_deref()
        .map(ShipmentStatus::from_str)
        .transpose()?;
    Ok(Json(state.lifecycle.list_shipments(&caller, status).await?))
}

/// GET /v1/shipments/:id — Shipment detail.
#[utoipa::path(
    get,
    path = "/v1/shipments/{id}",
    params(("id" = i64, Path, description = "Shipment ID")),
    responses(
        (status = 200, description = "Shipment found", body = ShipmentDetail),
        (status = 403, description = "Caller is not a party to the shipment", body = crate::error::ErrorBody),
        (status = 404, description = "Shipment not found", body = crate::error::ErrorBody),
    ),
    tag = "shipments"
)]
pub async fn get_shipment(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<ShipmentDetail>, AppError> {
    let id = shipment_id(id)?;
    Ok(Json(state.lifecycle.shipment_detail(&caller, id).await?))
}

/// GET /v1/shipments/:id/status — Latest ledger event.
///
/// 404 when the ledger is empty; reads never create the initial event.
#[utoipa::path(
    get,
    path = "/v1/shipments/{id}/status",
    params(("id" = i64, Path, description = "Shipment ID")),
    responses(
        (status = 200, description = "Current status event", body = serde_json::Value),
        (status = 404, description = "Shipment or status history not found", body = crate::error::ErrorBody),
    ),
    tag = "shipments"
)]
pub async fn get_current_status(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<StatusEvent>, AppError> {
    let id = shipment_id(id)?;
    state.lifecycle.visible_shipment(&caller, id).await?;
    Ok(Json(state.lifecycle.current_status(id).await?))
}

/// GET /v1/shipments/:id/history — Live ledger events, newest first.
#[utoipa::path(
    get,
    path = "/v1/shipments/{id}/history",
    params(("id" = i64, Path, description = "Shipment ID")),
    responses(
        (status = 200, description = "Status events", body = serde_json::Value),
        (status = 404, description = "Shipment not found", body = crate::error::ErrorBody),
    ),
    tag = "shipments"
)]
pub async fn get_history(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<Vec<StatusEvent>>, AppError> {
    let id = shipment_id(id)?;
    state.lifecycle.visible_shipment(&caller, id).await?;
    Ok(Json(state.lifecycle.status_events(id).await?))
}

/// GET /v1/shipments/:id/timeline — Events in pipeline priority order.
#[utoipa::path(
    get,
    path = "/v1/shipments/{id}/timeline",
    params(("id" = i64, Path, description = "Shipment ID")),
    responses(
        (status = 200, description = "Timeline entries", body = serde_json::Value),
        (status = 404, description = "Shipment not found", body = crate::error::ErrorBody),
    ),
    tag = "shipments"
)]
pub async fn get_timeline(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<Vec<TimelineEntry>>, AppError> {
    let id = shipment_id(id)?;
    state.lifecycle.visible_shipment(&caller, id).await?;
    Ok(Json(state.lifecycle.status_history(id).await?))
}

/// PATCH /v1/shipments/:id — Edit a shipment as its sender.
#[utoipa::path(
    patch,
    path = "/v1/shipments/{id}",
    params(("id" = i64, Path, description = "Shipment ID")),
    request_body = UpdateShipmentRequest,
    responses(
        (status = 200, description = "Shipment updated", body = serde_json::Value),
        (status = 400, description = "Shipment is cancelled or delivered", body = crate::error::ErrorBody),
        (status = 403, description = "Caller is not the sender", body = crate::error::ErrorBody),
        (status = 404, description = "Shipment not found", body = crate::error::ErrorBody),
        (status = 422, description = "Nothing to update or invalid field", body = crate::error::ErrorBody),
    ),
    tag = "shipments"
)]
pub async fn update_shipment(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<i64>,
    body: Result<Json<UpdateShipmentRequest>, JsonRejection>,
) -> Result<Json<Shipment>, AppError> {
    let id = shipment_id(id)?;
    let req = extract_json(body)?;
    let patch = ShipmentPatch {
        sender_name: req.sender_name,
        sender_phone: req.sender_phone,
        sender_email: req.sender_email,
        pickup_address: req.pickup_address,
        recipient_name: req.recipient_name,
        recipient_phone: req.recipient_phone,
        recipient_email: req.recipient_email,
        delivery_address: req.delivery_address,
        shipment_type: req.shipment_type,
        pickup_date: req.pickup_date.as_deref().map(Timestamp::parse).transpose()?,
        special_instructions: req.special_instructions,
        insurance_required: req.insurance_required,
        signature_required: req.signature_required,
    };
    if patch.is_empty() {
        return Err(AppError::Validation("no updatable fields supplied".into()));
    }
    Ok(Json(
        state
            .lifecycle
            .update_shipment(&caller, id, ShipmentEdit::Patch(patch))
            .await?,
    ))
}

/// PUT /v1/shipments/:id — Replace a shipment's editable fields.
#[utoipa::path(
    put,
    path = "/v1/shipments/{id}",
    params(("id" = i64, Path, description = "Shipment ID")),
    request_body = ReplaceShipmentRequest,
    responses(
        (status = 200, description = "Shipment replaced", body = serde_json::Value),
        (status = 400, description = "Shipment is cancelled or delivered", body = crate::error::ErrorBody),
        (status = 403, description = "Caller is not the sender", body = crate::error::ErrorBody),
        (status = 404, description = "Shipment not found", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "shipments"
)]
pub async fn replace_shipment(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<i64>,
    body: Result<Json<ReplaceShipmentRequest>, JsonRejection>,
) -> Result<Json<Shipment>, AppError> {
    let id = shipment_id(id)?;
    let req = extract_json(body)?;
    let details = ShipmentDetails {
        sender_name: req.sender_name,
        sender_phone: req.sender_phone,
        sender_email: req.sender_email,
        pickup_address: req.pickup_address,
        recipient_name: req.recipient_name,
        recipient_phone: req.recipient_phone,
        recipient_email: req.recipient_email,
        delivery_address: req.delivery_address,
        shipment_type: req.shipment_type,
        pickup_date: req.pickup_date.as_deref().map(Timestamp::parse).transpose()?,
        special_instructions: req.special_instructions,
        insurance_required: req.insurance_required,
        signature_required: req.signature_required,
    };
    Ok(Json(
        state
            .lifecycle
            .update_shipment(&caller, id, ShipmentEdit::Replace(details))
            .await?,
    ))
}

/// GET /v1/shipments/:id/payment-status — Whether a COMPLETED payment exists.
#[utoipa::path(
    get,
    path = "/v1/shipments/{id}/payment-status",
    params(("id" = i64, Path, description = "Shipment ID")),
    responses(
        (status = 200, description = "Payment gate state", body = PaymentStatusResponse),
        (status = 404, description = "Shipment not found", body = crate::error::ErrorBody),
    ),
    tag = "shipments"
)]
pub async fn get_payment_status(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(raw): Path<i64>,
) -> Result<Json<PaymentStatusResponse>, AppError> {
    let id = shipment_id(raw)?;
    state.lifecycle.visible_shipment(&caller, id).await?;
    let is_payment_complete = state.lifecycle.is_payment_complete(id).await?;
    Ok(Json(PaymentStatusResponse {
        shipment_id: raw,
        is_payment_complete,
    }))
}

/// POST /v1/shipments/:id/actions/:action — Request a status change.
///
/// Actions: `accept`, `reject`, `in_transit`, `delivered`, `cancel`.
#[utoipa::path(
    post,
    path = "/v1/shipments/{id}/actions/{action}",
    params(
        ("id" = i64, Path, description = "Shipment ID"),
        ("action" = String, Path, description = "Transition action"),
    ),
    responses(
        (status = 201, description = "Status event appended", body = serde_json::Value),
        (status = 400, description = "Transition not allowed from the current status", body = crate::error::ErrorBody),
        (status = 402, description = "Payment not completed", body = crate::error::ErrorBody),
        (status = 403, description = "Caller may not perform this action", body = crate::error::ErrorBody),
        (status = 404, description = "Shipment not found", body = crate::error::ErrorBody),
    ),
    tag = "shipments"
)]
pub async fn apply_action(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path((id, action)): Path<(i64, String)>,
) -> Result<(StatusCode, Json<StatusEvent>), AppError> {
    let id = shipment_id(id)?;
    let action =
        TransitionAction::from_str(&action).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let event = state.lifecycle.request_transition(id, action, &caller).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// POST /v1/shipments/:id/cancel — Cancel as the sender.
#[utoipa::path(
    post,
    path = "/v1/shipments/{id}/cancel",
    params(("id" = i64, Path, description = "Shipment ID")),
    responses(
        (status = 201, description = "Shipment cancelled", body = serde_json::Value),
        (status = 400, description = "Shipment is already final", body = crate::error::ErrorBody),
        (status = 403, description = "Caller is not the sender", body = crate::error::ErrorBody),
    ),
    tag = "shipments"
)]
pub async fn cancel_shipment(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<StatusEvent>), AppError> {
    let id = shipment_id(id)?;
    let event = state
        .lifecycle
        .request_transition(id, TransitionAction::Cancel, &caller)
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// PUT /v1/shipments/:id/estimated-delivery — Set the ETA.
#[utoipa::path(
    put,
    path = "/v1/shipments/{id}/estimated-delivery",
    params(("id" = i64, Path, description = "Shipment ID")),
    request_body = EstimatedDeliveryRequest,
    responses(
        (status = 200, description = "Shipment updated", body = serde_json::Value),
        (status = 400, description = "Shipment is not in transit", body = crate::error::ErrorBody),
        (status = 402, description = "Payment not completed", body = crate::error::ErrorBody),
        (status = 403, description = "Caller is not the supplier", body = crate::error::ErrorBody),
    ),
    tag = "shipments"
)]
pub async fn update_estimated_delivery(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<i64>,
    body: Result<Json<EstimatedDeliveryRequest>, JsonRejection>,
) -> Result<Json<Shipment>, AppError> {
    let id = shipment_id(id)?;
    let req = extract_json(body)?;
    let eta = Timestamp::parse(&req.estimated_delivery)?;
    Ok(Json(
        state
            .lifecycle
            .update_estimated_delivery(&caller, id, eta)
            .await?,
    ))
}

/// PATCH /v1/shipments/:id/status-events/latest — Annotate the latest event.
///
/// Only location and the delivered flag can change; status and timestamps
/// of ledger rows are immutable.
#[utoipa::path(
    patch,
    path = "/v1/shipments/{id}/status-events/latest",
    params(("id" = i64, Path, description = "Shipment ID")),
    request_body = AnnotateEventRequest,
    responses(
        (status = 200, description = "Event updated", body = serde_json::Value),
        (status = 400, description = "Shipment is final", body = crate::error::ErrorBody),
        (status = 403, description = "Caller is not the supplier", body = crate::error::ErrorBody),
        (status = 422, description = "Nothing to update", body = crate::error::ErrorBody),
    ),
    tag = "shipments"
)]
pub async fn annotate_latest_event(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<i64>,
    body: Result<Json<AnnotateEventRequest>, JsonRejection>,
) -> Result<Json<StatusEvent>, AppError> {
    let id = shipment_id(id)?;
    let req = extract_json(body)?;
    let annotation = EventAnnotation {
        current_location: req.current_location,
        is_delivered: req.is_delivered,
    };
    Ok(Json(
        state
            .lifecycle
            .annotate_latest_event(&caller, id, annotation)
            .await?,
    ))
}
