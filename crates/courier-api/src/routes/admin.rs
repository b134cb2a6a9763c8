//! # Admin API
//!
//! Ledger maintenance and request counters for super admins.
//!
//! ## Endpoints
//!
//! - `POST /v1/admin/status-events/backfill` — create the initial event for
//!   every shipment whose ledger is empty
//! - `POST /v1/admin/shipments/:id/ensure-initial-event` — same, one shipment
//! - `GET /v1/admin/metrics` — request and error counters since start-up

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};

use courier_state::StatusEvent;

use super::shipment_id;
use crate::auth::{require_super_admin, Authenticated};
use crate::error::AppError;
use crate::lifecycle::BackfillReport;
use crate::middleware::metrics::{ApiMetrics, MetricsSnapshot};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/status-events/backfill", post(backfill))
        .route(
            "/v1/admin/shipments/:id/ensure-initial-event",
            post(ensure_initial_event),
        )
        .route("/v1/admin/metrics", get(metrics))
}

/// POST /v1/admin/status-events/backfill — Repair empty ledgers.
#[utoipa::path(
    post,
    path = "/v1/admin/status-events/backfill",
    responses(
        (status = 200, description = "Backfill report", body = BackfillReport),
        (status = 403, description = "Caller is not a super admin", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub async fn backfill(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
) -> Result<Json<BackfillReport>, AppError> {
    Ok(Json(state.lifecycle.backfill_initial_events(&caller).await?))
}

/// POST /v1/admin/shipments/:id/ensure-initial-event — Idempotent upsert.
///
/// Returns the latest event, creating PENDING first if the ledger is empty.
#[utoipa::path(
    post,
    path = "/v1/admin/shipments/{id}/ensure-initial-event",
    params(("id" = i64, Path, description = "Shipment ID")),
    responses(
        (status = 200, description = "Latest status event", body = serde_json::Value),
        (status = 403, description = "Caller is not a super admin", body = crate::error::ErrorBody),
        (status = 404, description = "Shipment not found", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub async fn ensure_initial_event(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<StatusEvent>, AppError> {
    require_super_admin(&caller)?;
    let id = shipment_id(id)?;
    Ok(Json(state.lifecycle.ensure_initial_event(id).await?))
}

/// GET /v1/admin/metrics — Request counters.
///
/// Counts cover completed requests on the API and webhook routers; the
/// request reading them is not yet included.
#[utoipa::path(
    get,
    path = "/v1/admin/metrics",
    responses(
        (status = 200, description = "Counter snapshot", body = MetricsSnapshot),
        (status = 403, description = "Caller is not a super admin", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub async fn metrics(
    Authenticated(caller): Authenticated,
    Extension(metrics): Extension<ApiMetrics>,
) -> Result<Json<MetricsSnapshot>, AppError> {
    require_super_admin(&caller)?;
    Ok(Json(metrics.snapshot()))
}
