//! # OpenAPI Document Assembly
//!
//! Collects the utoipa-documented handlers into one OpenAPI document,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Courier API",
        version = "0.1.0",
        description = "Shipment lifecycle, status ledger, and payment endpoints of the courier backend.",
        license(name = "MIT")
    ),
    paths(
        // Packages
        crate::routes::packages::create_package,
        crate::routes::packages::list_packages,
        crate::routes::packages::get_package,
        crate::routes::packages::update_package,
        crate::routes::packages::replace_package,
        // Shipments
        crate::routes::shipments::create_shipment,
        crate::routes::shipments::list_shipments,
        crate::routes::shipments::get_shipment,
        crate::routes::shipments::update_shipment,
        crate::routes::shipments::replace_shipment,
        crate::routes::shipments::get_current_status,
        crate::routes::shipments::get_history,
        crate::routes::shipments::get_timeline,
        crate::routes::shipments::get_payment_status,
        crate::routes::shipments::apply_action,
        crate::routes::shipments::cancel_shipment,
        crate::routes::shipments::update_estimated_delivery,
        crate::routes::shipments::annotate_latest_event,
        // Payments
        crate::routes::payments::create_payment,
        crate::routes::payments::list_payments,
        crate::routes::payments::get_payment,
        crate::routes::payments::update_payment_status,
        // Gateway
        crate::routes::gateway::create_order,
        crate::routes::gateway::verify_payment,
        crate::routes::gateway::receive_webhook,
        // Admin
        crate::routes::admin::backfill,
        crate::routes::admin::ensure_initial_event,
        crate::routes::admin::metrics,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::lifecycle::ShipmentDetail,
        crate::lifecycle::ShipmentSummary,
        crate::lifecycle::BackfillReport,
        crate::middleware::metrics::MetricsSnapshot,
        crate::routes::packages::CreatePackageRequest,
        crate::routes::packages::UpdatePackageRequest,
        crate::routes::packages::ReplacePackageRequest,
        crate::routes::shipments::CreateShipmentRequest,
        crate::routes::shipments::UpdateShipmentRequest,
        crate::routes::shipments::ReplaceShipmentRequest,
        crate::routes::shipments::CreateShipmentResponse,
        crate::routes::shipments::PaymentStatusResponse,
        crate::routes::shipments::EstimatedDeliveryRequest,
        crate::routes::shipments::AnnotateEventRequest,
        crate::routes::payments::CreatePaymentRequest,
        crate::routes::payments::UpdatePaymentStatusRequest,
        crate::routes::payments::PaymentStatusChange,
        crate::routes::gateway::CreateOrderRequest,
        crate::routes::gateway::CreateOrderResponse,
        crate::routes::gateway::VerifyPaymentRequest,
        crate::routes::gateway::WebhookAck,
    )),
    tags(
        (name = "packages", description = "Package registration"),
        (name = "shipments", description = "Shipments and the status ledger"),
        (name = "payments", description = "Shipment payments"),
        (name = "gateway", description = "Payment gateway callbacks"),
        (name = "admin", description = "Ledger maintenance and counters"),
    )
)]
pub struct ApiDoc;

/// Serves the document at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_lifecycle_paths() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        assert!(paths.contains_key("/v1/shipments"));
        assert!(paths.contains_key("/v1/shipments/{id}/actions/{action}"));
        assert!(paths.contains_key("/v1/payments/{id}/status"));
        assert!(paths.contains_key("/v1/gateway/webhook"));
        assert!(paths.contains_key("/v1/gateway/orders"));
        assert!(paths.contains_key("/v1/packages/{id}"));
        assert!(paths.contains_key("/v1/admin/metrics"));
    }
}
