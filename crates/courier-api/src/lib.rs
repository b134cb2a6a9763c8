//! # courier-api — Axum API Service
//!
//! HTTP surface of the courier backend. Handlers parse requests, resolve the
//! caller, and delegate to [`lifecycle::LifecycleService`], which owns every
//! rule about shipments, the status ledger, and payments.
//!
//! ## Routes
//!
//! | Prefix | Module | Auth |
//! |---|---|---|
//! | `/v1/packages` | `routes::packages` | bearer |
//! | `/v1/shipments` | `routes::shipments` | bearer |
//! | `/v1/payments` | `routes::payments` | bearer |
//! | `/v1/gateway/orders`, `/v1/gateway/verify` | `routes::gateway` | bearer |
//! | `/v1/gateway/webhook` | `routes::gateway` | body signature |
//! | `/v1/admin` | `routes::admin` | bearer, super admin |
//! | `/openapi.json` | `openapi` | bearer |
//! | `/health/*` | here | none |
//!
//! ## Middleware Stack (Tower)
//!
//! TraceLayer → MetricsLayer → AuthLayer
//!
//! ## Storage
//!
//! [`repo::ShipmentRepository`] has an in-memory implementation (default,
//! used by tests) and a Postgres one selected when `DATABASE_URL` is set.

pub mod auth;
pub mod db;
pub mod error;
pub mod extractors;
pub mod gateway;
pub mod lifecycle;
pub mod middleware;
pub mod openapi;
pub mod repo;
pub mod routes;
pub mod state;

use axum::middleware::from_fn;
use axum::Router;

use crate::auth::AuthConfig;
use crate::middleware::metrics::ApiMetrics;

pub use error::AppError;
pub use state::AppState;

/// Assemble the application router.
///
/// Health probes and the gateway webhook sit outside the auth middleware.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let metrics = ApiMetrics::new();

    let api = Router::new()
        .merge(routes::packages::router())
        .merge(routes::shipments::router())
        .merge(routes::payments::router())
        .merge(routes::gateway::router())
        .merge(routes::admin::router())
        .merge(openapi::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(middleware::tracing_layer::layer())
        .layer(axum::Extension(auth_config))
        .layer(axum::Extension(metrics.clone()))
        .with_state(state.clone());

    let webhooks = routes::gateway::webhook_router()
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(middleware::tracing_layer::layer())
        .layer(axum::Extension(metrics))
        .with_state(state);

    let health = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));

    Router::new().merge(health).merge(webhooks).merge(api)
}

/// Liveness probe: 200 while the process runs.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe.
async fn readiness() -> &'static str {
    "ready"
}
