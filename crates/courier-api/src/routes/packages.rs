//! # Packages API
//!
//! ## Endpoints
//!
//! - `POST /v1/packages` — register a package owned by the caller
//! - `GET /v1/packages` — caller's packages (all packages for super admins)
//! - `GET /v1/packages/:id` — get package
//! - `PATCH /v1/packages/:id` — owner edit of the supplied fields, including
//!   the final cost
//! - `PUT /v1/packages/:id` — owner replacement of every editable field

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use courier_state::{
    NewPackage, Package, PackageDetails, PackageEdit, PackagePatch, PackageType,
};

use super::{caller_user, package_id};
use crate::auth::Authenticated;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, Validate};
use crate::state::AppState;

// ── Request DTOs ────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePackageRequest {
    #[serde(default)]
    #[schema(value_type = String, example = "stackable_goods")]
    pub package_type: PackageType,
    /// Kilograms.
    pub weight: f64,
    /// Metres.
    pub length: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub is_negotiable: bool,
    /// ISO 4217 code.
    pub currency: String,
    /// Minor currency units.
    pub estimated_cost: Option<i64>,
}

impl Validate for CreatePackageRequest {
    fn validate(&self) -> Result<(), String> {
        if self.currency.trim().is_empty() {
            return Err("currency must not be empty".to_string());
        }
        Ok(())
    }
}

/// Fields to change; omitted fields keep their stored value.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdatePackageRequest {
    #[schema(value_type = Option<String>, example = "stackable_goods")]
    pub package_type: Option<PackageType>,
    pub weight: Option<f64>,
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub is_negotiable: Option<bool>,
    pub currency: Option<String>,
    pub estimated_cost: Option<i64>,
    /// Agreed price in minor currency units.
    pub final_cost: Option<i64>,
}

/// Every editable field. Omitted costs are cleared.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplacePackageRequest {
    #[serde(default)]
    #[schema(value_type = String, example = "stackable_goods")]
    pub package_type: PackageType,
    pub weight: f64,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub is_negotiable: bool,
    pub currency: String,
    pub estimated_cost: Option<i64>,
    pub final_cost: Option<i64>,
}

impl Validate for ReplacePackageRequest {
    fn validate(&self) -> Result<(), String> {
        if self.currency.trim().is_empty() {
            return Err("currency must not be empty".to_string());
        }
        Ok(())
    }
}

fn normalize_currency(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

// ── Router ──────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/packages", get(list_packages).post(create_package))
        .route(
            "/v1/packages/:id",
            get(get_package).patch(update_package).put(replace_package),
        )
}

// ── Handlers ────────────────────────────────────────────────────────

/// POST /v1/packages — Register a package.
#[utoipa::path(
    post,
    path = "/v1/packages",
    request_body = CreatePackageRequest,
    responses(
        (status = 201, description = "Package created", body = serde_json::Value),
        (status = 403, description = "Caller cannot own packages", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "packages"
)]
pub async fn create_package(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    body: Result<Json<CreatePackageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Package>), AppError> {
    let req = extract_validated_json(body)?;
    let new = NewPackage {
        user_id: caller_user(&caller)?,
        package_type: req.package_type,
        weight: req.weight,
        length: req.length,
        width: req.width,
        height: req.height,
        is_negotiable: req.is_negotiable,
        currency: normalize_currency(&req.currency),
        estimated_cost: req.estimated_cost,
    };
    let package = state.lifecycle.create_package(&caller, new).await?;
    Ok((StatusCode::CREATED, Json(package)))
}

/// GET /v1/packages — List the caller's packages.
#[utoipa::path(
    get,
    path = "/v1/packages",
    responses(
        (status = 200, description = "Packages", body = serde_json::Value),
    ),
    tag = "packages"
)]
pub async fn list_packages(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
) -> Result<Json<Vec<Package>>, AppError> {
    Ok(Json(state.lifecycle.list_packages(&caller).await?))
}

/// GET /v1/packages/:id — Get a package.
#[utoipa::path(
    get,
    path = "/v1/packages/{id}",
    params(("id" = i64, Path, description = "Package ID")),
    responses(
        (status = 200, description = "Package found", body = serde_json::Value),
        (status = 403, description = "Package belongs to another user", body = crate::error::ErrorBody),
        (status = 404, description = "Package not found", body = crate::error::ErrorBody),
    ),
    tag = "packages"
)]
pub async fn get_package(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<i64>,
) -> Result<Json<Package>, AppError> {
    let id = package_id(id)?;
    Ok(Json(state.lifecycle.get_package(&caller, id).await?))
}

/// PATCH /v1/packages/:id — Edit a package as its owner.
#[utoipa::path(
    patch,
    path = "/v1/packages/{id}",
    params(("id" = i64, Path, description = "Package ID")),
    request_body = UpdatePackageRequest,
    responses(
        (status = 200, description = "Package updated", body = serde_json::Value),
        (status = 403, description = "Package belongs to another user", body = crate::error::ErrorBody),
        (status = 404, description = "Package not found", body = crate::error::ErrorBody),
        (status = 422, description = "Nothing to update or invalid field", body = crate::error::ErrorBody),
    ),
    tag = "packages"
)]
pub async fn update_package(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<i64>,
    body: Result<Json<UpdatePackageRequest>, JsonRejection>,
) -> Result<Json<Package>, AppError> {
    let id = package_id(id)?;
    let req = extract_json(body)?;
    let patch = PackagePatch {
        package_type: req.package_type,
        weight: req.weight,
        length: req.length,
        width: req.width,
        height: req.height,
        is_negotiable: req.is_negotiable,
        currency: req.currency.as_deref().map(normalize_currency),
        estimated_cost: req.estimated_cost,
        final_cost: req.final_cost,
    };
    if patch.is_empty() {
        return Err(AppError::Validation("no updatable fields supplied".into()));
    }
    Ok(Json(
        state
            .lifecycle
            .update_package(&caller, id, PackageEdit::Patch(patch))
            .await?,
    ))
}

/// PUT /v1/packages/:id — Replace a package's editable fields.
#[utoipa::path(
    put,
    path = "/v1/packages/{id}",
    params(("id" = i64, Path, description = "Package ID")),
    request_body = ReplacePackageRequest,
    responses(
        (status = 200, description = "Package replaced", body = serde_json::Value),
        (status = 403, description = "Package belongs to another user", body = crate::error::ErrorBody),
        (status = 404, description = "Package not found", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "packages"
)]
pub async fn replace_package(
    State(state): State<AppState>,
    Authenticated(caller): Authenticated,
    Path(id): Path<i64>,
    body: Result<Json<ReplacePackageRequest>, JsonRejection>,
) -> Result<Json<Package>, AppError> {
    let id = package_id(id)?;
    let req = extract_validated_json(body)?;
    let details = PackageDetails {
        package_type: req.package_type,
        weight: req.weight,
        length: req.length,
        width: req.width,
        height: req.height,
        is_negotiable: req.is_negotiable,
        currency: normalize_currency(&req.currency),
        estimated_cost: req.estimated_cost,
        final_cost: req.final_cost,
    };
    Ok(Json(
        state
            .lifecycle
            .update_package(&caller, id, PackageEdit::Replace(details))
            .await?,
    ))
}
