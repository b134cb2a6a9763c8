//! # API Route Modules
//!
//! - `packages` — package registration, lookup, and owner edits.
//! - `shipments` — shipment creation, detail, listing, sender edits, status
//!   transitions, estimated delivery, and latest-event annotation.
//! - `payments` — payment records and administrative status changes.
//! - `gateway` — payment gateway orders, checkout verification, and webhooks.
//! - `admin` — ledger maintenance (initial-event upsert and backfill) and
//!   request counters.

pub mod admin;
pub mod gateway;
pub mod packages;
pub mod payments;
pub mod shipments;

use courier_core::{Caller, PackageId, PaymentId, ShipmentId, UserId};

use crate::error::AppError;

/// The caller's user id; the operator identity has none.
pub(crate) fn caller_user(caller: &Caller) -> Result<UserId, AppError> {
    caller.user_id.ok_or_else(|| {
        AppError::Forbidden("this operation needs a caller bound to a user id".into())
    })
}

pub(crate) fn shipment_id(raw: i64) -> Result<ShipmentId, AppError> {
    ShipmentId::new(raw).map_err(|_| AppError::NotFound(format!("shipment {raw}")))
}

pub(crate) fn package_id(raw: i64) -> Result<PackageId, AppError> {
    PackageId::new(raw).map_err(|_| AppError::NotFound(format!("package {raw}")))
}

pub(crate) fn payment_id(raw: i64) -> Result<PaymentId, AppError> {
    PaymentId::new(raw).map_err(|_| AppError::NotFound(format!("payment {raw}")))
}
