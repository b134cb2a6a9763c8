//! # courier-core — Foundational Types for the Courier Backend
//!
//! Leaf crate of the workspace. Defines the primitives every other crate
//! speaks in: identifier newtypes, the authenticated caller, tracking
//! numbers, and UTC timestamps.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `ShipmentId`, `PackageId`,
//!    `PaymentId`, `StatusEventId`, `UserId` are distinct types. A payment id
//!    cannot be passed where a shipment id is expected.
//!
//! 2. **Explicit caller identity.** Every state-changing operation receives a
//!    [`Caller`] carrying the user id and [`Role`]. Nothing reads ambient
//!    request state.
//!
//! 3. **UTC-only timestamps.** [`Timestamp`] is always UTC with microsecond
//!    precision so values survive a round trip through Postgres unchanged.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `courier-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod role;
pub mod temporal;

pub use error::ValidationError;
pub use identity::{PackageId, PaymentId, ShipmentId, StatusEventId, TrackingNumber, UserId};
pub use role::{Caller, Role};
pub use temporal::Timestamp;
