//! # Storage Abstraction
//!
//! [`ShipmentRepository`] is the data-access capability the lifecycle
//! service depends on. Two implementations exist:
//!
//! - [`MemoryRepository`]: every table behind one `parking_lot::RwLock`.
//!   Used in development and in tests.
//! - [`PgRepository`]: Postgres via SQLx. Used when `DATABASE_URL` is set.
//!
//! ## Atomic units
//!
//! Operations whose validity depends on the latest ledger row take a check
//! closure. The implementation locks the shipment, reads the latest event,
//! runs the closure, and writes only if it approves, all in one unit:
//!
//! - memory: under the write lock
//! - Postgres: in one transaction holding `SELECT ... FOR UPDATE` on the
//!   shipment row
//!
//! Concurrent requests for the same shipment therefore serialize, and a
//! request never appends on top of a status it did not validate against.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use courier_core::{PackageId, PaymentId, ShipmentId, Timestamp, UserId, ValidationError};
use courier_state::{
    EventAnnotation, GatewayEvent, NewPackage, NewPayment, NewShipment, Package, PackageEdit,
    Payment, PaymentError, PaymentStatus, PaymentUpdate, Shipment, ShipmentEdit, ShipmentStatus,
    StatusEvent, TransitionError,
};

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

/// Decides the status to append given the latest ledger row.
pub type TransitionDecision =
    Box<dyn FnOnce(&StatusEvent) -> Result<ShipmentStatus, TransitionError> + Send>;

/// Approves a field update given the latest ledger row.
pub type MutationCheck = Box<dyn FnOnce(&StatusEvent) -> Result<(), TransitionError> + Send>;

/// Approves a new payment given the latest ledger row and existing payments.
pub type PaymentCheck =
    Box<dyn FnOnce(&StatusEvent, &[Payment]) -> Result<(), PaymentError> + Send>;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Rejected(#[from] TransitionError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Shipment listing filter. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShipmentFilter {
    pub sender_id: Option<UserId>,
    pub courier_id: Option<UserId>,
    /// Match on the current (derived) status.
    pub status: Option<ShipmentStatus>,
}

impl ShipmentFilter {
    pub fn matches(&self, shipment: &Shipment, current: Option<ShipmentStatus>) -> bool {
        self.sender_id.map_or(true, |id| shipment.sender_id == id)
            && self.courier_id.map_or(true, |id| shipment.courier_id == id)
            && self.status.map_or(true, |s| current == Some(s))
    }
}

/// Payment listing filter. Sender and courier scope through the shipment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentFilter {
    pub sender_id: Option<UserId>,
    pub courier_id: Option<UserId>,
    pub shipment_id: Option<ShipmentId>,
    pub status: Option<PaymentStatus>,
}

impl PaymentFilter {
    pub fn matches(&self, payment: &Payment, shipment: Option<&Shipment>) -> bool {
        let scoped = match (self.sender_id, self.courier_id) {
            (None, None) => true,
            (sender, courier) => shipment.map_or(false, |s| {
                sender.map_or(true, |id| s.sender_id == id)
                    && courier.map_or(true, |id| s.courier_id == id)
            }),
        };
        scoped
            && self.shipment_id.map_or(true, |id| payment.shipment_id == id)
            && self.status.map_or(true, |s| payment.payment_status == s)
    }
}

#[async_trait]
pub trait ShipmentRepository: Send + Sync + 'static {
    // ── Packages ────────────────────────────────────────────────────

    async fn insert_package(&self, new: NewPackage) -> Result<Package, RepositoryError>;

    async fn get_package(&self, id: PackageId) -> Result<Option<Package>, RepositoryError>;

    async fn list_packages(&self, owner: Option<UserId>) -> Result<Vec<Package>, RepositoryError>;

    /// Apply an edit to a live package. The merged fields are validated
    /// before anything is written.
    async fn update_package(
        &self,
        id: PackageId,
        edit: PackageEdit,
    ) -> Result<Package, RepositoryError>;

    // ── Shipments ───────────────────────────────────────────────────

    /// Insert a shipment together with its initial PENDING event.
    async fn create_shipment(
        &self,
        new: NewShipment,
    ) -> Result<(Shipment, StatusEvent), RepositoryError>;

    async fn get_shipment(&self, id: ShipmentId) -> Result<Option<Shipment>, RepositoryError>;

    /// Non-deleted shipments matching `filter`, newest first.
    async fn list_shipments(
        &self,
        filter: &ShipmentFilter,
    ) -> Result<Vec<Shipment>, RepositoryError>;

    async fn update_estimated_delivery(
        &self,
        id: ShipmentId,
        eta: Timestamp,
        check: MutationCheck,
    ) -> Result<Shipment, RepositoryError>;

    /// Apply a sender edit under the shipment lock, after `check` approves
    /// the latest ledger row and the merged fields validate.
    async fn update_shipment(
        &self,
        id: ShipmentId,
        edit: ShipmentEdit,
        check: MutationCheck,
    ) -> Result<Shipment, RepositoryError>;

    // ── Status ledger ───────────────────────────────────────────────

    /// Every ledger row of the shipment, deleted ones included.
    async fn status_events(&self, id: ShipmentId) -> Result<Vec<StatusEvent>, RepositoryError>;

    async fn latest_status_event(
        &self,
        id: ShipmentId,
    ) -> Result<Option<StatusEvent>, RepositoryError>;

    /// Return the latest event, creating the initial PENDING event if the
    /// ledger is empty. The flag reports whether a row was written.
    async fn ensure_initial_event(
        &self,
        id: ShipmentId,
    ) -> Result<(StatusEvent, bool), RepositoryError>;

    /// Lock, read latest, decide, append. Exactly one row on approval. The
    /// new row's `created_at` is strictly after the latest one's, and an
    /// append of DELIVERED stamps the shipment's delivery date.
    async fn append_transition(
        &self,
        id: ShipmentId,
        decide: TransitionDecision,
    ) -> Result<StatusEvent, RepositoryError>;

    async fn annotate_latest_event(
        &self,
        id: ShipmentId,
        annotation: EventAnnotation,
        check: MutationCheck,
    ) -> Result<StatusEvent, RepositoryError>;

    /// Shipments whose ledger has no live rows.
    async fn shipments_without_events(&self) -> Result<Vec<ShipmentId>, RepositoryError>;

    // ── Payments ────────────────────────────────────────────────────

    async fn payments_for_shipment(&self, id: ShipmentId)
        -> Result<Vec<Payment>, RepositoryError>;

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, RepositoryError>;

    async fn list_payments(&self, filter: &PaymentFilter)
        -> Result<Vec<Payment>, RepositoryError>;

    /// Check and insert under the shipment lock.
    async fn insert_payment(
        &self,
        new: NewPayment,
        check: PaymentCheck,
    ) -> Result<Payment, RepositoryError>;

    async fn set_payment_status(
        &self,
        id: PaymentId,
        status: PaymentStatus,
    ) -> Result<(Payment, PaymentUpdate), RepositoryError>;

    /// Find the payment a gateway event refers to and apply it. `None` when
    /// no payment matches. A capture for a shipment that another payment
    /// already completed reports [`PaymentUpdate::Superseded`] and writes
    /// nothing.
    async fn apply_gateway_event(
        &self,
        event: &GatewayEvent,
    ) -> Result<Option<(Payment, PaymentUpdate)>, RepositoryError>;
}
