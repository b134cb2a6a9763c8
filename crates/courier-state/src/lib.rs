//! # courier-state — Shipment Lifecycle State Machine
//!
//! Pure domain logic of the courier backend. Nothing here performs I/O;
//! the API crate loads ledger rows and payments, hands them to these
//! functions, and persists what they decide.
//!
//! ## Components
//!
//! - **Status ledger** (`ledger.rs`): append-only status events; derives the
//!   current status, newest-first history, and the priority-ordered timeline.
//!
//! - **Transition guard** (`guard.rs`): decides whether a caller may move a
//!   shipment from its current status, and to what. Enforces that final
//!   statuses freeze the shipment.
//!
//! - **Payment gate** (`payment.rs`): whether a shipment is paid, whether a
//!   new payment may be recorded, and how gateway events update payments.
//!
//! - **Records** (`shipment.rs`): shipments and packages.

pub mod action;
pub mod guard;
pub mod ledger;
pub mod payment;
pub mod shipment;
pub mod status;

pub use action::TransitionAction;
pub use guard::{ensure_mutable, Parties, RejectionKind, TransitionError, TransitionGuard};
pub use ledger::{EventAnnotation, NewStatusEvent, StatusEvent, TimelineEntry};
pub use payment::{
    GatewayEvent, NewPayment, Payment, PaymentError, PaymentMethod, PaymentStatus, PaymentUpdate,
};
pub use shipment::{
    NewPackage, NewShipment, Package, PackageDetails, PackageEdit, PackagePatch, PackageType,
    Shipment, ShipmentDetails, ShipmentEdit, ShipmentPatch, ShipmentType,
};
pub use status::ShipmentStatus;
