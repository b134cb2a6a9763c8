//! # Shipment Lifecycle Service
//!
//! Everything the HTTP handlers do to shipments goes through
//! [`LifecycleService`]. A status change runs in three steps:
//!
//! 1. **Explicit ledger upsert**: `ensure_initial_event` creates the
//!    PENDING row if the shipment predates the ledger. Reads never do this.
//!
//! 2. **Payment gate read**: whether a COMPLETED payment exists. A payment
//!    completing between this read and the append only makes a rejected
//!    request retryable; COMPLETED is terminal, so the gate never flips back.
//!
//! 3. **Guarded append**: the repository locks the shipment, reads the
//!    latest event, and asks [`TransitionGuard`] for the next status. One row
//!    is appended on approval, none on rejection.
//!
//! Visibility: super admins see everything, senders see their shipments,
//! suppliers see shipments assigned to them.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use courier_core::{
    Caller, PackageId, PaymentId, Role, ShipmentId, Timestamp, UserId, ValidationError,
};
use courier_state::payment::{self, check_can_create};
use courier_state::{
    ensure_mutable, ledger, EventAnnotation, GatewayEvent, NewPackage, NewPayment, NewShipment,
    Package, PackageEdit, Payment, PaymentError, PaymentStatus, PaymentUpdate, Shipment,
    ShipmentEdit, ShipmentStatus, StatusEvent, TimelineEntry, TransitionAction, TransitionError,
    TransitionGuard,
};

use crate::repo::{PaymentFilter, RepositoryError, ShipmentFilter, ShipmentRepository};

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Rejected(#[from] TransitionError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("{0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<RepositoryError> for LifecycleError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => Self::NotFound(what),
            RepositoryError::Rejected(e) => Self::Rejected(e),
            RepositoryError::Payment(e) => Self::Payment(e),
            RepositoryError::Validation(e) => Self::Validation(e),
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            RepositoryError::Database(e) => Self::Storage(e.to_string()),
        }
    }
}

/// A shipment with its derived status, timeline, and payment state.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ShipmentDetail {
    #[schema(value_type = Object)]
    pub shipment: Shipment,
    /// Status of the latest ledger row. `None` when the ledger is empty.
    #[schema(value_type = Option<String>)]
    pub current_status: Option<ShipmentStatus>,
    pub current_location: Option<String>,
    #[schema(value_type = Vec<Object>)]
    pub status_history: Vec<TimelineEntry>,
    #[schema(value_type = Option<String>)]
    pub payment_status: Option<PaymentStatus>,
}

/// A shipment row in a listing.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ShipmentSummary {
    #[schema(value_type = Object)]
    pub shipment: Shipment,
    #[schema(value_type = Option<String>)]
    pub current_status: Option<ShipmentStatus>,
}

/// Result of an initial-event backfill.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct BackfillReport {
    pub examined: usize,
    #[schema(value_type = Vec<i64>)]
    pub created: Vec<ShipmentId>,
}

#[derive(Clone)]
pub struct LifecycleService {
    repo: Arc<dyn ShipmentRepository>,
}

impl std::fmt::Debug for LifecycleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleService").finish_non_exhaustive()
    }
}

fn forbidden(message: impl Into<String>) -> LifecycleError {
    LifecycleError::Forbidden(message.into())
}

fn user_of(caller: &Caller) -> Result<UserId, LifecycleError> {
    caller
        .user_id
        .ok_or_else(|| forbidden(format!("{} caller has no user id", caller.role)))
}

impl LifecycleService {
    pub fn new(repo: Arc<dyn ShipmentRepository>) -> Self {
        Self { repo }
    }

    async fn live_shipment(&self, id: ShipmentId) -> Result<Shipment, LifecycleError> {
        self.repo
            .get_shipment(id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("shipment {id}")))
    }

    /// The shipment, if the caller is a party to it or a super admin.
    pub async fn visible_shipment(
        &self,
        caller: &Caller,
        id: ShipmentId,
    ) -> Result<Shipment, LifecycleError> {
        let shipment = self.live_shipment(id).await?;
        if !shipment.parties().can_view(caller) {
            return Err(forbidden(format!("caller may not view shipment {id}")));
        }
        Ok(shipment)
    }

    // ── Packages ────────────────────────────────────────────────────

    /// Store a package owned by the caller.
    pub async fn create_package(
        &self,
        caller: &Caller,
        new: NewPackage,
    ) -> Result<Package, LifecycleError> {
        if !caller.is(new.user_id, Role::ImporterExporter) && !caller.is_super_admin() {
            return Err(forbidden("only importer/exporters can create packages"));
        }
        new.validate()?;
        let package = self.repo.insert_package(new).await?;
        tracing::info!(package_id = %package.id, owner = %package.user_id, "package created");
        Ok(package)
    }

    pub async fn get_package(
        &self,
        caller: &Caller,
        id: PackageId,
    ) -> Result<Package, LifecycleError> {
        let package = self
            .repo
            .get_package(id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("package {id}")))?;
        if !caller.is_super_admin() && caller.user_id != Some(package.user_id) {
            return Err(forbidden(format!("caller may not view package {id}")));
        }
        Ok(package)
    }

    /// Edit a package. Owner or super admin.
    pub async fn update_package(
        &self,
        caller: &Caller,
        id: PackageId,
        edit: PackageEdit,
    ) -> Result<Package, LifecycleError> {
        let package = self
            .repo
            .get_package(id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("package {id}")))?;
        if !caller.is_super_admin() && caller.user_id != Some(package.user_id) {
            return Err(forbidden(format!("caller may not edit package {id}")));
        }
        let package = self.repo.update_package(id, edit).await?;
        tracing::info!(
            package_id = %id,
            final_cost = ?package.final_cost,
            "package updated"
        );
        Ok(package)
    }

    /// Packages owned by the caller; every package for super admins.
    pub async fn list_packages(&self, caller: &Caller) -> Result<Vec<Package>, LifecycleError> {
        let owner = match caller.role {
            Role::SuperAdmin => None,
            _ => Some(user_of(caller)?),
        };
        Ok(self.repo.list_packages(owner).await?)
    }

    // ── Shipments ───────────────────────────────────────────────────

    /// Create a shipment and its initial PENDING event in one unit.
    pub async fn create_shipment(
        &self,
        caller: &Caller,
        new: NewShipment,
    ) -> Result<(Shipment, StatusEvent), LifecycleError> {
        if !caller.is(new.sender_id, Role::ImporterExporter) {
            return Err(forbidden("only importer/exporters can create shipments"));
        }
        new.validate()?;
        let package = self
            .repo
            .get_package(new.package_id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("package {}", new.package_id)))?;
        if package.user_id != new.sender_id {
            return Err(forbidden(format!(
                "package {} belongs to another user",
                package.id
            )));
        }

        let (shipment, event) = self.repo.create_shipment(new).await?;
        tracing::info!(
            shipment_id = %shipment.id,
            tracking_number = %shipment.tracking_number,
            sender = %shipment.sender_id,
            courier = %shipment.courier_id,
            "shipment created"
        );
        Ok((shipment, event))
    }

    pub async fn shipment_detail(
        &self,
        caller: &Caller,
        id: ShipmentId,
    ) -> Result<ShipmentDetail, LifecycleError> {
        let shipment = self.visible_shipment(caller, id).await?;
        let events = self.repo.status_events(id).await?;
        let payments = self.repo.payments_for_shipment(id).await?;
        let latest = ledger::current(&events);
        Ok(ShipmentDetail {
            current_status: latest.map(|e| e.status),
            current_location: latest.and_then(|e| e.current_location.clone()),
            status_history: ledger::timeline(&events),
            payment_status: payment::summary_status(&payments),
            shipment,
        })
    }

    /// Shipments visible to the caller, optionally filtered on current status.
    pub async fn list_shipments(
        &self,
        caller: &Caller,
        status: Option<ShipmentStatus>,
    ) -> Result<Vec<ShipmentSummary>, LifecycleError> {
        let mut filter = ShipmentFilter {
            status,
            ..Default::default()
        };
        match caller.role {
            Role::SuperAdmin => {}
            Role::ImporterExporter => {
                filter.sender_id = Some(user_of(caller)?)
            }
            Role::Supplier => {
                filter.courier_id = Some(user_of(caller)?)
            }
        }

        let shipments = self.repo.list_shipments(&filter).await?;
        let mut summaries = Vec::with_capacity(shipments.len());
        for shipment in shipments {
            let current_status = self
                .repo
                .latest_status_event(shipment.id)
                .await?
                .map(|e| e.status);
            summaries.push(ShipmentSummary {
                shipment,
                current_status,
            });
        }
        Ok(summaries)
    }

    // ── Status ledger ───────────────────────────────────────────────

    /// The authoritative current event. NotFound when the ledger is empty;
    /// call [`Self::ensure_initial_event`] to repair it.
    pub async fn current_status(&self, id: ShipmentId) -> Result<StatusEvent, LifecycleError> {
        self.live_shipment(id).await?;
        self.repo
            .latest_status_event(id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("status history of shipment {id}")))
    }

    /// Idempotent upsert of the initial PENDING event.
    pub async fn ensure_initial_event(&self, id: ShipmentId) -> Result<StatusEvent, LifecycleError> {
        let (event, created) = self.repo.ensure_initial_event(id).await?;
        if created {
            tracing::warn!(shipment_id = %id, "status ledger was empty; initial event created");
        }
        Ok(event)
    }

    /// Priority-ordered timeline of the shipment's live events.
    pub async fn status_history(&self, id: ShipmentId) -> Result<Vec<TimelineEntry>, LifecycleError> {
        self.live_shipment(id).await?;
        let events = self.repo.status_events(id).await?;
        Ok(ledger::timeline(&events))
    }

    /// Live ledger rows, newest first.
    pub async fn status_events(&self, id: ShipmentId) -> Result<Vec<StatusEvent>, LifecycleError> {
        self.live_shipment(id).await?;
        let events = self.repo.status_events(id).await?;
        Ok(ledger::history(&events))
    }

    pub async fn is_payment_complete(&self, id: ShipmentId) -> Result<bool, LifecycleError> {
        let payments = self.repo.payments_for_shipment(id).await?;
        Ok(payment::is_completed(&payments))
    }

    /// Validate `action` against the current status and append the result.
    pub async fn request_transition(
        &self,
        id: ShipmentId,
        action: TransitionAction,
        caller: &Caller,
    ) -> Result<StatusEvent, LifecycleError> {
        let shipment = self.live_shipment(id).await?;
        self.ensure_initial_event(id).await?;
        let paid = self.is_payment_complete(id).await?;

        let parties = shipment.parties();
        let who = *caller;
        let result = self
            .repo
            .append_transition(
                id,
                Box::new(move |latest: &StatusEvent| {
                    TransitionGuard::new(latest.status, parties, paid).decide(action, &who)
                }),
            )
            .await;

        match result {
            Ok(event) => {
                tracing::info!(
                    shipment_id = %id,
                    action = %action,
                    status = %event.status,
                    role = %caller.role,
                    "shipment status changed"
                );
                Ok(event)
            }
            Err(RepositoryError::Rejected(e)) => {
                tracing::info!(
                    shipment_id = %id,
                    action = %action,
                    role = %caller.role,
                    reason = %e,
                    "status change rejected"
                );
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Set the estimated delivery date. Assigned supplier or super admin,
    /// only while IN_TRANSIT and paid.
    pub async fn update_estimated_delivery(
        &self,
        caller: &Caller,
        id: ShipmentId,
        eta: Timestamp,
    ) -> Result<Shipment, LifecycleError> {
        let shipment = self.live_shipment(id).await?;
        let parties = shipment.parties();
        if !parties.can_operate(caller) {
            return Err(forbidden(
                "only the assigned supplier or a super admin can update the estimated delivery",
            ));
        }
        let paid = self.is_payment_complete(id).await?;
        let updated = self
            .repo
            .update_estimated_delivery(
                id,
                eta,
                Box::new(move |latest: &StatusEvent| {
                    TransitionGuard::new(latest.status, parties, paid).ensure_eta_editable()
                }),
            )
            .await?;
        tracing::info!(shipment_id = %id, eta = %eta, "estimated delivery updated");
        Ok(updated)
    }

    /// Edit the sender-editable fields. Sender or super admin, and never once
    /// the shipment is CANCELLED or DELIVERED.
    pub async fn update_shipment(
        &self,
        caller: &Caller,
        id: ShipmentId,
        edit: ShipmentEdit,
    ) -> Result<Shipment, LifecycleError> {
        let shipment = self.live_shipment(id).await?;
        if !caller.is_super_admin() && !shipment.parties().is_sender(caller) {
            return Err(forbidden("only the sender can edit a shipment"));
        }
        self.ensure_initial_event(id).await?;
        let updated = self
            .repo
            .update_shipment(
                id,
                edit,
                Box::new(|latest: &StatusEvent| ensure_mutable(latest.status)),
            )
            .await?;
        tracing::info!(shipment_id = %id, "shipment updated");
        Ok(updated)
    }

    /// Patch location and delivered flag on the latest event.
    pub async fn annotate_latest_event(
        &self,
        caller: &Caller,
        id: ShipmentId,
        annotation: EventAnnotation,
    ) -> Result<StatusEvent, LifecycleError> {
        if annotation.is_empty() {
            return Err(ValidationError::EmptyField {
                field: "current_location or is_delivered",
            }
            .into());
        }
        let shipment = self.live_shipment(id).await?;
        if !shipment.parties().can_operate(caller) {
            return Err(forbidden(
                "only the assigned supplier or a super admin can annotate status events",
            ));
        }
        let event = self
            .repo
            .annotate_latest_event(
                id,
                annotation,
                Box::new(|latest: &StatusEvent| ensure_mutable(latest.status)),
            )
            .await?;
        tracing::info!(shipment_id = %id, event_id = %event.id, "status event annotated");
        Ok(event)
    }

    /// Create the initial PENDING event for every shipment lacking one.
    pub async fn backfill_initial_events(
        &self,
        caller: &Caller,
    ) -> Result<BackfillReport, LifecycleError> {
        if !caller.is_super_admin() {
            return Err(forbidden("only super admins can run the backfill"));
        }
        let missing = self.repo.shipments_without_events().await?;
        let mut report = BackfillReport {
            examined: missing.len(),
            created: Vec::new(),
        };
        for id in missing {
            let (_, created) = self.repo.ensure_initial_event(id).await?;
            if created {
                report.created.push(id);
            }
        }
        tracing::info!(
            examined = report.examined,
            created = report.created.len(),
            "initial status events backfilled"
        );
        Ok(report)
    }

    // ── Payments ────────────────────────────────────────────────────

    /// Record a payment for an ACCEPTED shipment.
    ///
    /// The sender may open PENDING payments. Only super admins may record a
    /// payment as already COMPLETED (cash, wire transfer).
    pub async fn create_payment(
        &self,
        caller: &Caller,
        new: NewPayment,
    ) -> Result<Payment, LifecycleError> {
        let shipment = self.live_shipment(new.shipment_id).await?;
        let parties = shipment.parties();
        if !caller.is_super_admin() && !parties.is_sender(caller) {
            return Err(forbidden("only the sender can pay for a shipment"));
        }
        if new.payment_status == PaymentStatus::Completed && !caller.is_super_admin() {
            return Err(forbidden("only super admins can record completed payments"));
        }
        if new.package_id != shipment.package_id {
            return Err(LifecycleError::Conflict(format!(
                "package {} is not the package of shipment {}",
                new.package_id, shipment.id
            )));
        }
        self.ensure_initial_event(shipment.id).await?;

        let proposed = new.clone();
        let payment = self
            .repo
            .insert_payment(
                new,
                Box::new(move |latest: &StatusEvent, existing: &[Payment]| {
                    check_can_create(latest.status, existing, &proposed)
                }),
            )
            .await?;
        tracing::info!(
            payment_id = %payment.id,
            shipment_id = %payment.shipment_id,
            method = %payment.payment_method,
            status = %payment.payment_status,
            "payment created"
        );
        Ok(payment)
    }

    pub async fn get_payment(
        &self,
        caller: &Caller,
        id: PaymentId,
    ) -> Result<Payment, LifecycleError> {
        let payment = self
            .repo
            .get_payment(id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("payment {id}")))?;
        self.visible_shipment(caller, payment.shipment_id).await?;
        Ok(payment)
    }

    /// Payments on shipments visible to the caller.
    pub async fn list_payments(
        &self,
        caller: &Caller,
        shipment_id: Option<ShipmentId>,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<Payment>, LifecycleError> {
        let mut filter = PaymentFilter {
            shipment_id,
            status,
            ..Default::default()
        };
        match caller.role {
            Role::SuperAdmin => {}
            Role::ImporterExporter => {
                filter.sender_id = Some(user_of(caller)?)
            }
            Role::Supplier => {
                filter.courier_id = Some(user_of(caller)?)
            }
        }
        Ok(self.repo.list_payments(&filter).await?)
    }

    /// Administrative status change, following the payment status machine.
    pub async fn set_payment_status(
        &self,
        caller: &Caller,
        id: PaymentId,
        status: PaymentStatus,
    ) -> Result<(Payment, PaymentUpdate), LifecycleError> {
        if !caller.is_super_admin() {
            return Err(forbidden("only super admins can change payment status"));
        }
        let (payment, update) = self.repo.set_payment_status(id, status).await?;
        tracing::info!(
            payment_id = %id,
            status = %payment.payment_status,
            changed = update == PaymentUpdate::Applied,
            "payment status set"
        );
        Ok((payment, update))
    }

    /// Apply a gateway event. `None` when no payment matches; repeated
    /// deliveries report [`PaymentUpdate::Unchanged`]. A capture that
    /// arrives after another payment of the shipment completed reports
    /// [`PaymentUpdate::Superseded`] and changes nothing.
    pub async fn apply_gateway_event(
        &self,
        event: &GatewayEvent,
    ) -> Result<Option<(Payment, PaymentUpdate)>, LifecycleError> {
        let outcome = self.repo.apply_gateway_event(event).await?;
        match &outcome {
            Some((payment, PaymentUpdate::Superseded)) => tracing::warn!(
                payment_id = %payment.id,
                shipment_id = %payment.shipment_id,
                gateway_payment_id = event.payment_id(),
                gateway_order_id = event.order_id(),
                status = %payment.payment_status,
                "gateway capture ignored: shipment already paid by another payment"
            ),
            Some((payment, update)) => tracing::info!(
                payment_id = %payment.id,
                gateway_payment_id = event.payment_id(),
                status = %payment.payment_status,
                changed = *update == PaymentUpdate::Applied,
                "gateway event applied"
            ),
            None => tracing::warn!(
                gateway_payment_id = event.payment_id(),
                gateway_order_id = event.order_id(),
                "gateway event matched no payment"
            ),
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::MemoryRepository;
    use courier_state::{PackagePatch, PackageType, PaymentMethod, ShipmentPatch, ShipmentType};

    const SENDER: UserId = UserId(10);
    const SUPPLIER: UserId = UserId(20);

    fn sender() -> Caller {
        Caller::new(SENDER, Role::ImporterExporter)
    }

    fn supplier() -> Caller {
        Caller::new(SUPPLIER, Role::Supplier)
    }

    fn new_package() -> NewPackage {
        NewPackage {
            user_id: SENDER,
            package_type: PackageType::NonStackableGoods,
            weight: 12.5,
            length: 1.2,
            width: 0.8,
            height: 1.0,
            is_negotiable: false,
            currency: "USD".into(),
            estimated_cost: Some(12_000),
        }
    }

    fn new_shipment(package_id: PackageId) -> NewShipment {
        NewShipment {
            sender_id: SENDER,
            sender_name: "Ada".into(),
            sender_phone: "+1 555 0100".into(),
            sender_email: None,
            pickup_address: "1 Dock Road".into(),
            recipient_name: "Grace".into(),
            recipient_phone: "+1 555 0199".into(),
            recipient_email: None,
            delivery_address: Some("9 Harbour Way".into()),
            courier_id: SUPPLIER,
            shipment_type: ShipmentType::Express,
            package_id,
            pickup_date: None,
            special_instructions: None,
            insurance_required: false,
            signature_required: true,
        }
    }

    fn new_payment(shipment: &Shipment, status: PaymentStatus) -> NewPayment {
        NewPayment {
            shipment_id: shipment.id,
            package_id: shipment.package_id,
            payment_method: PaymentMethod::Online,
            payment_status: status,
            payment_date: None,
            gateway_order_id: Some(format!("order_{}", shipment.id)),
        }
    }

    async fn service_with_shipment() -> (LifecycleService, MemoryRepository, Shipment) {
        let repo = MemoryRepository::new();
        let service = LifecycleService::new(Arc::new(repo.clone()));
        let package = service.create_package(&sender(), new_package()).await.unwrap();
        let (shipment, _) = service
            .create_shipment(&sender(), new_shipment(package.id))
            .await
            .unwrap();
        (service, repo, shipment)
    }

    async fn ledger_len(repo: &MemoryRepository, id: ShipmentId) -> usize {
        repo.status_events(id).await.unwrap().len()
    }

    #[tokio::test]
    async fn payment_gated_happy_path() {
        let (service, repo, shipment) = service_with_shipment().await;
        assert_eq!(ledger_len(&repo, shipment.id).await, 1);

        service
            .request_transition(shipment.id, TransitionAction::Accept, &supplier())
            .await
            .unwrap();
        assert_eq!(
            service.current_status(shipment.id).await.unwrap().status,
            ShipmentStatus::Accepted
        );

        let err = service
            .request_transition(shipment.id, TransitionAction::InTransit, &supplier())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Rejected(TransitionError::PaymentRequired { .. })
        ));
        assert_eq!(ledger_len(&repo, shipment.id).await, 2);

        let payment = service
            .create_payment(&sender(), new_payment(&shipment, PaymentStatus::Pending))
            .await
            .unwrap();
        service
            .set_payment_status(&Caller::operator(), payment.id, PaymentStatus::Completed)
            .await
            .unwrap();
        assert!(service.is_payment_complete(shipment.id).await.unwrap());

        let event = service
            .request_transition(shipment.id, TransitionAction::InTransit, &supplier())
            .await
            .unwrap();
        assert_eq!(event.status, ShipmentStatus::InTransit);
        assert_eq!(ledger_len(&repo, shipment.id).await, 3);

        let history = service.status_history(shipment.id).await.unwrap();
        let statuses: Vec<ShipmentStatus> = history.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                ShipmentStatus::Pending,
                ShipmentStatus::Accepted,
                ShipmentStatus::InTransit
            ]
        );
    }

    #[tokio::test]
    async fn repeated_target_status_is_rejected() {
        let (service, repo, shipment) = service_with_shipment().await;
        service
            .request_transition(shipment.id, TransitionAction::Accept, &supplier())
            .await
            .unwrap();
        let err = service
            .request_transition(shipment.id, TransitionAction::Accept, &supplier())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Rejected(TransitionError::SameStatus { .. })
        ));
        assert_eq!(ledger_len(&repo, shipment.id).await, 2);
    }

    #[tokio::test]
    async fn sender_cannot_accept() {
        let (service, _, shipment) = service_with_shipment().await;
        let err = service
            .request_transition(shipment.id, TransitionAction::Accept, &sender())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Rejected(TransitionError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn cancelled_shipment_is_frozen() {
        let (service, _, shipment) = service_with_shipment().await;
        service
            .request_transition(shipment.id, TransitionAction::Cancel, &sender())
            .await
            .unwrap();
        let err = service
            .request_transition(shipment.id, TransitionAction::Accept, &supplier())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Rejected(TransitionError::FinalState { .. })
        ));
        let err = service
            .annotate_latest_event(
                &supplier(),
                shipment.id,
                EventAnnotation {
                    current_location: Some("Depot".into()),
                    is_delivered: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Rejected(TransitionError::FinalState { .. })
        ));
    }

    #[tokio::test]
    async fn payment_before_acceptance_is_rejected() {
        let (service, _, shipment) = service_with_shipment().await;
        let err = service
            .create_payment(&sender(), new_payment(&shipment, PaymentStatus::Pending))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Payment(PaymentError::NotAccepted { .. })
        ));
    }

    #[tokio::test]
    async fn duplicate_pending_payment_is_rejected() {
        let (service, _, shipment) = service_with_shipment().await;
        service
            .request_transition(shipment.id, TransitionAction::Accept, &supplier())
            .await
            .unwrap();
        service
            .create_payment(&sender(), new_payment(&shipment, PaymentStatus::Pending))
            .await
            .unwrap();
        let err = service
            .create_payment(&sender(), new_payment(&shipment, PaymentStatus::Pending))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Payment(PaymentError::Duplicate { .. })
        ));
    }

    #[tokio::test]
    async fn only_admins_record_completed_payments() {
        let (service, _, shipment) = service_with_shipment().await;
        service
            .request_transition(shipment.id, TransitionAction::Accept, &supplier())
            .await
            .unwrap();
        let err = service
            .create_payment(&sender(), new_payment(&shipment, PaymentStatus::Completed))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Forbidden(_)));

        let payment = service
            .create_payment(
                &Caller::operator(),
                new_payment(&shipment, PaymentStatus::Completed),
            )
            .await
            .unwrap();
        assert!(payment.payment_date.is_some());
    }

    #[tokio::test]
    async fn gateway_event_applies_once() {
        let (service, _, shipment) = service_with_shipment().await;
        service
            .request_transition(shipment.id, TransitionAction::Accept, &supplier())
            .await
            .unwrap();
        service
            .create_payment(&sender(), new_payment(&shipment, PaymentStatus::Pending))
            .await
            .unwrap();
        let event = GatewayEvent::Captured {
            order_id: Some(format!("order_{}", shipment.id)),
            payment_id: "pay_live_1".into(),
        };
        let (_, first) = service.apply_gateway_event(&event).await.unwrap().unwrap();
        let (payment, second) = service.apply_gateway_event(&event).await.unwrap().unwrap();
        assert_eq!(first, PaymentUpdate::Applied);
        assert_eq!(second, PaymentUpdate::Unchanged);
        assert_eq!(payment.payment_status, PaymentStatus::Completed);
        assert_eq!(payment.gateway_payment_id.as_deref(), Some("pay_live_1"));
    }

    #[tokio::test]
    async fn late_capture_after_completed_retry_changes_nothing() {
        let (service, repo, shipment) = service_with_shipment().await;
        service
            .request_transition(shipment.id, TransitionAction::Accept, &supplier())
            .await
            .unwrap();
        let abandoned = service
            .create_payment(&sender(), new_payment(&shipment, PaymentStatus::Pending))
            .await
            .unwrap();
        let failed = GatewayEvent::Failed {
            order_id: abandoned.gateway_order_id.clone(),
            payment_id: "pay_a".into(),
        };
        service.apply_gateway_event(&failed).await.unwrap().unwrap();

        let mut retry = new_payment(&shipment, PaymentStatus::Pending);
        retry.gateway_order_id = Some("order_b".into());
        let retry = service.create_payment(&sender(), retry).await.unwrap();
        let captured = GatewayEvent::Captured {
            order_id: Some("order_b".into()),
            payment_id: "pay_b".into(),
        };
        service.apply_gateway_event(&captured).await.unwrap().unwrap();

        let late = GatewayEvent::Captured {
            order_id: abandoned.gateway_order_id.clone(),
            payment_id: "pay_a".into(),
        };
        let (payment, update) = service.apply_gateway_event(&late).await.unwrap().unwrap();
        assert_eq!(update, PaymentUpdate::Superseded);
        assert_eq!(payment.id, abandoned.id);

        let payments = repo.payments_for_shipment(shipment.id).await.unwrap();
        let status_of = |id: PaymentId| {
            payments
                .iter()
                .find(|p| p.id == id)
                .map(|p| p.payment_status)
        };
        assert_eq!(status_of(abandoned.id), Some(PaymentStatus::Failed));
        assert_eq!(status_of(retry.id), Some(PaymentStatus::Completed));
        assert_eq!(ledger_len(&repo, shipment.id).await, 2);
    }

    #[tokio::test]
    async fn sender_edits_shipment_until_frozen() {
        let (service, _, shipment) = service_with_shipment().await;
        let patch = || ShipmentPatch {
            special_instructions: Some("Leave at gate".into()),
            ..Default::default()
        };
        let err = service
            .update_shipment(&supplier(), shipment.id, ShipmentEdit::Patch(patch()))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Forbidden(_)));

        let updated = service
            .update_shipment(&sender(), shipment.id, ShipmentEdit::Patch(patch()))
            .await
            .unwrap();
        assert_eq!(updated.special_instructions.as_deref(), Some("Leave at gate"));

        service
            .request_transition(shipment.id, TransitionAction::Cancel, &sender())
            .await
            .unwrap();
        let err = service
            .update_shipment(&sender(), shipment.id, ShipmentEdit::Patch(patch()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Rejected(TransitionError::FinalState { .. })
        ));
    }

    #[tokio::test]
    async fn package_edit_is_owner_only() {
        let (service, _, shipment) = service_with_shipment().await;
        let patch = || PackagePatch {
            final_cost: Some(15_000),
            ..Default::default()
        };
        let err = service
            .update_package(&supplier(), shipment.package_id, PackageEdit::Patch(patch()))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Forbidden(_)));

        let updated = service
            .update_package(&sender(), shipment.package_id, PackageEdit::Patch(patch()))
            .await
            .unwrap();
        assert_eq!(updated.final_cost, Some(15_000));
        assert_eq!(updated.estimated_cost, Some(12_000));

        let bad = PackagePatch {
            weight: Some(0.0),
            ..Default::default()
        };
        let err = service
            .update_package(&Caller::operator(), shipment.package_id, PackageEdit::Patch(bad))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));
    }

    #[tokio::test]
    async fn eta_requires_in_transit_and_payment() {
        let (service, _, shipment) = service_with_shipment().await;
        let eta = Timestamp::now();
        let err = service
            .update_estimated_delivery(&supplier(), shipment.id, eta)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Rejected(TransitionError::Illegal { .. })
        ));

        let err = service
            .update_estimated_delivery(&sender(), shipment.id, eta)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Forbidden(_)));
    }

    #[tokio::test]
    async fn visibility_is_role_scoped() {
        let (service, _, shipment) = service_with_shipment().await;
        let stranger = Caller::new(UserId(99), Role::Supplier);
        let err = service
            .shipment_detail(&stranger, shipment.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Forbidden(_)));
        assert!(service
            .list_shipments(&stranger, None)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            service.list_shipments(&supplier(), None).await.unwrap().len(),
            1
        );

        let detail = service.shipment_detail(&sender(), shipment.id).await.unwrap();
        assert_eq!(detail.current_status, Some(ShipmentStatus::Pending));
        assert_eq!(detail.status_history.len(), 1);
        assert_eq!(detail.payment_status, None);
    }

    #[tokio::test]
    async fn shipment_needs_caller_owned_package() {
        let repo = MemoryRepository::new();
        let service = LifecycleService::new(Arc::new(repo));
        let package = service.create_package(&sender(), new_package()).await.unwrap();
        let other = Caller::new(UserId(11), Role::ImporterExporter);
        let mut new = new_shipment(package.id);
        new.sender_id = UserId(11);
        let err = service.create_shipment(&other, new).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Forbidden(_)));
    }

    #[tokio::test]
    async fn backfill_repairs_empty_ledgers() {
        let repo = MemoryRepository::new();
        let service = LifecycleService::new(Arc::new(repo.clone()));
        let package = service.create_package(&sender(), new_package()).await.unwrap();
        let legacy = repo.insert_shipment_without_ledger(new_shipment(package.id));

        assert!(matches!(
            service.current_status(legacy.id).await,
            Err(LifecycleError::NotFound(_))
        ));
        let report = service
            .backfill_initial_events(&Caller::operator())
            .await
            .unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.created, vec![legacy.id]);
        assert_eq!(
            service.current_status(legacy.id).await.unwrap().status,
            ShipmentStatus::Pending
        );

        let again = service
            .backfill_initial_events(&Caller::operator())
            .await
            .unwrap();
        assert_eq!(again, BackfillReport::default());
    }
}
