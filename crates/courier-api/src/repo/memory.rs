//! In-memory repository.
//!
//! All tables live behind a single `parking_lot::RwLock`, so every atomic
//! unit (check + write) runs under one write guard. The lock is never held
//! across an `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use courier_core::{
    PackageId, PaymentId, ShipmentId, StatusEventId, Timestamp, TrackingNumber, UserId,
};
use courier_state::ledger;
use courier_state::{
    EventAnnotation, GatewayEvent, NewPackage, NewPayment, NewShipment, NewStatusEvent, Package,
    PackageEdit, Payment, PaymentStatus, PaymentUpdate, Shipment, ShipmentEdit, ShipmentStatus,
    StatusEvent,
};

use super::{
    MutationCheck, PaymentCheck, PaymentFilter, RepositoryError, ShipmentFilter,
    ShipmentRepository, TransitionDecision,
};

#[derive(Debug, Default)]
struct Tables {
    packages: BTreeMap<PackageId, Package>,
    shipments: BTreeMap<ShipmentId, Shipment>,
    events: HashMap<ShipmentId, Vec<StatusEvent>>,
    payments: BTreeMap<PaymentId, Payment>,
    package_seq: i64,
    shipment_seq: i64,
    event_seq: i64,
    payment_seq: i64,
}

fn next(seq: &mut i64) -> i64 {
    *seq += 1;
    *seq
}

impl Tables {
    fn live_shipment(&self, id: ShipmentId) -> Result<&Shipment, RepositoryError> {
        self.shipments
            .get(&id)
            .filter(|s| !s.is_deleted)
            .ok_or_else(|| RepositoryError::NotFound(format!("shipment {id}")))
    }

    fn latest(&self, id: ShipmentId) -> Option<&StatusEvent> {
        self.events.get(&id).and_then(|rows| ledger::current(rows))
    }

    fn latest_or_missing(&self, id: ShipmentId) -> Result<StatusEvent, RepositoryError> {
        self.latest(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("status history of shipment {id}")))
    }

    /// Append a row stamped strictly after the current latest one.
    fn append(&mut self, new: NewStatusEvent) -> StatusEvent {
        let now = match self.latest(new.shipment_id) {
            Some(latest) => Timestamp::now().strictly_after(latest.created_at),
            None => Timestamp::now(),
        };
        let id = StatusEventId(next(&mut self.event_seq));
        let event = new.into_event(id, now);
        self.events
            .entry(event.shipment_id)
            .or_default()
            .push(event.clone());
        event
    }

    fn payments_of(&self, id: ShipmentId) -> Vec<Payment> {
        self.payments
            .values()
            .filter(|p| p.shipment_id == id)
            .cloned()
            .collect()
    }

    /// At most one live PENDING and one live COMPLETED payment per shipment.
    fn ensure_unique_status(
        &self,
        payment: &Payment,
        status: PaymentStatus,
    ) -> Result<(), RepositoryError> {
        if status == PaymentStatus::Failed {
            return Ok(());
        }
        let clash = self.payments.values().any(|p| {
            p.id != payment.id
                && p.shipment_id == payment.shipment_id
                && !p.is_deleted
                && p.payment_status == status
        });
        if clash {
            return Err(RepositoryError::Conflict(format!(
                "shipment {} already has a {status} payment",
                payment.shipment_id
            )));
        }
        Ok(())
    }
}

/// Repository keeping every table in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a shipment without its initial event. Models rows written
    /// before the ledger existed; used to exercise backfill.
    pub fn insert_shipment_without_ledger(&self, new: NewShipment) -> Shipment {
        let mut t = self.tables.write();
        let id = ShipmentId(next(&mut t.shipment_seq));
        let shipment = new.into_shipment(id, TrackingNumber::generate(), Timestamp::now());
        t.shipments.insert(id, shipment.clone());
        shipment
    }
}

#[async_trait]
impl ShipmentRepository for MemoryRepository {
    async fn insert_package(&self, new: NewPackage) -> Result<Package, RepositoryError> {
        let mut t = self.tables.write();
        let id = PackageId(next(&mut t.package_seq));
        let package = new.into_package(id, Timestamp::now());
        t.packages.insert(id, package.clone());
        Ok(package)
    }

    async fn get_package(&self, id: PackageId) -> Result<Option<Package>, RepositoryError> {
        Ok(self
            .tables
            .read()
            .packages
            .get(&id)
            .filter(|p| !p.is_deleted)
            .cloned())
    }

    async fn list_packages(&self, owner: Option<UserId>) -> Result<Vec<Package>, RepositoryError> {
        let t = self.tables.read();
        let mut packages: Vec<Package> = t
            .packages
            .values()
            .filter(|p| !p.is_deleted && owner.map_or(true, |o| p.user_id == o))
            .cloned()
            .collect();
        packages.sort_by_key(|p| std::cmp::Reverse((p.created_at, p.id)));
        Ok(packages)
    }

    async fn update_package(
        &self,
        id: PackageId,
        edit: PackageEdit,
    ) -> Result<Package, RepositoryError> {
        let mut t = self.tables.write();
        let package = t
            .packages
            .get_mut(&id)
            .filter(|p| !p.is_deleted)
            .ok_or_else(|| RepositoryError::NotFound(format!("package {id}")))?;
        let details = edit.resolve(package.details());
        details.validate()?;
        package.set_details(details, Timestamp::now());
        Ok(package.clone())
    }

    async fn create_shipment(
        &self,
        new: NewShipment,
    ) -> Result<(Shipment, StatusEvent), RepositoryError> {
        let mut t = self.tables.write();
        let id = ShipmentId(next(&mut t.shipment_seq));
        let shipment = new.into_shipment(id, TrackingNumber::generate(), Timestamp::now());
        t.shipments.insert(id, shipment.clone());
        let event = t.append(NewStatusEvent::initial(id, shipment.package_id));
        Ok((shipment, event))
    }

    async fn get_shipment(&self, id: ShipmentId) -> Result<Option<Shipment>, RepositoryError> {
        Ok(self
            .tables
            .read()
            .shipments
            .get(&id)
            .filter(|s| !s.is_deleted)
            .cloned())
    }

    async fn list_shipments(
        &self,
        filter: &ShipmentFilter,
    ) -> Result<Vec<Shipment>, RepositoryError> {
        let t = self.tables.read();
        let mut shipments: Vec<Shipment> = t
            .shipments
            .values()
            .filter(|s| !s.is_deleted)
            .filter(|s| filter.matches(s, t.latest(s.id).map(|e| e.status)))
            .cloned()
            .collect();
        shipments.sort_by_key(|s| std::cmp::Reverse((s.created_at, s.id)));
        Ok(shipments)
    }

    async fn update_estimated_delivery(
        &self,
        id: ShipmentId,
        eta: Timestamp,
        check: MutationCheck,
    ) -> Result<Shipment, RepositoryError> {
        let mut t = self.tables.write();
        t.live_shipment(id)?;
        let latest = t.latest_or_missing(id)?;
        check(&latest)?;
        let shipment = t
            .shipments
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("shipment {id}")))?;
        shipment.estimated_delivery = Some(eta);
        shipment.updated_at = Timestamp::now();
        Ok(shipment.clone())
    }

    async fn update_shipment(
        &self,
        id: ShipmentId,
        edit: ShipmentEdit,
        check: MutationCheck,
    ) -> Result<Shipment, RepositoryError> {
        let mut t = self.tables.write();
        let details = edit.resolve(t.live_shipment(id)?.details());
        let latest = t.latest_or_missing(id)?;
        check(&latest)?;
        details.validate()?;
        let shipment = t
            .shipments
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("shipment {id}")))?;
        shipment.set_details(details, Timestamp::now());
        Ok(shipment.clone())
    }

    async fn status_events(&self, id: ShipmentId) -> Result<Vec<StatusEvent>, RepositoryError> {
        Ok(self
            .tables
            .read()
            .events
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn latest_status_event(
        &self,
        id: ShipmentId,
    ) -> Result<Option<StatusEvent>, RepositoryError> {
        Ok(self.tables.read().latest(id).cloned())
    }

    async fn ensure_initial_event(
        &self,
        id: ShipmentId,
    ) -> Result<(StatusEvent, bool), RepositoryError> {
        let mut t = self.tables.write();
        let package_id = t.live_shipment(id)?.package_id;
        if let Some(latest) = t.latest(id) {
            return Ok((latest.clone(), false));
        }
        let event = t.append(NewStatusEvent::initial(id, package_id));
        Ok((event, true))
    }

    async fn append_transition(
        &self,
        id: ShipmentId,
        decide: TransitionDecision,
    ) -> Result<StatusEvent, RepositoryError> {
        let mut t = self.tables.write();
        let package_id = t.live_shipment(id)?.package_id;
        let latest = t.latest_or_missing(id)?;
        let next_status = decide(&latest)?;
        let event = t.append(NewStatusEvent::transition(id, package_id, next_status));
        if next_status == ShipmentStatus::Delivered {
            if let Some(shipment) = t.shipments.get_mut(&id) {
                shipment.delivery_date = Some(event.created_at);
                shipment.updated_at = event.created_at;
            }
        }
        Ok(event)
    }

    async fn annotate_latest_event(
        &self,
        id: ShipmentId,
        annotation: EventAnnotation,
        check: MutationCheck,
    ) -> Result<StatusEvent, RepositoryError> {
        let mut t = self.tables.write();
        t.live_shipment(id)?;
        let latest = t.latest_or_missing(id)?;
        check(&latest)?;
        let row = t
            .events
            .get_mut(&id)
            .and_then(|rows| rows.iter_mut().find(|e| e.id == latest.id))
            .ok_or_else(|| RepositoryError::NotFound(format!("status event {}", latest.id)))?;
        annotation.apply(row, Timestamp::now());
        Ok(row.clone())
    }

    async fn shipments_without_events(&self) -> Result<Vec<ShipmentId>, RepositoryError> {
        let t = self.tables.read();
        Ok(t.shipments
            .values()
            .filter(|s| !s.is_deleted && t.latest(s.id).is_none())
            .map(|s| s.id)
            .collect())
    }

    async fn payments_for_shipment(
        &self,
        id: ShipmentId,
    ) -> Result<Vec<Payment>, RepositoryError> {
        Ok(self.tables.read().payments_of(id))
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, RepositoryError> {
        Ok(self
            .tables
            .read()
            .payments
            .get(&id)
            .filter(|p| !p.is_deleted)
            .cloned())
    }

    async fn list_payments(
        &self,
        filter: &PaymentFilter,
    ) -> Result<Vec<Payment>, RepositoryError> {
        let t = self.tables.read();
        let mut payments: Vec<Payment> = t
            .payments
            .values()
            .filter(|p| !p.is_deleted)
            .filter(|p| filter.matches(p, t.shipments.get(&p.shipment_id)))
            .cloned()
            .collect();
        payments.sort_by_key(|p| std::cmp::Reverse((p.created_at, p.id)));
        Ok(payments)
    }

    async fn insert_payment(
        &self,
        new: NewPayment,
        check: PaymentCheck,
    ) -> Result<Payment, RepositoryError> {
        let mut t = self.tables.write();
        t.live_shipment(new.shipment_id)?;
        let latest = t.latest_or_missing(new.shipment_id)?;
        let existing = t.payments_of(new.shipment_id);
        check(&latest, &existing)?;
        let id = PaymentId(next(&mut t.payment_seq));
        let payment = new.into_payment(id, Timestamp::now());
        t.payments.insert(id, payment.clone());
        Ok(payment)
    }

    async fn set_payment_status(
        &self,
        id: PaymentId,
        status: PaymentStatus,
    ) -> Result<(Payment, PaymentUpdate), RepositoryError> {
        let mut t = self.tables.write();
        let current = t
            .payments
            .get(&id)
            .filter(|p| !p.is_deleted)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("payment {id}")))?;
        if current.payment_status != status {
            t.ensure_unique_status(&current, status)?;
        }
        let payment = t
            .payments
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("payment {id}")))?;
        let update = payment.set_status(status, Timestamp::now())?;
        Ok((payment.clone(), update))
    }

    async fn apply_gateway_event(
        &self,
        event: &GatewayEvent,
    ) -> Result<Option<(Payment, PaymentUpdate)>, RepositoryError> {
        let mut t = self.tables.write();
        let all: Vec<Payment> = t.payments.values().cloned().collect();
        let Some(found) = event.find(&all).cloned() else {
            return Ok(None);
        };
        if event.is_superseded(&found, &t.payments_of(found.shipment_id)) {
            return Ok(Some((found, PaymentUpdate::Superseded)));
        }
        let payment = t
            .payments
            .get_mut(&found.id)
            .ok_or_else(|| RepositoryError::NotFound(format!("payment {}", found.id)))?;
        let update = event.apply(payment, Timestamp::now());
        Ok(Some((payment.clone(), update)))
    }
}
