//! Postgres repository.
//!
//! Every check-then-write unit runs in one transaction that starts with
//! `SELECT ... FOR UPDATE` on the shipment row. Two requests for the same
//! shipment therefore serialize on that lock, and the second one reads the
//! ledger row the first one appended.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use courier_core::{PackageId, PaymentId, ShipmentId, Timestamp, TrackingNumber, UserId};
use courier_state::{
    EventAnnotation, GatewayEvent, NewPackage, NewPayment, NewShipment, NewStatusEvent, Package,
    PackageEdit, Payment, PaymentStatus, PaymentUpdate, Shipment, ShipmentEdit, ShipmentStatus,
    StatusEvent,
};

use super::{
    MutationCheck, PaymentCheck, PaymentFilter, RepositoryError, ShipmentFilter,
    ShipmentRepository, TransitionDecision,
};
use crate::db::{packages, payments, shipments, status_events};

/// Repository backed by a Postgres connection pool.
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn locked_shipment(
    conn: &mut PgConnection,
    id: ShipmentId,
) -> Result<Shipment, RepositoryError> {
    shipments::lock_for_update(conn, id)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("shipment {id}")))
}

async fn latest_or_missing(
    conn: &mut PgConnection,
    id: ShipmentId,
) -> Result<StatusEvent, RepositoryError> {
    status_events::latest(conn, id)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("status history of shipment {id}")))
}

/// Map a write that tripped the open-status index to a conflict.
fn payment_write_error(
    err: sqlx::Error,
    shipment_id: ShipmentId,
    status: PaymentStatus,
) -> RepositoryError {
    if payments::is_open_status_violation(&err) {
        return RepositoryError::Conflict(format!(
            "shipment {shipment_id} already has a {status} payment"
        ));
    }
    RepositoryError::Database(err)
}

#[async_trait]
impl ShipmentRepository for PgRepository {
    async fn insert_package(&self, new: NewPackage) -> Result<Package, RepositoryError> {
        Ok(packages::insert(&self.pool, &new, Timestamp::now()).await?)
    }

    async fn get_package(&self, id: PackageId) -> Result<Option<Package>, RepositoryError> {
        Ok(packages::get_by_id(&self.pool, id).await?)
    }

    async fn list_packages(&self, owner: Option<UserId>) -> Result<Vec<Package>, RepositoryError> {
        Ok(packages::list(&self.pool, owner).await?)
    }

    async fn update_package(
        &self,
        id: PackageId,
        edit: PackageEdit,
    ) -> Result<Package, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let current = packages::lock_for_update(&mut tx, id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("package {id}")))?;
        let details = edit.resolve(current.details());
        details.validate()?;
        let package = packages::update_details(&mut *tx, id, &details, Timestamp::now())
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("package {id}")))?;
        tx.commit().await?;
        Ok(package)
    }

    async fn create_shipment(
        &self,
        new: NewShipment,
    ) -> Result<(Shipment, StatusEvent), RepositoryError> {
        let now = Timestamp::now();
        let mut tx = self.pool.begin().await?;
        let shipment = shipments::insert(&mut *tx, &new, &TrackingNumber::generate(), now).await?;
        let event = status_events::insert(
            &mut *tx,
            &NewStatusEvent::initial(shipment.id, shipment.package_id),
            now,
        )
        .await?;
        tx.commit().await?;
        Ok((shipment, event))
    }

    async fn get_shipment(&self, id: ShipmentId) -> Result<Option<Shipment>, RepositoryError> {
        Ok(shipments::get_by_id(&self.pool, id).await?)
    }

    async fn list_shipments(
        &self,
        filter: &ShipmentFilter,
    ) -> Result<Vec<Shipment>, RepositoryError> {
        Ok(shipments::list(&self.pool, filter).await?)
    }

    async fn update_estimated_delivery(
        &self,
        id: ShipmentId,
        eta: Timestamp,
        check: MutationCheck,
    ) -> Result<Shipment, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        locked_shipment(&mut tx, id).await?;
        let latest = latest_or_missing(&mut tx, id).await?;
        check(&latest)?;
        let shipment = shipments::update_estimated_delivery(&mut *tx, id, eta, Timestamp::now())
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("shipment {id}")))?;
        tx.commit().await?;
        Ok(shipment)
    }

    async fn update_shipment(
        &self,
        id: ShipmentId,
        edit: ShipmentEdit,
        check: MutationCheck,
    ) -> Result<Shipment, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let current = locked_shipment(&mut tx, id).await?;
        let latest = latest_or_missing(&mut tx, id).await?;
        check(&latest)?;
        let details = edit.resolve(current.details());
        details.validate()?;
        let shipment = shipments::update_details(&mut *tx, id, &details, Timestamp::now())
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("shipment {id}")))?;
        tx.commit().await?;
        Ok(shipment)
    }

    async fn status_events(&self, id: ShipmentId) -> Result<Vec<StatusEvent>, RepositoryError> {
        Ok(status_events::list_for_shipment(&self.pool, id).await?)
    }

    async fn latest_status_event(
        &self,
        id: ShipmentId,
    ) -> Result<Option<StatusEvent>, RepositoryError> {
        Ok(status_events::latest(&self.pool, id).await?)
    }

    async fn ensure_initial_event(
        &self,
        id: ShipmentId,
    ) -> Result<(StatusEvent, bool), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let shipment = locked_shipment(&mut tx, id).await?;
        if let Some(latest) = status_events::latest(&mut *tx, id).await? {
            tx.commit().await?;
            return Ok((latest, false));
        }
        let event = status_events::insert(
            &mut *tx,
            &NewStatusEvent::initial(id, shipment.package_id),
            Timestamp::now(),
        )
        .await?;
        tx.commit().await?;
        Ok((event, true))
    }

    async fn append_transition(
        &self,
        id: ShipmentId,
        decide: TransitionDecision,
    ) -> Result<StatusEvent, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let shipment = locked_shipment(&mut tx, id).await?;
        let latest = latest_or_missing(&mut tx, id).await?;
        // Dropping `tx` on the error path rolls back and releases the lock.
        let next_status = decide(&latest)?;
        let event = status_events::insert(
            &mut *tx,
            &NewStatusEvent::transition(id, shipment.package_id, next_status),
            Timestamp::now().strictly_after(latest.created_at),
        )
        .await?;
        if next_status == ShipmentStatus::Delivered {
            shipments::set_delivery_date(&mut *tx, id, event.created_at).await?;
        }
        tx.commit().await?;
        Ok(event)
    }

    async fn annotate_latest_event(
        &self,
        id: ShipmentId,
        annotation: EventAnnotation,
        check: MutationCheck,
    ) -> Result<StatusEvent, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        locked_shipment(&mut tx, id).await?;
        let mut latest = latest_or_missing(&mut tx, id).await?;
        check(&latest)?;
        annotation.apply(&mut latest, Timestamp::now());
        let event = status_events::update_annotations(&mut *tx, &latest).await?;
        tx.commit().await?;
        Ok(event)
    }

    async fn shipments_without_events(&self) -> Result<Vec<ShipmentId>, RepositoryError> {
        Ok(shipments::ids_without_events(&self.pool).await?)
    }

    async fn payments_for_shipment(
        &self,
        id: ShipmentId,
    ) -> Result<Vec<Payment>, RepositoryError> {
        Ok(payments::list_for_shipment(&self.pool, id).await?)
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, RepositoryError> {
        Ok(payments::get_by_id(&self.pool, id).await?)
    }

    async fn list_payments(
        &self,
        filter: &PaymentFilter,
    ) -> Result<Vec<Payment>, RepositoryError> {
        Ok(payments::list(&self.pool, filter).await?)
    }

    async fn insert_payment(
        &self,
        new: NewPayment,
        check: PaymentCheck,
    ) -> Result<Payment, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        locked_shipment(&mut tx, new.shipment_id).await?;
        let latest = latest_or_missing(&mut tx, new.shipment_id).await?;
        let existing = payments::list_for_shipment(&mut *tx, new.shipment_id).await?;
        check(&latest, &existing)?;
        let payment = payments::insert(&mut *tx, &new, Timestamp::now())
            .await
            .map_err(|e| payment_write_error(e, new.shipment_id, new.payment_status))?;
        tx.commit().await?;
        Ok(payment)
    }

    async fn set_payment_status(
        &self,
        id: PaymentId,
        status: PaymentStatus,
    ) -> Result<(Payment, PaymentUpdate), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut payment = payments::lock_for_update(&mut tx, id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("payment {id}")))?;
        let update = payment.set_status(status, Timestamp::now())?;
        if update == PaymentUpdate::Unchanged {
            tx.commit().await?;
            return Ok((payment, update));
        }
        let stored = payments::update_status(&mut *tx, &payment)
            .await
            .map_err(|e| payment_write_error(e, payment.shipment_id, status))?;
        tx.commit().await?;
        Ok((stored, update))
    }

    async fn apply_gateway_event(
        &self,
        event: &GatewayEvent,
    ) -> Result<Option<(Payment, PaymentUpdate)>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let found =
            payments::lock_by_gateway_ids(&mut tx, event.payment_id(), event.order_id()).await?;
        let Some(mut payment) = found else {
            tx.commit().await?;
            return Ok(None);
        };
        // Captures for sibling payments of one shipment serialize here.
        shipments::lock_for_update(&mut tx, payment.shipment_id).await?;
        let siblings = payments::list_for_shipment(&mut *tx, payment.shipment_id).await?;
        if event.is_superseded(&payment, &siblings) {
            tx.commit().await?;
            return Ok(Some((payment, PaymentUpdate::Superseded)));
        }
        let before = payment.clone();
        let update = event.apply(&mut payment, Timestamp::now());
        if update == PaymentUpdate::Unchanged {
            tx.commit().await?;
            return Ok(Some((payment, update)));
        }
        let stored = match payments::update_status(&mut *tx, &payment).await {
            Ok(stored) => stored,
            // Dropping `tx` rolls back; the stored row is still `before`.
            Err(e) if payments::is_open_status_violation(&e) => {
                return Ok(Some((before, PaymentUpdate::Superseded)));
            }
            Err(e) => return Err(e.into()),
        };
        tx.commit().await?;
        Ok(Some((stored, update)))
    }
}
