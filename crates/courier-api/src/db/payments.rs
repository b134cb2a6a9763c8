//! Payment persistence operations on the `payments` table.
//!
//! The partial unique index `uq_payments_open_status` backs the rule of at
//! most one live PENDING and one live COMPLETED payment per shipment.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgExecutor};

use courier_core::{PackageId, PaymentId, ShipmentId, Timestamp};
use courier_state::{NewPayment, Payment, PaymentMethod, PaymentStatus};

use super::{parse_column, row_id};
use crate::repo::PaymentFilter;

const COLUMNS: &str = "p.id, p.shipment_id, p.package_id, p.payment_method, p.payment_status, \
                       p.payment_date, p.gateway_order_id, p.gateway_payment_id, p.is_deleted, \
                       p.created_at, p.updated_at";

/// Name of the unique index guarding open payment statuses.
pub const OPEN_STATUS_INDEX: &str = "uq_payments_open_status";

pub async fn insert<'e>(
    exec: impl PgExecutor<'e>,
    new: &NewPayment,
    now: Timestamp,
) -> Result<Payment, sqlx::Error> {
    let payment_date = match (new.payment_status, new.payment_date) {
        (PaymentStatus::Completed, None) => Some(now),
        (_, date) => date,
    };
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
        "INSERT INTO payments AS p (shipment_id, package_id, payment_method, payment_status,
                                    payment_date, gateway_order_id, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
         RETURNING {COLUMNS}"
    ))
    .bind(new.shipment_id.get())
    .bind(new.package_id.get())
    .bind(new.payment_method.as_str())
    .bind(new.payment_status.as_str())
    .bind(payment_date.map(Timestamp::into_inner))
    .bind(&new.gateway_order_id)
    .bind(now.into_inner())
    .fetch_one(exec)
    .await?;

    row.into_record()
}

pub async fn get_by_id<'e>(
    exec: impl PgExecutor<'e>,
    id: PaymentId,
) -> Result<Option<Payment>, sqlx::Error> {
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {COLUMNS} FROM payments p WHERE p.id = $1 AND NOT p.is_deleted"
    ))
    .bind(id.get())
    .fetch_optional(exec)
    .await?;

    row.map(PaymentRow::into_record).transpose()
}

/// Lock a live payment row for the rest of the transaction.
pub async fn lock_for_update(
    conn: &mut PgConnection,
    id: PaymentId,
) -> Result<Option<Payment>, sqlx::Error> {
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {COLUMNS} FROM payments p WHERE p.id = $1 AND NOT p.is_deleted FOR UPDATE"
    ))
    .bind(id.get())
    .fetch_optional(conn)
    .await?;

    row.map(PaymentRow::into_record).transpose()
}

/// Every payment of a shipment, deleted ones included.
pub async fn list_for_shipment<'e>(
    exec: impl PgExecutor<'e>,
    shipment_id: ShipmentId,
) -> Result<Vec<Payment>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {COLUMNS} FROM payments p WHERE p.shipment_id = $1 ORDER BY p.created_at, p.id"
    ))
    .bind(shipment_id.get())
    .fetch_all(exec)
    .await?;

    rows.into_iter().map(PaymentRow::into_record).collect()
}

/// Live payments matching `filter`, newest first.
pub async fn list<'e>(
    exec: impl PgExecutor<'e>,
    filter: &PaymentFilter,
) -> Result<Vec<Payment>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {COLUMNS} FROM payments p
         JOIN shipments s ON s.id = p.shipment_id
         WHERE NOT p.is_deleted
           AND ($1::BIGINT IS NULL OR s.sender_id = $1)
           AND ($2::BIGINT IS NULL OR s.courier_id = $2)
           AND ($3::BIGINT IS NULL OR p.shipment_id = $3)
           AND ($4::TEXT IS NULL OR p.payment_status = $4)
         ORDER BY p.created_at DESC, p.id DESC"
    ))
    .bind(filter.sender_id.map(|id| id.get()))
    .bind(filter.courier_id.map(|id| id.get()))
    .bind(filter.shipment_id.map(|id| id.get()))
    .bind(filter.status.map(|s| s.as_str()))
    .fetch_all(exec)
    .await?;

    rows.into_iter().map(PaymentRow::into_record).collect()
}

/// Find the live payment a gateway event refers to: by gateway payment id
/// first, then by gateway order id. Among payments sharing an order id, one
/// that has not FAILED wins, then the newest. Locks the row.
pub async fn lock_by_gateway_ids(
    conn: &mut PgConnection,
    payment_id: &str,
    order_id: Option<&str>,
) -> Result<Option<Payment>, sqlx::Error> {
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
        "SELECT {COLUMNS} FROM payments p
         WHERE NOT p.is_deleted
           AND (p.gateway_payment_id = $1 OR ($2::TEXT IS NOT NULL AND p.gateway_order_id = $2))
         ORDER BY (p.gateway_payment_id = $1) DESC NULLS LAST,
                  (p.payment_status <> 'FAILED') DESC,
                  p.created_at DESC,
                  p.id DESC
         LIMIT 1
         FOR UPDATE"
    ))
    .bind(payment_id)
    .bind(order_id)
    .fetch_optional(conn)
    .await?;

    row.map(PaymentRow::into_record).transpose()
}

/// Write back status, payment date, and gateway payment id.
pub async fn update_status<'e>(
    exec: impl PgExecutor<'e>,
    payment: &Payment,
) -> Result<Payment, sqlx::Error> {
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
        "UPDATE payments AS p
         SET payment_status = $1, payment_date = $2, gateway_payment_id = $3, updated_at = $4
         WHERE p.id = $5
         RETURNING {COLUMNS}"
    ))
    .bind(payment.payment_status.as_str())
    .bind(payment.payment_date.map(Timestamp::into_inner))
    .bind(&payment.gateway_payment_id)
    .bind(payment.updated_at.into_inner())
    .bind(payment.id.get())
    .fetch_one(exec)
    .await?;

    row.into_record()
}

/// Whether `err` is a violation of [`OPEN_STATUS_INDEX`].
pub fn is_open_status_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.constraint() == Some(OPEN_STATUS_INDEX),
        _ => false,
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: i64,
    shipment_id: i64,
    package_id: i64,
    payment_method: String,
    payment_status: String,
    payment_date: Option<DateTime<Utc>>,
    gateway_order_id: Option<String>,
    gateway_payment_id: Option<String>,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_record(self) -> Result<Payment, sqlx::Error> {
        Ok(Payment {
            id: row_id("id", self.id, PaymentId::new)?,
            shipment_id: row_id("shipment_id", self.shipment_id, ShipmentId::new)?,
            package_id: row_id("package_id", self.package_id, PackageId::new)?,
            payment_method: parse_column::<PaymentMethod>("payment_method", &self.payment_method)?,
            payment_status: parse_column::<PaymentStatus>("payment_status", &self.payment_status)?,
            payment_date: self.payment_date.map(Timestamp::from_utc),
            gateway_order_id: self.gateway_order_id,
            gateway_payment_id: self.gateway_payment_id,
            is_deleted: self.is_deleted,
            created_at: Timestamp::from_utc(self.created_at),
            updated_at: Timestamp::from_utc(self.updated_at),
        })
    }
}
