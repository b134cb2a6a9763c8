//! Shipment persistence operations on the `shipments` table.
//!
//! The table has no status column. Listing by status joins the latest live
//! row of `status_events`.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgExecutor};

use courier_core::{PackageId, ShipmentId, Timestamp, TrackingNumber, UserId};
use courier_state::{NewShipment, Shipment, ShipmentDetails, ShipmentType};

use super::{parse_column, row_id};
use crate::repo::ShipmentFilter;

const COLUMNS: &str = "s.id, s.tracking_number, s.sender_id, s.sender_name, s.sender_phone, \
                       s.sender_email, s.pickup_address, s.recipient_name, s.recipient_phone, \
                       s.recipient_email, s.delivery_address, s.courier_id, s.shipment_type, \
                       s.package_id, s.pickup_date, s.delivery_date, s.estimated_delivery, \
                       s.special_instructions, s.insurance_required, s.signature_required, \
                       s.is_deleted, s.created_at, s.updated_at";

/// Insert a shipment and return the stored row.
pub async fn insert<'e>(
    exec: impl PgExecutor<'e>,
    new: &NewShipment,
    tracking_number: &TrackingNumber,
    now: Timestamp,
) -> Result<Shipment, sqlx::Error> {
    let row = sqlx::query_as::<_, ShipmentRow>(&format!(
        "INSERT INTO shipments AS s (
             tracking_number, sender_id, sender_name, sender_phone, sender_email,
             pickup_address, recipient_name, recipient_phone, recipient_email,
             delivery_address, courier_id, shipment_type, package_id, pickup_date,
             special_instructions, insurance_required, signature_required,
             created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $18)
         RETURNING {COLUMNS}"
    ))
    .bind(tracking_number.as_str())
    .bind(new.sender_id.get())
    .bind(&new.sender_name)
    .bind(&new.sender_phone)
    .bind(&new.sender_email)
    .bind(&new.pickup_address)
    .bind(&new.recipient_name)
    .bind(&new.recipient_phone)
    .bind(&new.recipient_email)
    .bind(&new.delivery_address)
    .bind(new.courier_id.get())
    .bind(new.shipment_type.as_str())
    .bind(new.package_id.get())
    .bind(new.pickup_date.map(Timestamp::into_inner))
    .bind(&new.special_instructions)
    .bind(new.insurance_required)
    .bind(new.signature_required)
    .bind(now.into_inner())
    .fetch_one(exec)
    .await?;

    row.into_record()
}

/// Fetch a non-deleted shipment by ID.
pub async fn get_by_id<'e>(
    exec: impl PgExecutor<'e>,
    id: ShipmentId,
) -> Result<Option<Shipment>, sqlx::Error> {
    let row = sqlx::query_as::<_, ShipmentRow>(&format!(
        "SELECT {COLUMNS} FROM shipments s WHERE s.id = $1 AND NOT s.is_deleted"
    ))
    .bind(id.get())
    .fetch_optional(exec)
    .await?;

    row.map(ShipmentRow::into_record).transpose()
}

/// Lock a non-deleted shipment row for the rest of the transaction.
pub async fn lock_for_update(
    conn: &mut PgConnection,
    id: ShipmentId,
) -> Result<Option<Shipment>, sqlx::Error> {
    let row = sqlx::query_as::<_, ShipmentRow>(&format!(
        "SELECT {COLUMNS} FROM shipments s WHERE s.id = $1 AND NOT s.is_deleted FOR UPDATE"
    ))
    .bind(id.get())
    .fetch_optional(conn)
    .await?;

    row.map(ShipmentRow::into_record).transpose()
}

/// List non-deleted shipments matching `filter`, newest first.
pub async fn list<'e>(
    exec: impl PgExecutor<'e>,
    filter: &ShipmentFilter,
) -> Result<Vec<Shipment>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ShipmentRow>(&format!(
        "SELECT {COLUMNS} FROM shipments s
         LEFT JOIN LATERAL (
             SELECT e.status FROM status_events e
             WHERE e.shipment_id = s.id AND NOT e.is_deleted
             ORDER BY e.created_at DESC, e.id DESC
             LIMIT 1
         ) latest ON TRUE
         WHERE NOT s.is_deleted
           AND ($1::BIGINT IS NULL OR s.sender_id = $1)
           AND ($2::BIGINT IS NULL OR s.courier_id = $2)
           AND ($3::TEXT IS NULL OR latest.status = $3)
         ORDER BY s.created_at DESC, s.id DESC"
    ))
    .bind(filter.sender_id.map(|id| id.get()))
    .bind(filter.courier_id.map(|id| id.get()))
    .bind(filter.status.map(|s| s.as_str()))
    .fetch_all(exec)
    .await?;

    rows.into_iter().map(ShipmentRow::into_record).collect()
}

/// Set the estimated delivery date.
pub async fn update_estimated_delivery<'e>(
    exec: impl PgExecutor<'e>,
    id: ShipmentId,
    eta: Timestamp,
    now: Timestamp,
) -> Result<Option<Shipment>, sqlx::Error> {
    let row = sqlx::query_as::<_, ShipmentRow>(&format!(
        "UPDATE shipments AS s SET estimated_delivery = $1, updated_at = $2
         WHERE s.id = $3 AND NOT s.is_deleted
         RETURNING {COLUMNS}"
    ))
    .bind(eta.into_inner())
    .bind(now.into_inner())
    .bind(id.get())
    .fetch_optional(exec)
    .await?;

    row.map(ShipmentRow::into_record).transpose()
}

/// Overwrite the sender-editable columns.
pub async fn update_details<'e>(
    exec: impl PgExecutor<'e>,
    id: ShipmentId,
    details: &ShipmentDetails,
    now: Timestamp,
) -> Result<Option<Shipment>, sqlx::Error> {
    let row = sqlx::query_as::<_, ShipmentRow>(&format!(
        "UPDATE shipments AS s
         SET sender_name = $1, sender_phone = $2, sender_email = $3, pickup_address = $4,
             recipient_name = $5, recipient_phone = $6, recipient_email = $7,
             delivery_address = $8, shipment_type = $9, pickup_date = $10,
             special_instructions = $11, insurance_required = $12, signature_required = $13,
             updated_at = $14
         WHERE s.id = $15 AND NOT s.is_deleted
         RETURNING {COLUMNS}"
    ))
    .bind(&details.sender_name)
    .bind(&details.sender_phone)
    .bind(&details.sender_email)
    .bind(&details.pickup_address)
    .bind(&details.recipient_name)
    .bind(&details.recipient_phone)
    .bind(&details.recipient_email)
    .bind(&details.delivery_address)
    .bind(details.shipment_type.as_str())
    .bind(details.pickup_date.map(Timestamp::into_inner))
    .bind(&details.special_instructions)
    .bind(details.insurance_required)
    .bind(details.signature_required)
    .bind(now.into_inner())
    .bind(id.get())
    .fetch_optional(exec)
    .await?;

    row.map(ShipmentRow::into_record).transpose()
}

/// Record when the shipment was delivered.
pub async fn set_delivery_date<'e>(
    exec: impl PgExecutor<'e>,
    id: ShipmentId,
    delivered_at: Timestamp,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE shipments SET delivery_date = $1, updated_at = $1 WHERE id = $2")
        .bind(delivered_at.into_inner())
        .bind(id.get())
        .execute(exec)
        .await?;
    Ok(())
}

/// IDs of live shipments whose ledger has no live rows.
pub async fn ids_without_events<'e>(
    exec: impl PgExecutor<'e>,
) -> Result<Vec<ShipmentId>, sqlx::Error> {
    let ids: Vec<i64> = sqlx::query_scalar(
        "SELECT s.id FROM shipments s
         WHERE NOT s.is_deleted
           AND NOT EXISTS (
               SELECT 1 FROM status_events e
               WHERE e.shipment_id = s.id AND NOT e.is_deleted)
         ORDER BY s.id",
    )
    .fetch_all(exec)
    .await?;

    ids.into_iter()
        .map(|id| row_id("id", id, ShipmentId::new))
        .collect()
}

#[derive(sqlx::FromRow)]
struct ShipmentRow {
    id: i64,
    tracking_number: String,
    sender_id: i64,
    sender_name: String,
    sender_phone: String,
    sender_email: Option<String>,
    pickup_address: String,
    recipient_name: String,
    recipient_phone: String,
    recipient_email: Option<String>,
    delivery_address: Option<String>,
    courier_id: i64,
    shipment_type: String,
    package_id: i64,
    pickup_date: Option<DateTime<Utc>>,
    delivery_date: Option<DateTime<Utc>>,
    estimated_delivery: Option<DateTime<Utc>>,
    special_instructions: Option<String>,
    insurance_required: bool,
    signature_required: bool,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ShipmentRow {
    fn into_record(self) -> Result<Shipment, sqlx::Error> {
        Ok(Shipment {
            id: row_id("id", self.id, ShipmentId::new)?,
            tracking_number: parse_tracking(&self.tracking_number)?,
            sender_id: row_id("sender_id", self.sender_id, UserId::new)?,
            sender_name: self.sender_name,
            sender_phone: self.sender_phone,
            sender_email: self.sender_email,
            pickup_address: self.pickup_address,
            recipient_name: self.recipient_name,
            recipient_phone: self.recipient_phone,
            recipient_email: self.recipient_email,
            delivery_address: self.delivery_address,
            courier_id: row_id("courier_id", self.courier_id, UserId::new)?,
            shipment_type: parse_column::<ShipmentType>("shipment_type", &self.shipment_type)?,
            package_id: row_id("package_id", self.package_id, PackageId::new)?,
            pickup_date: self.pickup_date.map(Timestamp::from_utc),
            delivery_date: self.delivery_date.map(Timestamp::from_utc),
            estimated_delivery: self.estimated_delivery.map(Timestamp::from_utc),
            special_instructions: self.special_instructions,
            insurance_required: self.insurance_required,
            signature_required: self.signature_required,
            is_deleted: self.is_deleted,
            created_at: Timestamp::from_utc(self.created_at),
            updated_at: Timestamp::from_utc(self.updated_at),
        })
    }
}

fn parse_tracking(value: &str) -> Result<TrackingNumber, sqlx::Error> {
    TrackingNumber::parse(value).map_err(|e| sqlx::Error::ColumnDecode {
        index: "tracking_number".to_string(),
        source: Box::new(e),
    })
}
