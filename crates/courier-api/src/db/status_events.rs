//! Status ledger persistence on the `status_events` table.
//!
//! Rows are only ever inserted. The single UPDATE here touches the
//! annotation columns and `updated_at`, never `status` or `created_at`.

use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

use courier_core::{PackageId, ShipmentId, StatusEventId, Timestamp};
use courier_state::{NewStatusEvent, ShipmentStatus, StatusEvent};

use super::{parse_column, row_id};

const COLUMNS: &str = "id, shipment_id, package_id, status, current_location, is_delivered, \
                       is_deleted, created_at, updated_at";

/// Append one event to the ledger.
pub async fn insert<'e>(
    exec: impl PgExecutor<'e>,
    new: &NewStatusEvent,
    now: Timestamp,
) -> Result<StatusEvent, sqlx::Error> {
    let row = sqlx::query_as::<_, StatusEventRow>(&format!(
        "INSERT INTO status_events (shipment_id, package_id, status, current_location,
                                    is_delivered, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $6)
         RETURNING {COLUMNS}"
    ))
    .bind(new.shipment_id.get())
    .bind(new.package_id.get())
    .bind(new.status.as_str())
    .bind(&new.current_location)
    .bind(new.is_delivered)
    .bind(now.into_inner())
    .fetch_one(exec)
    .await?;

    row.into_record()
}

/// The authoritative current event: live row with greatest `(created_at, id)`.
pub async fn latest<'e>(
    exec: impl PgExecutor<'e>,
    shipment_id: ShipmentId,
) -> Result<Option<StatusEvent>, sqlx::Error> {
    let row = sqlx::query_as::<_, StatusEventRow>(&format!(
        "SELECT {COLUMNS} FROM status_events
         WHERE shipment_id = $1 AND NOT is_deleted
         ORDER BY created_at DESC, id DESC
         LIMIT 1"
    ))
    .bind(shipment_id.get())
    .fetch_optional(exec)
    .await?;

    row.map(StatusEventRow::into_record).transpose()
}

/// Every row of a shipment's ledger, deleted ones included, oldest first.
pub async fn list_for_shipment<'e>(
    exec: impl PgExecutor<'e>,
    shipment_id: ShipmentId,
) -> Result<Vec<StatusEvent>, sqlx::Error> {
    let rows = sqlx::query_as::<_, StatusEventRow>(&format!(
        "SELECT {COLUMNS} FROM status_events
         WHERE shipment_id = $1
         ORDER BY created_at, id"
    ))
    .bind(shipment_id.get())
    .fetch_all(exec)
    .await?;

    rows.into_iter().map(StatusEventRow::into_record).collect()
}

/// Write back the annotation columns of an event.
pub async fn update_annotations<'e>(
    exec: impl PgExecutor<'e>,
    event: &StatusEvent,
) -> Result<StatusEvent, sqlx::Error> {
    let row = sqlx::query_as::<_, StatusEventRow>(&format!(
        "UPDATE status_events
         SET current_location = $1, is_delivered = $2, updated_at = $3
         WHERE id = $4
         RETURNING {COLUMNS}"
    ))
    .bind(&event.current_location)
    .bind(event.is_delivered)
    .bind(event.updated_at.into_inner())
    .bind(event.id.get())
    .fetch_one(exec)
    .await?;

    row.into_record()
}

#[derive(sqlx::FromRow)]
struct StatusEventRow {
    id: i64,
    shipment_id: i64,
    package_id: i64,
    status: String,
    current_location: Option<String>,
    is_delivered: bool,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StatusEventRow {
    fn into_record(self) -> Result<StatusEvent, sqlx::Error> {
        Ok(StatusEvent {
            id: row_id("id", self.id, StatusEventId::new)?,
            shipment_id: row_id("shipment_id", self.shipment_id, ShipmentId::new)?,
            package_id: row_id("package_id", self.package_id, PackageId::new)?,
            status: parse_column::<ShipmentStatus>("status", &self.status)?,
            current_location: self.current_location,
            is_delivered: self.is_delivered,
            is_deleted: self.is_deleted,
            created_at: Timestamp::from_utc(self.created_at),
            updated_at: Timestamp::from_utc(self.updated_at),
        })
    }
}
