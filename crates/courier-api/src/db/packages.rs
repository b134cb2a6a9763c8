//! Package persistence operations on the `packages` table.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgExecutor};

use courier_core::{PackageId, Timestamp, UserId};
use courier_state::{NewPackage, Package, PackageDetails, PackageType};

use super::{parse_column, row_id};

const COLUMNS: &str = "id, user_id, package_type, weight, length, width, height, is_negotiable, \
                       currency, estimated_cost, final_cost, is_deleted, created_at, updated_at";

/// Insert a package and return the stored row.
pub async fn insert<'e>(
    exec: impl PgExecutor<'e>,
    new: &NewPackage,
    now: Timestamp,
) -> Result<Package, sqlx::Error> {
    let row = sqlx::query_as::<_, PackageRow>(&format!(
        "INSERT INTO packages (user_id, package_type, weight, length, width, height, \
                               is_negotiable, currency, estimated_cost, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
         RETURNING {COLUMNS}"
    ))
    .bind(new.user_id.get())
    .bind(new.package_type.as_str())
    .bind(new.weight)
    .bind(new.length)
    .bind(new.width)
    .bind(new.height)
    .bind(new.is_negotiable)
    .bind(&new.currency)
    .bind(new.estimated_cost)
    .bind(now.into_inner())
    .fetch_one(exec)
    .await?;

    row.into_record()
}

/// Fetch a non-deleted package by ID.
pub async fn get_by_id<'e>(
    exec: impl PgExecutor<'e>,
    id: PackageId,
) -> Result<Option<Package>, sqlx::Error> {
    let row = sqlx::query_as::<_, PackageRow>(&format!(
        "SELECT {COLUMNS} FROM packages WHERE id = $1 AND NOT is_deleted"
    ))
    .bind(id.get())
    .fetch_optional(exec)
    .await?;

    row.map(PackageRow::into_record).transpose()
}

/// Lock a non-deleted package row for the rest of the transaction.
pub async fn lock_for_update(
    conn: &mut PgConnection,
    id: PackageId,
) -> Result<Option<Package>, sqlx::Error> {
    let row = sqlx::query_as::<_, PackageRow>(&format!(
        "SELECT {COLUMNS} FROM packages WHERE id = $1 AND NOT is_deleted FOR UPDATE"
    ))
    .bind(id.get())
    .fetch_optional(conn)
    .await?;

    row.map(PackageRow::into_record).transpose()
}

/// Overwrite the owner-editable columns.
pub async fn update_details<'e>(
    exec: impl PgExecutor<'e>,
    id: PackageId,
    details: &PackageDetails,
    now: Timestamp,
) -> Result<Option<Package>, sqlx::Error> {
    let row = sqlx::query_as::<_, PackageRow>(&format!(
        "UPDATE packages
         SET package_type = $1, weight = $2, length = $3, width = $4, height = $5,
             is_negotiable = $6, currency = $7, estimated_cost = $8, final_cost = $9,
             updated_at = $10
         WHERE id = $11 AND NOT is_deleted
         RETURNING {COLUMNS}"
    ))
    .bind(details.package_type.as_str())
    .bind(details.weight)
    .bind(details.length)
    .bind(details.width)
    .bind(details.height)
    .bind(details.is_negotiable)
    .bind(&details.currency)
    .bind(details.estimated_cost)
    .bind(details.final_cost)
    .bind(now.into_inner())
    .bind(id.get())
    .fetch_optional(exec)
    .await?;

    row.map(PackageRow::into_record).transpose()
}

/// List non-deleted packages, optionally restricted to one owner, newest first.
pub async fn list<'e>(
    exec: impl PgExecutor<'e>,
    owner: Option<UserId>,
) -> Result<Vec<Package>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PackageRow>(&format!(
        "SELECT {COLUMNS} FROM packages
         WHERE NOT is_deleted AND ($1::BIGINT IS NULL OR user_id = $1)
         ORDER BY created_at DESC, id DESC"
    ))
    .bind(owner.map(|o| o.get()))
    .fetch_all(exec)
    .await?;

    rows.into_iter().map(PackageRow::into_record).collect()
}

#[derive(sqlx::FromRow)]
struct PackageRow {
    id: i64,
    user_id: i64,
    package_type: String,
    weight: f64,
    length: f64,
    width: f64,
    height: f64,
    is_negotiable: bool,
    currency: String,
    estimated_cost: Option<i64>,
    final_cost: Option<i64>,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PackageRow {
    fn into_record(self) -> Result<Package, sqlx::Error> {
        Ok(Package {
            id: row_id("id", self.id, PackageId::new)?,
            user_id: row_id("user_id", self.user_id, UserId::new)?,
            package_type: parse_column::<PackageType>("package_type", &self.package_type)?,
            weight: self.weight,
            length: self.length,
            width: self.width,
            height: self.height,
            is_negotiable: self.is_negotiable,
            currency: self.currency.trim().to_string(),
            estimated_cost: self.estimated_cost,
            final_cost: self.final_cost,
            is_deleted: self.is_deleted,
            created_at: Timestamp::from_utc(self.created_at),
            updated_at: Timestamp::from_utc(self.updated_at),
        })
    }
}
