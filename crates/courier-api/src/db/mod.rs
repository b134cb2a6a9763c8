//! # Database Persistence Layer
//!
//! Postgres persistence via SQLx.
//!
//! The database is **optional**. When a database URL is configured, the API
//! stores packages, shipments, the status ledger, and payments in Postgres.
//! When absent, the API runs on the in-memory repository, which is enough
//! for development and tests but does not survive restarts.
//!
//! Each submodule holds free functions over one table. They take any
//! `PgExecutor`, so the repository can run them on the pool or inside a
//! transaction.

pub mod packages;
pub mod payments;
pub mod shipments;
pub mod status_events;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Connect to Postgres and apply embedded migrations.
///
/// Returns `None` if no URL is given (in-memory mode).
pub async fn init_pool(database_url: Option<&str>) -> Result<Option<PgPool>, sqlx::Error> {
    let url = match database_url {
        Some(url) => url,
        None => {
            tracing::warn!(
                "DATABASE_URL not set. Running in in-memory mode; \
                 shipments will not survive restarts."
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// Parse a TEXT column into a domain enum, reporting a decode error with
/// the column name when the stored value is not recognised.
pub(crate) fn parse_column<T>(column: &'static str, value: &str) -> Result<T, sqlx::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.parse::<T>().map_err(|e| {
        tracing::error!(column, value, error = %e, "unrecognised value in database column");
        sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        }
    })
}

/// Wrap a raw BIGINT id read from the database.
pub(crate) fn row_id<T>(
    column: &'static str,
    value: i64,
    wrap: fn(i64) -> Result<T, courier_core::ValidationError>,
) -> Result<T, sqlx::Error> {
    wrap(value).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}
