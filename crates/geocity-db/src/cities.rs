//! Database operations for the `cities` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Input record for inserting a city.
#[derive(Debug, Clone)]
pub struct NewCity {
    pub name: String,
    pub outer_api_name: Option<String>,
    pub longitude: f64,
    pub latitude: f64,
}

/// A row from the `cities` table.
///
/// `is_deleted` is carried through reads so callers never see soft-deleted
/// rows by accident, even though deletes currently remove rows outright.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CityRow {
    pub id: i64,
    pub name: String,
    pub outer_api_name: Option<String>,
    pub longitude: f64,
    pub latitude: f64,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// Which uniqueness rule an insert would violate.
#[derive(Debug, Clone, PartialEq)]
pub enum CityConflict {
    Name(String),
    OuterApiName(String),
    Position { longitude: f64, latitude: f64 },
}

const CITY_COLUMNS: &str =
    "id, name, outer_api_name, longitude, latitude, is_deleted, created_at";

/// Insert a new city and return the stored row.
///
/// The partial unique indexes on `name`, `outer_api_name` and
/// `(longitude, latitude)` may still reject the insert under concurrency;
/// classify that with [`crate::is_unique_violation`].
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn insert_city(pool: &PgPool, city: &NewCity) -> Result<CityRow, sqlx::Error> {
    sqlx::query_as::<_, CityRow>(
        "INSERT INTO cities (name, outer_api_name, longitude, latitude) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id, name, outer_api_name, longitude, latitude, is_deleted, created_at",
    )
    .bind(&city.name)
    .bind(&city.outer_api_name)
    .bind(city.longitude)
    .bind(city.latitude)
    .fetch_one(pool)
    .await
}

/// List all live cities in insertion (id) order.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn list_cities(pool: &PgPool) -> Result<Vec<CityRow>, sqlx::Error> {
    sqlx::query_as::<_, CityRow>(&format!(
        "SELECT {CITY_COLUMNS} FROM cities WHERE NOT is_deleted ORDER BY id"
    ))
    .fetch_all(pool)
    .await
}

/// Fetch a live city by id, or `None` if no such row exists.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn get_city(pool: &PgPool, id: i64) -> Result<Option<CityRow>, sqlx::Error> {
    sqlx::query_as::<_, CityRow>(&format!(
        "SELECT {CITY_COLUMNS} FROM cities WHERE id = $1 AND NOT is_deleted"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Permanently remove a city by id. Returns `true` if a row was deleted.
///
/// Hard delete, matching the observed behavior of the service; the
/// `is_deleted` column is kept for schema compatibility only.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn delete_city(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM cities WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Report the first uniqueness rule a prospective insert would violate,
/// checked in the same order the create endpoint reports them: name, then
/// outer API name, then coordinate pair.
///
/// Advisory only — the unique indexes remain the concurrent backstop.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if any lookup fails.
pub async fn find_conflict(
    pool: &PgPool,
    name: &str,
    outer_api_name: Option<&str>,
    longitude: f64,
    latitude: f64,
) -> Result<Option<CityConflict>, sqlx::Error> {
    let name_taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM cities WHERE name = $1 AND NOT is_deleted)",
    )
    .bind(name)
    .fetch_one(pool)
    .await?;
    if name_taken {
        return Ok(Some(CityConflict::Name(name.to_owned())));
    }

    if let Some(outer) = outer_api_name {
        let outer_taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM cities WHERE outer_api_name = $1 AND NOT is_deleted)",
        )
        .bind(outer)
        .fetch_one(pool)
        .await?;
        if outer_taken {
            return Ok(Some(CityConflict::OuterApiName(outer.to_owned())));
        }
    }

    let position_taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(\
             SELECT 1 FROM cities \
             WHERE longitude = $1 AND latitude = $2 AND NOT is_deleted)",
    )
    .bind(longitude)
    .bind(latitude)
    .fetch_one(pool)
    .await?;
    if position_taken {
        return Ok(Some(CityConflict::Position {
            longitude,
            latitude,
        }));
    }

    Ok(None)
}
