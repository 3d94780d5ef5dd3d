//! City resource handlers: create, list/nearest-K, get by id, delete.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use geocity_core::haversine_km;
use geocity_db::{CityConflict, CityRow, NewCity};

use crate::middleware::RequestId;

use super::{map_db_error, map_geocoder_error, ApiError, AppState, StatusResponse};

/// Matches the provider's limit on geocodable query length.
const MAX_CITY_NAME_LEN: usize = 60;

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(super) struct CreateCityParams {
    city_name: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct PointParams {
    longitude: Option<f64>,
    latitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ListParams {
    limit: Option<i64>,
    longitude: Option<f64>,
    latitude: Option<f64>,
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

/// Full city record returned by create.
#[derive(Debug, Serialize)]
pub(super) struct CityRecord {
    pub id: i64,
    pub name: String,
    pub outer_api_name: Option<String>,
    pub longitude: f64,
    pub latitude: f64,
}

impl From<CityRow> for CityRecord {
    fn from(row: CityRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            outer_api_name: row.outer_api_name,
            longitude: row.longitude,
            latitude: row.latitude,
        }
    }
}

/// City view for reads; `distance` (km) is present only when the request
/// carried a reference point.
#[derive(Debug, Serialize)]
pub(super) struct CityView {
    pub id: i64,
    pub name: String,
    pub longitude: f64,
    pub latitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

impl CityView {
    fn from_row(row: CityRow, distance: Option<f64>) -> Self {
        Self {
            id: row.id,
            name: row.name,
            longitude: row.longitude,
            latitude: row.latitude,
            distance,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

/// Validate an optional reference point.
///
/// Exactly one coordinate present is a `MissingParameter` naming the absent
/// one; out-of-range values are `InvalidParameter`. Both absent is a valid
/// "no reference point" outcome.
fn validate_point(longitude: Option<f64>, latitude: Option<f64>) -> Result<Option<(f64, f64)>, ApiError> {
    match (longitude, latitude) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(ApiError::missing_parameter("latitude")),
        (None, Some(_)) => Err(ApiError::missing_parameter("longitude")),
        (Some(lon), Some(lat)) => {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(ApiError::invalid_parameter("longitude"));
            }
            if !(-90.0..=90.0).contains(&lat) {
                return Err(ApiError::invalid_parameter("latitude"));
            }
            Ok(Some((lon, lat)))
        }
    }
}

fn conflict_error(conflict: &CityConflict) -> ApiError {
    match conflict {
        CityConflict::Name(name) => ApiError::already_exists(format!("'{name}'")),
        CityConflict::OuterApiName(outer) => ApiError::already_exists(format!("'{outer}'")),
        CityConflict::Position {
            longitude,
            latitude,
        } => ApiError::already_exists(format!(
            "(latitude, longitude) = ({latitude}, {longitude})"
        )),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /city — resolve a name through the geocoder and persist a new city.
pub(super) async fn create_city(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(params): Query<CreateCityParams>,
) -> Result<Json<CityRecord>, ApiError> {
    let name = params.city_name.trim().to_owned();
    if name.is_empty() || name.chars().count() > MAX_CITY_NAME_LEN {
        return Err(ApiError::invalid_parameter("city_name"));
    }

    let position = state
        .geocoder
        .resolve(&name)
        .await
        .map_err(|e| map_geocoder_error(&req_id.0, &e))?
        .ok_or_else(|| ApiError::outer_position_not_found(&name))?;

    let conflict = geocity_db::find_conflict(
        &state.pool,
        &name,
        Some(&position.outer_api_name),
        position.longitude,
        position.latitude,
    )
    .await
    .map_err(|e| map_db_error(&req_id.0, &e))?;
    if let Some(conflict) = conflict {
        return Err(conflict_error(&conflict));
    }

    let row = geocity_db::insert_city(
        &state.pool,
        &NewCity {
            name: name.clone(),
            outer_api_name: Some(position.outer_api_name),
            longitude: position.longitude,
            latitude: position.latitude,
        },
    )
    .await
    .map_err(|e| {
        if geocity_db::is_unique_violation(&e) {
            // A concurrent create won the race between the advisory check and
            // the insert; the unique index turns it into the same 409.
            ApiError::already_exists(format!("'{name}'"))
        } else {
            map_db_error(&req_id.0, &e)
        }
    })?;

    Ok(Json(CityRecord::from(row)))
}

/// GET /city — all cities, or the nearest `limit` to a reference point.
pub(super) async fn list_cities(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<CityView>>, ApiError> {
    let point = validate_point(params.longitude, params.latitude)?;
    let limit = params.limit.unwrap_or(state.default_nearest_limit);
    if limit < 1 {
        return Err(ApiError::invalid_parameter("limit"));
    }

    let rows = geocity_db::list_cities(&state.pool)
        .await
        .map_err(|e| map_db_error(&req_id.0, &e))?;

    let views = match point {
        // No reference point: everything, store order, no distance, limit ignored.
        None => rows
            .into_iter()
            .map(|row| CityView::from_row(row, None))
            .collect(),
        Some((longitude, latitude)) => {
            let mut annotated: Vec<(f64, CityRow)> = rows
                .into_iter()
                .map(|row| {
                    let distance = haversine_km(latitude, longitude, row.latitude, row.longitude);
                    (distance, row)
                })
                .collect();
            // Stable sort: equidistant cities keep insertion order.
            annotated.sort_by(|(a, _), (b, _)| a.total_cmp(b));
            annotated.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            annotated
                .into_iter()
                .map(|(distance, row)| CityView::from_row(row, Some(distance)))
                .collect()
        }
    };

    Ok(Json(views))
}

/// GET /city/{city_id} — one city, with distance when a reference point is given.
pub(super) async fn get_city(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(city_id): Path<i64>,
    Query(params): Query<PointParams>,
) -> Result<Json<CityView>, ApiError> {
    let point = validate_point(params.longitude, params.latitude)?;

    let row = geocity_db::get_city(&state.pool, city_id)
        .await
        .map_err(|e| map_db_error(&req_id.0, &e))?
        .ok_or_else(|| ApiError::city_not_found(city_id))?;

    let distance =
        point.map(|(longitude, latitude)| haversine_km(latitude, longitude, row.latitude, row.longitude));

    Ok(Json(CityView::from_row(row, distance)))
}

/// DELETE /city/{city_id} — permanently remove a city.
pub(super) async fn delete_city(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(city_id): Path<i64>,
) -> Result<Json<StatusResponse>, ApiError> {
    let deleted = geocity_db::delete_city(&state.pool, city_id)
        .await
        .map_err(|e| map_db_error(&req_id.0, &e))?;
    if !deleted {
        return Err(ApiError::city_not_found(city_id));
    }

    Ok(Json(StatusResponse {
        status: "Success",
        message: format!("City with id {city_id} has been deleted from database"),
        ru: format!("Город с идентификатором {city_id} был удален из базы данных"),
    }))
}
