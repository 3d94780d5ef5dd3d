mod cities;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use geocity_geocoder::{GeocoderClient, GeocoderError};

use crate::middleware::{request_id, RequestId};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub geocoder: GeocoderClient,
    pub default_nearest_limit: i64,
}

/// Status body used for the delete confirmation and every error response.
/// `message` is English, `ru` is the Russian counterpart.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub message: String,
    pub ru: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorKind {
    NotFound,
    AlreadyExists,
    MissingParameter,
    InvalidParameter,
    Internal,
}

/// A domain error carrying both human-readable translations.
///
/// Raised at the point of detection and translated into a status code and
/// bilingual JSON body exactly once, in `into_response`.
#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    ru: String,
}

impl ApiError {
    fn new(kind: ErrorKind, message: String, ru: String) -> Self {
        Self { kind, message, ru }
    }

    pub(super) fn city_not_found(id: i64) -> Self {
        Self::new(
            ErrorKind::NotFound,
            format!("City with id {id} not found"),
            format!("Город с идентификатором {id} не найден"),
        )
    }

    pub(super) fn outer_position_not_found(city_name: &str) -> Self {
        Self::new(
            ErrorKind::NotFound,
            format!("Outer API position for '{city_name}' not found"),
            format!("Позиция из внешнего API для '{city_name}' не найдена"),
        )
    }

    pub(super) fn already_exists(key: String) -> Self {
        Self::new(
            ErrorKind::AlreadyExists,
            format!("City {key} already exists"),
            format!("Город {key} уже существует"),
        )
    }

    pub(super) fn missing_parameter(name: &str) -> Self {
        Self::new(
            ErrorKind::MissingParameter,
            format!("Missing parameter {name}"),
            format!("Параметр {name} отсутствует в запросе"),
        )
    }

    pub(super) fn invalid_parameter(name: &str) -> Self {
        Self::new(
            ErrorKind::InvalidParameter,
            format!("Invalid parameter {name}"),
            format!("Параметр {name} не корректен"),
        )
    }

    fn internal() -> Self {
        Self::new(
            ErrorKind::Internal,
            "Internal server error".to_owned(),
            "Внутренняя ошибка сервера".to_owned(),
        )
    }

    #[cfg(test)]
    pub(super) fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::AlreadyExists => StatusCode::CONFLICT,
            ErrorKind::MissingParameter | ErrorKind::InvalidParameter => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = StatusResponse {
            status: "Error",
            message: self.message,
            ru: self.ru,
        };
        (status, Json(body)).into_response()
    }
}

fn map_db_error(request_id: &str, error: &sqlx::Error) -> ApiError {
    tracing::error!(request_id, error = %error, "database query failed");
    ApiError::internal()
}

fn map_geocoder_error(request_id: &str, error: &GeocoderError) -> ApiError {
    tracing::error!(request_id, error = %error, "geocoder request failed");
    ApiError::internal()
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
        ])
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/city",
            get(cities::list_cities).post(cities::create_city),
        )
        .route(
            "/city/{city_id}",
            get(cities::get_city).delete(cities::delete_city),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    match geocity_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthData {
                status: "ok",
                database: "ok",
            }),
        ),
        Err(e) => {
            tracing::warn!(request_id = %req_id.0, error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthData {
                    status: "degraded",
                    database: "unavailable",
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use geocity_db::NewCity;
    use geocity_geocoder::GeocoderConfig;
    use tower::ServiceExt;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_app(pool: PgPool, geocoder_base: &str) -> Router {
        let geocoder = GeocoderClient::new(&GeocoderConfig {
            base_url: geocoder_base.to_owned(),
            api_key: "test-key".to_owned(),
            language: "ru_RU".to_owned(),
            timeout_secs: 5,
        })
        .expect("geocoder client");
        build_app(AppState {
            pool,
            geocoder,
            default_nearest_limit: 2,
        })
    }

    /// App wired to a geocoder endpoint that is never reached.
    fn test_app_without_geocoder(pool: PgPool) -> Router {
        test_app(pool, "http://127.0.0.1:9")
    }

    fn geocoder_body(name: &str, pos: &str) -> serde_json::Value {
        serde_json::json!({
            "response": { "GeoObjectCollection": { "featureMember": [{
                "GeoObject": {
                    "name": name,
                    "metaDataProperty": { "GeocoderMetaData": { "kind": "locality" } },
                    "Point": { "pos": pos }
                }
            }] } }
        })
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json parse")
    }

    /// The four-city fixture used by the nearest-K tests.
    async fn seed_cities(pool: &PgPool) -> Vec<i64> {
        let fixture = [
            ("City1", 37.62, 55.75),
            ("City2", 37.72, 55.85),
            ("City3", 37.82, 55.95),
            ("City4", 37.92, 56.05),
        ];
        let mut ids = Vec::new();
        for (name, longitude, latitude) in fixture {
            let row = geocity_db::insert_city(
                pool,
                &NewCity {
                    name: name.to_owned(),
                    outer_api_name: Some(format!("{name} (outer)")),
                    longitude,
                    latitude,
                },
            )
            .await
            .expect("seed city");
            ids.push(row.id);
        }
        ids
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    #[test]
    fn error_body_has_the_fixed_shape() {
        let json = serde_json::to_value(StatusResponse {
            status: "Error",
            message: "Missing parameter latitude".to_owned(),
            ru: "Параметр latitude отсутствует в запросе".to_owned(),
        })
        .expect("serialize");
        assert_eq!(json["status"], "Error");
        assert_eq!(json["message"], "Missing parameter latitude");
        assert_eq!(json["ru"], "Параметр latitude отсутствует в запросе");
    }

    #[test]
    fn error_kinds_map_to_spec_status_codes() {
        assert_eq!(
            ApiError::city_not_found(0).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::already_exists("'City1'".to_owned())
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::missing_parameter("latitude")
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::invalid_parameter("limit")
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::internal().into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn create_city_persists_and_returns_record(pool: PgPool) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("geocode", "City10"))
            .and(query_param("kind", "locality"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(geocoder_body("City10", "50 40")),
            )
            .mount(&server)
            .await;

        let app = test_app(pool.clone(), &server.uri());
        let response = app
            .clone()
            .oneshot(request("POST", "/city?city_name=City10"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["name"], "City10");
        assert_eq!(json["outer_api_name"], "City10");
        assert!((json["longitude"].as_f64().expect("longitude") - 50.0).abs() < 1e-9);
        assert!((json["latitude"].as_f64().expect("latitude") - 40.0).abs() < 1e-9);

        let id = json["id"].as_i64().expect("id");
        let response = app.oneshot(get(&format!("/city/{id}"))).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn create_duplicate_name_is_conflict(pool: PgPool) {
        seed_cities(&pool).await;

        let server = MockServer::start().await;
        // Different coordinates than the stored City1: name still wins.
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(geocoder_body("City1", "10 20")),
            )
            .mount(&server)
            .await;

        let app = test_app(pool, &server.uri());
        let response = app
            .oneshot(request("POST", "/city?city_name=City1"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let json = body_json(response).await;
        assert_eq!(json["status"], "Error");
        assert!(json["message"]
            .as_str()
            .expect("message")
            .contains("already exists"));
        assert!(json["ru"].as_str().expect("ru").contains("уже существует"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn create_duplicate_position_is_conflict(pool: PgPool) {
        let server = MockServer::start().await;
        // Both names geocode to the same position.
        Mock::given(method("GET"))
            .and(query_param("geocode", "OldTown"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(geocoder_body("OldTown", "50 40")),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("geocode", "NewTown"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(geocoder_body("NewTown", "50 40")),
            )
            .mount(&server)
            .await;

        let app = test_app(pool, &server.uri());
        let response = app
            .clone()
            .oneshot(request("POST", "/city?city_name=OldTown"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(request("POST", "/city?city_name=NewTown"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let json = body_json(response).await;
        assert!(json["message"]
            .as_str()
            .expect("message")
            .contains("(latitude, longitude) = (40, 50)"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn create_with_geocoder_miss_is_not_found(pool: PgPool) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": { "GeoObjectCollection": { "featureMember": [] } }
            })))
            .mount(&server)
            .await;

        let app = test_app(pool, &server.uri());
        let response = app
            .oneshot(request("POST", "/city?city_name=Atlantis"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let json = body_json(response).await;
        assert!(json["message"].as_str().expect("message").contains("not found"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn create_with_blank_name_is_bad_request(pool: PgPool) {
        let app = test_app_without_geocoder(pool);
        let response = app
            .oneshot(request("POST", "/city?city_name=%20%20"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn create_with_over_long_name_is_bad_request(pool: PgPool) {
        // One character past the 60-character cap; rejected before any
        // geocoder call is made.
        let name = "A".repeat(61);

        let app = test_app_without_geocoder(pool);
        let response = app
            .oneshot(request("POST", &format!("/city?city_name={name}")))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert_eq!(json["status"], "Error");
        assert_eq!(json["message"], "Invalid parameter city_name");
        assert_eq!(json["ru"], "Параметр city_name не корректен");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn list_without_coordinates_returns_everything_unannotated(pool: PgPool) {
        seed_cities(&pool).await;

        let app = test_app_without_geocoder(pool);
        // limit must be ignored when no reference point is given.
        let response = app.oneshot(get("/city?limit=1")).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let data = json.as_array().expect("array");
        assert_eq!(data.len(), 4);
        assert_eq!(data[0]["name"], "City1");
        assert!(data[0].get("distance").is_none());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn list_with_lone_longitude_names_latitude(pool: PgPool) {
        let app = test_app_without_geocoder(pool);
        let response = app
            .oneshot(get("/city?longitude=37.62"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert_eq!(json["message"], "Missing parameter latitude");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn list_with_lone_latitude_names_longitude(pool: PgPool) {
        let app = test_app_without_geocoder(pool);
        let response = app
            .oneshot(get("/city?latitude=55.75"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert_eq!(json["message"], "Missing parameter longitude");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn list_nearest_two_is_sorted_and_truncated(pool: PgPool) {
        seed_cities(&pool).await;

        let app = test_app_without_geocoder(pool);
        let response = app
            .oneshot(get("/city?longitude=37.62&latitude=55.75&limit=2"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let data = json.as_array().expect("array");
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["name"], "City1");
        assert_eq!(data[1]["name"], "City2");

        let d0 = data[0]["distance"].as_f64().expect("distance");
        let d1 = data[1]["distance"].as_f64().expect("distance");
        assert!(d0.abs() < 1e-9, "reference point coincides with City1");
        assert!(d1 > d0);
        assert!((12.0..=13.5).contains(&d1), "got {d1}");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn list_with_zero_limit_is_bad_request(pool: PgPool) {
        let app = test_app_without_geocoder(pool);
        let response = app
            .oneshot(get("/city?longitude=37.62&latitude=55.75&limit=0"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn list_with_out_of_range_coordinate_is_bad_request(pool: PgPool) {
        let app = test_app_without_geocoder(pool);
        let response = app
            .oneshot(get("/city?longitude=200&latitude=55.75"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert_eq!(json["message"], "Invalid parameter longitude");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn get_city_annotates_distance_when_point_given(pool: PgPool) {
        let ids = seed_cities(&pool).await;

        let app = test_app_without_geocoder(pool);
        let response = app
            .clone()
            .oneshot(get(&format!("/city/{}", ids[0])))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["name"], "City1");
        assert!(json.get("distance").is_none());

        let response = app
            .oneshot(get(&format!(
                "/city/{}?longitude=37.62&latitude=55.75",
                ids[0]
            )))
            .await
            .expect("response");
        let json = body_json(response).await;
        assert!(json["distance"].as_f64().expect("distance").abs() < 1e-9);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn get_unknown_city_is_not_found(pool: PgPool) {
        let app = test_app_without_geocoder(pool);
        let response = app.oneshot(get("/city/0")).await.expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let json = body_json(response).await;
        assert_eq!(json["status"], "Error");
        assert_eq!(json["message"], "City with id 0 not found");
        assert_eq!(json["ru"], "Город с идентификатором 0 не найден");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn delete_unknown_city_is_not_found(pool: PgPool) {
        let app = test_app_without_geocoder(pool);
        let response = app
            .oneshot(request("DELETE", "/city/0"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn delete_removes_city_and_confirms_bilingually(pool: PgPool) {
        let ids = seed_cities(&pool).await;
        let id = ids[3];

        let app = test_app_without_geocoder(pool);
        let response = app
            .clone()
            .oneshot(request("DELETE", &format!("/city/{id}")))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "Success");
        assert_eq!(
            json["message"],
            format!("City with id {id} has been deleted from database")
        );
        assert_eq!(
            json["ru"],
            format!("Город с идентификатором {id} был удален из базы данных")
        );

        let response = app
            .oneshot(get(&format!("/city/{id}")))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn responses_carry_a_request_id_header(pool: PgPool) {
        let app = test_app_without_geocoder(pool);
        let response = app.oneshot(get("/city")).await.expect("response");
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn health_reports_ok_with_live_database(pool: PgPool) {
        let app = test_app_without_geocoder(pool);
        let response = app.oneshot(get("/health")).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["database"], "ok");
    }
}
