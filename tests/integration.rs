mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;
use trip_dispatch::api::rest::router;
use trip_dispatch::engine::archive::TripArchive;
use trip_dispatch::state::AppState;
use trip_dispatch::store::MemoryStore;

use common::{FailingArchive, RecordingArchive, options};

fn setup_with(archive: Arc<dyn TripArchive>) -> axum::Router {
    let state = AppState::new(Arc::new(MemoryStore::new()), archive, options());
    router(Arc::new(state))
}

fn setup() -> axum::Router {
    setup_with(Arc::new(RecordingArchive::default()))
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn mark_available(app: &axum::Router, driver_id: i64) -> StatusCode {
    app.clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/driver",
            json!({ "driverId": driver_id }),
        ))
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn health_returns_ok() {
    let app = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["available_drivers"], 0);
    assert_eq!(body["open_trips"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let app = setup();
    assert_eq!(mark_available(&app, 1).await, StatusCode::OK);

    let response = app.oneshot(get_request("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("trip_operations_total"));
    assert!(body.contains("available_drivers 1"));
}

#[tokio::test]
async fn marking_available_twice_returns_not_modified() {
    let app = setup();

    assert_eq!(mark_available(&app, 7).await, StatusCode::OK);
    assert_eq!(mark_available(&app, 7).await, StatusCode::NOT_MODIFIED);

    let response = app.oneshot(get_request("/api/v1/driver/7")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["driverId"], 7);
    assert_eq!(body["available"], true);
}

#[tokio::test]
async fn remove_availability_unlists_driver() {
    let app = setup();
    mark_available(&app, 7).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/v1/driver/7")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get_request("/api/v1/driver/7")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["available"], false);
}

#[tokio::test]
async fn create_trip_without_drivers_is_reported() {
    let app = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/trips",
            json!({ "passengerId": 1, "postalCode": "12345" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "no_driver_available");
    assert_eq!(body["retryable"], true);
}

#[tokio::test]
async fn create_trip_requires_postal_code() {
    let app = setup();
    mark_available(&app, 1).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/trips",
            json!({ "passengerId": 1 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "validation_error");

    let response = app.oneshot(get_request("/api/v1/driver/1")).await.unwrap();
    assert_eq!(body_json(response).await["available"], true);
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let app = setup();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/trips")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["kind"], "validation_error");
}

#[tokio::test]
async fn unknown_driver_trip_returns_404() {
    let app = setup();
    let response = app
        .oneshot(get_request("/api/v1/driver/42/trip"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["kind"], "not_found");
}

#[tokio::test]
async fn full_trip_flow() {
    let app = setup();
    mark_available(&app, 5).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/trips",
            json!({ "passengerId": 11, "postalCode": "12345" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    assert_eq!(created["driverId"], 5);
    let trip_id = created["tripId"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(get_request("/api/v1/driver/5/trip"))
        .await
        .unwrap();
    let assigned = body_json(response).await;
    assert_eq!(assigned["tripId"], trip_id);
    assert_eq!(assigned["passengerId"], 11);
    assert_eq!(assigned["postalCode"], "12345");
    assert_eq!(assigned["state"], "requested");

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/trips/{trip_id}"),
            json!({ "driverId": 5 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["startTime"].as_i64().unwrap() > 0);

    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/v1/trips/{trip_id}")))
        .await
        .unwrap();
    let snapshot = body_json(response).await;
    assert_eq!(snapshot["state"], "accepted");
    assert_eq!(snapshot["driverId"], 5);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/trips/{trip_id}"),
            json!({ "driverId": 5 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .clone()
        .oneshot(json_request(
            "DELETE",
            &format!("/api/v1/trips/{trip_id}"),
            json!({ "driverId": 5 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let ended = body_json(response).await;
    assert_eq!(ended["tripId"], trip_id);
    assert_eq!(ended["archived"], true);
    assert!(ended.get("warning").is_none());

    let response = app
        .clone()
        .oneshot(get_request("/api/v1/driver/5/trip"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(get_request("/api/v1/driver/5")).await.unwrap();
    assert_eq!(body_json(response).await["available"], true);
}

#[tokio::test]
async fn end_trip_with_wrong_driver_returns_404() {
    let app = setup();
    mark_available(&app, 5).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/trips",
            json!({ "passengerId": 11, "postalCode": "12345" }),
        ))
        .await
        .unwrap();
    let trip_id = body_json(response).await["tripId"].as_i64().unwrap();

    let response = app
        .oneshot(json_request(
            "DELETE",
            &format!("/api/v1/trips/{trip_id}"),
            json!({ "driverId": 6 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn archive_failure_is_a_warning() {
    let app = setup_with(Arc::new(FailingArchive));
    mark_available(&app, 5).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/trips",
            json!({ "passengerId": 11, "postalCode": "12345" }),
        ))
        .await
        .unwrap();
    let trip_id = body_json(response).await["tripId"].as_i64().unwrap();

    app.clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/trips/{trip_id}"),
            json!({ "driverId": 5 }),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "DELETE",
            &format!("/api/v1/trips/{trip_id}"),
            json!({ "driverId": 5 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let ended = body_json(response).await;
    assert_eq!(ended["archived"], false);
    assert!(ended["warning"].as_str().unwrap().contains("dependency failed"));

    let response = app.oneshot(get_request("/api/v1/driver/5")).await.unwrap();
    assert_eq!(body_json(response).await["available"], true);
}
