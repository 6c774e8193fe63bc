use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};

use crate::api::rest::{json_body, path_id, required};
use crate::error::AppError;
use crate::models::driver::{DriverId, PassengerId, TripId};
use crate::models::trip::TripState;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/driver", post(mark_available))
        .route("/driver/:id", get(get_availability).delete(remove_availability))
        .route("/driver/:id/trip", get(get_driver_trip))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAvailableRequest {
    pub driver_id: Option<DriverId>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAvailableResponse {
    pub driver_id: DriverId,
    pub changed: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub driver_id: DriverId,
    pub available: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverTripResponse {
    pub trip_id: TripId,
    pub postal_code: String,
    pub passenger_id: PassengerId,
    pub state: TripState,
}

/// 304 when the driver was already listed.
async fn mark_available(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<MarkAvailableRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let driver_id = required("driverId", json_body(payload)?.driver_id)?;
    let availability = state.coordinator.mark_available(driver_id)?;

    if !availability.changed() {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    Ok(Json(MarkAvailableResponse {
        driver_id,
        changed: true,
    })
    .into_response())
}

async fn get_availability(
    State(state): State<Arc<AppState>>,
    path: Result<Path<DriverId>, PathRejection>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let driver_id = path_id(path)?;
    let available = state.coordinator.is_available(driver_id)?;

    Ok(Json(AvailabilityResponse {
        driver_id,
        available,
    }))
}

async fn remove_availability(
    State(state): State<Arc<AppState>>,
    path: Result<Path<DriverId>, PathRejection>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let driver_id = path_id(path)?;
    state.coordinator.remove_availability(driver_id)?;

    Ok(Json(AvailabilityResponse {
        driver_id,
        available: false,
    }))
}

async fn get_driver_trip(
    State(state): State<Arc<AppState>>,
    path: Result<Path<DriverId>, PathRejection>,
) -> Result<Json<DriverTripResponse>, AppError> {
    let driver_id = path_id(path)?;
    let trip = state.coordinator.driver_trip(driver_id)?;

    Ok(Json(DriverTripResponse {
        trip_id: trip.id,
        postal_code: trip.postal_code,
        passenger_id: trip.passenger_id,
        state: trip.state,
    }))
}
