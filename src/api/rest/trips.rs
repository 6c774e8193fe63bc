use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::routing::post;
use serde::{Deserialize, Serialize};

use crate::api::rest::{json_body, path_id, required};
use crate::error::AppError;
use crate::models::driver::{DriverId, PassengerId, TripId};
use crate::models::trip::{Trip, TripState};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/trips", post(create_trip))
        .route(
            "/trips/:id",
            post(accept_trip).delete(end_trip).get(get_trip),
        )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTripRequest {
    pub passenger_id: Option<PassengerId>,
    pub postal_code: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverActionRequest {
    pub driver_id: Option<DriverId>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTripResponse {
    pub trip_id: TripId,
    pub driver_id: DriverId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptTripResponse {
    pub start_time: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndTripResponse {
    pub trip_id: TripId,
    pub end_time: Option<i64>,
    pub archived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripResponse {
    pub trip_id: TripId,
    pub postal_code: String,
    pub passenger_id: PassengerId,
    pub driver_id: DriverId,
    pub state: TripState,
    pub start_time: Option<i64>,
}

impl From<Trip> for TripResponse {
    fn from(trip: Trip) -> Self {
        Self {
            trip_id: trip.id,
            postal_code: trip.postal_code,
            passenger_id: trip.passenger_id,
            driver_id: trip.driver_id,
            state: trip.state,
            start_time: trip.start_time.map(|at| at.timestamp()),
        }
    }
}

async fn create_trip(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateTripRequest>, JsonRejection>,
) -> Result<Json<CreateTripResponse>, AppError> {
    let payload = json_body(payload)?;
    let passenger_id = required("passengerId", payload.passenger_id)?;
    let postal_code = required("postalCode", payload.postal_code)?;

    let trip = state.coordinator.create_trip(passenger_id, &postal_code)?;

    Ok(Json(CreateTripResponse {
        trip_id: trip.id,
        driver_id: trip.driver_id,
    }))
}

async fn accept_trip(
    State(state): State<Arc<AppState>>,
    path: Result<Path<TripId>, PathRejection>,
    payload: Result<Json<DriverActionRequest>, JsonRejection>,
) -> Result<Json<AcceptTripResponse>, AppError> {
    let trip_id = path_id(path)?;
    let driver_id = required("driverId", json_body(payload)?.driver_id)?;

    let trip = state.coordinator.accept_trip(trip_id, driver_id)?;
    let start_time = trip
        .start_time
        .ok_or_else(|| AppError::Internal(format!("accepted trip {trip_id} has no start time")))?;

    Ok(Json(AcceptTripResponse {
        start_time: start_time.timestamp(),
    }))
}

async fn end_trip(
    State(state): State<Arc<AppState>>,
    path: Result<Path<TripId>, PathRejection>,
    payload: Result<Json<DriverActionRequest>, JsonRejection>,
) -> Result<Json<EndTripResponse>, AppError> {
    let trip_id = path_id(path)?;
    let driver_id = required("driverId", json_body(payload)?.driver_id)?;

    let completion = state.coordinator.end_trip(trip_id, driver_id).await?;

    Ok(Json(EndTripResponse {
        trip_id: completion.trip.id,
        end_time: completion.trip.end_time.map(|at| at.timestamp()),
        archived: completion.archived(),
        warning: completion.warning(),
    }))
}

async fn get_trip(
    State(state): State<Arc<AppState>>,
    path: Result<Path<TripId>, PathRejection>,
) -> Result<Json<TripResponse>, AppError> {
    let trip_id = path_id(path)?;
    let trip = state.coordinator.trip(trip_id)?;
    Ok(Json(trip.into()))
}
