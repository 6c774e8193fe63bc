use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::engine::archive::{ArchiveError, TripArchive};
use crate::error::AppError;
use crate::models::driver::{Availability, DriverId, PassengerId, TripId};
use crate::models::trip::{Trip, TripEvent, TripRecord};
use crate::observability::metrics::Metrics;
use crate::store::{DispatchStore, StoreCounts};

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub archive_timeout: Duration,
    pub event_buffer_size: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            archive_timeout: Duration::from_secs(2),
            event_buffer_size: 1024,
        }
    }
}

/// Outcome of ending a trip. The trip is closed whether or not archival worked.
#[derive(Debug)]
pub struct Completion {
    pub trip: Trip,
    pub archive_error: Option<AppError>,
}

impl Completion {
    pub fn archived(&self) -> bool {
        self.archive_error.is_none()
    }

    pub fn warning(&self) -> Option<String> {
        self.archive_error.as_ref().map(ToString::to_string)
    }
}

/// Drives trips from request to completion and owns every mutation of the
/// driver registry and the open-trip table.
pub struct Coordinator {
    store: Arc<dyn DispatchStore>,
    archive: Arc<dyn TripArchive>,
    archive_timeout: Duration,
    metrics: Metrics,
    events_tx: broadcast::Sender<TripEvent>,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn DispatchStore>,
        archive: Arc<dyn TripArchive>,
        metrics: Metrics,
        options: CoordinatorOptions,
    ) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(options.event_buffer_size.max(1));

        Self {
            store,
            archive,
            archive_timeout: options.archive_timeout,
            metrics,
            events_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TripEvent> {
        self.events_tx.subscribe()
    }

    pub fn mark_available(&self, driver_id: DriverId) -> Result<Availability, AppError> {
        let result = validate_id("driverId", driver_id)
            .and_then(|()| self.store.mark_available(driver_id).map_err(AppError::from));
        self.observe("mark_available", &result);

        if let Ok(availability) = &result {
            debug!(driver_id, ?availability, "driver availability declared");
        }
        result
    }

    pub fn is_available(&self, driver_id: DriverId) -> Result<bool, AppError> {
        validate_id("driverId", driver_id)?;
        Ok(self.store.is_available(driver_id)?)
    }

    pub fn remove_availability(&self, driver_id: DriverId) -> Result<bool, AppError> {
        let result = validate_id("driverId", driver_id)
            .and_then(|()| self.store.remove_available(driver_id).map_err(AppError::from));
        self.observe("remove_availability", &result);
        result
    }

    /// Reserves a random available driver and records a requested trip for it.
    pub fn create_trip(
        &self,
        passenger_id: PassengerId,
        postal_code: &str,
    ) -> Result<Trip, AppError> {
        let result = validate_id("passengerId", passenger_id)
            .and_then(|()| validate_postal_code(postal_code))
            .and_then(|postal_code| {
                self.store
                    .create_trip(passenger_id, postal_code, Utc::now())
                    .map_err(AppError::from)
            });
        self.observe("create_trip", &result);

        let trip = result?;
        info!(
            trip_id = trip.id,
            driver_id = trip.driver_id,
            passenger_id = trip.passenger_id,
            postal_code = %trip.postal_code,
            "trip requested"
        );
        self.publish(&trip);
        Ok(trip)
    }

    pub fn accept_trip(&self, trip_id: TripId, driver_id: DriverId) -> Result<Trip, AppError> {
        let result = validate_id("tripId", trip_id)
            .and_then(|()| validate_id("driverId", driver_id))
            .and_then(|()| {
                self.store
                    .accept_trip(trip_id, driver_id, Utc::now())
                    .map_err(AppError::from)
            });
        self.observe("accept_trip", &result);

        let trip = result?;
        info!(trip_id, driver_id, "trip accepted");
        self.publish(&trip);
        Ok(trip)
    }

    /// Closes the trip and releases its driver, then hands the record to the
    /// archive. Archive failures are reported on the [`Completion`] only.
    pub async fn end_trip(
        &self,
        trip_id: TripId,
        driver_id: DriverId,
    ) -> Result<Completion, AppError> {
        let result = validate_id("tripId", trip_id)
            .and_then(|()| validate_id("driverId", driver_id))
            .and_then(|()| {
                self.store
                    .complete_trip(trip_id, driver_id, Utc::now())
                    .map_err(AppError::from)
            });
        self.observe("end_trip", &result);

        let trip = result?;
        info!(trip_id, driver_id, "trip completed");
        self.publish(&trip);

        let archive_error = self.archive_trip(&trip).await.err().map(AppError::from);
        Ok(Completion {
            trip,
            archive_error,
        })
    }

    pub fn driver_trip(&self, driver_id: DriverId) -> Result<Trip, AppError> {
        validate_id("driverId", driver_id)?;
        Ok(self.store.driver_trip(driver_id)?)
    }

    pub fn trip(&self, trip_id: TripId) -> Result<Trip, AppError> {
        validate_id("tripId", trip_id)?;
        Ok(self.store.trip(trip_id)?)
    }

    pub fn counts(&self) -> Result<StoreCounts, AppError> {
        Ok(self.store.counts()?)
    }

    async fn archive_trip(&self, trip: &Trip) -> Result<(), ArchiveError> {
        let record = TripRecord::from_completed(trip).ok_or_else(|| {
            ArchiveError::Transport(format!("trip {} has no complete timestamps", trip.id))
        })?;

        let start = Instant::now();
        let outcome = match tokio::time::timeout(self.archive_timeout, self.archive.archive(&record))
            .await
        {
            Ok(result) => result,
            Err(_elapsed) => Err(ArchiveError::Timeout(self.archive_timeout)),
        };

        let label = if outcome.is_ok() { "success" } else { "error" };
        self.metrics
            .archive_latency_seconds
            .with_label_values(&[label])
            .observe(start.elapsed().as_secs_f64());
        self.metrics
            .archive_calls_total
            .with_label_values(&[label])
            .inc();

        if let Err(err) = &outcome {
            error!(trip_id = trip.id, error = %err, "trip archive failed; trip stays closed");
        }
        outcome
    }

    fn publish(&self, trip: &Trip) {
        let _ = self.events_tx.send(TripEvent {
            trip: trip.clone(),
            at: Utc::now(),
        });
    }

    fn observe<T>(&self, operation: &str, result: &Result<T, AppError>) {
        let outcome = match result {
            Ok(_) => "success",
            Err(err) => err.kind(),
        };
        self.metrics.record_operation(operation, outcome);

        if result.is_ok() {
            match self.store.counts() {
                Ok(counts) => self.metrics.set_counts(counts),
                Err(err) => warn!(error = %err, "failed to refresh store gauges"),
            }
        }
    }
}

fn validate_id(field: &str, id: i64) -> Result<(), AppError> {
    if id <= 0 {
        return Err(AppError::Validation(format!("{field} must be a positive id")));
    }
    Ok(())
}

fn validate_postal_code(raw: &str) -> Result<&str, AppError> {
    let postal_code = raw.trim();
    if postal_code.is_empty() {
        return Err(AppError::Validation(
            "postalCode cannot be empty".to_string(),
        ));
    }
    Ok(postal_code)
}
