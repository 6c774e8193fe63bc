//! Persistence for the availability registry and the open-trip table.
//!
//! Every [`DispatchStore`] method is one atomic unit: it either applies in
//! full or leaves both the registry and the trip table untouched. A driver is
//! never simultaneously available and bound to an open trip.

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::driver::{Availability, DriverId, PassengerId, TripId};
use crate::models::trip::{TransitionError, Trip};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no driver available")]
    NoDriverAvailable,

    #[error("trip {0} not found")]
    TripNotFound(TripId),

    #[error("driver {0} has no open trip")]
    NoOpenTrip(DriverId),

    #[error("driver {0} is bound to an open trip")]
    DriverBusy(DriverId),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("sqlite error during {operation}: {source}")]
    Sqlite {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },

    #[error("store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub available_drivers: usize,
    pub open_trips: usize,
}

pub trait DispatchStore: Send + Sync {
    /// Fails with [`StoreError::DriverBusy`] while the driver holds an open trip.
    fn mark_available(&self, driver_id: DriverId) -> Result<Availability, StoreError>;

    fn is_available(&self, driver_id: DriverId) -> Result<bool, StoreError>;

    /// Idempotent; returns whether the driver was listed.
    fn remove_available(&self, driver_id: DriverId) -> Result<bool, StoreError>;

    /// Removes and returns a random available driver without creating a trip.
    fn reserve_random_driver(&self) -> Result<DriverId, StoreError>;

    /// Reserves a random driver and records a `Requested` trip bound to it.
    fn create_trip(
        &self,
        passenger_id: PassengerId,
        postal_code: &str,
        at: DateTime<Utc>,
    ) -> Result<Trip, StoreError>;

    fn accept_trip(
        &self,
        trip_id: TripId,
        driver_id: DriverId,
        at: DateTime<Utc>,
    ) -> Result<Trip, StoreError>;

    /// Stamps the end time, deletes the trip and releases its driver.
    /// Returns the finalized trip.
    fn complete_trip(
        &self,
        trip_id: TripId,
        driver_id: DriverId,
        at: DateTime<Utc>,
    ) -> Result<Trip, StoreError>;

    fn trip(&self, trip_id: TripId) -> Result<Trip, StoreError>;

    fn driver_trip(&self, driver_id: DriverId) -> Result<Trip, StoreError>;

    fn counts(&self) -> Result<StoreCounts, StoreError>;
}
