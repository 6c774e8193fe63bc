use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::engine::registry::AvailabilityRegistry;
use crate::models::driver::{Availability, DriverId, PassengerId, TripId};
use crate::models::trip::Trip;
use crate::store::{DispatchStore, StoreCounts, StoreError};

#[derive(Debug, Default)]
struct Inner {
    registry: AvailabilityRegistry,
    trips: HashMap<TripId, Trip>,
    driver_trips: HashMap<DriverId, TripId>,
    last_trip_id: TripId,
}

impl Inner {
    fn reserve(&mut self) -> Result<DriverId, StoreError> {
        let driver_trips = &self.driver_trips;
        self.registry
            .reserve_random(&mut rand::thread_rng(), |id| !driver_trips.contains_key(&id))
            .ok_or(StoreError::NoDriverAvailable)
    }

    fn open_trip_mut(&mut self, trip_id: TripId) -> Result<&mut Trip, StoreError> {
        self.trips
            .get_mut(&trip_id)
            .ok_or(StoreError::TripNotFound(trip_id))
    }
}

/// Process-local store. All state sits behind one mutex, so each trait
/// method is a single critical section.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl DispatchStore for MemoryStore {
    fn mark_available(&self, driver_id: DriverId) -> Result<Availability, StoreError> {
        let mut inner = self.lock()?;
        if inner.driver_trips.contains_key(&driver_id) {
            return Err(StoreError::DriverBusy(driver_id));
        }
        Ok(inner.registry.mark_available(driver_id))
    }

    fn is_available(&self, driver_id: DriverId) -> Result<bool, StoreError> {
        Ok(self.lock()?.registry.is_available(driver_id))
    }

    fn remove_available(&self, driver_id: DriverId) -> Result<bool, StoreError> {
        Ok(self.lock()?.registry.remove(driver_id))
    }

    fn reserve_random_driver(&self) -> Result<DriverId, StoreError> {
        self.lock()?.reserve()
    }

    fn create_trip(
        &self,
        passenger_id: PassengerId,
        postal_code: &str,
        at: DateTime<Utc>,
    ) -> Result<Trip, StoreError> {
        let mut inner = self.lock()?;
        let driver_id = inner.reserve()?;

        inner.last_trip_id += 1;
        let trip = Trip::requested(inner.last_trip_id, passenger_id, postal_code, driver_id, at);
        inner.driver_trips.insert(driver_id, trip.id);
        inner.trips.insert(trip.id, trip.clone());

        Ok(trip)
    }

    fn accept_trip(
        &self,
        trip_id: TripId,
        driver_id: DriverId,
        at: DateTime<Utc>,
    ) -> Result<Trip, StoreError> {
        let mut inner = self.lock()?;
        let trip = inner.open_trip_mut(trip_id)?;

        let mut updated = trip.clone();
        updated.accept(driver_id, at)?;
        *trip = updated.clone();

        Ok(updated)
    }

    fn complete_trip(
        &self,
        trip_id: TripId,
        driver_id: DriverId,
        at: DateTime<Utc>,
    ) -> Result<Trip, StoreError> {
        let mut inner = self.lock()?;

        let mut finished = inner.open_trip_mut(trip_id)?.clone();
        finished.complete(driver_id, at)?;

        inner.trips.remove(&trip_id);
        inner.driver_trips.remove(&finished.driver_id);
        inner.registry.release(finished.driver_id);

        Ok(finished)
    }

    fn trip(&self, trip_id: TripId) -> Result<Trip, StoreError> {
        let inner = self.lock()?;
        inner
            .trips
            .get(&trip_id)
            .cloned()
            .ok_or(StoreError::TripNotFound(trip_id))
    }

    fn driver_trip(&self, driver_id: DriverId) -> Result<Trip, StoreError> {
        let inner = self.lock()?;
        inner
            .driver_trips
            .get(&driver_id)
            .and_then(|trip_id| inner.trips.get(trip_id))
            .cloned()
            .ok_or(StoreError::NoOpenTrip(driver_id))
    }

    fn counts(&self) -> Result<StoreCounts, StoreError> {
        let inner = self.lock()?;
        Ok(StoreCounts {
            available_drivers: inner.registry.len(),
            open_trips: inner.trips.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::MemoryStore;
    use crate::models::driver::Availability;
    use crate::models::trip::TripState;
    use crate::store::{DispatchStore, StoreError};

    #[test]
    fn create_trip_reserves_the_only_driver() {
        let store = MemoryStore::new();
        store.mark_available(1).unwrap();

        let trip = store.create_trip(10, "12345", Utc::now()).unwrap();

        assert_eq!(trip.driver_id, 1);
        assert_eq!(trip.state, TripState::Requested);
        assert!(!store.is_available(1).unwrap());
    }

    #[test]
    fn create_trip_without_drivers_writes_nothing() {
        let store = MemoryStore::new();

        let err = store.create_trip(10, "12345", Utc::now()).unwrap_err();

        assert!(matches!(err, StoreError::NoDriverAvailable));
        assert_eq!(store.counts().unwrap().open_trips, 0);
    }

    #[test]
    fn trip_ids_are_monotonic() {
        let store = MemoryStore::new();
        store.mark_available(1).unwrap();
        store.mark_available(2).unwrap();

        let first = store.create_trip(10, "1", Utc::now()).unwrap();
        let second = store.create_trip(11, "2", Utc::now()).unwrap();

        assert!(second.id > first.id);
    }

    #[test]
    fn busy_driver_cannot_be_marked_available() {
        let store = MemoryStore::new();
        store.mark_available(1).unwrap();
        store.create_trip(10, "12345", Utc::now()).unwrap();

        let err = store.mark_available(1).unwrap_err();

        assert!(matches!(err, StoreError::DriverBusy(1)));
        assert!(!store.is_available(1).unwrap());
    }

    #[test]
    fn complete_trip_releases_driver_and_deletes_trip() {
        let store = MemoryStore::new();
        store.mark_available(1).unwrap();
        let trip = store.create_trip(10, "12345", Utc::now()).unwrap();
        store.accept_trip(trip.id, 1, Utc::now()).unwrap();

        let finished = store.complete_trip(trip.id, 1, Utc::now()).unwrap();

        assert_eq!(finished.state, TripState::Completed);
        assert!(store.is_available(1).unwrap());
        assert!(matches!(
            store.driver_trip(1).unwrap_err(),
            StoreError::NoOpenTrip(1)
        ));
        assert!(matches!(
            store.trip(trip.id).unwrap_err(),
            StoreError::TripNotFound(_)
        ));
    }

    #[test]
    fn rejected_completion_leaves_state_untouched() {
        let store = MemoryStore::new();
        store.mark_available(1).unwrap();
        let trip = store.create_trip(10, "12345", Utc::now()).unwrap();

        assert!(store.complete_trip(trip.id, 1, Utc::now()).is_err());
        assert!(store.complete_trip(trip.id, 2, Utc::now()).is_err());

        assert_eq!(store.trip(trip.id).unwrap().state, TripState::Requested);
        assert!(!store.is_available(1).unwrap());
    }

    #[test]
    fn remove_available_is_idempotent() {
        let store = MemoryStore::new();
        assert_eq!(store.mark_available(4).unwrap(), Availability::Added);

        assert!(store.remove_available(4).unwrap());
        assert!(!store.remove_available(4).unwrap());
        assert!(!store.is_available(4).unwrap());
    }

    #[test]
    fn reserve_random_driver_empties_the_registry() {
        let store = MemoryStore::new();
        store.mark_available(5).unwrap();

        assert_eq!(store.reserve_random_driver().unwrap(), 5);
        assert!(matches!(
            store.reserve_random_driver().unwrap_err(),
            StoreError::NoDriverAvailable
        ));
    }
}
