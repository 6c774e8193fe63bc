use std::collections::HashSet;

use rand::Rng;
use rand::seq::IteratorRandom;

use crate::models::driver::{Availability, DriverId};

/// Drivers currently eligible for a new trip.
///
/// Membership only; the registry holds no ordering. Callers that need the
/// registry and trip storage to move together hold both under one lock.
#[derive(Debug, Default, Clone)]
pub struct AvailabilityRegistry {
    drivers: HashSet<DriverId>,
}

impl AvailabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_available(&mut self, driver_id: DriverId) -> Availability {
        if self.drivers.insert(driver_id) {
            Availability::Added
        } else {
            Availability::Unchanged
        }
    }

    pub fn is_available(&self, driver_id: DriverId) -> bool {
        self.drivers.contains(&driver_id)
    }

    /// Returns whether the driver was present.
    pub fn remove(&mut self, driver_id: DriverId) -> bool {
        self.drivers.remove(&driver_id)
    }

    /// Picks a uniformly random member accepted by `eligible` and removes it.
    pub fn reserve_random<R, F>(&mut self, rng: &mut R, eligible: F) -> Option<DriverId>
    where
        R: Rng + ?Sized,
        F: Fn(DriverId) -> bool,
    {
        let chosen = self
            .drivers
            .iter()
            .copied()
            .filter(|driver_id| eligible(*driver_id))
            .choose(rng)?;

        self.drivers.remove(&chosen);
        Some(chosen)
    }

    pub fn release(&mut self, driver_id: DriverId) {
        self.drivers.insert(driver_id);
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}
