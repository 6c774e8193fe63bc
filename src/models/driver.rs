use serde::{Deserialize, Serialize};

pub type DriverId = i64;
pub type PassengerId = i64;
pub type TripId = i64;

/// Result of declaring a driver available.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Availability {
    Added,
    Unchanged,
}

impl Availability {
    pub fn changed(self) -> bool {
        self == Availability::Added
    }
}
