use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::driver::{DriverId, PassengerId, TripId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TripState {
    Requested,
    Accepted,
    Completed,
}

impl TripState {
    pub fn as_str(self) -> &'static str {
        match self {
            TripState::Requested => "requested",
            TripState::Accepted => "accepted",
            TripState::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "requested" => Some(TripState::Requested),
            "accepted" => Some(TripState::Accepted),
            "completed" => Some(TripState::Completed),
            _ => None,
        }
    }

    /// The only state this one may move to.
    pub fn next(self) -> Option<Self> {
        match self {
            TripState::Requested => Some(TripState::Accepted),
            TripState::Accepted => Some(TripState::Completed),
            TripState::Completed => None,
        }
    }
}

impl fmt::Display for TripState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("trip {trip_id} is not assigned to driver {driver_id}")]
    NotAssigned { trip_id: TripId, driver_id: DriverId },

    #[error("trip {trip_id} is {from}, cannot move to {to}")]
    InvalidState {
        trip_id: TripId,
        from: TripState,
        to: TripState,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Trip {
    pub id: TripId,
    pub postal_code: String,
    pub passenger_id: PassengerId,
    pub driver_id: DriverId,
    pub state: TripState,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Trip {
    pub fn requested(
        id: TripId,
        passenger_id: PassengerId,
        postal_code: impl Into<String>,
        driver_id: DriverId,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            postal_code: postal_code.into(),
            passenger_id,
            driver_id,
            state: TripState::Requested,
            created_at: at,
            start_time: None,
            end_time: None,
        }
    }

    /// Requested -> Accepted, stamping `start_time`.
    pub fn accept(&mut self, driver_id: DriverId, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.advance(driver_id, TripState::Accepted)?;
        self.start_time = Some(at);
        Ok(())
    }

    /// Accepted -> Completed, stamping `end_time`.
    ///
    /// A clock that stepped backwards never yields an end before the start.
    pub fn complete(
        &mut self,
        driver_id: DriverId,
        at: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.advance(driver_id, TripState::Completed)?;
        let end = match self.start_time {
            Some(start) if start > at => start,
            _ => at,
        };
        self.end_time = Some(end);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.state != TripState::Completed
    }

    fn advance(&mut self, driver_id: DriverId, to: TripState) -> Result<(), TransitionError> {
        if self.driver_id != driver_id {
            return Err(TransitionError::NotAssigned {
                trip_id: self.id,
                driver_id,
            });
        }

        if self.state.next() != Some(to) {
            return Err(TransitionError::InvalidState {
                trip_id: self.id,
                from: self.state,
                to,
            });
        }

        self.state = to;
        Ok(())
    }
}

/// Finalized trip as handed to the trip-history archive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TripRecord {
    pub id: TripId,
    pub postal_code: String,
    pub passenger_id: PassengerId,
    pub driver_id: DriverId,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub end_time: DateTime<Utc>,
}

impl TripRecord {
    /// Builds the archive record from a completed trip; `None` for trips still open.
    pub fn from_completed(trip: &Trip) -> Option<Self> {
        if trip.state != TripState::Completed {
            return None;
        }

        Some(Self {
            id: trip.id,
            postal_code: trip.postal_code.clone(),
            passenger_id: trip.passenger_id,
            driver_id: trip.driver_id,
            start_time: trip.start_time?,
            end_time: trip.end_time?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripEvent {
    pub trip: Trip,
    pub at: DateTime<Utc>,
}
