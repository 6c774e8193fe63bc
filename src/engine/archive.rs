use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::info;

use crate::models::driver::TripId;
use crate::models::trip::TripRecord;

const TRIPS_LOG_PATH: &str = "/api/v1/tripsLog";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive call timed out after {0:?}")]
    Timeout(Duration),

    #[error("archive rejected trip {trip_id} with status {status}")]
    Rejected { trip_id: TripId, status: u16 },

    #[error("archive request failed: {0}")]
    Transport(String),
}

/// Downstream trip-history service. Delivery is at most once.
#[async_trait]
pub trait TripArchive: Send + Sync {
    async fn archive(&self, record: &TripRecord) -> Result<(), ArchiveError>;
}

/// Posts finalized trips to the trip-history HTTP service.
pub struct HttpTripArchive {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpTripArchive {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ArchiveError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ArchiveError::Transport(format!("failed to build client: {err}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}{TRIPS_LOG_PATH}", base_url.trim_end_matches('/')),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TripArchive for HttpTripArchive {
    async fn archive(&self, record: &TripRecord) -> Result<(), ArchiveError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(record)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ArchiveError::Timeout(self.timeout)
                } else {
                    ArchiveError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArchiveError::Rejected {
                trip_id: record.id,
                status: status.as_u16(),
            });
        }

        Ok(())
    }
}

/// Used when no archive endpoint is configured; records are only logged.
pub struct DisabledArchive;

#[async_trait]
impl TripArchive for DisabledArchive {
    async fn archive(&self, record: &TripRecord) -> Result<(), ArchiveError> {
        info!(trip_id = record.id, "archive disabled; dropping trip record");
        Ok(())
    }
}
