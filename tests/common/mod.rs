#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use trip_dispatch::engine::archive::{ArchiveError, TripArchive};
use trip_dispatch::engine::coordinator::{Coordinator, CoordinatorOptions};
use trip_dispatch::models::trip::TripRecord;
use trip_dispatch::observability::metrics::Metrics;
use trip_dispatch::store::DispatchStore;

pub const ARCHIVE_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Default)]
pub struct RecordingArchive {
    records: Mutex<Vec<TripRecord>>,
}

impl RecordingArchive {
    pub fn records(&self) -> Vec<TripRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl TripArchive for RecordingArchive {
    async fn archive(&self, record: &TripRecord) -> Result<(), ArchiveError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

pub struct FailingArchive;

#[async_trait]
impl TripArchive for FailingArchive {
    async fn archive(&self, record: &TripRecord) -> Result<(), ArchiveError> {
        Err(ArchiveError::Rejected {
            trip_id: record.id,
            status: 500,
        })
    }
}

pub struct StalledArchive;

#[async_trait]
impl TripArchive for StalledArchive {
    async fn archive(&self, _record: &TripRecord) -> Result<(), ArchiveError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }
}

pub fn options() -> CoordinatorOptions {
    CoordinatorOptions {
        archive_timeout: ARCHIVE_TIMEOUT,
        event_buffer_size: 64,
    }
}

pub fn coordinator(store: Arc<dyn DispatchStore>, archive: Arc<dyn TripArchive>) -> Coordinator {
    Coordinator::new(store, archive, Metrics::new(), options())
}
