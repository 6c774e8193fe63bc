use std::sync::Arc;

use crate::engine::archive::TripArchive;
use crate::engine::coordinator::{Coordinator, CoordinatorOptions};
use crate::observability::metrics::Metrics;
use crate::store::DispatchStore;

pub struct AppState {
    pub coordinator: Coordinator,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DispatchStore>,
        archive: Arc<dyn TripArchive>,
        options: CoordinatorOptions,
    ) -> Self {
        let metrics = Metrics::new();
        let coordinator = Coordinator::new(store, archive, metrics.clone(), options);

        Self {
            coordinator,
            metrics,
        }
    }
}
