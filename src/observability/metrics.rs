use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

use crate::store::StoreCounts;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub trip_operations_total: IntCounterVec,
    pub archive_calls_total: IntCounterVec,
    pub archive_latency_seconds: HistogramVec,
    pub available_drivers: IntGauge,
    pub open_trips: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let trip_operations_total = IntCounterVec::new(
            Opts::new(
                "trip_operations_total",
                "Trip and availability operations by outcome",
            ),
            &["operation", "outcome"],
        )
        .expect("valid trip_operations_total metric");

        let archive_calls_total = IntCounterVec::new(
            Opts::new("archive_calls_total", "Trip archive calls by outcome"),
            &["outcome"],
        )
        .expect("valid archive_calls_total metric");

        let archive_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "archive_latency_seconds",
                "Latency of trip archive calls in seconds",
            ),
            &["outcome"],
        )
        .expect("valid archive_latency_seconds metric");

        let available_drivers =
            IntGauge::new("available_drivers", "Drivers currently eligible for a trip")
                .expect("valid available_drivers metric");

        let open_trips = IntGauge::new("open_trips", "Trips requested or accepted")
            .expect("valid open_trips metric");

        registry
            .register(Box::new(trip_operations_total.clone()))
            .expect("register trip_operations_total");
        registry
            .register(Box::new(archive_calls_total.clone()))
            .expect("register archive_calls_total");
        registry
            .register(Box::new(archive_latency_seconds.clone()))
            .expect("register archive_latency_seconds");
        registry
            .register(Box::new(available_drivers.clone()))
            .expect("register available_drivers");
        registry
            .register(Box::new(open_trips.clone()))
            .expect("register open_trips");

        Self {
            registry,
            trip_operations_total,
            archive_calls_total,
            archive_latency_seconds,
            available_drivers,
            open_trips,
        }
    }

    pub fn record_operation(&self, operation: &str, outcome: &str) {
        self.trip_operations_total
            .with_label_values(&[operation, outcome])
            .inc();
    }

    pub fn set_counts(&self, counts: StoreCounts) {
        self.available_drivers.set(counts.available_drivers as i64);
        self.open_trips.set(counts.open_trips as i64);
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
