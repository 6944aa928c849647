use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub location_updates_total: IntCounterVec,
    pub match_requests_total: IntCounterVec,
    pub match_latency_seconds: HistogramVec,
    pub live_connections: IntGauge,
    pub notifications_total: IntCounterVec,
    pub geo_requests_total: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let location_updates_total = IntCounterVec::new(
            Opts::new("location_updates_total", "Captain location updates by outcome"),
            &["outcome"],
        )
        .expect("valid location_updates_total metric");

        let match_requests_total = IntCounterVec::new(
            Opts::new("match_requests_total", "Candidate searches by outcome"),
            &["outcome"],
        )
        .expect("valid match_requests_total metric");

        let match_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "match_latency_seconds",
                "Latency of candidate searches in seconds",
            ),
            &["outcome"],
        )
        .expect("valid match_latency_seconds metric");

        let live_connections =
            IntGauge::new("live_connections", "Currently registered live connections")
                .expect("valid live_connections metric");

        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Pushes to live connections by outcome"),
            &["outcome"],
        )
        .expect("valid notifications_total metric");

        let geo_requests_total = IntCounterVec::new(
            Opts::new("geo_requests_total", "Maps provider calls by operation and outcome"),
            &["operation", "outcome"],
        )
        .expect("valid geo_requests_total metric");

        registry
            .register(Box::new(location_updates_total.clone()))
            .expect("register location_updates_total");
        registry
            .register(Box::new(match_requests_total.clone()))
            .expect("register match_requests_total");
        registry
            .register(Box::new(match_latency_seconds.clone()))
            .expect("register match_latency_seconds");
        registry
            .register(Box::new(live_connections.clone()))
            .expect("register live_connections");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(geo_requests_total.clone()))
            .expect("register geo_requests_total");

        Self {
            registry,
            location_updates_total,
            match_requests_total,
            match_latency_seconds,
            live_connections,
            notifications_total,
            geo_requests_total,
        }
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
