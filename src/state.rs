use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use uuid::Uuid;

use crate::config::{LiveConfig, MatchingConfig};
use crate::engine::dispatcher::LiveUpdateDispatcher;
use crate::engine::matching::MatchingEngine;
use crate::geo::provider::{GeoProvider, GuardedGeoProvider};
use crate::models::ride::Ride;
use crate::observability::metrics::Metrics;
use crate::store::captains::CaptainDirectory;
use crate::store::connections::ConnectionRegistry;
use crate::store::interest::InterestRegistry;
use crate::store::locations::LocationStore;

pub struct AppState {
    pub captains: Arc<CaptainDirectory>,
    pub locations: Arc<LocationStore>,
    pub connections: Arc<ConnectionRegistry>,
    pub interest: Arc<InterestRegistry>,
    pub rides: DashMap<Uuid, Ride>,
    pub geo: Arc<dyn GeoProvider>,
    pub matching: MatchingEngine,
    pub dispatcher: Arc<LiveUpdateDispatcher>,
    pub default_radius_km: f64,
    pub connection_buffer: usize,
    pub heartbeat_timeout: Duration,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(matching: &MatchingConfig, live: &LiveConfig, geo: Arc<dyn GeoProvider>) -> Self {
        let metrics = Metrics::new();

        let captains = Arc::new(CaptainDirectory::new());
        let locations = Arc::new(LocationStore::new());
        let connections = Arc::new(ConnectionRegistry::new(live.send_timeout, metrics.clone()));
        let interest = Arc::new(InterestRegistry::new());

        let geo: Arc<dyn GeoProvider> = Arc::new(GuardedGeoProvider::new(
            geo,
            matching.geo_timeout,
            matching.geo_retry_backoff,
            metrics.clone(),
        ));

        let engine = MatchingEngine::new(
            locations.clone(),
            captains.clone(),
            geo.clone(),
            matching.top_k,
            metrics.clone(),
        );

        let dispatcher = Arc::new(LiveUpdateDispatcher::new(
            locations.clone(),
            captains.clone(),
            connections.clone(),
            interest.clone(),
            live.offline_grace,
            metrics.clone(),
        ));

        Self {
            captains,
            locations,
            connections,
            interest,
            rides: DashMap::new(),
            geo,
            matching: engine,
            dispatcher,
            default_radius_km: matching.default_radius_km,
            connection_buffer: live.connection_buffer,
            heartbeat_timeout: live.heartbeat_timeout,
            metrics,
        }
    }
}
