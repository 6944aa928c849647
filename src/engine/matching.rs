use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{info, warn};

use crate::engine::ranking::{order_by_proximity, order_by_route};
use crate::error::AppError;
use crate::geo::provider::GeoProvider;
use crate::geo::RadiusQuery;
use crate::models::captain::{CaptainStatus, GeoPoint};
use crate::models::ride::Candidate;
use crate::observability::metrics::Metrics;
use crate::store::captains::CaptainDirectory;
use crate::store::locations::LocationStore;

pub struct MatchingEngine {
    locations: Arc<LocationStore>,
    captains: Arc<CaptainDirectory>,
    geo: Arc<dyn GeoProvider>,
    top_k: usize,
    metrics: Metrics,
}

impl MatchingEngine {
    pub fn new(
        locations: Arc<LocationStore>,
        captains: Arc<CaptainDirectory>,
        geo: Arc<dyn GeoProvider>,
        top_k: usize,
        metrics: Metrics,
    ) -> Self {
        Self {
            locations,
            captains,
            geo,
            top_k,
            metrics,
        }
    }

    pub async fn find_candidates(
        &self,
        pickup: Option<GeoPoint>,
        radius_km: f64,
    ) -> Result<Vec<Candidate>, AppError> {
        let start = Instant::now();
        let result = self.rank(pickup, radius_km).await;

        let outcome = match &result {
            Ok(_) => "matched",
            Err(AppError::NoCaptainsFound) => "empty",
            Err(_) => "error",
        };
        self.metrics
            .match_requests_total
            .with_label_values(&[outcome])
            .inc();
        self.metrics
            .match_latency_seconds
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());

        result
    }

    async fn rank(
        &self,
        pickup: Option<GeoPoint>,
        radius_km: f64,
    ) -> Result<Vec<Candidate>, AppError> {
        let query = RadiusQuery::new(pickup, radius_km)?;
        let pickup = query.center();

        let mut candidates: Vec<Candidate> = self
            .locations
            .query_within(&query)
            .into_iter()
            .filter_map(|hit| {
                let captain = self.captains.get(&hit.captain_id).ok()?;
                (captain.status == CaptainStatus::Available).then(|| Candidate {
                    captain_id: captain.id,
                    name: captain.name,
                    status: captain.status,
                    location: hit.location,
                    straight_line_km: hit.distance_km,
                    last_available_at: captain.last_available_at,
                    route: None,
                })
            })
            .collect();

        if candidates.is_empty() {
            info!(
                lat = pickup.lat,
                lng = pickup.lng,
                radius_km,
                "no available captains in radius"
            );
            return Err(AppError::NoCaptainsFound);
        }

        order_by_proximity(&mut candidates);

        if !self.geo.is_configured() {
            info!(
                candidates = candidates.len(),
                "maps provider not configured; ranked by straight-line distance"
            );
            return Ok(candidates);
        }

        let k = self.top_k.min(candidates.len());
        let lookups = candidates[..k]
            .iter()
            .map(|candidate| self.geo.compute_route_metrics(&candidate.location, &pickup));
        let results = join_all(lookups).await;

        let mut degraded = false;
        for (candidate, result) in candidates[..k].iter_mut().zip(results) {
            match result {
                Ok(metrics) => candidate.route = Some(metrics),
                Err(AppError::NoRoute) => {}
                Err(err) => {
                    warn!(captain_id = %candidate.captain_id, error = %err, "driving time unavailable");
                    degraded = true;
                }
            }
        }

        if degraded {
            warn!(
                candidates = candidates.len(),
                "falling back to straight-line ordering"
            );
        } else {
            order_by_route(&mut candidates[..k]);
        }

        info!(
            candidates = candidates.len(),
            looked_up = k,
            degraded,
            "candidates ranked"
        );

        Ok(candidates)
    }
}
