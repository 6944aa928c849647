use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::{haversine_km, RadiusQuery};
use crate::models::captain::GeoPoint;

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct LocationFix {
    pub point: GeoPoint,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NearbyCaptain {
    pub captain_id: Uuid,
    pub location: GeoPoint,
    pub distance_km: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct LocationStore {
    fixes: DashMap<Uuid, LocationFix>,
}

impl LocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last write wins. An invalid coordinate leaves the stored one untouched.
    pub fn set_location(&self, captain_id: Uuid, point: GeoPoint) -> Result<LocationFix, AppError> {
        point.validate()?;

        let fix = LocationFix {
            point,
            recorded_at: Utc::now(),
        };
        self.fixes.insert(captain_id, fix);
        Ok(fix)
    }

    pub fn get(&self, captain_id: &Uuid) -> Option<LocationFix> {
        self.fixes.get(captain_id).map(|entry| *entry.value())
    }

    pub fn remove(&self, captain_id: &Uuid) -> Option<LocationFix> {
        self.fixes.remove(captain_id).map(|(_, fix)| fix)
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    pub fn query(
        &self,
        center: Option<GeoPoint>,
        radius_km: f64,
    ) -> Result<Vec<NearbyCaptain>, AppError> {
        let query = RadiusQuery::new(center, radius_km)?;
        Ok(self.query_within(&query))
    }

    /// Scans the map as it is now; writes landing mid-scan may or may not be seen.
    pub fn query_within(&self, query: &RadiusQuery) -> Vec<NearbyCaptain> {
        let center = query.center();

        self.fixes
            .iter()
            .filter(|entry| query.contains(&entry.value().point))
            .map(|entry| NearbyCaptain {
                captain_id: *entry.key(),
                location: entry.value().point,
                distance_km: haversine_km(&center, &entry.value().point),
                recorded_at: entry.value().recorded_at,
            })
            .collect()
    }
}
