use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::captain::{CaptainStatus, GeoPoint};
use crate::models::route::RouteMetrics;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Requested,
    Accepted,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub user_id: Uuid,
    pub pickup: GeoPoint,
    pub pickup_address: Option<String>,
    pub destination_address: Option<String>,
    pub radius_km: f64,
    pub status: RideStatus,
    pub candidate_ids: Vec<Uuid>,
    pub captain_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub captain_id: Uuid,
    pub name: String,
    pub status: CaptainStatus,
    pub location: GeoPoint,
    pub straight_line_km: f64,
    pub last_available_at: Option<DateTime<Utc>>,
    pub route: Option<RouteMetrics>,
}
