use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::captain::{CaptainStatus, GeoPoint};
use crate::models::event::ServerEvent;
use crate::models::identity::Identity;
use crate::models::ride::{Candidate, Ride, RideStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rides", post(request_ride))
        .route("/rides/:id", get(get_ride))
        .route("/rides/:id/accept", post(accept_ride))
        .route("/rides/:id/complete", post(complete_ride))
}

#[derive(Deserialize)]
pub struct RideRequest {
    pub user_id: Uuid,
    pub pickup: Option<GeoPoint>,
    pub pickup_address: Option<String>,
    pub destination_address: Option<String>,
    pub radius_km: Option<f64>,
}

#[derive(Deserialize)]
pub struct AcceptRideRequest {
    pub captain_id: Uuid,
}

#[derive(Serialize)]
pub struct RideRequestResponse {
    pub ride: Ride,
    pub candidates: Vec<Candidate>,
    pub notified: usize,
}

async fn request_ride(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RideRequest>,
) -> Result<Json<RideRequestResponse>, AppError> {
    let pickup = match (payload.pickup, payload.pickup_address.as_deref()) {
        (Some(point), _) => point,
        (None, Some(address)) => state.geo.resolve_address(address).await?,
        (None, None) => {
            return Err(AppError::InvalidArguments(
                "pickup or pickup_address is required".to_string(),
            ));
        }
    };
    let radius_km = payload.radius_km.unwrap_or(state.default_radius_km);

    let candidates = state.matching.find_candidates(Some(pickup), radius_km).await?;

    let now = Utc::now();
    let ride = Ride {
        id: Uuid::new_v4(),
        user_id: payload.user_id,
        pickup,
        pickup_address: payload.pickup_address,
        destination_address: payload.destination_address,
        radius_km,
        status: RideStatus::Requested,
        candidate_ids: candidates.iter().map(|c| c.captain_id).collect(),
        captain_id: None,
        created_at: now,
        updated_at: now,
    };
    state.rides.insert(ride.id, ride.clone());

    let event = ServerEvent::NewRide {
        ride_id: ride.id,
        user_id: ride.user_id,
        pickup: ride.pickup,
        pickup_address: ride.pickup_address.clone(),
        destination_address: ride.destination_address.clone(),
    };
    let targets: Vec<Identity> = ride
        .candidate_ids
        .iter()
        .map(|id| Identity::captain(*id))
        .collect();
    let notified = state.dispatcher.notify_all(&targets, &event).await;

    info!(
        ride_id = %ride.id,
        candidates = candidates.len(),
        notified,
        "ride requested"
    );

    Ok(Json(RideRequestResponse {
        ride,
        candidates,
        notified,
    }))
}

async fn get_ride(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    let ride = state
        .rides
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("ride {id} not found")))?;

    Ok(Json(ride.value().clone()))
}

async fn accept_ride(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcceptRideRequest>,
) -> Result<Json<Ride>, AppError> {
    let ride = {
        let mut ride = state
            .rides
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("ride {id} not found")))?;

        if ride.status != RideStatus::Requested {
            return Err(AppError::Conflict(format!("ride {id} is no longer open")));
        }

        if !ride.candidate_ids.contains(&payload.captain_id) {
            return Err(AppError::Conflict(format!(
                "captain {} was not offered ride {id}",
                payload.captain_id
            )));
        }

        state
            .captains
            .claim_available(&payload.captain_id, CaptainStatus::OnTrip)?;

        ride.status = RideStatus::Accepted;
        ride.captain_id = Some(payload.captain_id);
        ride.updated_at = Utc::now();
        ride.clone()
    };

    let rider = Identity::user(ride.user_id);
    state.interest.watch(payload.captain_id, rider);

    let accepted = ServerEvent::RideAccepted {
        ride_id: ride.id,
        captain_id: payload.captain_id,
    };
    if let Err(err) = state.dispatcher.notify(&rider, accepted).await {
        debug!(ride_id = %ride.id, error = %err, "rider not connected; acceptance not pushed");
    }

    info!(ride_id = %ride.id, captain_id = %payload.captain_id, "ride accepted");
    Ok(Json(ride))
}

async fn complete_ride(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    let ride = {
        let mut ride = state
            .rides
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("ride {id} not found")))?;

        if ride.status != RideStatus::Accepted {
            return Err(AppError::Conflict(format!("ride {id} is not in progress")));
        }

        ride.status = RideStatus::Completed;
        ride.updated_at = Utc::now();
        ride.clone()
    };

    if let Some(captain_id) = ride.captain_id {
        state.interest.clear(&captain_id);
        if let Err(err) = state
            .captains
            .set_status(&captain_id, CaptainStatus::Available)
        {
            debug!(ride_id = %ride.id, captain_id = %captain_id, error = %err, "captain not released");
        }
    }

    let rider = Identity::user(ride.user_id);
    if let Err(err) = state
        .dispatcher
        .notify(&rider, ServerEvent::RideCompleted { ride_id: ride.id })
        .await
    {
        debug!(ride_id = %ride.id, error = %err, "rider not connected; completion not pushed");
    }

    info!(ride_id = %ride.id, "ride completed");
    Ok(Json(ride))
}
