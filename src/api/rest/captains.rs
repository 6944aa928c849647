use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::captain::{Captain, CaptainStatus, CaptainView, GeoPoint, Vehicle};
use crate::models::identity::Identity;
use crate::state::AppState;
use crate::store::locations::{LocationFix, NearbyCaptain};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/captains", post(register_captain).get(list_captains))
        .route("/captains/nearby", get(nearby_captains))
        .route("/captains/:id", get(get_captain).delete(delete_captain))
        .route("/captains/:id/status", patch(update_captain_status))
        .route("/captains/:id/location", patch(update_captain_location))
}

#[derive(Deserialize)]
pub struct RegisterCaptainRequest {
    pub name: String,
    pub vehicle: Vehicle,
    pub status: Option<CaptainStatus>,
    pub location: Option<GeoPoint>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: CaptainStatus,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

#[derive(Deserialize)]
pub struct NearbyQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius_km: Option<f64>,
}

fn view(state: &AppState, captain: Captain) -> CaptainView {
    let fix = state.locations.get(&captain.id);
    CaptainView {
        captain,
        location: fix.map(|fix| fix.point),
        location_updated_at: fix.map(|fix| fix.recorded_at),
    }
}

async fn register_captain(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterCaptainRequest>,
) -> Result<Json<CaptainView>, AppError> {
    if payload.name.trim().len() < 3 {
        return Err(AppError::InvalidArguments(
            "name must be at least 3 characters".to_string(),
        ));
    }

    if payload.vehicle.capacity == 0 {
        return Err(AppError::InvalidArguments(
            "vehicle capacity must be > 0".to_string(),
        ));
    }

    if payload.vehicle.plate.trim().is_empty() || payload.vehicle.color.trim().is_empty() {
        return Err(AppError::InvalidArguments(
            "vehicle plate and color are required".to_string(),
        ));
    }

    if let Some(location) = &payload.location {
        location.validate()?;
    }

    let captain = state.captains.register(
        payload.name.trim().to_string(),
        payload.vehicle,
        payload.status.unwrap_or(CaptainStatus::Offline),
    );

    if let Some(location) = payload.location {
        state.locations.set_location(captain.id, location)?;
    }

    info!(captain_id = %captain.id, "captain registered");
    Ok(Json(view(&state, captain)))
}

async fn list_captains(State(state): State<Arc<AppState>>) -> Json<Vec<CaptainView>> {
    let captains = state
        .captains
        .list()
        .into_iter()
        .map(|captain| view(&state, captain))
        .collect();
    Json(captains)
}

async fn get_captain(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CaptainView>, AppError> {
    let captain = state.captains.get(&id)?;
    Ok(Json(view(&state, captain)))
}

async fn delete_captain(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CaptainView>, AppError> {
    let captain = state.captains.soft_delete(&id)?;
    state.locations.remove(&id);
    state.interest.clear(&id);
    state.connections.unregister(&Identity::captain(id));

    info!(captain_id = %id, "captain soft-deleted");
    Ok(Json(view(&state, captain)))
}

async fn update_captain_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<CaptainView>, AppError> {
    let captain = state.captains.set_status(&id, payload.status)?;
    Ok(Json(view(&state, captain)))
}

async fn update_captain_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<LocationFix>, AppError> {
    let fix = state.dispatcher.push_location(id, payload.location).await?;
    Ok(Json(fix))
}

async fn nearby_captains(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NearbyQuery>,
) -> Result<Json<Vec<NearbyCaptain>>, AppError> {
    let center = match (params.lat, params.lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
        _ => None,
    };
    let radius_km = params.radius_km.unwrap_or(state.default_radius_km);

    let mut nearby = state.locations.query(center, radius_km)?;
    nearby.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    Ok(Json(nearby))
}
