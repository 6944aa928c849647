use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::captain::GeoPoint;
use crate::models::route::RouteMetrics;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/maps/coordinates", get(get_coordinates))
        .route("/maps/distance-time", get(get_distance_time))
        .route("/maps/suggestions", get(get_suggestions))
}

#[derive(Deserialize)]
pub struct AddressQuery {
    pub address: Option<String>,
}

#[derive(Deserialize)]
pub struct DistanceTimeQuery {
    pub origin: Option<String>,
    pub destination: Option<String>,
}

#[derive(Deserialize)]
pub struct SuggestionsQuery {
    pub input: Option<String>,
}

fn required(value: Option<String>, name: &str) -> Result<String, AppError> {
    value
        .filter(|v| v.trim().len() >= 3)
        .ok_or_else(|| AppError::InvalidArguments(format!("{name} must be at least 3 characters")))
}

async fn get_coordinates(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AddressQuery>,
) -> Result<Json<GeoPoint>, AppError> {
    let address = required(params.address, "address")?;
    let point = state.geo.resolve_address(&address).await?;
    Ok(Json(point))
}

async fn get_distance_time(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DistanceTimeQuery>,
) -> Result<Json<RouteMetrics>, AppError> {
    let origin = required(params.origin, "origin")?;
    let destination = required(params.destination, "destination")?;

    let (origin, destination) = futures::try_join!(
        state.geo.resolve_address(&origin),
        state.geo.resolve_address(&destination)
    )?;
    let metrics = state.geo.compute_route_metrics(&origin, &destination).await?;
    Ok(Json(metrics))
}

async fn get_suggestions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SuggestionsQuery>,
) -> Result<Json<Vec<String>>, AppError> {
    let input = required(params.input, "input")?;
    let suggestions = state.geo.autocomplete(&input).await?;
    Ok(Json(suggestions))
}
