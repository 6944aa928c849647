use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ride_matcher::api;
use ride_matcher::config::{Config, LogFormat};
use ride_matcher::error::AppError;
use ride_matcher::geo::google::GoogleMapsProvider;
use ride_matcher::geo::provider::{DisabledGeoProvider, GeoProvider};
use ride_matcher::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Compact => subscriber.compact().init(),
    }

    let geo: Arc<dyn GeoProvider> = match &config.google_maps_api_key {
        Some(key) => Arc::new(GoogleMapsProvider::new(
            &config.google_maps_base_url,
            key.clone(),
        )?),
        None => {
            warn!("GOOGLE_MAPS_API_KEY not set; candidates are ranked by straight-line distance");
            Arc::new(DisabledGeoProvider)
        }
    };

    let shared_state = Arc::new(AppState::new(&config.matching, &config.live, geo));
    let app = api::rest::router(shared_state);

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
