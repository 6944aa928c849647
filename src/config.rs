use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub google_maps_api_key: Option<String>,
    pub google_maps_base_url: String,
    pub matching: MatchingConfig,
    pub live: LiveConfig,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct MatchingConfig {
    pub top_k: usize,
    pub default_radius_km: f64,
    pub geo_timeout: Duration,
    pub geo_retry_backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub offline_grace: Duration,
    pub heartbeat_timeout: Duration,
    pub connection_buffer: usize,
    pub send_timeout: Duration,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            default_radius_km: 2.0,
            geo_timeout: Duration::from_millis(2_000),
            geo_retry_backoff: Duration::from_millis(200),
        }
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            offline_grace: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
            connection_buffer: 64,
            send_timeout: Duration::from_millis(1_000),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") | Err(_) => LogFormat::Compact,
            Ok(other) => {
                return Err(AppError::Internal(format!(
                    "invalid LOG_FORMAT: {other}, expected compact or json"
                )));
            }
        };

        let default_radius_km: f64 = parse_or_default("DEFAULT_RADIUS_KM", 2.0)?;
        if !(default_radius_km.is_finite() && default_radius_km > 0.0) {
            return Err(AppError::Internal(
                "invalid DEFAULT_RADIUS_KM: must be > 0".to_string(),
            ));
        }

        let connection_buffer: usize = parse_or_default("CONNECTION_BUFFER", 64)?;
        if connection_buffer == 0 {
            return Err(AppError::Internal(
                "invalid CONNECTION_BUFFER: must be > 0".to_string(),
            ));
        }

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            google_maps_api_key: env::var("GOOGLE_MAPS_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            google_maps_base_url: env::var("GOOGLE_MAPS_BASE_URL")
                .unwrap_or_else(|_| "https://maps.googleapis.com".to_string()),
            matching: MatchingConfig {
                top_k: parse_or_default("MATCH_TOP_K", 5)?,
                default_radius_km,
                geo_timeout: Duration::from_millis(parse_or_default("GEO_TIMEOUT_MS", 2_000)?),
                geo_retry_backoff: Duration::from_millis(parse_or_default(
                    "GEO_RETRY_BACKOFF_MS",
                    200,
                )?),
            },
            live: LiveConfig {
                offline_grace: Duration::from_secs(parse_or_default("OFFLINE_GRACE_SECS", 30)?),
                heartbeat_timeout: Duration::from_secs(parse_or_default(
                    "HEARTBEAT_TIMEOUT_SECS",
                    60,
                )?),
                connection_buffer,
                send_timeout: Duration::from_millis(parse_or_default("SEND_TIMEOUT_MS", 1_000)?),
            },
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
