//! Google Maps Platform adapter: geocoding, distance matrix and place autocomplete.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use crate::error::AppError;
use crate::geo::provider::GeoProvider;
use crate::models::captain::GeoPoint;
use crate::models::route::{Measure, RouteMetrics};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct GoogleMapsProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GoogleMapsProvider {
    pub fn new(base_url: &str, api_key: String) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build maps client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, AppError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|err| AppError::Internal(format!("failed to build maps URL: {err}")))?;
        url.query_pairs_mut()
            .extend_pairs(params.iter())
            .append_pair("key", &self.api_key);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| upstream(path, format!("request failed: {}", err.without_url())))?;

        if !response.status().is_success() {
            return Err(upstream(path, format!("HTTP {}", response.status())));
        }

        response
            .json::<T>()
            .await
            .map_err(|err| upstream(path, format!("malformed response: {}", err.without_url())))
    }
}

fn upstream(path: &str, reason: String) -> AppError {
    warn!(endpoint = path, reason = %reason, "maps request failed");
    AppError::UpstreamUnavailable(reason)
}

fn format_point(point: &GeoPoint) -> String {
    format!("{:.6},{:.6}", point.lat, point.lng)
}

#[async_trait]
impl GeoProvider for GoogleMapsProvider {
    async fn resolve_address(&self, text: &str) -> Result<GeoPoint, AppError> {
        let response: GeocodeResponse = self
            .get_json("/maps/api/geocode/json", &[("address", text)])
            .await?;
        parse_geocode_response(response, text)
    }

    async fn compute_route_metrics(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
    ) -> Result<RouteMetrics, AppError> {
        let origins = format_point(origin);
        let destinations = format_point(destination);
        let response: DistanceMatrixResponse = self
            .get_json(
                "/maps/api/distancematrix/json",
                &[("origins", origins.as_str()), ("destinations", destinations.as_str())],
            )
            .await?;
        parse_distance_matrix_response(response)
    }

    async fn autocomplete(&self, text: &str) -> Result<Vec<String>, AppError> {
        let response: AutocompleteResponse = self
            .get_json("/maps/api/place/autocomplete/json", &[("input", text)])
            .await?;
        parse_autocomplete_response(response)
    }
}

#[derive(Debug, Deserialize)]
pub struct GeocodeResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<GeocodeResult>,
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GeocodeResult {
    pub geometry: Geometry,
}

#[derive(Debug, Deserialize)]
pub struct Geometry {
    pub location: GeoPoint,
}

#[derive(Debug, Deserialize)]
pub struct DistanceMatrixResponse {
    pub status: String,
    #[serde(default)]
    pub rows: Vec<DistanceMatrixRow>,
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DistanceMatrixRow {
    #[serde(default)]
    pub elements: Vec<DistanceMatrixElement>,
}

#[derive(Debug, Deserialize)]
pub struct DistanceMatrixElement {
    pub status: String,
    pub distance: Option<Measure>,
    pub duration: Option<Measure>,
}

#[derive(Debug, Deserialize)]
pub struct AutocompleteResponse {
    pub status: String,
    #[serde(default)]
    pub predictions: Vec<Prediction>,
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Prediction {
    pub description: Option<String>,
}

fn status_error(status: &str, message: Option<String>) -> AppError {
    match status {
        "INVALID_REQUEST" => AppError::InvalidArguments(
            message.unwrap_or_else(|| "maps provider rejected the request".to_string()),
        ),
        other => AppError::UpstreamUnavailable(match message {
            Some(message) => format!("maps status {other}: {message}"),
            None => format!("maps status {other}"),
        }),
    }
}

pub fn parse_geocode_response(response: GeocodeResponse, query: &str) -> Result<GeoPoint, AppError> {
    match response.status.as_str() {
        "OK" => response
            .results
            .into_iter()
            .next()
            .map(|result| result.geometry.location)
            .ok_or_else(|| AppError::AddressNotFound(query.to_string())),
        "ZERO_RESULTS" => Err(AppError::AddressNotFound(query.to_string())),
        other => Err(status_error(other, response.error_message)),
    }
}

pub fn parse_distance_matrix_response(
    response: DistanceMatrixResponse,
) -> Result<RouteMetrics, AppError> {
    if response.status != "OK" {
        return Err(status_error(&response.status, response.error_message));
    }

    let element = response
        .rows
        .into_iter()
        .next()
        .and_then(|row| row.elements.into_iter().next())
        .ok_or(AppError::NoRoute)?;

    match element.status.as_str() {
        "OK" => match (element.distance, element.duration) {
            (Some(distance), Some(duration)) => Ok(RouteMetrics { distance, duration }),
            _ => Err(AppError::UpstreamUnavailable(
                "distance matrix element is missing distance or duration".to_string(),
            )),
        },
        "ZERO_RESULTS" | "NOT_FOUND" => Err(AppError::NoRoute),
        other => Err(status_error(other, None)),
    }
}

pub fn parse_autocomplete_response(response: AutocompleteResponse) -> Result<Vec<String>, AppError> {
    match response.status.as_str() {
        "OK" => {
            let mut suggestions: Vec<String> = Vec::with_capacity(response.predictions.len());
            for description in response
                .predictions
                .into_iter()
                .filter_map(|prediction| prediction.description)
            {
                if description.trim().is_empty() || suggestions.contains(&description) {
                    continue;
                }
                suggestions.push(description);
            }
            Ok(suggestions)
        }
        "ZERO_RESULTS" => Ok(Vec::new()),
        other => Err(status_error(other, response.error_message)),
    }
}
