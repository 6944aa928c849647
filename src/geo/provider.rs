use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, timeout};
use tracing::warn;

use crate::error::AppError;
use crate::models::captain::GeoPoint;
use crate::models::route::RouteMetrics;
use crate::observability::metrics::Metrics;

/// Geocoding, routing and autocomplete, backed by a third-party maps service.
///
/// Implementations must translate every upstream failure into one of
/// `AddressNotFound`, `NoRoute`, `InvalidArguments` or `UpstreamUnavailable`.
#[async_trait]
pub trait GeoProvider: Send + Sync {
    async fn resolve_address(&self, text: &str) -> Result<GeoPoint, AppError>;

    async fn compute_route_metrics(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
    ) -> Result<RouteMetrics, AppError>;

    async fn autocomplete(&self, text: &str) -> Result<Vec<String>, AppError>;

    fn is_configured(&self) -> bool {
        true
    }
}

#[derive(Debug, Default)]
pub struct DisabledGeoProvider;

#[async_trait]
impl GeoProvider for DisabledGeoProvider {
    async fn resolve_address(&self, _text: &str) -> Result<GeoPoint, AppError> {
        Err(disabled())
    }

    async fn compute_route_metrics(
        &self,
        _origin: &GeoPoint,
        _destination: &GeoPoint,
    ) -> Result<RouteMetrics, AppError> {
        Err(disabled())
    }

    async fn autocomplete(&self, _text: &str) -> Result<Vec<String>, AppError> {
        Err(disabled())
    }

    fn is_configured(&self) -> bool {
        false
    }
}

fn disabled() -> AppError {
    AppError::UpstreamUnavailable("maps provider is not configured".to_string())
}

pub struct GuardedGeoProvider {
    inner: Arc<dyn GeoProvider>,
    attempt_timeout: Duration,
    backoff: Duration,
    metrics: Metrics,
}

impl GuardedGeoProvider {
    pub fn new(
        inner: Arc<dyn GeoProvider>,
        attempt_timeout: Duration,
        backoff: Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            inner,
            attempt_timeout,
            backoff,
            metrics,
        }
    }

    async fn call<T, F, Fut>(&self, operation: &'static str, op: F) -> Result<T, AppError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        if !self.inner.is_configured() {
            self.metrics
                .geo_requests_total
                .with_label_values(&[operation, "disabled"])
                .inc();
            return Err(disabled());
        }

        let mut result = self.attempt(operation, &op).await;

        if let Err(AppError::UpstreamUnavailable(reason)) = &result {
            warn!(operation, reason = %reason, "maps provider unavailable; retrying once");
            sleep(self.backoff).await;
            result = self.attempt(operation, &op).await;
        }

        let outcome = match &result {
            Ok(_) => "ok",
            Err(AppError::UpstreamUnavailable(_)) => "unavailable",
            Err(_) => "rejected",
        };
        self.metrics
            .geo_requests_total
            .with_label_values(&[operation, outcome])
            .inc();

        result
    }

    async fn attempt<T, F, Fut>(&self, operation: &'static str, op: &F) -> Result<T, AppError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        match timeout(self.attempt_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(AppError::UpstreamUnavailable(format!(
                "{operation} timed out after {}ms",
                self.attempt_timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl GeoProvider for GuardedGeoProvider {
    async fn resolve_address(&self, text: &str) -> Result<GeoPoint, AppError> {
        if text.trim().is_empty() {
            return Err(AppError::InvalidArguments("address is required".to_string()));
        }
        self.call("resolve_address", || self.inner.resolve_address(text))
            .await
    }

    async fn compute_route_metrics(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
    ) -> Result<RouteMetrics, AppError> {
        self.call("compute_route_metrics", || {
            self.inner.compute_route_metrics(origin, destination)
        })
        .await
    }

    async fn autocomplete(&self, text: &str) -> Result<Vec<String>, AppError> {
        if text.trim().is_empty() {
            return Err(AppError::InvalidArguments("input is required".to_string()));
        }
        self.call("autocomplete", || self.inner.autocomplete(text))
            .await
    }

    fn is_configured(&self) -> bool {
        self.inner.is_configured()
    }
}
