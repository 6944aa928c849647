pub mod google;
pub mod provider;

use crate::error::AppError;
use crate::models::captain::GeoPoint;

pub const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn central_angle(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    2.0 * haversine.clamp(0.0, 1.0).sqrt().asin()
}

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    EARTH_RADIUS_KM * central_angle(a, b)
}

/// Spherical cap around `center`. Built only through [`RadiusQuery::new`], so a value
/// always has a valid center and a positive radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusQuery {
    center: GeoPoint,
    radius_km: f64,
}

impl RadiusQuery {
    pub fn new(center: Option<GeoPoint>, radius_km: f64) -> Result<Self, AppError> {
        let center =
            center.ok_or_else(|| AppError::InvalidArguments("center is required".to_string()))?;

        center
            .validate()
            .map_err(|err| AppError::InvalidArguments(format!("center: {err}")))?;

        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(AppError::InvalidArguments(format!(
                "radius must be a positive number of kilometers, got {radius_km}"
            )));
        }

        Ok(Self { center, radius_km })
    }

    pub fn center(&self) -> GeoPoint {
        self.center
    }

    pub fn radius_km(&self) -> f64 {
        self.radius_km
    }

    pub fn angular_radius(&self) -> f64 {
        self.radius_km / EARTH_RADIUS_KM
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        central_angle(&self.center, point) <= self.angular_radius()
    }
}
