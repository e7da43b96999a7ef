use serde::{Deserialize, Serialize};

use crate::error::AppError;

const EARTH_RADIUS_MILES: f64 = 3_958.761_3;
const MILES_PER_DEGREE_LAT: f64 = 69.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.lat.is_finite() || !self.lng.is_finite() {
            return Err(AppError::Validation(
                "coordinates must be finite numbers".to_string(),
            ));
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(AppError::Validation(format!(
                "latitude {} out of range [-90, 90]",
                self.lat
            )));
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            return Err(AppError::Validation(format!(
                "longitude {} out of range [-180, 180]",
                self.lng
            )));
        }
        Ok(())
    }
}

/// Great-circle distance in miles, rounded to 2 decimal places.
pub fn distance_miles(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    let raw = EARTH_RADIUS_MILES * central_angle;
    (raw * 100.0).round() / 100.0
}

/// Coarse bounding-box check used as the proximity index prefilter.
///
/// Must be a superset of the exact haversine cutoff: false positives are
/// fine, false negatives are not. The degree deltas use a slightly small
/// miles-per-degree constant and a floor on the longitude scale near the
/// poles, both of which widen the box.
pub fn coarse_contains(center: &GeoPoint, radius_miles: f64, point: &GeoPoint) -> bool {
    let lat_delta = radius_miles / MILES_PER_DEGREE_LAT;
    let lng_scale = center.lat.to_radians().cos().abs().max(0.01);
    let lng_delta = radius_miles / (MILES_PER_DEGREE_LAT * lng_scale);

    let mut lng_diff = (point.lng - center.lng).abs();
    if lng_diff > 180.0 {
        lng_diff = 360.0 - lng_diff;
    }

    (point.lat - center.lat).abs() <= lat_delta && lng_diff <= lng_delta
}
