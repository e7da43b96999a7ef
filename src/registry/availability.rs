//! Driver availability: going online with a location, service radius and
//! optional expiry; going offline; lazy-expiry reads.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::driver::{Availability, Driver};
use crate::models::event::RideEvent;
use crate::notify::messages;
use crate::state::AppState;

pub const MIN_RADIUS_MILES: f64 = 1.0;
pub const MAX_RADIUS_MILES: f64 = 50.0;
pub const MAX_DURATION_HOURS: f64 = 24.0;

pub fn set_available(
    state: &AppState,
    driver_id: Uuid,
    location: GeoPoint,
    radius_miles: f64,
    duration_hours: Option<f64>,
    now: DateTime<Utc>,
) -> Result<Driver, AppError> {
    location.validate()?;

    if !radius_miles.is_finite() || !(MIN_RADIUS_MILES..=MAX_RADIUS_MILES).contains(&radius_miles) {
        return Err(AppError::Validation(format!(
            "service radius must be between {MIN_RADIUS_MILES} and {MAX_RADIUS_MILES} miles"
        )));
    }

    let expires_at = match duration_hours {
        Some(hours) => {
            if !hours.is_finite() || hours <= 0.0 || hours > MAX_DURATION_HOURS {
                return Err(AppError::Validation(format!(
                    "duration must be between 0 and {MAX_DURATION_HOURS} hours"
                )));
            }
            Some(now + Duration::seconds((hours * 3600.0).round() as i64))
        }
        None => None,
    };

    let driver = state.store.transaction(|store| {
        let mut driver = store
            .drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

        driver.availability = Availability::open(location, radius_miles, now, expires_at);
        driver.updated_at = now;
        Ok(driver.clone())
    })?;

    state.invalidate_session(driver_id);
    state.refresh_driver_gauge(now);
    tracing::info!(driver_id = %driver_id, radius_miles, "driver available");

    Ok(driver)
}

pub fn set_unavailable(
    state: &AppState,
    driver_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Driver, AppError> {
    let driver = state.store.transaction(|store| {
        let mut driver = store
            .drivers
            .get_mut(&driver_id)
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

        driver.availability = Availability::offline();
        driver.updated_at = now;
        Ok(driver.clone())
    })?;

    state.invalidate_session(driver_id);
    state.refresh_driver_gauge(now);
    tracing::info!(driver_id = %driver_id, "driver unavailable");

    Ok(driver)
}

/// Lazy-expiry read: an availability past its expiry reads as "none" even
/// before a sweep has corrected the record.
pub fn get_open_availability(
    state: &AppState,
    driver_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<Availability>, AppError> {
    let driver = state
        .store
        .drivers
        .get(&driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

    Ok(driver
        .availability
        .is_live(now)
        .then_some(driver.availability))
}

/// Idempotent sweep primitive shared by the scheduler and the matching
/// engine's inline sweep: closes the availability only if it is actually
/// expired, then notifies the driver. Returns true when it closed something.
pub fn close_if_expired(state: &AppState, driver_id: Uuid, now: DateTime<Utc>) -> bool {
    let closed = state.store.transaction(|store| {
        let Some(mut driver) = store.drivers.get_mut(&driver_id) else {
            return Ok(None);
        };
        if !driver.availability.is_expired(now) {
            return Ok(None);
        }
        driver.availability = Availability::offline();
        driver.updated_at = now;
        Ok(Some(driver.contact.clone()))
    });

    match closed {
        Ok(Some(contact)) => {
            state.invalidate_session(driver_id);
            state.refresh_driver_gauge(now);
            state.publish(RideEvent::availability_expired(driver_id, now));
            state.notify(&contact, &messages::availability_expired());
            tracing::info!(driver_id = %driver_id, "expired availability closed");
            true
        }
        Ok(None) => false,
        Err(err) => {
            tracing::warn!(driver_id = %driver_id, error = %err, "expiry sweep failed");
            false
        }
    }
}
