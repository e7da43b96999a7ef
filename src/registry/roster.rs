//! Rider and driver records: registration, profile updates, deletion.
//! An actor with a ride still in a non-terminal status cannot be deleted.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::driver::Driver;
use crate::models::rider::Rider;
use crate::registry::availability;
use crate::state::AppState;

pub fn register_rider(
    state: &AppState,
    name: String,
    contact: String,
    now: DateTime<Utc>,
) -> Result<Rider, AppError> {
    validate_identity(&name, &contact)?;

    let rider = Rider::new(name, contact, now);
    state.store.riders.insert(rider.id, rider.clone());
    Ok(rider)
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct RiderProfileUpdate {
    pub name: Option<String>,
    pub contact: Option<String>,
    pub home: Option<GeoPoint>,
    pub work: Option<GeoPoint>,
}

pub fn update_rider_profile(
    state: &AppState,
    rider_id: Uuid,
    update: RiderProfileUpdate,
    now: DateTime<Utc>,
) -> Result<Rider, AppError> {
    if let Some(name) = &update.name {
        if name.trim().is_empty() {
            return Err(AppError::Validation("name cannot be empty".to_string()));
        }
    }
    if let Some(point) = &update.home {
        point.validate()?;
    }
    if let Some(point) = &update.work {
        point.validate()?;
    }

    let mut rider = state
        .store
        .riders
        .get_mut(&rider_id)
        .ok_or_else(|| AppError::NotFound(format!("rider {rider_id} not found")))?;

    if let Some(name) = update.name {
        rider.name = name;
    }
    if let Some(contact) = update.contact {
        rider.contact = contact;
    }
    if let Some(home) = update.home {
        rider.home = Some(home);
    }
    if let Some(work) = update.work {
        rider.work = Some(work);
    }
    rider.updated_at = now;

    Ok(rider.clone())
}

pub fn delete_rider(state: &AppState, rider_id: Uuid) -> Result<(), AppError> {
    state.store.transaction(|store| {
        if !store.riders.contains_key(&rider_id) {
            return Err(AppError::NotFound(format!("rider {rider_id} not found")));
        }
        if store.has_active_ride(rider_id) {
            return Err(AppError::Conflict(
                "rider still has an active ride".to_string(),
            ));
        }
        store.riders.remove(&rider_id);
        Ok(())
    })?;

    state.invalidate_session(rider_id);
    Ok(())
}

pub fn register_driver(
    state: &AppState,
    name: String,
    contact: String,
    vehicle: String,
    now: DateTime<Utc>,
) -> Result<Driver, AppError> {
    validate_identity(&name, &contact)?;
    if vehicle.trim().is_empty() {
        return Err(AppError::Validation(
            "vehicle description cannot be empty".to_string(),
        ));
    }

    let driver = Driver::new(name, contact, vehicle, now);
    state.store.drivers.insert(driver.id, driver.clone());
    Ok(driver)
}

pub fn delete_driver(state: &AppState, driver_id: Uuid, now: DateTime<Utc>) -> Result<(), AppError> {
    // Close any open availability first so a deleted driver never lingers in
    // the matching index.
    if availability::get_open_availability(state, driver_id, now)?.is_some() {
        availability::set_unavailable(state, driver_id, now)?;
    }

    state.store.transaction(|store| {
        if store.has_active_ride(driver_id) {
            return Err(AppError::Conflict(
                "driver still has an active ride".to_string(),
            ));
        }
        store.drivers.remove(&driver_id);
        Ok(())
    })?;

    state.invalidate_session(driver_id);
    Ok(())
}

pub fn get_rider(state: &AppState, rider_id: Uuid) -> Result<Rider, AppError> {
    state
        .store
        .riders
        .get(&rider_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("rider {rider_id} not found")))
}

pub fn get_driver(state: &AppState, driver_id: Uuid) -> Result<Driver, AppError> {
    state
        .store
        .drivers
        .get(&driver_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))
}

fn validate_identity(name: &str, contact: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }
    if contact.trim().is_empty() {
        return Err(AppError::Validation("contact cannot be empty".to_string()));
    }
    Ok(())
}
