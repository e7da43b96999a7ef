//! Ride records: creation, rider-owned edits while open, deletion of open
//! requests, history and aggregate stats. Status changes go through the
//! acceptance engine or the scheduler, never through this module's edits.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::event::{RideEvent, RideEventKind};
use crate::models::ride::{Place, Ride, RideStatus};
use crate::state::AppState;

pub const MIN_LEAD_MINUTES: i64 = 30;

#[derive(Debug, Deserialize)]
pub struct RideDraft {
    pub rider_id: Uuid,
    pub pickup: Place,
    pub dropoff: Place,
    pub bid: f64,
    pub ride_time: DateTime<Utc>,
}

pub fn create_ride(state: &AppState, draft: RideDraft, now: DateTime<Utc>) -> Result<Ride, AppError> {
    validate_place(&draft.pickup)?;
    validate_place(&draft.dropoff)?;
    validate_bid(draft.bid)?;
    validate_ride_time(draft.ride_time, now)?;

    if !state.store.riders.contains_key(&draft.rider_id) {
        return Err(AppError::NotFound(format!(
            "rider {} not found",
            draft.rider_id
        )));
    }

    let ride = Ride::new(
        draft.rider_id,
        draft.pickup,
        draft.dropoff,
        draft.bid,
        draft.ride_time,
        now,
    );
    state.store.rides.insert(ride.id, ride.clone());

    state.record_transition("open");
    state.publish(RideEvent::for_ride(RideEventKind::RideCreated, &ride, now));
    state.invalidate_session(ride.rider_id);
    tracing::info!(ride_id = %ride.id, rider_id = %ride.rider_id, "ride created");

    Ok(ride)
}

#[derive(Debug, Default, Deserialize)]
pub struct RideUpdate {
    pub pickup: Option<Place>,
    pub dropoff: Option<Place>,
    pub bid: Option<f64>,
    pub ride_time: Option<DateTime<Utc>>,
}

/// Rider-owned fields may change only while the ride is still open.
pub fn update_ride_details(
    state: &AppState,
    ride_id: Uuid,
    rider_id: Uuid,
    update: RideUpdate,
    now: DateTime<Utc>,
) -> Result<Ride, AppError> {
    if let Some(pickup) = &update.pickup {
        validate_place(pickup)?;
    }
    if let Some(dropoff) = &update.dropoff {
        validate_place(dropoff)?;
    }
    if let Some(bid) = update.bid {
        validate_bid(bid)?;
    }
    if let Some(ride_time) = update.ride_time {
        validate_ride_time(ride_time, now)?;
    }

    let ride = state.store.transaction(|store| {
        let mut ride = store
            .rides
            .get_mut(&ride_id)
            .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;

        if ride.rider_id != rider_id {
            return Err(AppError::Conflict(
                "ride belongs to a different rider".to_string(),
            ));
        }
        if ride.status != RideStatus::Open {
            return Err(AppError::Conflict(
                "ride can no longer be edited".to_string(),
            ));
        }

        if let Some(pickup) = update.pickup {
            ride.pickup = pickup;
        }
        if let Some(dropoff) = update.dropoff {
            ride.dropoff = dropoff;
        }
        if let Some(bid) = update.bid {
            ride.bid = bid;
        }
        if let Some(ride_time) = update.ride_time {
            ride.ride_time = ride_time;
        }
        Ok(ride.clone())
    })?;

    state.invalidate_session(rider_id);
    Ok(ride)
}

/// A request still open may be deleted outright by its rider. Anything past
/// open is audit history and is never hard-deleted.
pub fn delete_open_ride(state: &AppState, ride_id: Uuid, rider_id: Uuid) -> Result<(), AppError> {
    state.store.transaction(|store| {
        let Some(ride) = store.rides.get(&ride_id).map(|entry| entry.value().clone()) else {
            return Err(AppError::NotFound(format!("ride {ride_id} not found")));
        };

        if ride.rider_id != rider_id {
            return Err(AppError::Conflict(
                "ride belongs to a different rider".to_string(),
            ));
        }
        if ride.status != RideStatus::Open {
            return Err(AppError::Conflict(
                "only open ride requests can be deleted".to_string(),
            ));
        }

        store.rides.remove(&ride_id);
        Ok(())
    })?;

    state.invalidate_session(rider_id);
    tracing::info!(ride_id = %ride_id, "open ride deleted");
    Ok(())
}

pub fn get_ride(state: &AppState, ride_id: Uuid) -> Result<Ride, AppError> {
    state
        .store
        .rides
        .get(&ride_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))
}

pub fn rides_for_rider(state: &AppState, rider_id: Uuid) -> Vec<Ride> {
    history(state, |ride| ride.rider_id == rider_id)
}

pub fn rides_for_driver(state: &AppState, driver_id: Uuid) -> Vec<Ride> {
    history(state, |ride| ride.driver_id == Some(driver_id))
}

fn history(state: &AppState, keep: impl Fn(&Ride) -> bool) -> Vec<Ride> {
    let mut rides: Vec<Ride> = state
        .store
        .rides
        .iter()
        .filter(|entry| keep(entry.value()))
        .map(|entry| entry.value().clone())
        .collect();
    rides.sort_by(|a, b| b.ride_time.cmp(&a.ride_time));
    rides
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct ActorStats {
    pub open: usize,
    pub matched: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub failed: usize,
    pub completed_bid_total: f64,
}

pub fn stats_for_rider(state: &AppState, rider_id: Uuid) -> ActorStats {
    stats(state, |ride| ride.rider_id == rider_id)
}

pub fn stats_for_driver(state: &AppState, driver_id: Uuid) -> ActorStats {
    stats(state, |ride| ride.driver_id == Some(driver_id))
}

fn stats(state: &AppState, keep: impl Fn(&Ride) -> bool) -> ActorStats {
    let mut out = ActorStats::default();
    for entry in state.store.rides.iter() {
        let ride = entry.value();
        if !keep(ride) {
            continue;
        }
        match ride.status {
            RideStatus::Open => out.open += 1,
            RideStatus::Matched => out.matched += 1,
            RideStatus::Completed => {
                out.completed += 1;
                out.completed_bid_total += ride.bid;
            }
            RideStatus::Cancelled => out.cancelled += 1,
            RideStatus::Failed => out.failed += 1,
        }
    }
    out
}

fn validate_place(place: &Place) -> Result<(), AppError> {
    if place.name.trim().is_empty() {
        return Err(AppError::Validation(
            "location name cannot be empty".to_string(),
        ));
    }
    place.point.validate()
}

fn validate_bid(bid: f64) -> Result<(), AppError> {
    if !bid.is_finite() || bid <= 0.0 {
        return Err(AppError::Validation(
            "bid must be a positive amount".to_string(),
        ));
    }
    Ok(())
}

fn validate_ride_time(ride_time: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), AppError> {
    if ride_time - now < Duration::minutes(MIN_LEAD_MINUTES) {
        return Err(AppError::Validation(format!(
            "ride time must be at least {MIN_LEAD_MINUTES} minutes in the future"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{
        RideDraft, RideUpdate, create_ride, delete_open_ride, stats_for_rider,
        update_ride_details,
    };
    use crate::config::Config;
    use crate::geo::GeoPoint;
    use crate::models::ride::Place;
    use crate::registry::roster::register_rider;
    use crate::state::AppState;

    fn place(name: &str, lat: f64, lng: f64) -> Place {
        Place {
            name: name.to_string(),
            point: GeoPoint { lat, lng },
        }
    }

    fn draft(rider_id: Uuid, minutes_ahead: i64) -> RideDraft {
        RideDraft {
            rider_id,
            pickup: place("Market St", 40.0, -75.0),
            dropoff: place("Airport", 40.1, -75.1),
            bid: 25.0,
            ride_time: Utc::now() + Duration::minutes(minutes_ahead),
        }
    }

    fn state_with_rider() -> (AppState, Uuid) {
        let state = AppState::new(Config::default());
        let rider = register_rider(&state, "Ana".to_string(), "@ana".to_string(), Utc::now())
            .unwrap();
        (state, rider.id)
    }

    #[test]
    fn ride_time_under_thirty_minutes_is_rejected() {
        let (state, rider_id) = state_with_rider();
        let now = Utc::now();

        assert!(create_ride(&state, draft(rider_id, 20), now).is_err());
        assert!(create_ride(&state, draft(rider_id, 45), now).is_ok());
    }

    #[test]
    fn bad_bid_and_bad_coordinates_are_rejected() {
        let (state, rider_id) = state_with_rider();
        let now = Utc::now();

        let mut bad_bid = draft(rider_id, 60);
        bad_bid.bid = -5.0;
        assert!(create_ride(&state, bad_bid, now).is_err());

        let mut bad_point = draft(rider_id, 60);
        bad_point.pickup.point.lat = 95.0;
        assert!(create_ride(&state, bad_point, now).is_err());
    }

    #[test]
    fn unknown_rider_cannot_create_a_ride() {
        let state = AppState::new(Config::default());
        assert!(create_ride(&state, draft(Uuid::new_v4(), 60), Utc::now()).is_err());
    }

    #[test]
    fn edits_are_rider_owned_and_open_only() {
        let (state, rider_id) = state_with_rider();
        let now = Utc::now();
        let ride = create_ride(&state, draft(rider_id, 60), now).unwrap();

        let stranger = Uuid::new_v4();
        let update = RideUpdate {
            bid: Some(30.0),
            ..Default::default()
        };
        assert!(update_ride_details(&state, ride.id, stranger, update, now).is_err());

        let update = RideUpdate {
            bid: Some(30.0),
            ..Default::default()
        };
        let updated = update_ride_details(&state, ride.id, rider_id, update, now).unwrap();
        assert_eq!(updated.bid, 30.0);

        state
            .store
            .rides
            .get_mut(&ride.id)
            .unwrap()
            .try_accept(Uuid::new_v4(), now);
        let update = RideUpdate {
            bid: Some(40.0),
            ..Default::default()
        };
        assert!(update_ride_details(&state, ride.id, rider_id, update, now).is_err());
    }

    #[test]
    fn only_open_rides_can_be_deleted() {
        let (state, rider_id) = state_with_rider();
        let now = Utc::now();
        let ride = create_ride(&state, draft(rider_id, 60), now).unwrap();

        state
            .store
            .rides
            .get_mut(&ride.id)
            .unwrap()
            .try_accept(Uuid::new_v4(), now);
        assert!(delete_open_ride(&state, ride.id, rider_id).is_err());
        assert!(state.store.rides.contains_key(&ride.id));
    }

    #[test]
    fn stats_count_by_status_and_sum_completed_bids() {
        let (state, rider_id) = state_with_rider();
        let now = Utc::now();

        let open = create_ride(&state, draft(rider_id, 60), now).unwrap();
        let done = create_ride(&state, draft(rider_id, 90), now).unwrap();
        state
            .store
            .rides
            .get_mut(&done.id)
            .unwrap()
            .try_complete(now);

        let stats = stats_for_rider(&state, rider_id);
        assert_eq!(stats.open, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.completed_bid_total, 25.0);
        assert!(state.store.rides.contains_key(&open.id));
    }
}
