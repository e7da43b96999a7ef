//! Proximity matching in both directions: a new ride looking for available
//! drivers, and a driver going available looking for open rides. Read-heavy;
//! the only mutation either query performs is the inline sweep of
//! already-expired availability.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::Driver;
use crate::models::ride::{Ride, RideStatus};
use crate::registry::availability;
use crate::state::AppState;

/// Upper bound handed to the proximity index. Individual drivers narrow this
/// with their own service radius; the index only guarantees a superset.
pub const INDEX_RADIUS_MILES: f64 = 50.0;

#[derive(Debug, Clone, Serialize)]
pub struct DriverCandidate {
    pub driver: Driver,
    pub distance_miles: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenRideMatch {
    pub ride: Ride,
    pub distance_miles: f64,
}

/// Available drivers for an open ride, nearest first. Each candidate is kept
/// only if the exact distance to the pickup is within that driver's own
/// service radius and the ride time falls inside the driver's availability
/// window.
pub fn find_drivers_for_ride(
    state: &AppState,
    ride_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<DriverCandidate>, AppError> {
    let ride = state
        .store
        .rides
        .get(&ride_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;

    if ride.status != RideStatus::Open {
        return Ok(Vec::new());
    }

    for driver_id in state.store.expired_available_driver_ids(now) {
        availability::close_if_expired(state, driver_id, now);
    }

    let lookahead = Duration::hours(state.config.match_lookahead_hours);
    let mut candidates: Vec<DriverCandidate> = state
        .store
        .drivers_near(&ride.pickup.point, INDEX_RADIUS_MILES)
        .into_iter()
        .filter(|(driver, distance)| {
            driver.availability.is_live(now)
                && driver
                    .availability
                    .service_radius_miles
                    .is_some_and(|radius| *distance <= radius)
                && driver.availability.covers(ride.ride_time, lookahead)
        })
        .map(|(driver, distance_miles)| DriverCandidate {
            driver,
            distance_miles,
        })
        .collect();

    candidates.sort_by(|a, b| a.distance_miles.total_cmp(&b.distance_miles));

    state
        .metrics
        .match_candidates
        .with_label_values(&["drivers_for_ride"])
        .observe(candidates.len() as f64);

    Ok(candidates)
}

/// Open rides for a driver's current availability, nearest first. An expired
/// availability is closed on the spot (with the usual notification) and
/// yields no matches; a driver who never went available gets a validation
/// error the caller can render as "not currently available".
pub fn find_matches_for_driver_availability(
    state: &AppState,
    driver_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<OpenRideMatch>, AppError> {
    let driver = state
        .store
        .drivers
        .get(&driver_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

    if driver.availability.is_expired(now) {
        availability::close_if_expired(state, driver_id, now);
        return Ok(Vec::new());
    }
    if !driver.availability.is_live(now) {
        return Err(AppError::Validation("not currently available".to_string()));
    }

    let (Some(location), Some(radius)) = (
        driver.availability.location,
        driver.availability.service_radius_miles,
    ) else {
        // Available without a location violates the snapshot invariant.
        return Err(AppError::Internal(format!(
            "driver {driver_id} available without location"
        )));
    };

    let lookahead = Duration::hours(state.config.match_lookahead_hours);
    let mut matches: Vec<OpenRideMatch> = state
        .store
        .open_rides_near(&location, radius)
        .into_iter()
        .filter(|(ride, _)| driver.availability.covers(ride.ride_time, lookahead))
        .map(|(ride, distance_miles)| OpenRideMatch {
            ride,
            distance_miles,
        })
        .collect();

    matches.sort_by(|a, b| a.distance_miles.total_cmp(&b.distance_miles));

    state
        .metrics
        .match_candidates
        .with_label_values(&["rides_for_driver"])
        .observe(matches.len() as f64);

    Ok(matches)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, Utc};
    use uuid::Uuid;

    use super::{find_drivers_for_ride, find_matches_for_driver_availability};
    use crate::cache::NoopSessionCache;
    use crate::config::Config;
    use crate::error::AppError;
    use crate::geo::GeoPoint;
    use crate::models::ride::Place;
    use crate::notify::RecordingNotifier;
    use crate::registry::availability::set_available;
    use crate::registry::rides::{RideDraft, create_ride};
    use crate::registry::roster::{register_driver, register_rider};
    use crate::state::AppState;

    fn test_state() -> (AppState, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let state = AppState::with_collaborators(
            Config::default(),
            notifier.clone(),
            Arc::new(NoopSessionCache),
        );
        (state, notifier)
    }

    fn add_rider(state: &AppState, now: DateTime<Utc>) -> Uuid {
        register_rider(state, "Ana".to_string(), "@ana".to_string(), now)
            .unwrap()
            .id
    }

    fn add_driver(state: &AppState, now: DateTime<Utc>) -> Uuid {
        register_driver(
            state,
            "Dana".to_string(),
            "@dana".to_string(),
            "Blue Prius".to_string(),
            now,
        )
        .unwrap()
        .id
    }

    fn add_ride(state: &AppState, rider_id: Uuid, lat: f64, lng: f64, now: DateTime<Utc>) -> Uuid {
        create_ride(
            state,
            RideDraft {
                rider_id,
                pickup: Place {
                    name: "pickup".to_string(),
                    point: GeoPoint { lat, lng },
                },
                dropoff: Place {
                    name: "dropoff".to_string(),
                    point: GeoPoint {
                        lat: lat + 0.1,
                        lng: lng + 0.1,
                    },
                },
                bid: 25.0,
                ride_time: now + Duration::hours(1),
            },
            now,
        )
        .unwrap()
        .id
    }

    #[test]
    fn nearby_driver_within_own_radius_is_matched() {
        let (state, _) = test_state();
        let now = Utc::now();
        let rider = add_rider(&state, now);
        let driver = add_driver(&state, now);

        set_available(
            &state,
            driver,
            GeoPoint { lat: 40.01, lng: -75.0 },
            10.0,
            Some(3.0),
            now,
        )
        .unwrap();
        let ride = add_ride(&state, rider, 40.0, -75.0, now);

        let candidates = find_drivers_for_ride(&state, ride, now).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].driver.id, driver);
        assert!(candidates[0].distance_miles < 10.0);
    }

    #[test]
    fn driver_inside_index_bound_but_outside_own_radius_is_excluded() {
        let (state, _) = test_state();
        let now = Utc::now();
        let rider = add_rider(&state, now);
        let driver = add_driver(&state, now);

        // Roughly 35 miles north of the pickup: inside the 50-mile index
        // bound, outside the driver's 10-mile radius.
        set_available(
            &state,
            driver,
            GeoPoint { lat: 40.5, lng: -75.0 },
            10.0,
            None,
            now,
        )
        .unwrap();
        let ride = add_ride(&state, rider, 40.0, -75.0, now);

        assert!(find_drivers_for_ride(&state, ride, now).unwrap().is_empty());
    }

    #[test]
    fn expired_driver_is_swept_offline_by_the_query() {
        let (state, notifier) = test_state();
        let now = Utc::now();
        let rider = add_rider(&state, now);
        let driver = add_driver(&state, now);

        set_available(
            &state,
            driver,
            GeoPoint { lat: 40.01, lng: -75.0 },
            10.0,
            Some(1.0),
            now,
        )
        .unwrap();
        let ride = add_ride(&state, rider, 40.0, -75.0, now);

        let later = now + Duration::hours(2);
        assert!(find_drivers_for_ride(&state, ride, later).unwrap().is_empty());

        let swept = state.store.drivers.get(&driver).unwrap().clone();
        assert!(!swept.availability.is_available);
        assert_eq!(notifier.messages_for("@dana").len(), 1);
    }

    #[test]
    fn ride_time_outside_availability_window_is_excluded() {
        let (state, _) = test_state();
        let now = Utc::now();
        let rider = add_rider(&state, now);
        let driver = add_driver(&state, now);

        // Availability ends in 30 minutes; the ride is an hour out.
        set_available(
            &state,
            driver,
            GeoPoint { lat: 40.01, lng: -75.0 },
            10.0,
            Some(0.5),
            now,
        )
        .unwrap();
        let ride = add_ride(&state, rider, 40.0, -75.0, now);

        assert!(find_drivers_for_ride(&state, ride, now).unwrap().is_empty());
    }

    #[test]
    fn candidates_are_ordered_nearest_first() {
        let (state, _) = test_state();
        let now = Utc::now();
        let rider = add_rider(&state, now);

        let close = add_driver(&state, now);
        let closer = add_driver(&state, now);
        set_available(&state, close, GeoPoint { lat: 40.05, lng: -75.0 }, 20.0, None, now)
            .unwrap();
        set_available(&state, closer, GeoPoint { lat: 40.01, lng: -75.0 }, 20.0, None, now)
            .unwrap();

        let ride = add_ride(&state, rider, 40.0, -75.0, now);
        let candidates = find_drivers_for_ride(&state, ride, now).unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].driver.id, closer);
        assert_eq!(candidates[1].driver.id, close);
    }

    #[test]
    fn driver_direction_returns_open_rides_in_radius() {
        let (state, _) = test_state();
        let now = Utc::now();
        let rider = add_rider(&state, now);
        let driver = add_driver(&state, now);

        let near = add_ride(&state, rider, 40.02, -75.0, now);
        add_ride(&state, rider, 42.0, -75.0, now);

        set_available(
            &state,
            driver,
            GeoPoint { lat: 40.0, lng: -75.0 },
            10.0,
            Some(3.0),
            now,
        )
        .unwrap();

        let matches = find_matches_for_driver_availability(&state, driver, now).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].ride.id, near);
    }

    #[test]
    fn offline_driver_gets_not_currently_available() {
        let (state, _) = test_state();
        let now = Utc::now();
        let driver = add_driver(&state, now);

        let err = find_matches_for_driver_availability(&state, driver, now).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn expired_driver_direction_closes_availability_and_returns_empty() {
        let (state, notifier) = test_state();
        let now = Utc::now();
        let driver = add_driver(&state, now);

        set_available(
            &state,
            driver,
            GeoPoint { lat: 40.0, lng: -75.0 },
            10.0,
            Some(1.0),
            now,
        )
        .unwrap();

        let later = now + Duration::hours(2);
        let matches = find_matches_for_driver_availability(&state, driver, later).unwrap();
        assert!(matches.is_empty());

        let swept = state.store.drivers.get(&driver).unwrap().clone();
        assert!(!swept.availability.is_available);
        assert_eq!(notifier.messages_for("@dana").len(), 1);
    }
}
