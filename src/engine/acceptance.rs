//! The acceptance transaction and its siblings. These are the only paths
//! that change a ride's status; every one runs its guard inside a store
//! transaction so racing callers resolve to exactly one winner, and every
//! notification happens after the commit, never inside it.

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::event::{RideEvent, RideEventKind};
use crate::models::ride::{CancelActor, Ride};
use crate::notify::messages;
use crate::state::AppState;

/// Moves a ride `open -> matched` and the driver to busy in one atomic unit.
/// Losing the race against another driver is an expected outcome and comes
/// back as [`AppError::RideTaken`]; the losing driver's availability is left
/// untouched so it keeps receiving other offers.
pub fn accept_ride(
    state: &AppState,
    ride_id: Uuid,
    driver_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Ride, AppError> {
    let ride = state.store.transaction(|store| {
        if !store.drivers.contains_key(&driver_id) {
            return Err(AppError::NotFound(format!("driver {driver_id} not found")));
        }

        let accepted = {
            let mut ride = store
                .rides
                .get_mut(&ride_id)
                .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;
            if !ride.try_accept(driver_id, now) {
                return Err(AppError::RideTaken);
            }
            ride.clone()
        };

        if let Some(mut driver) = store.drivers.get_mut(&driver_id) {
            driver.availability = crate::models::driver::Availability::offline();
            driver.current_ride_id = Some(ride_id);
            driver.updated_at = now;
        }

        Ok(accepted)
    })?;

    state.record_transition("matched");
    state.refresh_driver_gauge(now);
    state.publish(RideEvent::for_ride(RideEventKind::RideMatched, &ride, now));
    state.invalidate_session(ride.rider_id);
    state.invalidate_session(driver_id);

    let driver = state.store.drivers.get(&driver_id).map(|d| d.value().clone());
    let rider = state.store.riders.get(&ride.rider_id).map(|r| r.value().clone());
    if let (Some(driver), Some(rider)) = (driver, rider) {
        state.notify(&rider.contact, &messages::ride_accepted_rider(&ride, &driver));
        state.notify(&driver.contact, &messages::ride_accepted_driver(&ride, &rider));
    }

    info!(ride_id = %ride_id, driver_id = %driver_id, "ride accepted");
    Ok(ride)
}

/// `matched|open -> completed`. Clears the driver's current ride (it stays
/// unavailable until it re-registers availability) and increments both
/// participants' completed-ride counters in the same transaction.
pub fn complete_ride(
    state: &AppState,
    ride_id: Uuid,
    driver_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Ride, AppError> {
    let ride = state.store.transaction(|store| {
        let completed = {
            let mut ride = store
                .rides
                .get_mut(&ride_id)
                .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;

            if let Some(assigned) = ride.driver_id {
                if assigned != driver_id {
                    return Err(AppError::Conflict(
                        "ride belongs to a different driver".to_string(),
                    ));
                }
            }
            if !ride.try_complete(now) {
                return Err(AppError::Conflict(
                    "ride is not in a completable state".to_string(),
                ));
            }
            // An open ride completed directly records the completing driver.
            if ride.driver_id.is_none() {
                ride.driver_id = Some(driver_id);
            }
            ride.clone()
        };

        if let Some(mut driver) = store.drivers.get_mut(&driver_id) {
            driver.current_ride_id = None;
            driver.rides_completed += 1;
            driver.updated_at = now;
        }
        if let Some(mut rider) = store.riders.get_mut(&completed.rider_id) {
            rider.rides_completed += 1;
            rider.updated_at = now;
        }

        Ok(completed)
    })?;

    state.record_transition("completed");
    state.publish(RideEvent::for_ride(RideEventKind::RideCompleted, &ride, now));
    state.invalidate_session(ride.rider_id);
    state.invalidate_session(driver_id);

    if let Some(rider) = state.store.riders.get(&ride.rider_id).map(|r| r.value().clone()) {
        state.notify(&rider.contact, &messages::ride_completed(&ride));
    }

    info!(ride_id = %ride_id, driver_id = %driver_id, "ride completed");
    Ok(ride)
}

/// `open|matched -> cancelled`, only for the actor that owns the ride in the
/// given role. The counterpart is notified after the commit.
pub fn cancel_ride(
    state: &AppState,
    ride_id: Uuid,
    actor_id: Uuid,
    role: CancelActor,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<Ride, AppError> {
    let ride = state.store.transaction(|store| {
        let cancelled = {
            let mut ride = store
                .rides
                .get_mut(&ride_id)
                .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;

            let owns = match role {
                CancelActor::Rider => ride.rider_id == actor_id,
                CancelActor::Driver => ride.driver_id == Some(actor_id),
                CancelActor::System => true,
            };
            if !owns {
                return Err(AppError::Conflict(
                    "ride does not belong to this actor".to_string(),
                ));
            }
            if !ride.try_cancel(role, reason, now) {
                return Err(AppError::Conflict(
                    "ride is not in a cancellable state".to_string(),
                ));
            }
            ride.clone()
        };

        if let Some(driver_id) = cancelled.driver_id {
            if let Some(mut driver) = store.drivers.get_mut(&driver_id) {
                driver.current_ride_id = None;
                driver.updated_at = now;
            }
        }

        Ok(cancelled)
    })?;

    state.record_transition("cancelled");
    state.publish(RideEvent::for_ride(RideEventKind::RideCancelled, &ride, now));
    state.invalidate_session(ride.rider_id);
    if let Some(driver_id) = ride.driver_id {
        state.invalidate_session(driver_id);
    }

    notify_cancelled(state, &ride, role, reason);
    info!(ride_id = %ride_id, ?role, "ride cancelled");
    Ok(ride)
}

/// Scheduler path: `open -> failed` with a reason, system actor.
pub fn fail_open_ride(
    state: &AppState,
    ride_id: Uuid,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<Ride, AppError> {
    let ride = state.store.transaction(|store| {
        let mut ride = store
            .rides
            .get_mut(&ride_id)
            .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;
        if !ride.try_fail(reason, now) {
            return Err(AppError::Conflict(
                "ride is no longer open".to_string(),
            ));
        }
        Ok(ride.clone())
    })?;

    state.record_transition("failed");
    state.publish(RideEvent::for_ride(RideEventKind::RideFailed, &ride, now));
    state.invalidate_session(ride.rider_id);

    if let Some(rider) = state.store.riders.get(&ride.rider_id).map(|r| r.value().clone()) {
        state.notify(&rider.contact, &messages::ride_failed(&ride));
    }

    info!(ride_id = %ride_id, reason, "open ride failed");
    Ok(ride)
}

/// Scheduler path: system cancellation of an abandoned match. Both
/// participants are notified.
pub fn system_cancel_ride(
    state: &AppState,
    ride_id: Uuid,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<Ride, AppError> {
    cancel_ride(state, ride_id, Uuid::nil(), CancelActor::System, reason, now)
}

fn notify_cancelled(state: &AppState, ride: &Ride, role: CancelActor, reason: &str) {
    let message = messages::ride_cancelled(ride, reason);

    // The actor who cancelled already knows; tell the other side. A system
    // cancellation tells both.
    if role != CancelActor::Rider {
        let rider_contact = state
            .store
            .riders
            .get(&ride.rider_id)
            .map(|r| r.contact.clone());
        if let Some(contact) = rider_contact {
            state.notify(&contact, &message);
        }
    }
    if role != CancelActor::Driver {
        let driver_contact = ride
            .driver_id
            .and_then(|id| state.store.drivers.get(&id).map(|d| d.contact.clone()));
        if let Some(contact) = driver_contact {
            state.notify(&contact, &message);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, Utc};
    use uuid::Uuid;

    use super::{accept_ride, cancel_ride, complete_ride, fail_open_ride};
    use crate::cache::NoopSessionCache;
    use crate::config::Config;
    use crate::error::AppError;
    use crate::geo::GeoPoint;
    use crate::models::ride::{CancelActor, Place, RideStatus};
    use crate::notify::RecordingNotifier;
    use crate::registry::availability::set_available;
    use crate::registry::rides::{RideDraft, create_ride};
    use crate::registry::roster::{register_driver, register_rider};
    use crate::state::AppState;

    struct Fixture {
        state: AppState,
        notifier: Arc<RecordingNotifier>,
        rider_id: Uuid,
        driver_id: Uuid,
        ride_id: Uuid,
        now: DateTime<Utc>,
    }

    fn fixture() -> Fixture {
        let notifier = Arc::new(RecordingNotifier::default());
        let state = AppState::with_collaborators(
            Config::default(),
            notifier.clone(),
            Arc::new(NoopSessionCache),
        );
        let now = Utc::now();

        let rider_id = register_rider(&state, "Ana".to_string(), "@ana".to_string(), now)
            .unwrap()
            .id;
        let driver_id = register_driver(
            &state,
            "Dana".to_string(),
            "@dana".to_string(),
            "Blue Prius".to_string(),
            now,
        )
        .unwrap()
        .id;
        let ride_id = create_ride(
            &state,
            RideDraft {
                rider_id,
                pickup: Place {
                    name: "Market St".to_string(),
                    point: GeoPoint { lat: 40.0, lng: -75.0 },
                },
                dropoff: Place {
                    name: "Airport".to_string(),
                    point: GeoPoint { lat: 40.1, lng: -75.1 },
                },
                bid: 25.0,
                ride_time: now + Duration::hours(1),
            },
            now,
        )
        .unwrap()
        .id;

        Fixture {
            state,
            notifier,
            rider_id,
            driver_id,
            ride_id,
            now,
        }
    }

    #[test]
    fn accept_matches_ride_and_marks_driver_busy() {
        let f = fixture();
        set_available(
            &f.state,
            f.driver_id,
            GeoPoint { lat: 40.01, lng: -75.0 },
            10.0,
            Some(3.0),
            f.now,
        )
        .unwrap();

        let ride = accept_ride(&f.state, f.ride_id, f.driver_id, f.now).unwrap();
        assert_eq!(ride.status, RideStatus::Matched);
        assert_eq!(ride.driver_id, Some(f.driver_id));

        let driver = f.state.store.drivers.get(&f.driver_id).unwrap().clone();
        assert!(!driver.availability.is_available);
        assert_eq!(driver.current_ride_id, Some(f.ride_id));

        // Both parties were told.
        assert_eq!(f.notifier.messages_for("@ana").len(), 1);
        assert_eq!(f.notifier.messages_for("@dana").len(), 1);
    }

    #[test]
    fn second_accept_gets_ride_taken_and_keeps_its_availability() {
        let f = fixture();
        let other = register_driver(
            &f.state,
            "Omar".to_string(),
            "@omar".to_string(),
            "Gray Civic".to_string(),
            f.now,
        )
        .unwrap()
        .id;
        set_available(
            &f.state,
            other,
            GeoPoint { lat: 40.02, lng: -75.0 },
            10.0,
            Some(3.0),
            f.now,
        )
        .unwrap();

        accept_ride(&f.state, f.ride_id, f.driver_id, f.now).unwrap();
        let err = accept_ride(&f.state, f.ride_id, other, f.now).unwrap_err();
        assert!(matches!(err, AppError::RideTaken));

        // The loser keeps its availability and gets no ride assignment.
        let loser = f.state.store.drivers.get(&other).unwrap().clone();
        assert!(loser.availability.is_available);
        assert!(loser.current_ride_id.is_none());
    }

    #[test]
    fn accept_with_unknown_driver_leaves_ride_open() {
        let f = fixture();
        let err = accept_ride(&f.state, f.ride_id, Uuid::new_v4(), f.now).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let ride = f.state.store.rides.get(&f.ride_id).unwrap().clone();
        assert_eq!(ride.status, RideStatus::Open);
        assert!(ride.driver_id.is_none());
    }

    #[test]
    fn complete_increments_both_counters_and_frees_the_driver() {
        let f = fixture();
        accept_ride(&f.state, f.ride_id, f.driver_id, f.now).unwrap();
        let ride = complete_ride(&f.state, f.ride_id, f.driver_id, f.now).unwrap();

        assert_eq!(ride.status, RideStatus::Completed);
        let driver = f.state.store.drivers.get(&f.driver_id).unwrap().clone();
        assert_eq!(driver.rides_completed, 1);
        assert!(driver.current_ride_id.is_none());
        assert!(!driver.availability.is_available);

        let rider = f.state.store.riders.get(&f.rider_id).unwrap().clone();
        assert_eq!(rider.rides_completed, 1);
    }

    #[test]
    fn only_the_assigned_driver_may_complete() {
        let f = fixture();
        accept_ride(&f.state, f.ride_id, f.driver_id, f.now).unwrap();

        let other = register_driver(
            &f.state,
            "Omar".to_string(),
            "@omar".to_string(),
            "Gray Civic".to_string(),
            f.now,
        )
        .unwrap()
        .id;
        let err = complete_ride(&f.state, f.ride_id, other, f.now).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn rider_cannot_cancel_someone_elses_ride() {
        let f = fixture();
        let err = cancel_ride(
            &f.state,
            f.ride_id,
            Uuid::new_v4(),
            CancelActor::Rider,
            "changed plans",
            f.now,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn driver_cancel_notifies_the_rider_and_frees_the_driver() {
        let f = fixture();
        accept_ride(&f.state, f.ride_id, f.driver_id, f.now).unwrap();

        let ride = cancel_ride(
            &f.state,
            f.ride_id,
            f.driver_id,
            CancelActor::Driver,
            "vehicle trouble",
            f.now,
        )
        .unwrap();
        assert_eq!(ride.status, RideStatus::Cancelled);
        assert_eq!(ride.cancelled_by, Some(CancelActor::Driver));

        let driver = f.state.store.drivers.get(&f.driver_id).unwrap().clone();
        assert!(driver.current_ride_id.is_none());

        // accept notification + cancel notification
        assert_eq!(f.notifier.messages_for("@ana").len(), 2);
    }

    #[test]
    fn double_cancel_is_a_conflict() {
        let f = fixture();
        cancel_ride(
            &f.state,
            f.ride_id,
            f.rider_id,
            CancelActor::Rider,
            "changed plans",
            f.now,
        )
        .unwrap();

        let err = cancel_ride(
            &f.state,
            f.ride_id,
            f.rider_id,
            CancelActor::Rider,
            "changed plans",
            f.now,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn fail_only_applies_to_open_rides() {
        let f = fixture();
        accept_ride(&f.state, f.ride_id, f.driver_id, f.now).unwrap();
        assert!(fail_open_ride(&f.state, f.ride_id, "timeout", f.now).is_err());
    }

    #[test]
    fn concurrent_accepts_have_exactly_one_winner() {
        let f = fixture();
        let state = Arc::new(f.state);

        let drivers: Vec<Uuid> = (0..8)
            .map(|i| {
                register_driver(
                    &state,
                    format!("Driver {i}"),
                    format!("@driver{i}"),
                    "Car".to_string(),
                    f.now,
                )
                .unwrap()
                .id
            })
            .collect();

        let handles: Vec<_> = drivers
            .iter()
            .map(|&driver_id| {
                let state = state.clone();
                let ride_id = f.ride_id;
                let now = f.now;
                std::thread::spawn(move || accept_ride(&state, ride_id, driver_id, now).is_ok())
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);

        let ride = state.store.rides.get(&f.ride_id).unwrap().clone();
        assert_eq!(ride.status, RideStatus::Matched);
        let winner = ride.driver_id.unwrap();
        assert!(drivers.contains(&winner));
        assert_eq!(
            state.store.drivers.get(&winner).unwrap().current_ride_id,
            Some(f.ride_id)
        );
    }
}
