//! Periodic reclamation jobs. Each job is idempotent, reads "now" once per
//! run, and treats per-record failures as log-and-continue so one bad record
//! never aborts the rest of a sweep. Jobs run on their own tokio interval
//! and can also be triggered on demand through the REST surface.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::acceptance;
use crate::models::event::{RideEvent, RideEventKind};
use crate::models::ride::{Ride, RideStatus};
use crate::notify::messages;
use crate::registry::availability;
use crate::state::AppState;

pub const STALE_OPEN_GRACE_MINUTES: i64 = 20;
pub const STALLED_MATCH_HOURS: i64 = 2;
pub const ABANDONED_MATCH_HOURS: i64 = 24;
pub const REMINDER_MIN_MINUTES: i64 = 15;
pub const REMINDER_MAX_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepJob {
    CloseExpiredAvailability,
    FailStaleOpenRides,
    NudgeStalledMatches,
    CancelAbandonedMatches,
    SendRideReminders,
}

impl SweepJob {
    pub const ALL: [SweepJob; 5] = [
        SweepJob::CloseExpiredAvailability,
        SweepJob::FailStaleOpenRides,
        SweepJob::NudgeStalledMatches,
        SweepJob::CancelAbandonedMatches,
        SweepJob::SendRideReminders,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SweepJob::CloseExpiredAvailability => "close-expired-availability",
            SweepJob::FailStaleOpenRides => "fail-stale-open-rides",
            SweepJob::NudgeStalledMatches => "nudge-stalled-matches",
            SweepJob::CancelAbandonedMatches => "cancel-abandoned-matches",
            SweepJob::SendRideReminders => "send-ride-reminders",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|job| job.name() == name)
    }

    pub fn interval(self, config: &Config) -> StdDuration {
        let secs = match self {
            SweepJob::CloseExpiredAvailability => config.availability_sweep_secs,
            SweepJob::FailStaleOpenRides => config.stale_ride_sweep_secs,
            SweepJob::NudgeStalledMatches => config.stalled_match_sweep_secs,
            SweepJob::CancelAbandonedMatches => config.abandoned_match_sweep_secs,
            SweepJob::SendRideReminders => config.reminder_sweep_secs,
        };
        StdDuration::from_secs(secs)
    }

    /// One sweep over all currently-qualifying records. Returns how many
    /// records this run corrected.
    pub fn run_once(self, state: &AppState, now: DateTime<Utc>) -> usize {
        let swept = match self {
            SweepJob::CloseExpiredAvailability => close_expired_availability(state, now),
            SweepJob::FailStaleOpenRides => fail_stale_open_rides(state, now),
            SweepJob::NudgeStalledMatches => nudge_stalled_matches(state, now),
            SweepJob::CancelAbandonedMatches => cancel_abandoned_matches(state, now),
            SweepJob::SendRideReminders => send_ride_reminders(state, now),
        };

        state
            .metrics
            .sweep_runs_total
            .with_label_values(&[self.name()])
            .inc();
        state
            .metrics
            .sweep_affected_total
            .with_label_values(&[self.name()])
            .inc_by(swept as u64);

        if swept > 0 {
            info!(job = self.name(), swept, "sweep finished");
        } else {
            debug!(job = self.name(), "sweep finished, nothing to do");
        }
        swept
    }
}

pub async fn run_job_loop(state: Arc<AppState>, job: SweepJob) {
    let mut ticker = tokio::time::interval(job.interval(&state.config));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(job = job.name(), "sweep loop started");

    loop {
        ticker.tick().await;
        job.run_once(&state, Utc::now());
    }
}

fn close_expired_availability(state: &AppState, now: DateTime<Utc>) -> usize {
    state
        .store
        .expired_available_driver_ids(now)
        .into_iter()
        .filter(|&driver_id| availability::close_if_expired(state, driver_id, now))
        .count()
}

fn fail_stale_open_rides(state: &AppState, now: DateTime<Utc>) -> usize {
    let cutoff = now - Duration::minutes(STALE_OPEN_GRACE_MINUTES);
    let stale = collect_rides(state, |ride| {
        ride.status == RideStatus::Open && ride.driver_id.is_none() && ride.ride_time <= cutoff
    });

    let mut swept = 0;
    for ride_id in stale {
        match acceptance::fail_open_ride(state, ride_id, "timeout", now) {
            Ok(_) => swept += 1,
            // Lost a race against an accept or cancel; the next sweep will
            // see the record's new status.
            Err(err) => debug!(ride_id = %ride_id, error = %err, "stale ride skipped"),
        }
    }
    swept
}

fn nudge_stalled_matches(state: &AppState, now: DateTime<Utc>) -> usize {
    let cutoff = now - Duration::hours(STALLED_MATCH_HOURS);
    let stalled = collect_rides(state, |ride| {
        ride.status == RideStatus::Matched
            && !ride.status_notification_sent
            && ride.ride_time <= cutoff
    });

    let mut swept = 0;
    for ride_id in stalled {
        let Some(ride) = state.store.rides.get(&ride_id).map(|r| r.value().clone()) else {
            continue;
        };
        let Some(driver_id) = ride.driver_id else {
            warn!(ride_id = %ride_id, "matched ride without driver");
            continue;
        };

        if let Some(driver) = state.store.drivers.get(&driver_id).map(|d| d.value().clone()) {
            state.notify(&driver.contact, &messages::stalled_match_nudge(&ride));
        }

        // Conditional flag write: a concurrent completion or cancellation
        // between the scan and here means the nudge flag no longer applies.
        let marked = state.store.transaction(|store| {
            let Some(mut ride) = store.rides.get_mut(&ride_id) else {
                return Ok(false);
            };
            if ride.status != RideStatus::Matched || ride.status_notification_sent {
                return Ok(false);
            }
            ride.status_notification_sent = true;
            Ok(true)
        });
        if matches!(marked, Ok(true)) {
            swept += 1;
        }
    }
    swept
}

fn cancel_abandoned_matches(state: &AppState, now: DateTime<Utc>) -> usize {
    let cutoff = now - Duration::hours(ABANDONED_MATCH_HOURS);
    let abandoned = collect_rides(state, |ride| {
        ride.status == RideStatus::Matched && ride.ride_time <= cutoff
    });

    let mut swept = 0;
    for ride_id in abandoned {
        match acceptance::system_cancel_ride(state, ride_id, "no driver resolution", now) {
            Ok(_) => swept += 1,
            Err(err) => debug!(ride_id = %ride_id, error = %err, "abandoned ride skipped"),
        }
    }
    swept
}

fn send_ride_reminders(state: &AppState, now: DateTime<Utc>) -> usize {
    let window_start = now + Duration::minutes(REMINDER_MIN_MINUTES);
    let window_end = now + Duration::minutes(REMINDER_MAX_MINUTES);
    let due = collect_rides(state, |ride| {
        ride.status == RideStatus::Matched
            && !ride.reminder_sent
            && ride.ride_time >= window_start
            && ride.ride_time <= window_end
    });

    let mut swept = 0;
    for ride_id in due {
        let Some(ride) = state.store.rides.get(&ride_id).map(|r| r.value().clone()) else {
            continue;
        };
        let rider = state
            .store
            .riders
            .get(&ride.rider_id)
            .map(|r| r.value().clone());
        let driver = ride
            .driver_id
            .and_then(|id| state.store.drivers.get(&id).map(|d| d.value().clone()));

        if let (Some(rider), Some(driver)) = (rider, driver) {
            state.notify(
                &rider.contact,
                &messages::reminder(&ride, &driver.name, &driver.contact),
            );
            state.notify(
                &driver.contact,
                &messages::reminder(&ride, &rider.name, &rider.contact),
            );
        }

        let marked = state.store.transaction(|store| {
            let Some(mut ride) = store.rides.get_mut(&ride_id) else {
                return Ok(false);
            };
            if ride.status != RideStatus::Matched || ride.reminder_sent {
                return Ok(false);
            }
            ride.reminder_sent = true;
            Ok(true)
        });
        if matches!(marked, Ok(true)) {
            state.publish(RideEvent::for_ride(RideEventKind::RideReminder, &ride, now));
            swept += 1;
        }
    }
    swept
}

fn collect_rides(state: &AppState, keep: impl Fn(&Ride) -> bool) -> Vec<Uuid> {
    state
        .store
        .rides
        .iter()
        .filter(|entry| keep(entry.value()))
        .map(|entry| *entry.key())
        .collect()
}
