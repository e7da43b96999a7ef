//! Rendered notification text. One function per state change so the wording
//! lives in one place and the call sites stay terse.

use chrono::{DateTime, Utc};

use crate::models::driver::Driver;
use crate::models::ride::Ride;
use crate::models::rider::Rider;

fn fmt_time(at: DateTime<Utc>) -> String {
    at.format("%b %-d, %H:%M UTC").to_string()
}

pub fn availability_expired() -> String {
    "Your availability window has ended. Set a new one to keep receiving ride requests."
        .to_string()
}

pub fn new_nearby_ride(ride: &Ride, distance_miles: f64) -> String {
    format!(
        "New ride request {:.1} mi away: {} to {}, ${:.2}, {}.",
        distance_miles,
        ride.pickup.name,
        ride.dropoff.name,
        ride.bid,
        fmt_time(ride.ride_time)
    )
}

pub fn ride_accepted_rider(ride: &Ride, driver: &Driver) -> String {
    format!(
        "{} ({}) accepted your ride from {} at {}. Contact: {}.",
        driver.name,
        driver.vehicle,
        ride.pickup.name,
        fmt_time(ride.ride_time),
        driver.contact
    )
}

pub fn ride_accepted_driver(ride: &Ride, rider: &Rider) -> String {
    format!(
        "You accepted {}'s ride from {} to {} at {}. Contact: {}.",
        rider.name,
        ride.pickup.name,
        ride.dropoff.name,
        fmt_time(ride.ride_time),
        rider.contact
    )
}

pub fn ride_completed(ride: &Ride) -> String {
    format!(
        "Your ride from {} to {} is complete. Thanks for riding!",
        ride.pickup.name, ride.dropoff.name
    )
}

pub fn ride_cancelled(ride: &Ride, reason: &str) -> String {
    format!(
        "Your ride from {} at {} was cancelled: {}.",
        ride.pickup.name,
        fmt_time(ride.ride_time),
        reason
    )
}

pub fn ride_failed(ride: &Ride) -> String {
    format!(
        "No driver picked up your ride from {} scheduled for {}. Please post a new request.",
        ride.pickup.name,
        fmt_time(ride.ride_time)
    )
}

pub fn stalled_match_nudge(ride: &Ride) -> String {
    format!(
        "Your ride from {} was scheduled for {} and is still marked active. Please complete or cancel it.",
        ride.pickup.name,
        fmt_time(ride.ride_time)
    )
}

pub fn reminder(ride: &Ride, counterpart_name: &str, counterpart_contact: &str) -> String {
    format!(
        "Reminder: ride from {} at {}. {} can be reached at {}.",
        ride.pickup.name,
        fmt_time(ride.ride_time),
        counterpart_name,
        counterpart_contact
    )
}
