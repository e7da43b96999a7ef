use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::ride::Ride;

/// Domain events broadcast to the analytics/websocket feed. Delivery is
/// best-effort: a send with no subscribers is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RideEventKind {
    RideCreated,
    RideMatched,
    RideCompleted,
    RideCancelled,
    RideFailed,
    RideReminder,
    AvailabilityExpired,
}

#[derive(Debug, Clone, Serialize)]
pub struct RideEvent {
    pub kind: RideEventKind,
    pub ride_id: Option<Uuid>,
    pub rider_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub at: DateTime<Utc>,
}

impl RideEvent {
    pub fn for_ride(kind: RideEventKind, ride: &Ride, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            ride_id: Some(ride.id),
            rider_id: Some(ride.rider_id),
            driver_id: ride.driver_id,
            at,
        }
    }

    pub fn availability_expired(driver_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            kind: RideEventKind::AvailabilityExpired,
            ride_id: None,
            rider_id: None,
            driver_id: Some(driver_id),
            at,
        }
    }
}
