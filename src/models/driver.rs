use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

/// A driver's availability snapshot. Invariant: `is_available == true`
/// implies `location` and `service_radius_miles` are both set; going offline
/// clears every field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Availability {
    pub is_available: bool,
    pub location: Option<GeoPoint>,
    pub service_radius_miles: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Availability {
    pub fn offline() -> Self {
        Self {
            is_available: false,
            location: None,
            service_radius_miles: None,
            started_at: None,
            expires_at: None,
        }
    }

    pub fn open(
        location: GeoPoint,
        service_radius_miles: f64,
        started_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            is_available: true,
            location: Some(location),
            service_radius_miles: Some(service_radius_miles),
            started_at: Some(started_at),
            expires_at,
        }
    }

    /// The one liveness predicate shared by the registry getter, the matching
    /// engine and the scheduler. Open-ended availability never expires.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_available && self.expires_at.is_none_or(|at| at > now)
    }

    /// Still flagged available but past its expiry, i.e. due for a sweep.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_available && self.expires_at.is_some_and(|at| at <= now)
    }

    /// Whether a ride scheduled at `ride_time` falls inside this window:
    /// no earlier than the window start, no later than the expiry when one
    /// exists, and no further out than `lookahead` past the start.
    pub fn covers(&self, ride_time: DateTime<Utc>, lookahead: Duration) -> bool {
        let Some(started_at) = self.started_at else {
            return false;
        };
        if ride_time < started_at || ride_time - started_at > lookahead {
            return false;
        }
        self.expires_at.is_none_or(|at| ride_time <= at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub contact: String,
    pub vehicle: String,
    pub rating: f64,
    pub rides_completed: u64,
    pub availability: Availability,
    pub current_ride_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    pub fn new(name: String, contact: String, vehicle: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            contact,
            vehicle,
            rating: 5.0,
            rides_completed: 0,
            availability: Availability::offline(),
            current_ride_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}
