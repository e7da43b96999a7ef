use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub point: GeoPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    Open,
    Matched,
    Completed,
    Cancelled,
    Failed,
}

impl RideStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RideStatus::Completed | RideStatus::Cancelled | RideStatus::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelActor {
    Rider,
    Driver,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub rider_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup: Place,
    pub dropoff: Place,
    pub bid: f64,
    pub ride_time: DateTime<Utc>,
    pub status: RideStatus,
    pub reminder_sent: bool,
    pub status_notification_sent: bool,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<CancelActor>,
    pub cancellation_reason: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl Ride {
    pub fn new(
        rider_id: Uuid,
        pickup: Place,
        dropoff: Place,
        bid: f64,
        ride_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            rider_id,
            driver_id: None,
            pickup,
            dropoff,
            bid,
            ride_time,
            status: RideStatus::Open,
            reminder_sent: false,
            status_notification_sent: false,
            created_at: now,
            accepted_at: None,
            completed_at: None,
            cancelled_at: None,
            cancelled_by: None,
            cancellation_reason: None,
            failed_at: None,
            failure_reason: None,
        }
    }

    /// Guarded transitions. Each returns false on a guard miss and mutates
    /// nothing in that case; callers run them inside a store transaction so
    /// two racing callers cannot both see the guard pass.
    pub fn try_accept(&mut self, driver_id: Uuid, now: DateTime<Utc>) -> bool {
        if self.status != RideStatus::Open {
            return false;
        }
        self.status = RideStatus::Matched;
        self.driver_id = Some(driver_id);
        self.accepted_at = Some(now);
        true
    }

    pub fn try_complete(&mut self, now: DateTime<Utc>) -> bool {
        if !matches!(self.status, RideStatus::Open | RideStatus::Matched) {
            return false;
        }
        self.status = RideStatus::Completed;
        self.completed_at = Some(now);
        true
    }

    pub fn try_cancel(&mut self, by: CancelActor, reason: &str, now: DateTime<Utc>) -> bool {
        if !matches!(self.status, RideStatus::Open | RideStatus::Matched) {
            return false;
        }
        self.status = RideStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.cancelled_by = Some(by);
        self.cancellation_reason = Some(reason.to_string());
        true
    }

    pub fn try_fail(&mut self, reason: &str, now: DateTime<Utc>) -> bool {
        if self.status != RideStatus::Open {
            return false;
        }
        self.status = RideStatus::Failed;
        self.failed_at = Some(now);
        self.failure_reason = Some(reason.to_string());
        true
    }
}
