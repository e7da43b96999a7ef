use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rider {
    pub id: Uuid,
    pub name: String,
    /// Opaque contact identity handed to the notification collaborator.
    pub contact: String,
    pub home: Option<GeoPoint>,
    pub work: Option<GeoPoint>,
    pub rating: f64,
    pub rides_completed: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rider {
    pub fn new(name: String, contact: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            contact,
            home: None,
            work: None,
            rating: 5.0,
            rides_completed: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
