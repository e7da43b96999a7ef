use std::sync::Mutex;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::{self, GeoPoint};
use crate::models::driver::Driver;
use crate::models::ride::{Ride, RideStatus};
use crate::models::rider::Rider;

/// In-memory record store with a coarse proximity index and transactional
/// writes.
///
/// Writes that must be consistent across records (ride status + driver busy
/// flag, ride status + two counters) run inside [`GeoStore::transaction`],
/// which serializes them on a single commit lock. The closures are
/// check-then-act over plain map entries and never await, so the lock is held
/// only for a handful of in-memory operations. Reads take no lock beyond the
/// per-shard locks of the maps, which means a reader may observe the state
/// between two mutations of one transaction; the only ordering the system
/// guarantees is that two racing transactions cannot both see a guard pass.
pub struct GeoStore {
    pub riders: DashMap<Uuid, Rider>,
    pub drivers: DashMap<Uuid, Driver>,
    pub rides: DashMap<Uuid, Ride>,
    commit_lock: Mutex<()>,
}

impl GeoStore {
    pub fn new() -> Self {
        Self {
            riders: DashMap::new(),
            drivers: DashMap::new(),
            rides: DashMap::new(),
            commit_lock: Mutex::new(()),
        }
    }

    /// Runs `f` while holding the commit lock. Inside the closure, take at
    /// most one map entry reference at a time.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&GeoStore) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let _guard = self
            .commit_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(self)
    }

    /// Drivers with a published location within `radius_miles` of `point`,
    /// with their exact distance. Coarse bounding-box prefilter first (the
    /// index query, superset guaranteed), exact haversine cutoff second.
    pub fn drivers_near(&self, point: &GeoPoint, radius_miles: f64) -> Vec<(Driver, f64)> {
        self.drivers
            .iter()
            .filter_map(|entry| {
                let driver = entry.value();
                let location = driver.availability.location.as_ref()?;
                if !geo::coarse_contains(point, radius_miles, location) {
                    return None;
                }
                let distance = geo::distance_miles(point, location);
                (distance <= radius_miles).then(|| (driver.clone(), distance))
            })
            .collect()
    }

    /// Open rides whose pickup point is within `radius_miles` of `point`.
    pub fn open_rides_near(&self, point: &GeoPoint, radius_miles: f64) -> Vec<(Ride, f64)> {
        self.rides
            .iter()
            .filter_map(|entry| {
                let ride = entry.value();
                if ride.status != RideStatus::Open {
                    return None;
                }
                if !geo::coarse_contains(point, radius_miles, &ride.pickup.point) {
                    return None;
                }
                let distance = geo::distance_miles(point, &ride.pickup.point);
                (distance <= radius_miles).then(|| (ride.clone(), distance))
            })
            .collect()
    }

    pub fn expired_available_driver_ids(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        self.drivers
            .iter()
            .filter(|entry| entry.value().availability.is_expired(now))
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn live_driver_count(&self, now: DateTime<Utc>) -> usize {
        self.drivers
            .iter()
            .filter(|entry| entry.value().availability.is_live(now))
            .count()
    }

    /// Whether the actor participates in any ride that is not yet terminal.
    /// Gates rider/driver deletion.
    pub fn has_active_ride(&self, actor_id: Uuid) -> bool {
        self.rides.iter().any(|entry| {
            let ride = entry.value();
            !ride.status.is_terminal()
                && (ride.rider_id == actor_id || ride.driver_id == Some(actor_id))
        })
    }
}

impl Default for GeoStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::GeoStore;
    use crate::geo::GeoPoint;
    use crate::models::driver::{Availability, Driver};
    use crate::models::ride::{Place, Ride};

    fn driver_at(lat: f64, lng: f64) -> Driver {
        let now = Utc::now();
        let mut driver = Driver::new(
            "Dana".to_string(),
            "@dana".to_string(),
            "Blue Prius".to_string(),
            now,
        );
        driver.availability = Availability::open(GeoPoint { lat, lng }, 10.0, now, None);
        driver
    }

    fn ride_at(lat: f64, lng: f64) -> Ride {
        let now = Utc::now();
        Ride::new(
            Uuid::new_v4(),
            Place {
                name: "pickup".to_string(),
                point: GeoPoint { lat, lng },
            },
            Place {
                name: "dropoff".to_string(),
                point: GeoPoint {
                    lat: lat + 0.1,
                    lng: lng + 0.1,
                },
            },
            20.0,
            now + Duration::hours(1),
            now,
        )
    }

    #[test]
    fn drivers_near_filters_by_exact_distance() {
        let store = GeoStore::new();
        let near = driver_at(40.01, -75.0);
        let far = driver_at(41.5, -75.0);
        store.drivers.insert(near.id, near.clone());
        store.drivers.insert(far.id, far.clone());

        let hits = store.drivers_near(&GeoPoint { lat: 40.0, lng: -75.0 }, 50.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id, near.id);
        assert!(hits[0].1 < 1.0);
    }

    #[test]
    fn drivers_without_location_are_never_returned() {
        let store = GeoStore::new();
        let now = Utc::now();
        let offline = Driver::new(
            "Omar".to_string(),
            "@omar".to_string(),
            "Gray Civic".to_string(),
            now,
        );
        store.drivers.insert(offline.id, offline);

        let hits = store.drivers_near(&GeoPoint { lat: 40.0, lng: -75.0 }, 50.0);
        assert!(hits.is_empty());
    }

    #[test]
    fn open_rides_near_skips_non_open_rides() {
        let store = GeoStore::new();
        let open = ride_at(40.0, -75.0);
        let mut matched = ride_at(40.0, -75.0);
        matched.try_accept(Uuid::new_v4(), Utc::now());
        store.rides.insert(open.id, open.clone());
        store.rides.insert(matched.id, matched);

        let hits = store.open_rides_near(&GeoPoint { lat: 40.0, lng: -75.0 }, 10.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id, open.id);
    }

    #[test]
    fn has_active_ride_ignores_terminal_rides() {
        let store = GeoStore::new();
        let rider_id = Uuid::new_v4();
        let mut ride = ride_at(40.0, -75.0);
        ride.rider_id = rider_id;
        ride.try_fail("timeout", Utc::now());
        store.rides.insert(ride.id, ride);

        assert!(!store.has_active_ride(rider_id));
    }

    #[test]
    fn expired_driver_ids_only_lists_expired_availability() {
        let store = GeoStore::new();
        let now = Utc::now();

        let mut expired = driver_at(40.0, -75.0);
        expired.availability.expires_at = Some(now - Duration::minutes(5));
        let live = driver_at(40.0, -75.0);

        store.drivers.insert(expired.id, expired.clone());
        store.drivers.insert(live.id, live);

        let ids = store.expired_available_driver_ids(now);
        assert_eq!(ids, vec![expired.id]);
        assert_eq!(store.live_driver_count(now), 1);
    }
}
