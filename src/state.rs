use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::cache::{NoopSessionCache, SessionCache};
use crate::config::Config;
use crate::models::event::RideEvent;
use crate::notify::{LogNotifier, Notifier};
use crate::observability::metrics::Metrics;
use crate::store::GeoStore;

pub struct AppState {
    pub store: GeoStore,
    pub config: Config,
    pub notifier: Arc<dyn Notifier>,
    pub session_cache: Arc<dyn SessionCache>,
    pub ride_events_tx: broadcast::Sender<RideEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self::with_collaborators(config, Arc::new(LogNotifier), Arc::new(NoopSessionCache))
    }

    pub fn with_collaborators(
        config: Config,
        notifier: Arc<dyn Notifier>,
        session_cache: Arc<dyn SessionCache>,
    ) -> Self {
        let (ride_events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);

        Self {
            store: GeoStore::new(),
            config,
            notifier,
            session_cache,
            ride_events_tx,
            metrics: Metrics::new(),
        }
    }

    /// Best-effort delivery: a failure is logged and otherwise ignored so it
    /// never blocks the state transition that triggered it.
    pub fn notify(&self, contact: &str, message: &str) {
        if let Err(err) = self.notifier.deliver(contact, message) {
            tracing::warn!(contact, error = %err, "notification delivery failed");
        }
    }

    pub fn publish(&self, event: RideEvent) {
        let _ = self.ride_events_tx.send(event);
    }

    pub fn invalidate_session(&self, actor_id: Uuid) {
        self.session_cache.invalidate(actor_id);
    }

    pub fn record_transition(&self, status: &str) {
        self.metrics
            .ride_transitions_total
            .with_label_values(&[status])
            .inc();
    }

    pub fn refresh_driver_gauge(&self, now: chrono::DateTime<chrono::Utc>) {
        self.metrics
            .drivers_available
            .set(self.store.live_driver_count(now) as i64);
    }
}
