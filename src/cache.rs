use uuid::Uuid;

/// Boundary to the conversational layer's per-actor session cache. The core
/// calls `invalidate` whenever it mutates an actor's availability or active
/// ride so that layer never serves a stale view.
pub trait SessionCache: Send + Sync {
    fn invalidate(&self, actor_id: Uuid);
}

pub struct NoopSessionCache;

impl SessionCache for NoopSessionCache {
    fn invalidate(&self, _actor_id: Uuid) {}
}
