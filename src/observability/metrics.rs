use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub ride_transitions_total: IntCounterVec,
    pub sweep_runs_total: IntCounterVec,
    pub sweep_affected_total: IntCounterVec,
    pub drivers_available: IntGauge,
    pub match_candidates: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let ride_transitions_total = IntCounterVec::new(
            Opts::new(
                "ride_transitions_total",
                "Ride status transitions by target status",
            ),
            &["status"],
        )
        .expect("valid ride_transitions_total metric");

        let sweep_runs_total = IntCounterVec::new(
            Opts::new("sweep_runs_total", "Scheduler sweep executions by job"),
            &["job"],
        )
        .expect("valid sweep_runs_total metric");

        let sweep_affected_total = IntCounterVec::new(
            Opts::new(
                "sweep_affected_total",
                "Records corrected by scheduler sweeps, by job",
            ),
            &["job"],
        )
        .expect("valid sweep_affected_total metric");

        let drivers_available = IntGauge::new(
            "drivers_available",
            "Drivers with live (unexpired) availability",
        )
        .expect("valid drivers_available metric");

        let match_candidates = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "match_candidates",
                "Candidate count per matching query",
            )
            .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0]),
            &["direction"],
        )
        .expect("valid match_candidates metric");

        registry
            .register(Box::new(ride_transitions_total.clone()))
            .expect("register ride_transitions_total");
        registry
            .register(Box::new(sweep_runs_total.clone()))
            .expect("register sweep_runs_total");
        registry
            .register(Box::new(sweep_affected_total.clone()))
            .expect("register sweep_affected_total");
        registry
            .register(Box::new(drivers_available.clone()))
            .expect("register drivers_available");
        registry
            .register(Box::new(match_candidates.clone()))
            .expect("register match_candidates");

        Self {
            registry,
            ride_transitions_total,
            sweep_runs_total,
            sweep_affected_total,
            drivers_available,
            match_candidates,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
