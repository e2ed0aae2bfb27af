//! Prometheus metrics for the release agent.
//!
//! - `opkit_agent_reconcile_total{result}`: finished passes by outcome
//! - `opkit_agent_reconcile_duration_seconds{result}`: pass latency
//! - `opkit_agent_queue_depth`: releases waiting for a pass

use std::time::Duration;

use opkit::Action;
use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

/// Pass latency buckets in seconds.
const RECONCILE_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0];

/// Metrics recorded by the agent loop, registered on a private registry.
pub struct AgentMetrics {
    registry: Registry,
    reconcile_total: CounterVec,
    reconcile_duration: HistogramVec,
    queue_depth: Gauge,
}

impl AgentMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let reconcile_total = CounterVec::new(
            Opts::new(
                "opkit_agent_reconcile_total",
                "Finished reconcile passes by outcome",
            ),
            &["result"],
        )?;
        registry.register(Box::new(reconcile_total.clone()))?;

        let reconcile_duration = HistogramVec::new(
            HistogramOpts::new(
                "opkit_agent_reconcile_duration_seconds",
                "Duration of one reconcile pass",
            )
            .buckets(RECONCILE_BUCKETS.to_vec()),
            &["result"],
        )?;
        registry.register(Box::new(reconcile_duration.clone()))?;

        let queue_depth = Gauge::new(
            "opkit_agent_queue_depth",
            "Releases waiting for a reconcile pass",
        )?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            registry,
            reconcile_total,
            reconcile_duration,
            queue_depth,
        })
    }

    /// Record one finished pass.
    pub fn pass_finished(&self, outcome: &opkit::Result<Action>, elapsed: Duration) {
        let result = outcome_label(outcome);
        self.reconcile_total.with_label_values(&[result]).inc();
        self.reconcile_duration
            .with_label_values(&[result])
            .observe(elapsed.as_secs_f64());
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as f64);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn encode_text(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn outcome_label(outcome: &opkit::Result<Action>) -> &'static str {
    match outcome {
        Ok(Action::Done) => "done",
        Ok(Action::Requeue) | Ok(Action::RequeueAfter(_)) => "requeue",
        Err(_) => "error",
    }
}
