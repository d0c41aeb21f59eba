//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters and gauges the fetch pipeline reports on.

use std::sync::Arc;

use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across the pipeline.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    fetch_attempts_total: IntCounter,
    fetch_completed_total: IntCounter,
    fetch_failures_total: IntCounterVec,
    failures_observed: IntCounter,
    fetch_dead_letters_total: IntCounter,
    fetch_bytes_total: IntCounter,
    plan_decisions_total: IntCounterVec,
    fetch_in_flight: IntGauge,
    fetch_queue_depth: IntGauge,
}

/// Snapshot of the pipeline counters and gauges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Fetch attempts started.
    pub fetch_attempts_total: u64,
    /// Files fetched successfully.
    pub fetch_completed_total: u64,
    /// Failed attempts across all stages.
    pub fetch_failures_total: u64,
    /// Intents that exhausted their attempts.
    pub fetch_dead_letters_total: u64,
    /// Payload bytes written to the mirror.
    pub fetch_bytes_total: u64,
    /// Attempts currently holding an admission permit.
    pub fetch_in_flight: i64,
    /// Intents waiting in the fetch queue.
    pub fetch_queue_depth: i64,
}

impl Metrics {
    /// Construct a new metrics registry with the pipeline collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let fetch_attempts_total = register(
            &registry,
            "fetch_attempts_total",
            IntCounter::with_opts(Opts::new(
                "fetch_attempts_total",
                "Fetch attempts admitted by the gate",
            )),
        )?;
        let fetch_completed_total = register(
            &registry,
            "fetch_completed_total",
            IntCounter::with_opts(Opts::new(
                "fetch_completed_total",
                "Files fetched to the local mirror",
            )),
        )?;
        let fetch_failures_total = register(
            &registry,
            "fetch_failures_total",
            IntCounterVec::new(
                Opts::new("fetch_failures_total", "Failed fetch attempts by stage"),
                &["stage"],
            ),
        )?;
        let failures_observed =
            IntCounter::new("fetch_failures_observed", "Failed attempts across stages").map_err(
                |source| TelemetryError::MetricsCollector {
                    name: "fetch_failures_observed",
                    source,
                },
            )?;
        let fetch_dead_letters_total = register(
            &registry,
            "fetch_dead_letters_total",
            IntCounter::with_opts(Opts::new(
                "fetch_dead_letters_total",
                "Intents that exhausted their retry budget",
            )),
        )?;
        let fetch_bytes_total = register(
            &registry,
            "fetch_bytes_total",
            IntCounter::with_opts(Opts::new(
                "fetch_bytes_total",
                "Payload bytes written to the mirror",
            )),
        )?;
        let plan_decisions_total = register(
            &registry,
            "plan_decisions_total",
            IntCounterVec::new(
                Opts::new("plan_decisions_total", "Dedup planner decisions"),
                &["decision"],
            ),
        )?;
        let fetch_in_flight = register(
            &registry,
            "fetch_in_flight",
            IntGauge::with_opts(Opts::new(
                "fetch_in_flight",
                "Fetch attempts currently holding an admission permit",
            )),
        )?;
        let fetch_queue_depth = register(
            &registry,
            "fetch_queue_depth",
            IntGauge::with_opts(Opts::new(
                "fetch_queue_depth",
                "Intents waiting in the fetch queue",
            )),
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                fetch_attempts_total,
                fetch_completed_total,
                fetch_failures_total,
                failures_observed,
                fetch_dead_letters_total,
                fetch_bytes_total,
                plan_decisions_total,
                fetch_in_flight,
                fetch_queue_depth,
            }),
        })
    }

    /// Count an admitted attempt.
    pub fn inc_attempt(&self) {
        self.inner.fetch_attempts_total.inc();
    }

    /// Count a completed file and its size.
    pub fn record_completed(&self, bytes: u64) {
        self.inner.fetch_completed_total.inc();
        self.inner.fetch_bytes_total.inc_by(bytes);
    }

    /// Count a failed attempt at `stage`.
    pub fn inc_failure(&self, stage: &str) {
        self.inner
            .fetch_failures_total
            .with_label_values(&[stage])
            .inc();
        self.inner.failures_observed.inc();
    }

    /// Count a dead-lettered intent.
    pub fn inc_dead_letter(&self) {
        self.inner.fetch_dead_letters_total.inc();
    }

    /// Count a planner decision (`queued`, `replaced`, `skipped`).
    pub fn inc_plan_decision(&self, decision: &str) {
        self.inner
            .plan_decisions_total
            .with_label_values(&[decision])
            .inc();
    }

    /// Read the counter for one planner decision.
    #[must_use]
    pub fn plan_decisions(&self, decision: &str) -> u64 {
        self.inner
            .plan_decisions_total
            .with_label_values(&[decision])
            .get()
    }

    /// Adjust the in-flight gauge when a permit is acquired.
    pub fn inc_in_flight(&self) {
        self.inner.fetch_in_flight.inc();
    }

    /// Adjust the in-flight gauge when a permit is released.
    pub fn dec_in_flight(&self) {
        self.inner.fetch_in_flight.dec();
    }

    /// Adjust the queue depth gauge on submission.
    pub fn inc_queue_depth(&self) {
        self.inner.fetch_queue_depth.inc();
    }

    /// Adjust the queue depth gauge on receipt.
    pub fn dec_queue_depth(&self) {
        self.inner.fetch_queue_depth.dec();
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of the pipeline counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            fetch_attempts_total: self.inner.fetch_attempts_total.get(),
            fetch_completed_total: self.inner.fetch_completed_total.get(),
            fetch_failures_total: self.inner.failures_observed.get(),
            fetch_dead_letters_total: self.inner.fetch_dead_letters_total.get(),
            fetch_bytes_total: self.inner.fetch_bytes_total.get(),
            fetch_in_flight: self.inner.fetch_in_flight.get(),
            fetch_queue_depth: self.inner.fetch_queue_depth.get(),
        }
    }
}

fn register<C>(
    registry: &Registry,
    name: &'static str,
    collector: prometheus::Result<C>,
) -> Result<C>
where
    C: Collector + Clone + 'static,
{
    let collector =
        collector.map_err(|source| TelemetryError::MetricsCollector { name, source })?;
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })?;
    Ok(collector)
}
