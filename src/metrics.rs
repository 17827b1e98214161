//! Prometheus metrics for the transcription orchestrator.
//!
//! ## Usage
//!
//! Call [`init_metrics`] once at process startup **before** starting the
//! queue worker. The helper functions (`inc_submitted`,
//! `record_provider_duration`, …) are no-ops if `init_metrics` was never
//! called, so the queue and router are always safe to run.
//!
//! ## Metrics Exposed
//!
//! | Name | Type | Labels |
//! |------|------|--------|
//! | `transcriber_jobs_submitted_total` | Counter | |
//! | `transcriber_jobs_rejected_total` | Counter | `reason` |
//! | `transcriber_jobs_completed_total` | Counter | `status` |
//! | `transcriber_queue_depth` | Gauge | |
//! | `transcriber_active_jobs` | Gauge | |
//! | `transcriber_provider_requests_total` | Counter | `provider` |
//! | `transcriber_provider_errors_total` | Counter | `provider` |
//! | `transcriber_provider_duration_seconds` | Histogram | `provider` |
//! | `transcriber_provider_fallbacks_total` | Counter | `from`, `to` |

use crate::OrchestratorError;
use prometheus::{
    core::Collector, CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::OnceLock;
use std::time::Duration;

// ── Internal metrics bundle ────────────────────────────────────────────────

/// All Prometheus metrics for the orchestrator, stored in a single
/// [`OnceLock`] and initialised atomically.
pub struct Metrics {
    /// Prometheus registry that owns all metric descriptors.
    pub registry: Registry,
    /// Jobs admitted into the queue.
    pub jobs_submitted: IntCounter,
    /// Submissions refused, by reason (`capacity`, `duplicate`).
    pub jobs_rejected: CounterVec,
    /// Jobs finished, by status (`success`, `error`).
    pub jobs_completed: CounterVec,
    /// Jobs admitted and waiting to execute.
    pub queue_depth: IntGauge,
    /// Jobs executing under the concurrency gate.
    pub active_jobs: IntGauge,
    /// Provider calls, by provider.
    pub provider_requests: CounterVec,
    /// Failed provider calls, by provider.
    pub provider_errors: CounterVec,
    /// Provider call latency.
    pub provider_duration: HistogramVec,
    /// Fallback attempts, by failed and substitute provider.
    pub provider_fallbacks: CounterVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

// ── Initialisation ─────────────────────────────────────────────────────────

fn register<C: Collector + Clone + 'static>(
    registry: &Registry,
    collector: Result<C, prometheus::Error>,
) -> Result<C, OrchestratorError> {
    let collector =
        collector.map_err(|e| OrchestratorError::Other(format!("metrics init failed: {e}")))?;
    registry
        .register(Box::new(collector.clone()))
        .map_err(|e| OrchestratorError::Other(format!("metrics registration failed: {e}")))?;
    Ok(collector)
}

impl Metrics {
    /// Build a bundle on a fresh registry, every name starting with `prefix`.
    fn build(prefix: &str) -> Result<Self, OrchestratorError> {
        let registry = Registry::new();
        let name = |suffix: &str| format!("{prefix}_{suffix}");

        let jobs_submitted = register(
            &registry,
            IntCounter::new(name("jobs_submitted_total"), "Jobs admitted into the queue"),
        )?;
        let jobs_rejected = register(
            &registry,
            CounterVec::new(
                Opts::new(name("jobs_rejected_total"), "Submissions refused"),
                &["reason"],
            ),
        )?;
        let jobs_completed = register(
            &registry,
            CounterVec::new(
                Opts::new(name("jobs_completed_total"), "Jobs finished by status"),
                &["status"],
            ),
        )?;
        let queue_depth = register(
            &registry,
            IntGauge::new(name("queue_depth"), "Jobs waiting to execute"),
        )?;
        let active_jobs = register(
            &registry,
            IntGauge::new(name("active_jobs"), "Jobs executing under the gate"),
        )?;
        let provider_requests = register(
            &registry,
            CounterVec::new(
                Opts::new(name("provider_requests_total"), "Provider calls"),
                &["provider"],
            ),
        )?;
        let provider_errors = register(
            &registry,
            CounterVec::new(
                Opts::new(name("provider_errors_total"), "Failed provider calls"),
                &["provider"],
            ),
        )?;
        let provider_duration = register(
            &registry,
            HistogramVec::new(
                HistogramOpts::new(name("provider_duration_seconds"), "Provider call latency")
                    .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
                &["provider"],
            ),
        )?;
        let provider_fallbacks = register(
            &registry,
            CounterVec::new(
                Opts::new(name("provider_fallbacks_total"), "Fallback attempts"),
                &["from", "to"],
            ),
        )?;

        Ok(Self {
            registry,
            jobs_submitted,
            jobs_rejected,
            jobs_completed,
            queue_depth,
            active_jobs,
            provider_requests,
            provider_errors,
            provider_duration,
            provider_fallbacks,
        })
    }
}

/// Initialise all Prometheus metrics on a private registry.
///
/// Calling it a second time is a no-op (returns `Ok(())`).
///
/// # Errors
///
/// Returns [`OrchestratorError::Other`] if metric construction or
/// registration fails.
///
/// # Panics
///
/// This function never panics.
pub fn init_metrics() -> Result<(), OrchestratorError> {
    if METRICS.get().is_some() {
        return Ok(());
    }
    // A racing initialiser builds identical descriptors; first one wins.
    let _ = METRICS.set(Metrics::build("transcriber")?);
    Ok(())
}

fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

// ── Public helper functions ────────────────────────────────────────────────

/// Count an admitted job. No-op before [`init_metrics`].
pub fn inc_submitted() {
    if let Some(m) = metrics() {
        m.jobs_submitted.inc();
    }
}

/// Count a refused submission. No-op before [`init_metrics`].
pub fn inc_rejected(reason: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.jobs_rejected.get_metric_with_label_values(&[reason]) {
            c.inc();
        }
    }
}

/// Count a finished job by status. No-op before [`init_metrics`].
pub fn inc_completed(status: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.jobs_completed.get_metric_with_label_values(&[status]) {
            c.inc();
        }
    }
}

/// Set the waiting-jobs gauge. No-op before [`init_metrics`].
pub fn set_queue_depth(depth: i64) {
    if let Some(m) = metrics() {
        m.queue_depth.set(depth);
    }
}

/// Set the executing-jobs gauge. No-op before [`init_metrics`].
pub fn set_active_jobs(active: i64) {
    if let Some(m) = metrics() {
        m.active_jobs.set(active);
    }
}

/// Count a provider call. No-op before [`init_metrics`].
pub fn inc_provider_request(provider: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.provider_requests.get_metric_with_label_values(&[provider]) {
            c.inc();
        }
    }
}

/// Count a failed provider call. No-op before [`init_metrics`].
pub fn inc_provider_error(provider: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.provider_errors.get_metric_with_label_values(&[provider]) {
            c.inc();
        }
    }
}

/// Record the latency of one provider call.
///
/// No-op if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn record_provider_duration(provider: &str, d: Duration) {
    if let Some(m) = metrics() {
        if let Ok(h) = m.provider_duration.get_metric_with_label_values(&[provider]) {
            h.observe(d.as_secs_f64());
        }
    }
}

/// Count a fallback from `from` to `to`. No-op before [`init_metrics`].
pub fn inc_fallback(from: &str, to: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.provider_fallbacks.get_metric_with_label_values(&[from, to]) {
            c.inc();
        }
    }
}

/// Gather all registered metrics as a raw list of metric families.
///
/// Returns an empty `Vec` if metrics have not been initialised.
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    metrics().map_or_else(Vec::new, |m| m.registry.gather())
}

/// Gather and encode all metrics in the Prometheus text exposition format.
///
/// Returns an empty string if metrics have not been initialised or if
/// encoding fails.
///
/// # Panics
///
/// This function never panics.
pub fn gather_metrics() -> String {
    encode(&gather())
}

fn encode(families: &[prometheus::proto::MetricFamily]) -> String {
    if families.is_empty() {
        return String::new();
    }
    let mut buffer = Vec::new();
    if TextEncoder::new().encode(families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
