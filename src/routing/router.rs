//! Provider router.
//!
//! The [`Router`] owns the read-only [`ProviderRegistry`] and the active
//! [`RoutingStrategy`]. It executes a job against the strategy's choice,
//! keeps per-provider counters, and retries exactly once through the
//! strategy's fallback when the first provider fails.

use crate::job::{RoutingContext, TranscriptionResult};
use crate::metrics;
use crate::provider::{ProviderRegistry, TranscriptionProvider};
use crate::OrchestratorError;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::benchmark::{self, BenchmarkReport, ProviderCache, ProviderFactory};
use super::strategy::{ensure_registered, ProcessingPlan, ProviderHint, RoutingStrategy};

/// Lock-free per-provider counters. Monotonic, never reset.
#[derive(Debug, Default)]
struct ProviderCounters {
    requests: AtomicU64,
    errors: AtomicU64,
    total_duration_micros: AtomicU64,
}

/// Point-in-time view of one provider's counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderMetricsSnapshot {
    /// Calls made to the provider, including fallback calls.
    pub requests: u64,
    /// Calls that failed.
    pub errors: u64,
    /// Mean wall-clock time per call, in seconds.
    pub avg_duration_secs: f64,
    /// `errors / requests`, 0.0 with no requests.
    pub error_rate: f64,
}

/// Executes jobs against strategy-selected providers.
///
/// Thread-safe: the registry is immutable, counters are atomics, and the
/// benchmark cache sits behind an async mutex.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tokio_transcription_orchestrator::{
///     EchoProvider, ProviderRegistry, Router, RoutingContext,
///     routing::FallbackStrategy,
/// };
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = ProviderRegistry::new()
///     .with_provider(Arc::new(EchoProvider::new("local")))
///     .with_provider(Arc::new(EchoProvider::new("cloud")));
/// let router = Router::new(registry, Arc::new(FallbackStrategy::new("local", "cloud")));
/// router.initialize_all().await?;
/// let result = router.transcribe("/tmp/voice.ogg", &RoutingContext::new(12.0)).await?;
/// println!("{}", result.text);
/// # Ok(())
/// # }
/// ```
pub struct Router {
    registry: ProviderRegistry,
    strategy: Arc<dyn RoutingStrategy>,
    counters: HashMap<String, ProviderCounters>,
    factory: Option<Arc<dyn ProviderFactory>>,
    benchmark_cache: Mutex<ProviderCache>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("strategy", &self.strategy.name())
            .field("providers", &self.registry.names())
            .field("benchmark_factory", &self.factory.is_some())
            .finish()
    }
}

impl Router {
    /// Create a router over `registry` using `strategy`.
    ///
    /// Strategies are not validated against the registry here: a strategy
    /// naming an unregistered provider fails when a job executes.
    pub fn new(registry: ProviderRegistry, strategy: Arc<dyn RoutingStrategy>) -> Self {
        let counters = registry
            .names()
            .into_iter()
            .map(|name| (name, ProviderCounters::default()))
            .collect();
        let cache_capacity = strategy
            .benchmark_plan()
            .map(|plan| plan.max_cached_providers)
            .unwrap_or_else(benchmark::default_max_cached_providers);

        Self {
            registry,
            strategy,
            counters,
            factory: None,
            benchmark_cache: Mutex::new(ProviderCache::new(cache_capacity)),
        }
    }

    /// Attach the factory used to build benchmark providers.
    pub fn with_factory(mut self, factory: Arc<dyn ProviderFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// The active strategy.
    pub fn strategy(&self) -> &Arc<dyn RoutingStrategy> {
        &self.strategy
    }

    /// The provider registry.
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Fixed provider/model hint of the active strategy.
    pub fn provider_hint(&self) -> Option<ProviderHint> {
        self.strategy.provider_hint()
    }

    /// Downstream processing plan for a job with this context.
    pub fn processing_plan(&self, context: &RoutingContext) -> ProcessingPlan {
        self.strategy.processing_plan(context)
    }

    /// Transcribe `input` with the strategy-selected provider.
    ///
    /// On failure, and if the strategy supports it, retries exactly once
    /// against the strategy's fallback. If the fallback also fails, the
    /// original failure is returned.
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::ProviderUnavailable`] if the strategy picks an
    ///   unregistered provider
    /// - [`OrchestratorError::ExecutionFailed`] if the provider (and any
    ///   fallback) failed
    pub async fn transcribe(
        &self,
        input: &str,
        context: &RoutingContext,
    ) -> Result<TranscriptionResult, OrchestratorError> {
        let provider = self.strategy.select(context, &self.registry)?;
        debug!(strategy = self.strategy.name(), provider = %provider, "router: provider selected");

        let primary_err = match self.invoke(&provider, input, context).await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !self.strategy.supports_fallback() {
            return Err(primary_err);
        }
        let Some(fallback) = self.strategy.fallback_for(&provider) else {
            return Err(primary_err);
        };
        if fallback == provider {
            return Err(primary_err);
        }

        warn!(
            provider = %provider,
            fallback = %fallback,
            error = %primary_err,
            "router: primary failed, trying fallback"
        );
        metrics::inc_fallback(&provider, &fallback);

        match self.invoke(&fallback, input, context).await {
            Ok(result) => {
                info!(provider = %fallback, "router: fallback succeeded");
                Ok(result)
            }
            Err(fallback_err) => {
                warn!(
                    provider = %fallback,
                    error = %fallback_err,
                    "router: fallback failed, returning original error"
                );
                Err(primary_err)
            }
        }
    }

    /// Run one provider call with counter bookkeeping.
    async fn invoke(
        &self,
        name: &str,
        input: &str,
        context: &RoutingContext,
    ) -> Result<TranscriptionResult, OrchestratorError> {
        let provider: &Arc<dyn TranscriptionProvider> = match self.registry.get(name) {
            Some(p) => p,
            None => {
                ensure_registered(name, &self.registry)?;
                return Err(OrchestratorError::Other(format!("provider '{name}' vanished")));
            }
        };

        let counters = self.counters.get(name);
        if let Some(c) = counters {
            c.requests.fetch_add(1, Ordering::Relaxed);
        }
        metrics::inc_provider_request(name);

        let started = Instant::now();
        let result = provider.transcribe(input, context).await;
        let elapsed = started.elapsed();

        if let Some(c) = counters {
            c.total_duration_micros
                .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        }
        metrics::record_provider_duration(name, elapsed);

        result.map_err(|source| {
            if let Some(c) = counters {
                c.errors.fetch_add(1, Ordering::Relaxed);
            }
            metrics::inc_provider_error(name);
            OrchestratorError::ExecutionFailed {
                provider: name.to_string(),
                source,
            }
        })
    }

    /// Per-provider counters, computed on read.
    pub fn metrics(&self) -> BTreeMap<String, ProviderMetricsSnapshot> {
        self.counters
            .iter()
            .map(|(name, c)| {
                let requests = c.requests.load(Ordering::Relaxed);
                let errors = c.errors.load(Ordering::Relaxed);
                let total = Duration::from_micros(c.total_duration_micros.load(Ordering::Relaxed));
                let (avg_duration_secs, error_rate) = if requests > 0 {
                    (
                        total.as_secs_f64() / requests as f64,
                        errors as f64 / requests as f64,
                    )
                } else {
                    (0.0, 0.0)
                };
                (
                    name.clone(),
                    ProviderMetricsSnapshot {
                        requests,
                        errors,
                        avg_duration_secs,
                        error_rate,
                    },
                )
            })
            .collect()
    }

    /// Initialize every registered provider, in name order.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::ProviderInitFailed`] for the first provider that
    /// fails; providers after it are left untouched.
    pub async fn initialize_all(&self) -> Result<(), OrchestratorError> {
        for (name, provider) in self.registry.iter() {
            provider
                .initialize()
                .await
                .map_err(|source| OrchestratorError::ProviderInitFailed {
                    provider: name.to_string(),
                    source,
                })?;
            info!(provider = name, model = ?provider.model(), "router: provider initialized");
        }
        Ok(())
    }

    /// Shut down every registered provider and every cached benchmark
    /// provider. Failures are logged and skipped.
    pub async fn shutdown_all(&self) {
        for (name, provider) in self.registry.iter() {
            match provider.shutdown().await {
                Ok(()) => debug!(provider = name, "router: provider shut down"),
                Err(e) => warn!(provider = name, error = %e, "router: provider shutdown failed"),
            }
        }
        self.benchmark_cache.lock().await.clear().await;
    }

    /// Fan `input` out across every combination of the active strategy's
    /// benchmark plan.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::BenchmarkUnavailable`] if the strategy has no
    /// plan or no [`ProviderFactory`] was attached. Per-combination failures
    /// are reported inside the [`BenchmarkReport`].
    pub async fn benchmark(
        &self,
        input: &str,
        context: &RoutingContext,
    ) -> Result<BenchmarkReport, OrchestratorError> {
        let plan = self.strategy.benchmark_plan().ok_or_else(|| {
            OrchestratorError::BenchmarkUnavailable(format!(
                "strategy '{}' has no benchmark plan",
                self.strategy.name()
            ))
        })?;
        let factory = self.factory.as_deref().ok_or_else(|| {
            OrchestratorError::BenchmarkUnavailable("no provider factory attached".to_string())
        })?;

        let mut cache = self.benchmark_cache.lock().await;
        Ok(benchmark::run(plan, factory, &mut cache, input, context).await)
    }

    /// Number of cached benchmark provider instances.
    pub async fn cached_benchmark_providers(&self) -> usize {
        self.benchmark_cache.lock().await.len()
    }
}
