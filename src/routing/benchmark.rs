//! Benchmark fan-out: one input, every configured provider combination.
//!
//! ## Responsibility
//! Describe the combinations to compare ([`BenchmarkPlan`]), build and cache
//! provider instances per combination ([`ProviderFactory`],
//! [`ProviderCache`]), run the input through each combination sequentially
//! and rank the results by speed and by similarity to a reference.
//!
//! ## Guarantees
//! - Isolated failures: a combination that fails to build or to transcribe
//!   is recorded in its entry; the remaining combinations still run
//! - Reuse: repeated runs reuse cached instances keyed by [`BenchmarkKey`]
//! - Bounded: the cache holds at most `max_cached_providers` instances; the
//!   oldest is evicted and shut down first
//!
//! ## NOT Responsible For
//! - Normal job routing (see: `strategy`, `hybrid`, `structure`)
//! - Rendering the comparison for users (host concern)

use crate::job::{RoutingContext, TranscriptionResult};
use crate::provider::{ProviderError, ProviderRegistry, TranscriptionProvider};
use crate::OrchestratorError;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::strategy::{ensure_registered, RoutingStrategy};

/// Default bound on cached benchmark provider instances.
pub(crate) fn default_max_cached_providers() -> usize {
    16
}

/// One point in the benchmark grid.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct BenchmarkKey {
    /// Provider kind (e.g. `"faster-whisper"`).
    pub provider: String,
    /// Model name (e.g. `"large-v3"`).
    pub model: String,
    /// Numeric precision / compute type (e.g. `"int8"`, `"float16"`).
    pub precision: String,
    /// Decoding beam width.
    pub beam_size: u32,
    /// Execution device (e.g. `"cpu"`, `"cuda"`).
    pub device: String,
}

impl BenchmarkKey {
    /// Create a key.
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        precision: impl Into<String>,
        beam_size: u32,
        device: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            precision: precision.into(),
            beam_size,
            device: device.into(),
        }
    }
}

impl fmt::Display for BenchmarkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/beam{}/{}",
            self.provider, self.model, self.precision, self.beam_size, self.device
        )
    }
}

/// The grid of combinations to compare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BenchmarkPlan {
    /// Provider kinds.
    pub providers: Vec<String>,
    /// Model names.
    pub models: Vec<String>,
    /// Precisions / compute types.
    pub precisions: Vec<String>,
    /// Beam widths.
    pub beam_sizes: Vec<u32>,
    /// Devices.
    pub devices: Vec<String>,
    /// Combination whose output is treated as the quality reference.
    #[serde(default)]
    pub reference: Option<BenchmarkKey>,
    /// Bound on cached provider instances.
    #[serde(default = "default_max_cached_providers")]
    pub max_cached_providers: usize,
}

impl BenchmarkPlan {
    /// Every combination, in provider → model → precision → beam → device
    /// order.
    pub fn combinations(&self) -> Vec<BenchmarkKey> {
        let mut keys = Vec::new();
        for provider in &self.providers {
            for model in &self.models {
                for precision in &self.precisions {
                    for &beam_size in &self.beam_sizes {
                        for device in &self.devices {
                            keys.push(BenchmarkKey::new(
                                provider.as_str(),
                                model.as_str(),
                                precision.as_str(),
                                beam_size,
                                device.as_str(),
                            ));
                        }
                    }
                }
            }
        }
        keys
    }
}

/// Builds a provider instance for one benchmark combination.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    /// Create (but do not initialize) a provider for `key`.
    async fn create(
        &self,
        key: &BenchmarkKey,
    ) -> Result<Arc<dyn TranscriptionProvider>, ProviderError>;
}

/// Strategy marker carrying a [`BenchmarkPlan`].
///
/// Normal selection returns the first plan provider that is registered so
/// the strategy still satisfies the shared contract; the comparison itself
/// runs through [`super::Router::benchmark`].
#[derive(Debug, Clone)]
pub struct BenchmarkStrategy {
    plan: BenchmarkPlan,
}

impl BenchmarkStrategy {
    /// Wrap a plan.
    pub fn new(plan: BenchmarkPlan) -> Self {
        Self { plan }
    }
}

impl RoutingStrategy for BenchmarkStrategy {
    fn name(&self) -> &str {
        "benchmark"
    }

    fn select(
        &self,
        _context: &RoutingContext,
        registry: &ProviderRegistry,
    ) -> Result<String, OrchestratorError> {
        match self.plan.providers.iter().find(|p| registry.contains(p)) {
            Some(name) => Ok(name.clone()),
            None => ensure_registered(
                self.plan.providers.first().map(String::as_str).unwrap_or(""),
                registry,
            ),
        }
    }

    fn benchmark_plan(&self) -> Option<&BenchmarkPlan> {
        Some(&self.plan)
    }
}

// ============================================================================
// Provider cache
// ============================================================================

/// Initialized provider instances keyed by combination, oldest evicted first.
pub struct ProviderCache {
    capacity: usize,
    entries: HashMap<BenchmarkKey, Arc<dyn TranscriptionProvider>>,
    order: VecDeque<BenchmarkKey>,
}

impl ProviderCache {
    /// Create a cache holding at most `capacity` instances (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Number of cached instances.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if an instance for `key` is cached.
    pub fn contains(&self, key: &BenchmarkKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Return the cached instance for `key`, building and initializing one
    /// through `factory` on a miss.
    ///
    /// Instances that fail to initialize are not cached.
    pub async fn get_or_create(
        &mut self,
        key: &BenchmarkKey,
        factory: &dyn ProviderFactory,
    ) -> Result<Arc<dyn TranscriptionProvider>, ProviderError> {
        if let Some(provider) = self.entries.get(key) {
            debug!(key = %key, "benchmark: cache hit");
            return Ok(Arc::clone(provider));
        }

        let provider = factory.create(key).await?;
        provider.initialize().await?;

        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&oldest) {
                debug!(key = %oldest, "benchmark: evicting cached provider");
                if let Err(e) = evicted.shutdown().await {
                    warn!(key = %oldest, error = %e, "benchmark: evicted provider shutdown failed");
                }
            }
        }

        self.entries.insert(key.clone(), Arc::clone(&provider));
        self.order.push_back(key.clone());
        Ok(provider)
    }

    /// Shut down and drop every cached instance, logging failures.
    pub async fn clear(&mut self) {
        for key in self.order.drain(..) {
            if let Some(provider) = self.entries.remove(&key) {
                if let Err(e) = provider.shutdown().await {
                    warn!(key = %key, error = %e, "benchmark: cached provider shutdown failed");
                }
            }
        }
        self.entries.clear();
    }
}

// ============================================================================
// Report
// ============================================================================

/// Result of one combination.
#[derive(Debug, Clone)]
pub struct BenchmarkEntry {
    /// The combination.
    pub key: BenchmarkKey,
    /// Transcript or the failure for this combination.
    pub result: Result<TranscriptionResult, OrchestratorError>,
    /// Time to fetch the provider from the cache, including creation and
    /// initialization on a miss.
    pub setup: Duration,
    /// Wall-clock time of the transcription call alone. The speed ranking
    /// is ordered by this.
    pub elapsed: Duration,
    /// Token-set Jaccard similarity to the reference transcript.
    pub similarity: Option<f64>,
}

/// Comparison across all combinations.
#[derive(Debug, Clone, Default)]
pub struct BenchmarkReport {
    /// One entry per combination, in plan order.
    pub entries: Vec<BenchmarkEntry>,
    /// Successful combinations, fastest first.
    pub speed_ranking: Vec<BenchmarkKey>,
    /// Successful non-reference combinations by similarity, best first.
    /// Empty when the reference is unset or failed.
    pub quality_ranking: Vec<(BenchmarkKey, f64)>,
}

impl BenchmarkReport {
    /// Entry for a given combination.
    pub fn entry(&self, key: &BenchmarkKey) -> Option<&BenchmarkEntry> {
        self.entries.iter().find(|e| &e.key == key)
    }

    /// Number of failed combinations.
    pub fn failures(&self) -> usize {
        self.entries.iter().filter(|e| e.result.is_err()).count()
    }
}

/// Token-set Jaccard similarity of two transcripts.
///
/// Tokens are whitespace-separated, lower-cased, with surrounding
/// punctuation stripped. Two empty transcripts are identical (1.0).
///
/// # Example
///
/// ```rust
/// use tokio_transcription_orchestrator::routing::benchmark::jaccard_similarity;
/// assert_eq!(jaccard_similarity("Hello, world", "hello world!"), 1.0);
/// assert_eq!(jaccard_similarity("a b", "b c"), 1.0 / 3.0);
/// ```
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let ta = token_set(a);
    let tb = token_set(b);
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    intersection as f64 / union as f64
}

fn token_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Run `input` through every combination of `plan`, sequentially.
pub(crate) async fn run(
    plan: &BenchmarkPlan,
    factory: &dyn ProviderFactory,
    cache: &mut ProviderCache,
    input: &str,
    context: &RoutingContext,
) -> BenchmarkReport {
    let keys = plan.combinations();
    info!(combinations = keys.len(), "benchmark: starting fan-out");

    let mut entries = Vec::with_capacity(keys.len());
    for key in keys {
        let setup_started = Instant::now();
        let provider = cache.get_or_create(&key, factory).await;
        let setup = setup_started.elapsed();

        // Timed separately so cache state never affects the speed ranking.
        let started = Instant::now();
        let result = match provider {
            Ok(provider) => provider.transcribe(input, context).await.map_err(|source| {
                OrchestratorError::ExecutionFailed {
                    provider: key.to_string(),
                    source,
                }
            }),
            Err(source) => Err(OrchestratorError::ProviderInitFailed {
                provider: key.to_string(),
                source,
            }),
        };
        let elapsed = started.elapsed();
        match &result {
            Ok(_) => debug!(
                key = %key,
                setup_ms = setup.as_millis() as u64,
                elapsed_ms = elapsed.as_millis() as u64,
                "benchmark: combination done"
            ),
            Err(e) => warn!(key = %key, error = %e, "benchmark: combination failed"),
        }
        entries.push(BenchmarkEntry {
            key,
            result,
            setup,
            elapsed,
            similarity: None,
        });
    }

    let mut speed: Vec<&BenchmarkEntry> = entries.iter().filter(|e| e.result.is_ok()).collect();
    speed.sort_by_key(|e| e.elapsed);
    let speed_ranking = speed.into_iter().map(|e| e.key.clone()).collect();

    let reference_text = plan.reference.as_ref().and_then(|reference| {
        entries
            .iter()
            .find(|e| &e.key == reference)
            .and_then(|e| e.result.as_ref().ok())
            .map(|r| r.text.clone())
    });

    let mut quality_ranking = Vec::new();
    if let (Some(reference), Some(reference_text)) = (plan.reference.as_ref(), reference_text) {
        for entry in entries.iter_mut().filter(|e| &e.key != reference) {
            if let Ok(result) = &entry.result {
                let similarity = jaccard_similarity(&reference_text, &result.text);
                entry.similarity = Some(similarity);
                quality_ranking.push((entry.key.clone(), similarity));
            }
        }
        quality_ranking.sort_by(|a, b| b.1.total_cmp(&a.1));
    }

    BenchmarkReport {
        entries,
        speed_ranking,
        quality_ranking,
    }
}
