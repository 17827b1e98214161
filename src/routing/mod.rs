//! # Stage: Provider Routing
//!
//! ## Responsibility
//! Decide which registered transcription provider serves a job, execute the
//! job against it, and retry once through a fallback when the strategy offers
//! one. Strategies are pluggable: a fixed provider, a primary with a
//! secondary, duration-threshold routing, a fixed model with structuring
//! predicates, or a benchmark fan-out across a provider grid.
//!
//! ## Guarantees
//! - Deterministic: strategy selection is a pure function of the job's
//!   [`crate::RoutingContext`] and the registry contents.
//! - Thread-safe: the registry is read-only, per-provider counters are
//!   atomics, so a single [`Router`] serves every concurrent job.
//! - Bounded retries: a failed job is retried at most once, never chained.
//! - Late failure: a strategy naming an unregistered provider fails the job
//!   that hits it, with an error listing what is registered.
//!
//! ## NOT Responsible For
//! - Queueing or concurrency limits (that belongs to `queue`)
//! - The transcription itself (that belongs to each provider)
//! - Refinement, structuring or formatting passes (exposed as a
//!   [`ProcessingPlan`] for the host to act on)

pub mod benchmark;
pub mod config;
pub mod hybrid;
pub mod router;
pub mod strategy;
pub mod structure;

// Re-exports for convenience
pub use benchmark::{
    jaccard_similarity, BenchmarkEntry, BenchmarkKey, BenchmarkPlan, BenchmarkReport,
    BenchmarkStrategy, ProviderCache, ProviderFactory,
};
pub use config::StrategyConfig;
pub use hybrid::HybridStrategy;
pub use router::{ProviderMetricsSnapshot, Router};
pub use strategy::{
    FallbackStrategy, ProcessingPlan, ProviderHint, RoutingStrategy, SingleProviderStrategy,
};
pub use structure::StructureStrategy;
