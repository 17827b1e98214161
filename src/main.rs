//! Demo binary for tokio-transcription-orchestrator
//!
//! Loads a config (first CLI argument, or built-in defaults), registers the
//! configured providers, pushes a batch of demo jobs through the queue and
//! prints their outcomes, wait estimates and router metrics.
//!
//! ## Environment Variables
//!
//! - `LOG_FORMAT=json`: structured JSON output (production)
//! - `RUST_LOG=info`: log level filter (default: info)

use std::path::Path;
use std::time::Duration;
use tokio_transcription_orchestrator::{
    config::{loader, AppConfig},
    init_tracing, metrics, Job, Priority, RoutingContext, ServiceContext,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured tracing (JSON or pretty, based on LOG_FORMAT env)
    let _ = init_tracing();

    // Initialize Prometheus metrics registry before the queue starts.
    metrics::init_metrics()?;

    let config = match std::env::args().nth(1) {
        Some(path) => loader::load_from_file(Path::new(&path))?,
        None => AppConfig::default(),
    };
    info!(
        strategy = config.routing.kind(),
        capacity = config.queue.capacity,
        concurrency = config.queue.concurrency,
        "Starting tokio-transcription-orchestrator demo"
    );

    let service = ServiceContext::from_config(config);
    service.initialize().await?;
    service.start();

    let demo_jobs = [
        ("user-1", "voice/greeting.ogg", 4.0, Priority::Normal),
        ("user-2", "voice/standup.ogg", 95.0, Priority::High),
        ("user-3", "voice/reminder.ogg", 12.5, Priority::Low),
        ("user-1", "voice/follow-up.ogg", 30.0, Priority::Normal),
        ("user-4", "voice/lecture.ogg", 1800.0, Priority::Normal),
    ];

    let mut ids = Vec::new();
    for (owner, input, duration, priority) in demo_jobs {
        let job = Job::new(owner, input, RoutingContext::new(duration).with_priority(priority));
        let id = job.id.clone();
        match service.submit(job) {
            Ok(position) => {
                let estimate = service.estimate_wait(&id);
                info!(
                    job_id = %id,
                    position,
                    wait_secs = estimate.wait_secs,
                    processing_secs = estimate.processing_secs,
                    "job queued"
                );
                ids.push((id, duration));
            }
            Err(e) => warn!(owner, error = %e, "job rejected"),
        }
    }

    for (id, duration) in &ids {
        match service.await_result(id, Duration::from_secs(30)).await {
            Ok(result) => {
                let plan = service.processing_plan(&RoutingContext::new(*duration));
                info!(
                    job_id = %id,
                    provider = %result.provider,
                    text = %result.text,
                    refine = plan.refine,
                    structure = plan.structure,
                    "job finished"
                );
            }
            Err(e) => error!(job_id = %id, kind = ?e.kind(), error = %e, "job failed"),
        }
    }

    for (provider, snapshot) in service.router().metrics() {
        info!(
            provider = %provider,
            requests = snapshot.requests,
            errors = snapshot.errors,
            avg_duration_secs = snapshot.avg_duration_secs,
            error_rate = snapshot.error_rate,
            "provider metrics"
        );
    }

    service.shutdown(Duration::from_secs(5)).await;

    println!("{}", metrics::gather_metrics());
    Ok(())
}
