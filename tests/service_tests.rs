//! End-to-end tests for `ServiceContext`
//!
//! Loads TOML configs from temp files, builds the service, and pushes jobs
//! through queue and router together.

use std::io::Write;
use std::time::Duration;

use tokio_transcription_orchestrator::config::{export_schema, loader, AppConfig};
use tokio_transcription_orchestrator::{
    metrics, Job, OrchestratorError, RoutingContext, ServiceContext,
};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

const HYBRID_TOML: &str = r#"
[queue]
capacity = 10
concurrency = 2
poll_interval_ms = 5
rate_factor = 0.5

[routing]
kind = "hybrid"
quality_provider = "quality"
draft_provider = "draft"
threshold_secs = 60.0

[[providers]]
name = "quality"
kind = "echo"
model = "large-v3"
delay_ms = 1

[[providers]]
name = "draft"
kind = "echo"
model = "distil-small"
delay_ms = 1
"#;

#[tokio::test]
async fn test_service_from_file_routes_by_duration() {
    let file = write_config(HYBRID_TOML);
    let config = loader::load_from_file(file.path()).expect("config loads");
    let service = ServiceContext::from_config(config);
    service.initialize().await.expect("providers initialize");
    service.start();

    let short = Job::new("u1", "short.ogg", RoutingContext::new(10.0));
    let long = Job::new("u2", "long.ogg", RoutingContext::new(600.0));
    let (short_id, long_id) = (short.id.clone(), long.id.clone());
    service.submit(short).expect("short admitted");
    service.submit(long).expect("long admitted");

    let short = service
        .await_result(&short_id, Duration::from_secs(5))
        .await
        .expect("short result");
    let long = service
        .await_result(&long_id, Duration::from_secs(5))
        .await
        .expect("long result");
    assert_eq!(short.provider, "quality");
    assert_eq!(long.provider, "draft");

    let metrics = service.router().metrics();
    assert_eq!(metrics.get("quality").map(|m| m.requests), Some(1));
    assert_eq!(metrics.get("draft").map(|m| m.requests), Some(1));

    assert!(service.shutdown(Duration::from_secs(1)).await);
}

#[tokio::test]
async fn test_service_estimate_uses_configured_rate_factor() {
    let config = loader::load_from_str(HYBRID_TOML, "inline").expect("config loads");
    let service = ServiceContext::from_config(config);
    // Worker not started: everything stays queued.
    let first = Job::new("u", "a.ogg", RoutingContext::new(40.0));
    let second = Job::new("u", "b.ogg", RoutingContext::new(10.0));
    let id = second.id.clone();
    service.submit(first).expect("admitted");
    service.submit(second).expect("admitted");

    let estimate = service.estimate_wait(&id);
    // 40s ahead / 2 slots * 0.5
    assert!((estimate.wait_secs - 10.0).abs() < 1e-9);
    assert!((estimate.processing_secs - 5.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_service_rejects_when_full() {
    let config = loader::load_from_str(
        r#"
[queue]
capacity = 1
concurrency = 1
"#,
        "inline",
    )
    .expect("config loads");
    let service = ServiceContext::from_config(config);
    service
        .submit(Job::new("u", "a.ogg", RoutingContext::new(1.0)))
        .expect("first admitted");
    let err = service
        .submit(Job::new("u", "b.ogg", RoutingContext::new(1.0)))
        .err();
    assert!(matches!(
        err,
        Some(OrchestratorError::AdmissionRejected { capacity: 1 })
    ));
}

#[tokio::test]
async fn test_invalid_config_file_reports_every_problem() {
    let file = write_config(
        r#"
[queue]
capacity = 0
concurrency = 0

[routing]
kind = "single"
provider = "missing"
"#,
    );
    let err = loader::load_from_file(file.path())
        .err()
        .expect("validation must fail");
    let message = err.to_string();
    assert!(message.contains("queue.capacity"), "{message}");
    assert!(message.contains("queue.concurrency"), "{message}");
    assert!(message.contains("missing"), "{message}");

    let as_orchestrator: OrchestratorError = err.into();
    assert!(matches!(as_orchestrator, OrchestratorError::Config(_)));
}

#[tokio::test]
async fn test_metrics_exposition_after_jobs() {
    metrics::init_metrics().expect("metrics init");
    let service = ServiceContext::from_config(AppConfig::default());
    service.initialize().await.expect("initialize");
    service.start();

    let job = Job::new("u", "m.ogg", RoutingContext::new(1.0));
    let id = job.id.clone();
    service.submit(job).expect("admitted");
    service
        .await_result(&id, Duration::from_secs(5))
        .await
        .expect("result");
    service.shutdown(Duration::from_secs(1)).await;

    let text = metrics::gather_metrics();
    assert!(text.contains("transcriber_jobs_submitted_total"));
    assert!(text.contains("transcriber_provider_requests_total{provider=\"echo\"}"));
    assert!(text.contains("transcriber_jobs_completed_total{status=\"success\"}"));
}

#[test]
fn test_schema_export_describes_sections() {
    let schema = export_schema().expect("schema export");
    assert!(schema.contains("queue"));
    assert!(schema.contains("routing"));
    assert!(schema.contains("providers"));
}
