//! Integration tests for the admission queue
//!
//! Exercises `QueueManager` through the public API only:
//! - Admission bound and position ordering under concurrent submitters
//! - Concurrency gate never exceeded
//! - Outcome round trip, timeouts and purging
//! - Worker start/stop/restart semantics
//! - Wait-time estimation

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_transcription_orchestrator::{
    Job, JobId, OrchestratorError, QueueConfig, QueueManager, RoutingContext,
};

// ============================================================================
// Helpers
// ============================================================================

fn job(id: &str, duration: f64) -> Job {
    Job::new("tester", format!("audio/{id}.ogg"), RoutingContext::new(duration)).with_id(id)
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(cond(), "condition not reached within 2s");
}

const AWAIT: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(5);

// ============================================================================
// Admission
// ============================================================================

#[tokio::test]
async fn test_positions_one_to_capacity_then_rejected() {
    let queue: QueueManager<()> = QueueManager::new(QueueConfig::new(5, 1));
    for i in 1..=5 {
        let position = queue.submit(job(&format!("j{i}"), 1.0));
        assert_eq!(position.ok(), Some(i));
    }
    let rejected = queue.submit(job("j6", 1.0));
    assert!(matches!(
        rejected,
        Err(OrchestratorError::AdmissionRejected { capacity: 5 })
    ));
    assert_eq!(queue.depth(), 5);
    assert_eq!(queue.active_count(), 0);
}

#[tokio::test]
async fn test_rejection_does_not_affect_later_positions() {
    let queue: QueueManager<()> = QueueManager::new(QueueConfig::new(2, 1));
    let release = Arc::new(Notify::new());
    let gate = Arc::clone(&release);
    queue.start_worker(move |_job: Job| {
        let gate = Arc::clone(&gate);
        async move {
            gate.notified().await;
            Ok(())
        }
    });

    queue.submit(job("a", 1.0)).ok();
    wait_until(|| queue.active_count() == 1).await;
    assert_eq!(queue.submit(job("b", 1.0)).ok(), Some(2));
    assert_eq!(queue.submit(job("c", 1.0)).ok(), Some(3));
    assert!(queue.submit(job("d", 1.0)).is_err());

    // Free "a"; "b" starts executing, which frees one waiting slot.
    release.notify_one();
    queue
        .await_outcome(&JobId::new("a"), AWAIT, POLL)
        .await
        .expect("a completes");
    wait_until(|| queue.depth() == 1).await;
    assert_eq!(queue.submit(job("d", 1.0)).ok(), Some(3));

    queue.shutdown(Duration::from_millis(10)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submitters_get_distinct_increasing_positions() {
    let queue: Arc<QueueManager<()>> = Arc::new(QueueManager::new(QueueConfig::new(200, 1)));
    let mut handles = Vec::new();
    for t in 0..8 {
        let queue = Arc::clone(&queue);
        handles.push(tokio::spawn(async move {
            let mut positions = Vec::new();
            for i in 0..20 {
                if let Ok(p) = queue.submit(job(&format!("t{t}-{i}"), 1.0)) {
                    positions.push(p);
                }
            }
            positions
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        let positions = handle.await.expect("submitter task");
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        all.extend(positions);
    }
    let unique: HashSet<_> = all.iter().copied().collect();
    assert_eq!(all.len(), 160);
    assert_eq!(unique.len(), 160);
    assert_eq!(unique.iter().max(), Some(&160));
}

// ============================================================================
// Concurrency gate
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_active_count_never_exceeds_concurrency() {
    let queue: Arc<QueueManager<usize>> = Arc::new(QueueManager::new(QueueConfig::new(50, 3)));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let (r, p) = (Arc::clone(&running), Arc::clone(&peak));
    queue.start_worker(move |_job: Job| {
        let (running, peak) = (Arc::clone(&r), Arc::clone(&p));
        async move {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(now)
        }
    });

    let ids: Vec<JobId> = (0..20)
        .map(|i| {
            let j = job(&format!("g{i}"), 1.0);
            let id = j.id.clone();
            queue.submit(j).expect("admitted");
            id
        })
        .collect();

    let observer = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            for _ in 0..50 {
                assert!(queue.active_count() <= 3);
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
    };

    for id in &ids {
        let outcome = queue.await_outcome(id, AWAIT, POLL).await.expect("outcome");
        assert!(outcome.is_success());
    }
    observer.await.expect("observer");
    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(queue.depth() + queue.active_count(), 0);
    queue.stop_worker().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_jobs_start_in_admission_order_on_multi_thread_runtime() {
    let queue: QueueManager<()> = QueueManager::new(QueueConfig::new(200, 1));
    let ids: Vec<JobId> = (0..200)
        .map(|i| {
            let j = job(&format!("fifo-{i:03}"), 1.0);
            let id = j.id.clone();
            queue.submit(j).expect("admitted");
            id
        })
        .collect();

    let seen = Arc::new(parking_lot::Mutex::new(Vec::with_capacity(200)));
    let recorder = Arc::clone(&seen);
    queue.start_worker(move |job: Job| {
        recorder.lock().push(job.id.clone());
        async { Ok(()) }
    });

    for id in &ids {
        queue.await_outcome(id, AWAIT, POLL).await.expect("outcome");
    }
    assert_eq!(*seen.lock(), ids);
    queue.stop_worker().await;
}

// ============================================================================
// Outcomes
// ============================================================================

#[tokio::test]
async fn test_outcome_retrievable_exactly_once() {
    let queue: QueueManager<String> = QueueManager::new(QueueConfig::new(5, 2));
    queue.start_worker(|job: Job| async move { Ok(job.owner) });
    queue.submit(job("once", 1.0)).expect("admitted");

    let id = JobId::new("once");
    let first = queue.await_outcome(&id, AWAIT, POLL).await;
    assert_eq!(
        first.ok().and_then(|o| o.result.ok()).as_deref(),
        Some("tester")
    );
    let second = queue
        .await_outcome(&id, Duration::from_millis(50), POLL)
        .await;
    assert!(matches!(
        second,
        Err(OrchestratorError::OutcomeTimeout { .. })
    ));
    queue.stop_worker().await;
}

#[tokio::test]
async fn test_failed_job_stores_error_and_loop_continues() {
    let queue: QueueManager<u8> = QueueManager::new(QueueConfig::new(5, 1));
    queue.start_worker(|job: Job| async move {
        if job.id.as_str() == "bad" {
            Err(OrchestratorError::Other("decoder crashed".into()))
        } else {
            Ok(1)
        }
    });
    queue.submit(job("bad", 1.0)).ok();
    queue.submit(job("good", 1.0)).ok();

    let bad = queue
        .await_outcome(&JobId::new("bad"), AWAIT, POLL)
        .await
        .expect("bad outcome");
    assert!(!bad.is_success());
    let good = queue
        .await_outcome(&JobId::new("good"), AWAIT, POLL)
        .await
        .expect("good outcome");
    assert!(good.is_success());
    queue.stop_worker().await;
}

#[tokio::test]
async fn test_timed_out_job_outcome_still_stored() {
    let queue: QueueManager<()> = QueueManager::new(QueueConfig::new(5, 1));
    queue.start_worker(|_job: Job| async {
        tokio::time::sleep(Duration::from_millis(80)).await;
        Ok(())
    });
    queue.submit(job("slow", 1.0)).ok();
    let id = JobId::new("slow");

    let early = queue
        .await_outcome(&id, Duration::from_millis(10), POLL)
        .await;
    assert!(matches!(early, Err(OrchestratorError::OutcomeTimeout { .. })));

    let late = queue.await_outcome(&id, AWAIT, POLL).await;
    assert!(late.is_ok());
    queue.stop_worker().await;
}

#[tokio::test]
async fn test_uncollected_outcomes_are_purged_by_sweeper() {
    let config = QueueConfig {
        outcome_ttl_s: 1,
        purge_interval_s: 1,
        ..QueueConfig::new(5, 1)
    };
    let queue: QueueManager<()> = QueueManager::new(config);
    queue.start_worker(|_job: Job| async { Ok(()) });
    queue.submit(job("forgotten", 1.0)).ok();

    wait_until(|| queue.outcomes_held() == 1).await;
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(queue.outcomes_held(), 0);
    assert!(queue.try_take_outcome(&JobId::new("forgotten")).is_none());
    queue.stop_worker().await;
}

// ============================================================================
// Worker lifecycle
// ============================================================================

#[tokio::test]
async fn test_restart_after_stop_processes_pending_jobs() {
    let queue: QueueManager<&'static str> = QueueManager::new(QueueConfig::new(5, 1));
    assert!(queue.start_worker(|_job: Job| async { Ok("first run") }));
    queue.stop_worker().await;
    assert!(!queue.is_running());

    queue.submit(job("pending", 1.0)).ok();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(queue.depth(), 1, "no worker, job stays queued");

    assert!(queue.start_worker(|_job: Job| async { Ok("second run") }));
    let outcome = queue
        .await_outcome(&JobId::new("pending"), AWAIT, POLL)
        .await
        .expect("outcome after restart");
    assert_eq!(outcome.result.ok(), Some("second run"));
    queue.stop_worker().await;
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_jobs() {
    let queue: QueueManager<()> = QueueManager::new(QueueConfig::new(5, 2));
    queue.start_worker(|_job: Job| async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        Ok(())
    });
    queue.submit(job("a", 1.0)).ok();
    queue.submit(job("b", 1.0)).ok();
    wait_until(|| queue.active_count() == 2).await;

    assert!(queue.shutdown(Duration::from_secs(2)).await);
    assert_eq!(queue.outcomes_held(), 2);
}

#[tokio::test]
async fn test_hook_receives_snapshot_per_started_job() {
    let queue: QueueManager<()> = QueueManager::new(QueueConfig::new(5, 1));
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    queue.set_queue_changed_hook(move |snapshot| sink.lock().push(snapshot));
    queue.start_worker(|_job: Job| async { Ok(()) });

    for id in ["h1", "h2", "h3"] {
        queue.submit(job(id, 1.0)).ok();
    }
    for id in ["h1", "h2", "h3"] {
        queue
            .await_outcome(&JobId::new(id), AWAIT, POLL)
            .await
            .expect("outcome");
    }

    let snapshots = seen.lock().clone();
    assert_eq!(snapshots.len(), 3);
    assert!(snapshots.iter().all(|s| s.active == 1 && s.concurrency == 1));
    queue.stop_worker().await;
}

// ============================================================================
// Wait estimation
// ============================================================================

#[tokio::test]
async fn test_estimate_wait_scenario_ten_twenty_five() {
    let queue: QueueManager<()> = QueueManager::new(QueueConfig::new(2, 1));
    let release = Arc::new(Notify::new());
    let gate = Arc::clone(&release);
    queue.start_worker(move |_job: Job| {
        let gate = Arc::clone(&gate);
        async move {
            gate.notified().await;
            Ok(())
        }
    });

    queue.submit(job("ten", 10.0)).ok();
    wait_until(|| queue.active_count() == 1).await;
    queue.submit(job("twenty", 20.0)).ok();
    queue.submit(job("five", 5.0)).ok();

    let estimate = queue.estimate_wait(&JobId::new("five"), 1.0);
    assert!((estimate.wait_secs - 30.0).abs() < 1e-9);
    assert!((estimate.processing_secs - 5.0).abs() < 1e-9);

    let doubled = queue.estimate_wait(&JobId::new("five"), 2.0);
    assert!((doubled.wait_secs - 60.0).abs() < 1e-9);
    assert!((doubled.processing_secs - 10.0).abs() < 1e-9);

    assert_eq!(queue.position(&JobId::new("five")), Some(3));
    queue.shutdown(Duration::from_millis(10)).await;
}

#[tokio::test]
async fn test_estimate_wait_divides_by_concurrency() {
    let queue: QueueManager<()> = QueueManager::new(QueueConfig::new(10, 4));
    for (id, d) in [("a", 40.0), ("b", 40.0), ("c", 7.0)] {
        queue.submit(job(id, d)).ok();
    }
    let estimate = queue.estimate_wait(&JobId::new("c"), 1.0);
    assert!((estimate.wait_secs - 20.0).abs() < 1e-9);
    assert!((estimate.processing_secs - 7.0).abs() < 1e-9);
}
