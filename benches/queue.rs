//! Queue benchmarks: orchestration overhead with zero-cost jobs.
//!
//! Measures admission (`submit`) under the ledger lock and full
//! submit → execute → collect round trips through the dispatch loop.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio_transcription_orchestrator::{Job, QueueConfig, QueueManager, RoutingContext};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_job(i: u64) -> Job {
    Job::new(
        format!("bench-{i}"),
        format!("audio/{i}.ogg"),
        RoutingContext::new((i % 120) as f64),
    )
}

// ---------------------------------------------------------------------------
// Bench: submit only, worker stopped
// ---------------------------------------------------------------------------

fn bench_submit(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_submit");
    for count in [100u64, 1000] {
        group.bench_with_input(BenchmarkId::new("jobs", count), &count, |b, &count| {
            b.iter(|| {
                let queue: QueueManager<()> =
                    QueueManager::new(QueueConfig::new(count as usize, 4));
                for i in 0..count {
                    let _ = black_box(queue.submit(make_job(i)));
                }
            })
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Bench: estimate_wait against a deep ledger
// ---------------------------------------------------------------------------

fn bench_estimate_wait(c: &mut Criterion) {
    let queue: QueueManager<()> = QueueManager::new(QueueConfig::new(1000, 4));
    let mut last = None;
    for i in 0..1000 {
        let job = make_job(i);
        last = Some(job.id.clone());
        let _ = queue.submit(job);
    }
    let Some(last) = last else { return };

    c.bench_function("queue_estimate_wait_tail_of_1000", |b| {
        b.iter(|| black_box(queue.estimate_wait(black_box(&last), 1.0)))
    });
}

// ---------------------------------------------------------------------------
// Bench: submit → execute → await round trip
// ---------------------------------------------------------------------------

fn bench_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("queue_round_trip");
    group.sample_size(20);

    for concurrency in [1usize, 4, 16] {
        group.bench_with_input(
            BenchmarkId::new("concurrency", concurrency),
            &concurrency,
            |b, &concurrency| {
                b.to_async(&rt).iter(|| async move {
                    let queue: QueueManager<u64> =
                        QueueManager::new(QueueConfig::new(256, concurrency));
                    queue.start_worker(|job: Job| async move {
                        Ok(job.input.len() as u64)
                    });
                    let ids: Vec<_> = (0..100)
                        .map(|i| {
                            let job = make_job(i);
                            let id = job.id.clone();
                            let _ = queue.submit(job);
                            id
                        })
                        .collect();
                    for id in &ids {
                        let outcome = queue
                            .await_outcome(id, Duration::from_secs(5), Duration::from_micros(200))
                            .await;
                        let _ = black_box(outcome);
                    }
                    queue.stop_worker().await;
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_submit, bench_estimate_wait, bench_round_trip);
criterion_main!(benches);
