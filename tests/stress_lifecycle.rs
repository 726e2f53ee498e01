//! Lifecycle and concurrency coverage for the pools and probes.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use stresslab::{LeakPool, LoadPool, ProbeKind, ProbeSet, ProbeSettings, ProbeUpdate};

#[tokio::test]
async fn load_workers_drain_completely() {
    let pool = LoadPool::new();
    for count in [1usize, 4, 16] {
        pool.start(count, Duration::from_millis(1));
        assert_eq!(pool.active_workers(), count);
        pool.stop_all().await;
        assert_eq!(pool.active_workers(), 0);
    }
}

#[tokio::test]
async fn concurrent_grows_are_all_accounted_for() {
    let pool = Arc::new(LeakPool::new());

    let tasks = (0..8).map(|_| {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            for _ in 0..10 {
                pool.grow(1024);
            }
        })
    });
    for result in join_all(tasks).await {
        result.unwrap();
    }

    assert_eq!(pool.outstanding(), 8 * 10 * 1024);

    let outcome = pool.shrink(8 * 10 * 1024);
    assert_eq!(outcome.shortfall, 0);
    assert_eq!(pool.outstanding(), 0);
}

#[tokio::test]
async fn unpaced_leak_worker_is_stopped_by_reset() {
    let pool = Arc::new(LeakPool::new());
    pool.leak(4096, Duration::ZERO);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(pool.outstanding() > 0);

    let snapshot = pool.reset_all().await;
    assert_eq!(snapshot.outstanding, 0);
    assert_eq!(pool.active_workers(), 0);
}

#[tokio::test]
async fn concurrent_evaluations_consume_the_counter_exactly() {
    let probes = Arc::new(ProbeSet::default());
    probes
        .probe(ProbeKind::Readiness)
        .configure(ProbeUpdate {
            fail_count: Some(20),
            ..ProbeUpdate::default()
        })
        .unwrap();

    let tasks = (0..60).map(|_| {
        let probes = Arc::clone(&probes);
        tokio::spawn(async move { probes.probe(ProbeKind::Readiness).evaluate().await })
    });

    let mut failures = 0;
    let mut passes = 0;
    for result in join_all(tasks).await {
        if result.unwrap().is_failure() {
            failures += 1;
        } else {
            passes += 1;
        }
    }

    assert_eq!(failures, 20);
    assert_eq!(passes, 40);
    // the counter is drained, later evaluations pass
    assert!(!probes
        .probe(ProbeKind::Readiness)
        .evaluate()
        .await
        .is_failure());
}

#[tokio::test]
async fn components_do_not_interfere() {
    let cpu = LoadPool::new();
    let ram = Arc::new(LeakPool::new());
    let probes = ProbeSet::new(
        ProbeSettings::default(),
        ProbeSettings {
            fail: true,
            ..ProbeSettings::default()
        },
        ProbeSettings::default(),
    );

    cpu.start(2, Duration::from_millis(1));
    ram.grow(2048);

    assert!(probes.probe(ProbeKind::Liveness).evaluate().await.is_failure());
    assert!(!probes.probe(ProbeKind::Startup).evaluate().await.is_failure());

    cpu.stop_all().await;
    let snapshot = ram.reset_all().await;
    assert_eq!(cpu.active_workers(), 0);
    assert_eq!(snapshot.outstanding, 0);
}
