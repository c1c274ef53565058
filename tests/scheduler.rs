//! Job scheduler and batch work tests.

mod common;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::time::Duration;
use stratus::core::config::SchedulerConfig;
use stratus::core::error::CoreError;
use stratus::entity::cache::FailoverUnitCache;
use stratus::scheduler::executor::{Executor, InlineExecutor, PoolExecutor};
use stratus::scheduler::multi::MultiUnitWork;
use stratus::scheduler::JobScheduler;

fn small_scheduler() -> JobScheduler {
    JobScheduler::new(&SchedulerConfig {
        entity_workers: Some(4),
        message_workers: Some(2),
        callback_workers: 1,
        max_entity_queue_depth: 10_000,
        max_message_queue_depth: 100,
    })
}

// ============================================================================
// Executor tests
// ============================================================================

#[test]
fn inline_executor_runs_on_caller() {
    let ran = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&ran);
    InlineExecutor.execute(Box::new(move || {
        flag.fetch_add(1, Ordering::SeqCst);
    }));
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn pool_executor_runs_jobs() {
    let pool = PoolExecutor::new("test", 2, 100);
    let (tx, rx) = mpsc::channel();
    for i in 0..10 {
        let tx = tx.clone();
        pool.try_execute(Box::new(move || tx.send(i).unwrap())).unwrap();
    }
    let mut seen: Vec<i32> = (0..10)
        .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..10).collect::<Vec<_>>());
    assert_eq!(pool.close(), 0);
}

#[test]
fn pool_executor_rejects_when_full() {
    let pool = PoolExecutor::new("test", 1, 2);
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel();

    pool.try_execute(Box::new(move || {
        started_tx.send(()).unwrap();
        gate_rx.recv().unwrap();
    }))
    .unwrap();
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    // Worker busy; fill the queue to its bound.
    pool.try_execute(Box::new(|| {})).unwrap();
    pool.try_execute(Box::new(|| {})).unwrap();
    let error = pool.try_execute(Box::new(|| {})).unwrap_err();
    assert!(matches!(error, CoreError::QueueFull { queue: "test", .. }));
    assert!(error.is_retriable());

    gate_tx.send(()).unwrap();
    pool.close();
}

#[test]
fn pool_executor_rejects_after_close() {
    let pool = PoolExecutor::new("test", 1, 10);
    pool.close();
    let error = pool.try_execute(Box::new(|| {})).unwrap_err();
    assert!(matches!(error, CoreError::SchedulerClosed { queue: "test" }));
}

// ============================================================================
// Per-unit ordering
// ============================================================================

#[test]
fn jobs_for_one_unit_run_in_submission_order() {
    let scheduler = small_scheduler();
    let order = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = mpsc::channel();

    for seq in 0..100u32 {
        let order = Arc::clone(&order);
        let tx = tx.clone();
        scheduler
            .schedule(
                common::unit_id(1),
                Box::new(move || {
                    order.lock().push(seq);
                    tx.send(()).unwrap();
                }),
            )
            .unwrap();
    }
    for _ in 0..100 {
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    let seen = order.lock().clone();
    assert_eq!(seen, (0..100).collect::<Vec<_>>());
    scheduler.close();
}

#[test]
fn distinct_units_run_concurrently() {
    let scheduler = small_scheduler();
    let barrier = Arc::new(Barrier::new(2));
    let (tx, rx) = mpsc::channel();

    for raw in [1u128, 2] {
        let barrier = Arc::clone(&barrier);
        let tx = tx.clone();
        scheduler
            .schedule(
                common::unit_id(raw),
                Box::new(move || {
                    // Completes only if the job for the other unit is running
                    // at the same time.
                    barrier.wait();
                    tx.send(raw).unwrap();
                }),
            )
            .unwrap();
    }

    let mut done = vec![
        rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        rx.recv_timeout(Duration::from_secs(5)).unwrap(),
    ];
    done.sort_unstable();
    assert_eq!(done, vec![1, 2]);
    scheduler.close();
}

#[test]
fn interleaved_units_each_keep_order() {
    let scheduler = small_scheduler();
    let orders: Vec<Arc<Mutex<Vec<u32>>>> =
        (0..4).map(|_| Arc::new(Mutex::new(Vec::new()))).collect();
    let (tx, rx) = mpsc::channel();

    for seq in 0..50u32 {
        for (raw, order) in orders.iter().enumerate() {
            let order = Arc::clone(order);
            let tx = tx.clone();
            scheduler
                .schedule(
                    common::unit_id(raw as u128),
                    Box::new(move || {
                        order.lock().push(seq);
                        tx.send(()).unwrap();
                    }),
                )
                .unwrap();
        }
    }
    for _ in 0..200 {
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    for order in &orders {
        assert_eq!(*order.lock(), (0..50).collect::<Vec<_>>());
    }
    scheduler.close();
}

#[test]
fn second_job_observes_first_commit() {
    let scheduler = small_scheduler();
    let cache = Arc::new(FailoverUnitCache::new());
    cache.insert(common::empty_unit(1));
    let (tx, rx) = mpsc::channel();

    let cache1 = Arc::clone(&cache);
    scheduler
        .schedule(
            common::unit_id(1),
            Box::new(move || {
                let checkout = cache1.checkout(common::unit_id(1)).unwrap();
                let mut update = checkout.enable_update(false);
                update.current_mut().target_replica_count = 7;
                std::thread::sleep(Duration::from_millis(20));
                update.submit();
            }),
        )
        .unwrap();

    let cache2 = Arc::clone(&cache);
    scheduler
        .schedule(
            common::unit_id(1),
            Box::new(move || {
                let checkout = cache2.checkout(common::unit_id(1)).unwrap();
                tx.send((
                    checkout.current().version,
                    checkout.current().target_replica_count,
                ))
                .unwrap();
            }),
        )
        .unwrap();

    let (version, target) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(version, 1);
    assert_eq!(target, 7);
    scheduler.close();
}

// ============================================================================
// Bounds and close
// ============================================================================

#[test]
fn entity_queue_rejects_when_full() {
    let scheduler = JobScheduler::new(&SchedulerConfig {
        entity_workers: Some(1),
        message_workers: Some(1),
        callback_workers: 1,
        max_entity_queue_depth: 2,
        max_message_queue_depth: 10,
    });
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel();

    scheduler
        .schedule(
            common::unit_id(1),
            Box::new(move || {
                started_tx.send(()).unwrap();
                gate_rx.recv().unwrap();
            }),
        )
        .unwrap();
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    scheduler.schedule(common::unit_id(1), Box::new(|| {})).unwrap();
    scheduler.schedule(common::unit_id(2), Box::new(|| {})).unwrap();
    let error = scheduler
        .schedule(common::unit_id(3), Box::new(|| {}))
        .unwrap_err();
    assert!(matches!(error, CoreError::QueueFull { queue: "entity", .. }));

    gate_tx.send(()).unwrap();
    scheduler.close();
}

#[test]
fn close_discards_queued_jobs() {
    let scheduler = JobScheduler::new(&SchedulerConfig {
        entity_workers: Some(1),
        message_workers: Some(1),
        callback_workers: 1,
        max_entity_queue_depth: 100,
        max_message_queue_depth: 100,
    });
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel();

    scheduler
        .schedule(
            common::unit_id(1),
            Box::new(move || {
                started_tx.send(()).unwrap();
                gate_rx.recv().unwrap();
            }),
        )
        .unwrap();
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    // Queued behind the single busy worker; these never run.
    for _ in 0..3 {
        scheduler.schedule(common::unit_id(1), Box::new(|| {})).unwrap();
    }
    assert_eq!(scheduler.pending(), 3);

    // Unblock the in-flight job once close is underway.
    let releaser = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        gate_tx.send(()).unwrap();
    });
    let discarded = scheduler.close();
    assert_eq!(discarded, 3);
    releaser.join().unwrap();

    let error = scheduler
        .schedule(common::unit_id(1), Box::new(|| {}))
        .unwrap_err();
    assert!(matches!(error, CoreError::SchedulerClosed { .. }));
}

// ============================================================================
// Multi-unit work
// ============================================================================

fn batch_completes_once(item_count: usize) {
    let scheduler = small_scheduler();
    let fired = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();

    let items = (0..item_count)
        .map(|i| {
            let job: Box<dyn FnOnce() + Send> = Box::new(|| {});
            (common::unit_id((i % 17) as u128), job)
        })
        .collect();

    let fired_cb = Arc::clone(&fired);
    let work = MultiUnitWork::begin(
        &scheduler,
        items,
        Some(Box::new(move || {
            fired_cb.fetch_add(1, Ordering::SeqCst);
            tx.send(()).unwrap();
        })),
        scheduler.callback_executor(),
    )
    .unwrap();

    rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(work.remaining(), 0);
    // No second firing, however long we wait.
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    scheduler.close();
}

#[test]
fn batch_of_one_completes_once() {
    batch_completes_once(1);
}

#[test]
fn batch_of_ten_completes_once() {
    batch_completes_once(10);
}

#[test]
fn batch_of_thousand_completes_once() {
    batch_completes_once(1000);
}

#[test]
fn empty_batch_without_callback() {
    let scheduler = small_scheduler();
    let work = MultiUnitWork::begin(&scheduler, Vec::new(), None, scheduler.callback_executor())
        .unwrap();
    assert_eq!(work.remaining(), 0);
    scheduler.close();
}

#[test]
fn truncated_batch_still_completes_once() {
    let scheduler = JobScheduler::new(&SchedulerConfig {
        entity_workers: Some(1),
        message_workers: Some(1),
        callback_workers: 1,
        max_entity_queue_depth: 1,
        max_message_queue_depth: 10,
    });
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel();

    // Occupy the worker and the whole queue.
    scheduler
        .schedule(
            common::unit_id(9),
            Box::new(move || {
                started_tx.send(()).unwrap();
                gate_rx.recv().unwrap();
            }),
        )
        .unwrap();
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    scheduler.schedule(common::unit_id(9), Box::new(|| {})).unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let fired_cb = Arc::clone(&fired);
    let items: Vec<_> = (0..4)
        .map(|i| {
            let job: Box<dyn FnOnce() + Send> = Box::new(|| {});
            (common::unit_id(i as u128), job)
        })
        .collect();

    let result = MultiUnitWork::begin(
        &scheduler,
        items,
        Some(Box::new(move || {
            fired_cb.fetch_add(1, Ordering::SeqCst);
        })),
        Arc::new(InlineExecutor),
    );

    // Nothing could be scheduled, so every item was counted complete and the
    // callback fired inline, exactly once, before the error returned.
    let error = result.unwrap_err();
    assert!(matches!(error, CoreError::QueueFull { .. }));
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    gate_tx.send(()).unwrap();
    scheduler.close();
}

#[test]
fn batch_callback_runs_off_the_entity_worker() {
    let scheduler = small_scheduler();
    let (tx, rx) = mpsc::channel();

    let job: Box<dyn FnOnce() + Send> = Box::new(|| {});
    MultiUnitWork::begin(
        &scheduler,
        vec![(common::unit_id(1), job)],
        Some(Box::new(move || {
            tx.send(std::thread::current().name().map(str::to_owned))
                .unwrap();
        })),
        scheduler.callback_executor(),
    )
    .unwrap();

    let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(name.as_deref(), Some("callback-0"));
    scheduler.close();
}
