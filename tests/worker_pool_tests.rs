//! Worker pool tests: exactly-once accounting, refusal, panic reporting,
//! close-waits-for-work.

use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use simmer::core::{do_work, CancelToken, CoreError, WorkerPool};

#[test]
fn every_accepted_item_runs_exactly_once() {
    let pool = WorkerPool::new(4, 64);
    let token = CancelToken::new();
    let (err_tx, err_rx) = bounded(16);

    let count = Arc::new(AtomicUsize::new(0));
    let works: Vec<u64> = (0..50).collect();

    let counter = Arc::clone(&count);
    let rejected = do_work(&token, &pool, &err_tx, works, move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(rejected.is_empty());
    pool.close();

    assert_eq!(count.load(Ordering::SeqCst), 50);
    assert!(err_rx.try_recv().is_err(), "no errors expected");
}

#[test]
fn full_queue_returns_the_unaccepted_tail() {
    // One worker, queue of two. A gate holds the worker on its first task
    // while two more fill the queue, so the next do_work refuses everything.
    let pool = WorkerPool::new(1, 2);
    let token = CancelToken::new();
    let (err_tx, _err_rx) = bounded(16);

    let (gate_tx, gate_rx) = bounded::<()>(0);
    let (running_tx, running_rx) = bounded::<()>(1);

    let rejected = do_work(&token, &pool, &err_tx, vec![0u64], move |_, _| {
        let _ = running_tx.send(());
        let _ = gate_rx.recv();
    });
    assert!(rejected.is_empty());

    // Wait until the worker holds the gated task, then fill the queue.
    running_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("first task should start");

    let rejected = do_work(&token, &pool, &err_tx, vec![1u64, 2], |_, _| {});
    assert!(rejected.is_empty());

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let rejected = do_work(&token, &pool, &err_tx, vec![10u64, 11, 12], move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(rejected, vec![10, 11, 12]);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    drop(gate_tx);
    pool.close();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn close_waits_for_accepted_work() {
    let pool = WorkerPool::new(2, 32);
    let token = CancelToken::new();
    let (err_tx, _err_rx) = bounded(16);

    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);

    let rejected = do_work(&token, &pool, &err_tx, (0..20u64).collect(), move |_, _| {
        std::thread::sleep(Duration::from_millis(5));
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert!(rejected.is_empty());

    pool.close();
    assert_eq!(count.load(Ordering::SeqCst), 20, "close dropped accepted work");
}

#[test]
fn panicking_work_reports_on_error_channel() {
    let pool = WorkerPool::new(1, 8);
    let token = CancelToken::new();
    let (err_tx, err_rx) = bounded(8);

    let rejected = do_work(&token, &pool, &err_tx, vec![1u64], |_, _| {
        panic!("boom");
    });
    assert!(rejected.is_empty());

    pool.close();

    let err = err_rx.try_recv().expect("expected one error");
    assert!(
        matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::CallbackPanic(_))
        ),
        "unexpected error: {err:#}"
    );
    assert!(err_rx.try_recv().is_err(), "expected exactly one error");
}
