//! Single-flight coalescing tests.

use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use simmer::core::{
    BulkGetter, BulkSingleFlightGetter, CancelToken, CoreError, DoFn, ErrorSender, MapCache,
};
use simmer::Id;

mod support;
use support::TestClock;

/// Records dispatched key batches and completes them on demand, so tests
/// control exactly when callbacks fire.
#[derive(Default)]
struct ManualBulk {
    calls: Mutex<Vec<Vec<Id>>>,
    pending: Mutex<Vec<(Vec<Id>, DoFn<Id, u64>)>>,
}

impl ManualBulk {
    fn complete_all(&self, value_of: impl Fn(Id) -> u64) {
        let pending: Vec<_> = self.pending.lock().unwrap().drain(..).collect();
        for (keys, do_fn) in pending {
            for key in keys {
                do_fn(key, value_of(key));
            }
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl BulkGetter<Id, u64> for ManualBulk {
    fn get(
        &self,
        _token: &CancelToken,
        _err_tx: &ErrorSender,
        keys: Vec<Id>,
        do_fn: DoFn<Id, u64>,
    ) -> Vec<Id> {
        self.calls.lock().unwrap().push(keys.clone());
        self.pending.lock().unwrap().push((keys, do_fn));
        Vec::new()
    }
}

fn counting_callback(counter: &Arc<AtomicUsize>, expected: u64) -> DoFn<Id, u64> {
    let counter = Arc::clone(counter);
    Arc::new(move |_, value| {
        assert_eq!(value, expected);
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn coalesces_overlapping_gets_and_survives_a_panicking_peer() {
    let inner = Arc::new(ManualBulk::default());
    let getter =
        BulkSingleFlightGetter::new(Arc::clone(&inner), None, Arc::new(|_: &Id, _: &u64| true));

    let token = CancelToken::new();
    let (err_tx, err_rx) = bounded(3);

    let first = Arc::new(AtomicUsize::new(0));
    let third = Arc::new(AtomicUsize::new(0));

    let rejected = getter.get(&token, &err_tx, vec![42], counting_callback(&first, 420));
    assert!(rejected.is_empty());

    // While 42 is in flight, a panicking caller and another counter attach.
    let panicking: DoFn<Id, u64> = Arc::new(|_, _| panic!("boom"));
    let rejected = getter.get(&token, &err_tx, vec![42], panicking);
    assert!(rejected.is_empty());

    let rejected = getter.get(&token, &err_tx, vec![42], counting_callback(&third, 420));
    assert!(rejected.is_empty());

    inner.complete_all(|id| id * 10);

    assert_eq!(inner.call_count(), 1, "inner fetch must run once per overlap");
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(third.load(Ordering::SeqCst), 1);

    let err = err_rx.try_recv().expect("expected one panic report");
    assert!(matches!(
        err.downcast_ref::<CoreError>(),
        Some(CoreError::CallbackPanic(_))
    ));
    assert!(err_rx.try_recv().is_err(), "expected exactly one error");
}

#[test]
fn distinct_keys_dispatch_separately() {
    let inner = Arc::new(ManualBulk::default());
    let getter =
        BulkSingleFlightGetter::new(Arc::clone(&inner), None, Arc::new(|_: &Id, _: &u64| true));

    let token = CancelToken::new();
    let (err_tx, _err_rx) = bounded(1);

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let cb: DoFn<Id, u64> = Arc::new(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    getter.get(&token, &err_tx, vec![1, 2], Arc::clone(&cb));
    getter.get(&token, &err_tx, vec![2, 3], cb);

    inner.complete_all(|id| id);

    // 2 was coalesced: dispatched once, delivered twice.
    let calls = inner.calls.lock().unwrap().clone();
    assert_eq!(calls, vec![vec![1, 2], vec![3]]);
    assert_eq!(seen.load(Ordering::SeqCst), 4);
}

#[test]
fn writes_through_to_the_map_cache() {
    let inner = Arc::new(ManualBulk::default());
    let clock = TestClock::at_epoch();
    let cache = Arc::new(MapCache::new(clock, Duration::from_secs(60)));

    let getter = BulkSingleFlightGetter::new(
        Arc::clone(&inner),
        Some(cache),
        Arc::new(|_: &Id, value: &u64| *value != 0),
    );

    let token = CancelToken::new();
    let (err_tx, _err_rx) = bounded(1);

    let count = Arc::new(AtomicUsize::new(0));
    getter.get(&token, &err_tx, vec![7], counting_callback(&count, 70));
    inner.complete_all(|id| id * 10);
    assert_eq!(count.load(Ordering::SeqCst), 1);

    // Served from cache: no new dispatch, callback runs synchronously.
    getter.get(&token, &err_tx, vec![7], counting_callback(&count, 70));
    assert_eq!(inner.call_count(), 1);
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
fn should_cache_false_suppresses_the_write_through() {
    let inner = Arc::new(ManualBulk::default());
    let clock = TestClock::at_epoch();
    let cache = Arc::new(MapCache::new(clock, Duration::from_secs(60)));

    let getter = BulkSingleFlightGetter::new(
        Arc::clone(&inner),
        Some(cache),
        Arc::new(|_: &Id, value: &u64| *value != 0),
    );

    let token = CancelToken::new();
    let (err_tx, _err_rx) = bounded(1);

    let cb: DoFn<Id, u64> = Arc::new(|_, value| assert_eq!(value, 0));
    getter.get(&token, &err_tx, vec![9], Arc::clone(&cb));
    inner.complete_all(|_| 0);

    // The zero sentinel was not cached, so the key dispatches again.
    getter.get(&token, &err_tx, vec![9], cb);
    assert_eq!(inner.call_count(), 2);
}
