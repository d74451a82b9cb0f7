//! Bulk retrieval contract and the worker-pool-backed implementation.

use anyhow::Result;
use std::fmt::Display;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::cancel::CancelToken;
use super::error::{panic_message, CoreError};
use super::fetch::Getter;
use super::worker_pool::{do_work, WorkerPool};
use super::ErrorSender;

/// In-band per-key error. `Arc` so one failure can be shared with every
/// coalesced callback for the key.
pub type SharedError = Arc<anyhow::Error>;

/// Per-result callback. Invoked from worker threads; keep it non-blocking.
pub type DoFn<K, V> = Arc<dyn Fn(K, V) + Send + Sync>;

/// Asynchronous bulk retrieval.
///
/// 1. `get` returns promptly, often but not necessarily before `do_fn` has
///    run for any key.
/// 2. Keys the underlying system cannot accept are returned.
/// 3. `do_fn` runs exactly once per accepted key; duplicates get duplicate
///    calls.
/// 4. A `do_fn` panic is reported with a non-blocking send on `err_tx`,
///    never propagated.
pub trait BulkGetter<K, V>: Send + Sync {
    fn get(
        &self,
        token: &CancelToken,
        err_tx: &ErrorSender,
        keys: Vec<K>,
        do_fn: DoFn<K, V>,
    ) -> Vec<K>;
}

impl<K, V, G: BulkGetter<K, V> + ?Sized> BulkGetter<K, V> for Arc<G> {
    fn get(
        &self,
        token: &CancelToken,
        err_tx: &ErrorSender,
        keys: Vec<K>,
        do_fn: DoFn<K, V>,
    ) -> Vec<K> {
        (**self).get(token, err_tx, keys, do_fn)
    }
}

/// Fans keys across a worker pool, one fetch per key. Fetch errors and
/// fetch panics flow in-band as `Err` values so exactly-once delivery and
/// backpressure apply to them too.
pub struct BulkWorkerPoolGetter<K, V, G> {
    pool: Arc<WorkerPool>,
    getter: Arc<G>,
    _marker: PhantomData<fn(K) -> V>,
}

impl<K, V, G> BulkWorkerPoolGetter<K, V, G> {
    pub fn new(pool: Arc<WorkerPool>, getter: Arc<G>) -> Self {
        Self {
            pool,
            getter,
            _marker: PhantomData,
        }
    }
}

impl<K, V, G> BulkGetter<K, Result<V, SharedError>> for BulkWorkerPoolGetter<K, V, G>
where
    K: Clone + Display + Send + Sync + 'static,
    V: 'static,
    G: Getter<K, V> + 'static,
{
    fn get(
        &self,
        token: &CancelToken,
        err_tx: &ErrorSender,
        keys: Vec<K>,
        do_fn: DoFn<K, Result<V, SharedError>>,
    ) -> Vec<K> {
        let getter = Arc::clone(&self.getter);

        do_work(token, &self.pool, err_tx, keys, move |token, key: K| {
            let result = safe_run_getter(&*getter, token, key.clone());
            do_fn(key, result.map_err(Arc::new));
        })
    }
}

fn safe_run_getter<K, V, G>(getter: &G, token: &CancelToken, key: K) -> Result<V>
where
    K: Display + Clone,
    G: Getter<K, V>,
{
    let label = key.clone();
    match panic::catch_unwind(AssertUnwindSafe(|| getter.get(token, key))) {
        Ok(result) => result.map_err(|e| e.context(format!("{label}: getter failed"))),
        Err(payload) => Err(CoreError::GetterPanic(panic_message(payload)).into()),
    }
}

/// Maps the value type of an inner bulk getter.
pub struct BulkTransformGetter<G, F, VI> {
    inner: G,
    transform: Arc<F>,
    _marker: PhantomData<fn(VI)>,
}

impl<G, F, VI> BulkTransformGetter<G, F, VI> {
    pub fn new(inner: G, transform: F) -> Self {
        Self {
            inner,
            transform: Arc::new(transform),
            _marker: PhantomData,
        }
    }
}

impl<K, VI, VO, G, F> BulkGetter<K, VO> for BulkTransformGetter<G, F, VI>
where
    K: Clone + Send + Sync + 'static,
    VI: 'static,
    VO: 'static,
    G: BulkGetter<K, VI>,
    F: Fn(&K, VI) -> VO + Send + Sync + 'static,
{
    fn get(
        &self,
        token: &CancelToken,
        err_tx: &ErrorSender,
        keys: Vec<K>,
        do_fn: DoFn<K, VO>,
    ) -> Vec<K> {
        let transform = Arc::clone(&self.transform);
        let wrapped: DoFn<K, VI> = Arc::new(move |key: K, value: VI| {
            let out = transform(&key, value);
            do_fn(key, out);
        });

        self.inner.get(token, err_tx, keys, wrapped)
    }
}
