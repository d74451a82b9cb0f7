//! Coalesces concurrent bulk fetches for the same key.
//!
//! While a key is in flight, later callers register their callback against
//! the pending entry instead of dispatching a second upstream fetch; every
//! registered callback observes the one shared value. Optionally writes
//! successful values through to a [`MapCache`], gated by `should_cache`
//! (used to keep "not found" sentinels and errors out of the cache).

use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use super::bulk::{BulkGetter, DoFn};
use super::cancel::CancelToken;
use super::error::{panic_message, CoreError};
use super::map_cache::MapCache;
use super::ErrorSender;

type Pending<K, V> = Arc<Mutex<HashMap<K, Vec<DoFn<K, V>>>>>;

pub struct BulkSingleFlightGetter<K, V, G> {
    inner: G,
    cache: Option<Arc<MapCache<K, V>>>,
    should_cache: Arc<dyn Fn(&K, &V) -> bool + Send + Sync>,
    pending: Pending<K, V>,
}

impl<K, V, G> BulkSingleFlightGetter<K, V, G>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    G: BulkGetter<K, V>,
{
    pub fn new(
        inner: G,
        cache: Option<Arc<MapCache<K, V>>>,
        should_cache: Arc<dyn Fn(&K, &V) -> bool + Send + Sync>,
    ) -> Self {
        Self {
            inner,
            cache,
            should_cache,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register `do_fn` for each key; returns the keys with no fetch in
    /// flight yet, which the caller must dispatch.
    fn add_pending(&self, keys: Vec<K>, do_fn: &DoFn<K, V>) -> Vec<K> {
        let mut dispatch = Vec::with_capacity(keys.len());
        let mut pending = self.pending.lock().unwrap();

        for key in keys {
            match pending.get_mut(&key) {
                Some(callbacks) => callbacks.push(Arc::clone(do_fn)),
                None => {
                    pending.insert(key.clone(), vec![Arc::clone(do_fn)]);
                    dispatch.push(key);
                }
            }
        }

        dispatch
    }
}

impl<K, V, G> BulkGetter<K, V> for BulkSingleFlightGetter<K, V, G>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    G: BulkGetter<K, V>,
{
    fn get(
        &self,
        token: &CancelToken,
        err_tx: &ErrorSender,
        keys: Vec<K>,
        do_fn: DoFn<K, V>,
    ) -> Vec<K> {
        let remaining = match &self.cache {
            Some(cache) => {
                let (found, remaining) = cache.get(&keys);
                for (key, value) in found {
                    do_fn(key, value);
                }
                remaining
            }
            None => keys,
        };

        if remaining.is_empty() {
            return remaining;
        }

        let dispatch = self.add_pending(remaining, &do_fn);
        if dispatch.is_empty() {
            return dispatch;
        }

        let cache = self.cache.clone();
        let should_cache = Arc::clone(&self.should_cache);
        let pending = Arc::clone(&self.pending);
        let panic_tx = err_tx.clone();

        let wrapped: DoFn<K, V> = Arc::new(move |key: K, value: V| {
            if let Some(cache) = &cache {
                if should_cache(&key, &value) {
                    cache.put(key.clone(), value.clone());
                }
            }

            let callbacks = pending.lock().unwrap().remove(&key).unwrap_or_default();

            // One callback's panic must not drop its peers.
            for callback in callbacks {
                let key = key.clone();
                let value = value.clone();
                if let Err(payload) =
                    panic::catch_unwind(AssertUnwindSafe(move || callback(key, value)))
                {
                    let _ =
                        panic_tx.try_send(CoreError::CallbackPanic(panic_message(payload)).into());
                }
            }
        });

        self.inner.get(token, err_tx, dispatch, wrapped)
    }
}
