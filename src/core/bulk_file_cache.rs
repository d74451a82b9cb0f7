//! Applies an [`ItemFileCache`] to an inner bulk getter.
//!
//! Cache hits are delivered synchronously. Miss responses are read into a
//! pooled buffer and teed: one copy continues to the caller, the other is
//! queued on a bounded channel drained by a writer thread that batches
//! puts. A full put channel skips the write (best effort) and notifies an
//! advisory sink; the response itself is always delivered.

use crossbeam_channel::{bounded, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::Result;

use super::bulk::{BulkGetter, DoFn, SharedError};
use super::cancel::CancelToken;
use super::fetch::ByteReader;
use super::file_cache::ItemFileCache;
use super::util::{greedy_recv, try_send, BufPool, PooledBuf};
use super::ErrorSender;
use crate::Id;

/// How many put batches the channel buffers ahead of the writer.
const PUT_CHANNEL_BATCH_DEPTH: usize = 10;

pub struct BulkFileCacheGetter<G> {
    inner: G,
    cache: Arc<ItemFileCache>,
    pool: Arc<BufPool>,
    put_tx: Mutex<Option<Sender<PooledBuf>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    on_put_channel_full: Arc<dyn Fn() + Send + Sync>,
}

impl<G> BulkFileCacheGetter<G> {
    pub fn new(
        token: &CancelToken,
        inner: G,
        cache: Arc<ItemFileCache>,
        put_batch_size: usize,
        on_put_channel_full: Arc<dyn Fn() + Send + Sync>,
        on_put_error: Arc<dyn Fn(anyhow::Error) + Send + Sync>,
    ) -> Self {
        let capacity = put_batch_size * PUT_CHANNEL_BATCH_DEPTH;
        let (put_tx, put_rx) = bounded::<PooledBuf>(capacity);

        let writer = {
            let cache = Arc::clone(&cache);
            let token = token.clone();
            thread::spawn(move || {
                while let Some(batch) = greedy_recv(&put_rx, put_batch_size) {
                    let blobs: Vec<&[u8]> = batch.iter().map(PooledBuf::as_slice).collect();
                    if let Err(e) = cache.put(&token, &blobs) {
                        on_put_error(e);
                    }
                    // Dropping the batch returns every buffer to the pool.
                }
            })
        };

        Self {
            inner,
            cache,
            pool: BufPool::new(capacity),
            put_tx: Mutex::new(Some(put_tx)),
            writer: Mutex::new(Some(writer)),
            on_put_channel_full,
        }
    }

    /// Close the put channel, wait for the writer to drain, then close the
    /// underlying cache. Idempotent.
    pub fn close(&self) -> Result<()> {
        drop(self.put_tx.lock().unwrap().take());
        if let Some(writer) = self.writer.lock().unwrap().take() {
            let _ = writer.join();
        }
        self.cache.close()
    }
}

impl<G> BulkGetter<Id, Result<ByteReader, SharedError>> for BulkFileCacheGetter<G>
where
    G: BulkGetter<Id, Result<ByteReader, SharedError>>,
{
    fn get(
        &self,
        token: &CancelToken,
        err_tx: &ErrorSender,
        keys: Vec<Id>,
        do_fn: DoFn<Id, Result<ByteReader, SharedError>>,
    ) -> Vec<Id> {
        let pool = Arc::clone(&self.pool);

        let remaining = match self.cache.get(token, &keys, |id, blob| {
            let mut buf = pool.acquire();
            buf.extend_from_slice(blob);
            do_fn(id, Ok(Box::new(buf)));
        }) {
            Ok(remaining) => remaining,
            Err(e) => {
                // Report and fall through so do_fn still runs for every key.
                let _ = err_tx.try_send(e);
                keys
            }
        };

        if remaining.is_empty() {
            return remaining;
        }

        let put_tx = self.put_tx.lock().unwrap().clone();
        let on_full = Arc::clone(&self.on_put_channel_full);
        let pool = Arc::clone(&self.pool);

        let wrapped: DoFn<Id, Result<ByteReader, SharedError>> =
            Arc::new(move |id, value: Result<ByteReader, SharedError>| {
                let mut reader = match value {
                    Ok(reader) => reader,
                    Err(e) => {
                        do_fn(id, Err(e));
                        return;
                    }
                };

                let mut keep = pool.acquire();
                if let Err(e) = keep.read_from(&mut reader) {
                    do_fn(id, Err(Arc::new(e.into())));
                    return;
                }

                let mut forward = pool.acquire();
                forward.extend_from_slice(keep.as_slice());

                match &put_tx {
                    Some(put_tx) => {
                        if !try_send(put_tx, keep) {
                            on_full();
                        }
                    }
                    None => drop(keep),
                }

                do_fn(id, Ok(Box::new(forward)));
            });

        self.inner.get(token, err_tx, remaining, wrapped)
    }
}
