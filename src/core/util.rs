//! Channel helpers and pooled buffers shared across the pipeline.

use crossbeam_channel::{Receiver, Sender};
use std::io::{self, Read};
use std::sync::{Arc, Condvar, Mutex};

/// Non-blocking send. Returns false when the channel is full or disconnected.
pub fn try_send<T>(tx: &Sender<T>, v: T) -> bool {
    tx.try_send(v).is_ok()
}

/// Send items from the front of `items` without blocking; stop at the first refusal.
/// Returns how many were accepted.
pub fn try_send_from<T: Clone>(tx: &Sender<T>, items: &[T]) -> usize {
    for (n, item) in items.iter().enumerate() {
        if tx.try_send(item.clone()).is_err() {
            return n;
        }
    }
    items.len()
}

/// One blocking read, then non-blocking reads up to `max` items (0 = no cap).
/// Returns None when the channel is closed and empty.
pub fn greedy_recv<T>(rx: &Receiver<T>, max: usize) -> Option<Vec<T>> {
    let first = rx.recv().ok()?;
    let mut batch = vec![first];
    while max == 0 || batch.len() < max {
        match rx.try_recv() {
            Ok(v) => batch.push(v),
            Err(_) => break,
        }
    }
    Some(batch)
}

/// Counter of in-flight work: add before dispatch, done from the callback,
/// wait blocks until the count returns to zero.
#[derive(Clone, Default)]
pub struct WaitGroup {
    inner: Arc<(Mutex<usize>, Condvar)>,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: usize) {
        let (count, _) = &*self.inner;
        *count.lock().unwrap() += n;
    }

    pub fn done(&self) {
        let (count, cvar) = &*self.inner;
        let mut count = count.lock().unwrap();
        *count -= 1;
        if *count == 0 {
            cvar.notify_all();
        }
    }

    pub fn wait(&self) {
        let (count, cvar) = &*self.inner;
        let mut count = count.lock().unwrap();
        while *count > 0 {
            count = cvar.wait(count).unwrap();
        }
    }
}

/// Lock-free cache of reusable byte buffers. Buffers come back on
/// [`PooledBuf`] drop; when the pool is at capacity the buffer is freed
/// instead.
pub struct BufPool {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl BufPool {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Arc::new(Self { tx, rx })
    }

    /// Take a cleared buffer from the pool, or allocate a fresh one.
    pub fn acquire(self: &Arc<Self>) -> PooledBuf {
        let buf = self.rx.try_recv().unwrap_or_default();
        PooledBuf {
            pool: Arc::clone(self),
            buf: Some(buf),
            pos: 0,
        }
    }

    fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        let _ = self.tx.try_send(buf);
    }
}

/// Owned handle over a pooled buffer. Reads like a cursor; dropping the
/// handle returns the buffer to its pool.
pub struct PooledBuf {
    pool: Arc<BufPool>,
    buf: Option<Vec<u8>>,
    pos: usize,
}

impl PooledBuf {
    /// Append the full contents of `r`.
    pub fn read_from(&mut self, r: &mut dyn Read) -> io::Result<usize> {
        r.read_to_end(self.buf.as_mut().expect("buffer taken"))
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.buf.as_mut().expect("buffer taken").extend_from_slice(bytes);
    }

    pub fn as_slice(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

impl Read for PooledBuf {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let data = self.as_slice();
        let n = (data.len() - self.pos).min(out.len());
        out[..n].copy_from_slice(&data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}
