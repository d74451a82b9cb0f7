//! Fixed-size worker pool with a bounded FIFO queue and non-blocking enqueue.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::cancel::CancelToken;
use super::error::{panic_message, CoreError};
use super::ErrorSender;

struct Task {
    err_tx: ErrorSender,
    run: Box<dyn FnOnce() + Send>,
}

/// Pool of long-lived workers pulling tasks from one bounded queue.
/// Work is enqueued through [`do_work`]; a full queue refuses instead of
/// blocking. `close` stops acceptance and waits for every accepted task.
pub struct WorkerPool {
    work_tx: Mutex<Option<Sender<Task>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Both arguments must be positive.
    pub fn new(num_workers: usize, queue_capacity: usize) -> Self {
        assert!(num_workers > 0, "num_workers must be positive");
        assert!(queue_capacity > 0, "queue_capacity must be positive");

        let (work_tx, work_rx) = bounded::<Task>(queue_capacity);
        let handles = (0..num_workers)
            .map(|_| {
                let work_rx = work_rx.clone();
                thread::spawn(move || worker_loop(work_rx))
            })
            .collect();

        Self {
            work_tx: Mutex::new(Some(work_tx)),
            handles: Mutex::new(handles),
        }
    }

    fn sender(&self) -> Option<Sender<Task>> {
        self.work_tx.lock().unwrap().clone()
    }

    /// Stop accepting work and block until all queued tasks have run.
    /// Accepted work is never dropped. Idempotent.
    pub fn close(&self) {
        drop(self.work_tx.lock().unwrap().take());
        let handles = std::mem::take(&mut *self.handles.lock().unwrap());
        for handle in handles {
            let _ = handle.join();
        }
    }
}

fn worker_loop(work_rx: Receiver<Task>) {
    while let Ok(Task { err_tx, run }) = work_rx.recv() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(run)) {
            let _ = err_tx.try_send(CoreError::CallbackPanic(panic_message(payload)).into());
        }
    }
}

/// Queue `works` for asynchronous execution.
///
/// 1. Returns promptly, often but not necessarily before `do_fn` runs.
/// 2. If the queue is full (or the pool is closed), the tail starting at the
///    first refused item is returned.
/// 3. `do_fn` is called exactly once per item that was accepted.
/// 4. A panic in `do_fn` is reported with a non-blocking send on `err_tx`.
pub fn do_work<T, F>(
    token: &CancelToken,
    pool: &WorkerPool,
    err_tx: &ErrorSender,
    works: Vec<T>,
    do_fn: F,
) -> Vec<T>
where
    T: Clone + Send + 'static,
    F: Fn(&CancelToken, T) + Send + Sync + 'static,
{
    let Some(work_tx) = pool.sender() else {
        return works;
    };

    let do_fn = Arc::new(do_fn);

    for (i, work) in works.iter().enumerate() {
        let task = Task {
            err_tx: err_tx.clone(),
            run: Box::new({
                let token = token.clone();
                let work = work.clone();
                let do_fn = Arc::clone(&do_fn);
                move || do_fn(&token, work)
            }),
        };

        if work_tx.try_send(task).is_err() {
            return works[i..].to_vec();
        }
    }

    Vec::new()
}
