//! Streaming iterator over a dynamically growing id set.
//!
//! Construction allocates two bounded channels sized by `max_in_flight` and
//! one driver thread. The driver greedily drains the id channel, dispatches
//! each batch through the bulk getter, and forwards results; ids the getter
//! refuses come back as in-band error values. The search methods feed ids
//! in while reading results out, so at most `max_in_flight` requests are
//! active, and the accumulator can grow the traversal by returning more
//! ids (parent walks, kid walks, frontier scans).

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use crate::core::{
    greedy_recv, try_send, try_send_from, BulkGetter, CancelToken, CoreError, DoFn, SharedError,
    WaitGroup,
};
use crate::Id;

/// One stream result: the id and either its value or the error that ended
/// that id's retrieval.
#[derive(Clone, Debug)]
pub struct StreamValue<T> {
    pub id: Id,
    pub body: Result<T, SharedError>,
}

impl<T> StreamValue<T> {
    pub fn ok(id: Id, value: T) -> Self {
        Self {
            id,
            body: Ok(value),
        }
    }

    pub fn err(id: Id, e: anyhow::Error) -> Self {
        Self {
            id,
            body: Err(Arc::new(e)),
        }
    }
}

pub struct ItemStream<T> {
    id_tx: Sender<Id>,
    item_rx: Receiver<StreamValue<T>>,
    token: CancelToken,
    max_in_flight: usize,
}

impl<T: Send + Sync + 'static> ItemStream<T> {
    pub fn new(
        token: &CancelToken,
        getter: Arc<dyn BulkGetter<Id, StreamValue<T>>>,
        max_in_flight: usize,
    ) -> Self {
        let (id_tx, id_rx) = bounded(max_in_flight);
        let (item_tx, item_rx) = bounded(max_in_flight);

        let driver_token = token.clone();
        thread::spawn(move || drive(driver_token, getter, id_rx, item_tx));

        Self {
            id_tx,
            item_rx,
            token: token.clone(),
            max_in_flight,
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Retrieve `ids` and return them as a map. Fails on the first error.
    pub fn get(self, ids: &[Id]) -> Result<HashMap<Id, T>> {
        let mut results = HashMap::with_capacity(ids.len());

        self.search_unordered(ids.to_vec(), |id, value| {
            results.insert(id, value);
            Ok((true, Vec::new()))
        })?;

        Ok(results)
    }

    /// Stream `ids` through `acc` in completion order. The accumulator
    /// returns `(keep_going, more_ids)`; returned ids join the traversal.
    /// Exactly one delivery per accepted id; no ordering promise.
    pub fn search_unordered<F>(self, mut ids: Vec<Id>, mut acc: F) -> Result<()>
    where
        F: FnMut(Id, T) -> Result<(bool, Vec<Id>)>,
    {
        let Self {
            id_tx,
            item_rx,
            token,
            max_in_flight,
        } = self;

        let mut outstanding = 0usize;
        let mut outer_err = None;

        'search: while !ids.is_empty() || outstanding > 0 {
            let want = ids.len().min(max_in_flight - outstanding);
            let sent = try_send_from(&id_tx, &ids[..want]);
            ids.drain(..sent);
            outstanding += sent;

            let Some(items) = greedy_recv(&item_rx, 0) else {
                break;
            };
            outstanding -= items.len();

            for item in items {
                let value = match item.body {
                    Ok(value) => value,
                    Err(e) => {
                        outer_err = Some(into_error(e));
                        break 'search;
                    }
                };

                match acc(item.id, value) {
                    Ok((keep_going, more_ids)) => {
                        ids.extend(more_ids);
                        if !keep_going {
                            break 'search;
                        }
                    }
                    Err(e) => {
                        outer_err = Some(e.context("failed to accumulate"));
                        break 'search;
                    }
                }
            }
        }

        drop(id_tx);
        drain(outer_err, &item_rx, &token)
    }

    /// Like [`search_unordered`](Self::search_unordered), but results are
    /// staged until they can be delivered in the order of `ids`. Ids the
    /// accumulator adds are delivered after the current frontier, FIFO.
    pub fn search_ordered<F>(self, mut ids: Vec<Id>, mut acc: F) -> Result<()>
    where
        F: FnMut(Id, T) -> Result<(bool, Vec<Id>)>,
    {
        let Self {
            id_tx,
            item_rx,
            token,
            max_in_flight,
        } = self;

        let mut staged: HashMap<Id, T> = HashMap::with_capacity(ids.len());
        let mut outstanding = 0usize;
        let mut outer_err = None;

        while !ids.is_empty() {
            let end = ids.len().min(max_in_flight);
            let sent = try_send_from(&id_tx, &ids[outstanding..end]);
            outstanding += sent;

            let Some(items) = greedy_recv(&item_rx, 0) else {
                break;
            };

            match ordered_batch(&mut staged, &ids, items, &mut acc) {
                Ok((keep_going, consumed, more_ids)) => {
                    ids.drain(..consumed);
                    outstanding -= consumed;
                    ids.extend(more_ids);

                    if !keep_going {
                        break;
                    }
                }
                Err(e) => {
                    outer_err = Some(e);
                    break;
                }
            }
        }

        drop(id_tx);
        drain(outer_err, &item_rx, &token)
    }
}

/// Stage a result batch, then deliver staged values while the next pending
/// id is available. Returns `(keep_going, consumed, more_ids)`.
fn ordered_batch<T, F>(
    staged: &mut HashMap<Id, T>,
    ids: &[Id],
    items: Vec<StreamValue<T>>,
    acc: &mut F,
) -> Result<(bool, usize, Vec<Id>)>
where
    F: FnMut(Id, T) -> Result<(bool, Vec<Id>)>,
{
    for item in items {
        match item.body {
            Ok(value) => {
                staged.insert(item.id, value);
            }
            Err(e) => return Err(into_error(e).context("failed to accumulate item")),
        }
    }

    let mut consumed = 0;
    let mut keep_going = true;
    let mut all_more = Vec::new();

    while keep_going && consumed < ids.len() {
        let id = ids[consumed];
        let Some(value) = staged.remove(&id) else {
            break;
        };

        let (ok, more_ids) = acc(id, value)?;
        keep_going = ok;
        all_more.extend(more_ids);
        consumed += 1;
    }

    Ok((keep_going, consumed, all_more))
}

fn drive<T: Send + Sync + 'static>(
    token: CancelToken,
    getter: Arc<dyn BulkGetter<Id, StreamValue<T>>>,
    id_rx: Receiver<Id>,
    item_tx: Sender<StreamValue<T>>,
) {
    let (err_tx, err_rx) = bounded::<anyhow::Error>(1);
    let wg = WaitGroup::new();

    while let Some(ids) = greedy_recv(&id_rx, 0) {
        wg.add(ids.len());

        let do_fn: DoFn<Id, StreamValue<T>> = Arc::new({
            let item_tx = item_tx.clone();
            let err_tx = err_tx.clone();
            let wg = wg.clone();
            move |_id, value| {
                if !try_send(&item_tx, value) {
                    let _ = err_tx.try_send(CoreError::ResultChannelFull.into());
                }
                wg.done();
            }
        });

        let rejected = getter.get(&token, &err_tx, ids, do_fn);
        for id in rejected {
            let _ = item_tx.send(StreamValue::err(
                id,
                CoreError::EnqueueRefused { id }.into(),
            ));
            wg.done();
        }
    }

    wg.wait();
    drop(err_tx);

    let mut deferred: Vec<anyhow::Error> = err_rx.try_iter().collect();
    if let Some(e) = join_errors(&mut deferred) {
        let _ = item_tx.send(StreamValue::err(0, e));
    }
    // Dropping item_tx closes the stream output.
}

/// Drain the result channel, collecting trailing in-band errors. Errors
/// caused by the caller's own cancellation are not failures.
fn drain<T>(
    outer_err: Option<anyhow::Error>,
    item_rx: &Receiver<StreamValue<T>>,
    token: &CancelToken,
) -> Result<()> {
    let mut errs: Vec<anyhow::Error> = outer_err.into_iter().collect();

    for item in item_rx.iter() {
        if let Err(e) = item.body {
            errs.push(into_error(e));
        }
    }

    if token.is_cancelled() {
        errs.retain(|e| !is_cancellation(e));
    }

    match join_errors(&mut errs) {
        Some(e) => Err(e.context("search failed")),
        None => Ok(()),
    }
}

fn join_errors(errs: &mut Vec<anyhow::Error>) -> Option<anyhow::Error> {
    match errs.len() {
        0 => None,
        1 => errs.pop(),
        _ => {
            let joined = errs
                .iter()
                .map(|e| format!("{e:#}"))
                .collect::<Vec<_>>()
                .join("; ");
            Some(anyhow!("{} errors: {joined}", errs.len()))
        }
    }
}

fn into_error(e: SharedError) -> anyhow::Error {
    anyhow!(e)
}

fn is_cancellation(e: &anyhow::Error) -> bool {
    if matches!(e.downcast_ref::<CoreError>(), Some(CoreError::Cancelled)) {
        return true;
    }

    e.downcast_ref::<SharedError>()
        .is_some_and(|inner| matches!(inner.downcast_ref::<CoreError>(), Some(CoreError::Cancelled)))
}
