//! Client over the remote item service.
//!
//! `Client::builder()` wires the full retrieval stack: worker pool → bulk
//! remote getter → optional persistent cache → item decode → single-flight
//! coalescing with an in-memory TTL cache. Remember to `close()` the client
//! when done so the pool and cache writer shut down cleanly.
//!
//! Basic usage:
//!
//! ```ignore
//! let client = Client::builder().build()?;
//! let ids = client.new_stories(&token)?;
//! let items = client.get_items(&token, &ids[..20])?;
//! client.close()?;
//! ```

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::core::{
    item_path, user_path, BulkFileCacheGetter, BulkGetter, BulkSingleFlightGetter,
    BulkTransformGetter, BulkWorkerPoolGetter, ByteReader, CancelToken, Clock, CoreError, Getter,
    HttpGetter, ItemFileCache, MapCache, RekeyGetter, ResourceGetter, SharedError, SystemClock,
    WorkerPool,
};
use crate::item_set::ItemSet;
use crate::pipeline::{ItemStream, StreamValue};
use crate::types::{Id, Item, ItemKind, User};

pub const BASE_URL: &str = "https://hacker-news.firebaseio.com/v0/";

const DEFAULT_MAX_CONNECTIONS: usize = 100;
const DEFAULT_CACHE_FOR: Duration = Duration::from_secs(60);
const DEFAULT_PUT_BATCH_SIZE: usize = 100;
const RESOURCE_CACHE_TTL: Duration = Duration::from_secs(60);

/// Work queue slots per worker.
const WORK_CAPACITY_PER_WORKER: usize = 4;
/// Stream in-flight budget per worker.
const IN_FLIGHT_PER_WORKER: usize = 2;
/// Idle HTTP connections are kept around a few cache lifetimes.
const IDLE_TIMEOUT_CACHE_FOR_MULTIPLIER: u32 = 5;

type RawResult = Result<ByteReader, SharedError>;
type ItemGetter = Arc<dyn BulkGetter<Id, StreamValue<Arc<Item>>>>;

/// Default on-disk cache location: the user cache dir, or the temp dir
/// when there is none.
pub fn default_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("simmer.db")
}

pub struct ClientBuilder {
    base_url: String,
    max_connections: usize,
    cache_for: Duration,
    file_cache_path: Option<PathBuf>,
    stale_if: Option<String>,
    work_channel_capacity: Option<usize>,
    max_in_flight: Option<usize>,
    put_batch_size: usize,
    getter: Option<Arc<dyn Getter<String, ByteReader>>>,
    clock: Option<Arc<dyn Clock>>,
    on_cache_error: Option<Arc<dyn Fn(anyhow::Error) + Send + Sync>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            cache_for: DEFAULT_CACHE_FOR,
            file_cache_path: Some(default_cache_path()),
            stale_if: None,
            work_channel_capacity: None,
            max_in_flight: None,
            put_batch_size: DEFAULT_PUT_BATCH_SIZE,
            getter: None,
            clock: None,
            on_cache_error: None,
        }
    }
}

impl ClientBuilder {
    /// Worker count and idle-connection budget.
    pub fn max_connections(mut self, value: usize) -> Self {
        self.max_connections = value;
        self
    }

    /// TTL of the in-memory coalescing cache. Zero disables it.
    pub fn cache_for(mut self, value: Duration) -> Self {
        self.cache_for = value;
        self
    }

    pub fn file_cache_path(mut self, value: impl Into<PathBuf>) -> Self {
        self.file_cache_path = Some(value.into());
        self
    }

    /// Disable the persistent cache layer entirely.
    pub fn no_file_cache(mut self) -> Self {
        self.file_cache_path = None;
        self
    }

    /// Override the staleness predicate of the persistent cache.
    pub fn stale_if(mut self, value: impl Into<String>) -> Self {
        self.stale_if = Some(value.into());
        self
    }

    /// Work queue capacity. Default: 4 × workers.
    pub fn work_channel_capacity(mut self, value: usize) -> Self {
        self.work_channel_capacity = Some(value);
        self
    }

    /// Stream in-flight budget. Default: 2 × workers.
    pub fn max_in_flight(mut self, value: usize) -> Self {
        self.max_in_flight = Some(value);
        self
    }

    /// Persistent-cache writer batch size.
    pub fn put_batch_size(mut self, value: usize) -> Self {
        self.put_batch_size = value;
        self
    }

    /// Replace the HTTP fetcher (tests inject a fake remote here).
    pub fn getter(mut self, value: Arc<dyn Getter<String, ByteReader>>) -> Self {
        self.getter = Some(value);
        self
    }

    pub fn clock(mut self, value: Arc<dyn Clock>) -> Self {
        self.clock = Some(value);
        self
    }

    /// Sink for best-effort cache failures (put errors, put channel full).
    /// The responses themselves are always delivered.
    pub fn on_cache_error(mut self, value: Arc<dyn Fn(anyhow::Error) + Send + Sync>) -> Self {
        self.on_cache_error = Some(value);
        self
    }

    pub fn build(self) -> Result<Client> {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let getter: Arc<dyn Getter<String, ByteReader>> = match self.getter {
            Some(getter) => getter,
            None => {
                let http = reqwest::blocking::Client::builder()
                    .pool_max_idle_per_host(self.max_connections)
                    .pool_idle_timeout(self.cache_for * IDLE_TIMEOUT_CACHE_FOR_MULTIPLIER)
                    .build()
                    .context("build http client")?;
                Arc::new(HttpGetter::new(http, self.base_url))
            }
        };

        let num_workers = self.max_connections.max(1);
        let work_capacity = self
            .work_channel_capacity
            .unwrap_or(num_workers * WORK_CAPACITY_PER_WORKER);
        let max_in_flight = self
            .max_in_flight
            .unwrap_or(num_workers * IN_FLIGHT_PER_WORKER);

        let resources = ResourceGetter::new(
            Arc::clone(&getter),
            Arc::clone(&clock),
            RESOURCE_CACHE_TTL,
        );

        let pool = Arc::new(WorkerPool::new(num_workers, work_capacity));

        let item_paths = RekeyGetter::new(getter, item_path);
        let mut raw: Arc<dyn BulkGetter<Id, RawResult>> =
            Arc::new(BulkWorkerPoolGetter::new(Arc::clone(&pool), Arc::new(item_paths)));

        let mut file_close: Option<Box<dyn Fn() -> Result<()> + Send + Sync>> = None;

        if let Some(path) = &self.file_cache_path {
            let cache = Arc::new(
                ItemFileCache::open(Arc::clone(&clock), path, self.stale_if.as_deref())
                    .context("failed to create item file cache")?,
            );

            let on_error = self
                .on_cache_error
                .unwrap_or_else(|| Arc::new(|_| {}));
            let on_full = {
                let on_error = Arc::clone(&on_error);
                Arc::new(move || on_error(CoreError::PutChannelFull.into()))
            };

            let file_getter = Arc::new(BulkFileCacheGetter::new(
                &CancelToken::new(),
                raw,
                cache,
                self.put_batch_size,
                on_full,
                on_error,
            ));

            raw = Arc::clone(&file_getter) as Arc<dyn BulkGetter<Id, RawResult>>;
            file_close = Some(Box::new(move || file_getter.close()));
        }

        let decoded = BulkTransformGetter::new(raw, |id: &Id, value: RawResult| {
            decode_item(*id, value)
        });

        let map_cache = (!self.cache_for.is_zero())
            .then(|| Arc::new(MapCache::new(Arc::clone(&clock), self.cache_for)));
        let should_cache: Arc<dyn Fn(&Id, &StreamValue<Arc<Item>>) -> bool + Send + Sync> =
            Arc::new(|_, value| {
                matches!(&value.body, Ok(item) if item.kind != ItemKind::NullBody)
            });

        let items: ItemGetter =
            Arc::new(BulkSingleFlightGetter::new(decoded, map_cache, should_cache));

        Ok(Client {
            resources,
            items,
            pool,
            file_close,
            max_in_flight,
        })
    }
}

pub struct Client {
    resources: ResourceGetter,
    items: ItemGetter,
    pool: Arc<WorkerPool>,
    file_close: Option<Box<dyn Fn() -> Result<()> + Send + Sync>>,
    max_in_flight: usize,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn top_stories(&self, token: &CancelToken) -> Result<Vec<Id>> {
        self.resources.get(token, "topstories.json")
    }

    pub fn new_stories(&self, token: &CancelToken) -> Result<Vec<Id>> {
        self.resources.get(token, "newstories.json")
    }

    pub fn best_stories(&self, token: &CancelToken) -> Result<Vec<Id>> {
        self.resources.get(token, "beststories.json")
    }

    pub fn ask_stories(&self, token: &CancelToken) -> Result<Vec<Id>> {
        self.resources.get(token, "askstories.json")
    }

    pub fn show_stories(&self, token: &CancelToken) -> Result<Vec<Id>> {
        self.resources.get(token, "showstories.json")
    }

    pub fn job_stories(&self, token: &CancelToken) -> Result<Vec<Id>> {
        self.resources.get(token, "jobstories.json")
    }

    /// The largest id the remote has assigned so far.
    pub fn max_item(&self, token: &CancelToken) -> Result<Id> {
        self.resources.get(token, "maxitem.json")
    }

    pub fn user(&self, token: &CancelToken, name: &str) -> Result<User> {
        self.resources.get(token, &user_path(name))
    }

    /// A fresh stream over the shared retrieval stack. One search per stream.
    pub fn item_stream(&self, token: &CancelToken) -> ItemStream<Arc<Item>> {
        ItemStream::new(token, Arc::clone(&self.items), self.max_in_flight)
    }

    pub fn get_items(&self, token: &CancelToken, ids: &[Id]) -> Result<ItemSet> {
        let results = self.item_stream(token).get(ids)?;
        Ok(results.into_values().collect())
    }

    pub fn search_ordered<F>(&self, token: &CancelToken, ids: Vec<Id>, acc: F) -> Result<()>
    where
        F: FnMut(Id, Arc<Item>) -> Result<(bool, Vec<Id>)>,
    {
        if ids.is_empty() {
            return Ok(());
        }
        self.item_stream(token).search_ordered(ids, acc)
    }

    pub fn search_unordered<F>(&self, token: &CancelToken, ids: Vec<Id>, acc: F) -> Result<()>
    where
        F: FnMut(Id, Arc<Item>) -> Result<(bool, Vec<Id>)>,
    {
        if ids.is_empty() {
            return Ok(());
        }
        self.item_stream(token).search_unordered(ids, acc)
    }

    /// Direct parents of `items`. Fails when a parent has a null body.
    pub fn get_parents(&self, token: &CancelToken, items: &ItemSet) -> Result<ItemSet> {
        let ids: Vec<Id> = items.iter().filter_map(|item| item.parent).collect();

        let parents = self
            .get_items(token, &ids)
            .context("failed to retrieve parent items")?;

        for parent in parents.iter() {
            if parent.kind == ItemKind::NullBody {
                anyhow::bail!("parent {} has null body", parent.id);
            }
        }

        Ok(parents)
    }

    /// `items` plus every ancestor reachable through parent links.
    pub fn get_ancestors(&self, token: &CancelToken, items: &ItemSet) -> Result<ItemSet> {
        let mut result = ItemSet::with_capacity(items.len());
        let mut queued_as_parent: HashSet<Id> = items.ids().into_iter().collect();

        self.search_unordered(token, items.ids(), |_, item| {
            let more = match item.parent {
                Some(parent_id) if queued_as_parent.insert(parent_id) => vec![parent_id],
                _ => Vec::new(),
            };
            result.insert(item);
            Ok((true, more))
        })?;

        Ok(result)
    }

    /// Direct children of `items`.
    pub fn get_kids(&self, token: &CancelToken, items: &ItemSet) -> Result<ItemSet> {
        let ids: Vec<Id> = items.iter().flat_map(|item| item.kids.clone()).collect();

        self.get_items(token, &ids)
            .context("failed to retrieve kid items")
    }

    /// `items` plus every descendant reachable through kid links.
    pub fn get_descendants(&self, token: &CancelToken, items: &ItemSet) -> Result<ItemSet> {
        let mut result = ItemSet::with_capacity(items.len());

        self.search_unordered(token, items.ids(), |_, item| {
            let kids = item.kids.clone();
            result.insert(item);
            Ok((true, kids))
        })?;

        Ok(result)
    }

    /// Items created after `active_after` along with their ancestors,
    /// found by scanning from `max_id` downward and expanding through
    /// parent links. Ids at or below the largest id known to be inactive
    /// are not visited unless something needed them as a parent.
    pub fn get_active(
        &self,
        token: &CancelToken,
        max_id: Id,
        active_after: SystemTime,
    ) -> Result<ItemSet> {
        self.get_active_with(token, max_id, active_after, |_| {})
    }

    /// [`get_active`](Self::get_active) with a per-item progress hook,
    /// called with the running count of scanned items.
    pub fn get_active_with(
        &self,
        token: &CancelToken,
        max_id: Id,
        active_after: SystemTime,
        mut on_scanned: impl FnMut(usize),
    ) -> Result<ItemSet> {
        let stream = self.item_stream(token);

        let seed_from = max_id.saturating_sub(stream.max_in_flight() as Id);
        let ids: Vec<Id> = (seed_from..=max_id).collect();

        let mut next = ids[0] as i64 - 1;
        let mut largest_known_inactive: Id = 0;
        let mut queued_as_parent: HashSet<Id> = HashSet::with_capacity(ids.len());
        let mut all = ItemSet::with_capacity(ids.len());
        let mut scanned = 0usize;

        stream.search_unordered(ids, |id, item| {
            scanned += 1;
            on_scanned(scanned);

            if !item.is_active(active_after) {
                largest_known_inactive = largest_known_inactive.max(id);

                if !queued_as_parent.contains(&id) {
                    return Ok((true, Vec::new()));
                }
            }

            let mut more_ids = Vec::with_capacity(2);
            try_enqueue_parent(&item, &mut queued_as_parent, &mut more_ids);
            try_enqueue_next(
                &mut next,
                largest_known_inactive,
                &queued_as_parent,
                &mut more_ids,
            );

            all.insert(item);

            Ok((true, more_ids))
        })?;

        Ok(all)
    }

    /// Shut down the worker pool and the persistent-cache writer.
    /// Blocks until in-flight work has drained. Idempotent.
    pub fn close(&self) -> Result<()> {
        self.pool.close();
        if let Some(close) = &self.file_close {
            close()?;
        }
        Ok(())
    }
}

fn try_enqueue_parent(item: &Item, queued_as_parent: &mut HashSet<Id>, more_ids: &mut Vec<Id>) {
    if let Some(parent_id) = item.parent {
        if queued_as_parent.insert(parent_id) {
            more_ids.push(parent_id);
        }
    }
}

fn try_enqueue_next(
    next: &mut i64,
    largest_known_inactive: Id,
    queued_as_parent: &HashSet<Id>,
    more_ids: &mut Vec<Id>,
) {
    while *next > largest_known_inactive as i64 {
        let id = *next as Id;

        if queued_as_parent.contains(&id) {
            *next -= 1;
            continue;
        }

        more_ids.push(id);
        *next -= 1;
        break;
    }
}

/// Decode one raw response into a stream value. The JSON `null` body maps
/// to a [`ItemKind::NullBody`] item carrying the requested id; a body id
/// that differs from the requested id is a contract error.
fn decode_item(id: Id, raw: RawResult) -> StreamValue<Arc<Item>> {
    let reader = match raw {
        Ok(reader) => reader,
        Err(e) => return StreamValue { id, body: Err(e) },
    };

    match decode_item_body(id, reader) {
        Ok(item) => StreamValue::ok(id, item),
        Err(e) => StreamValue::err(id, e),
    }
}

fn decode_item_body(id: Id, reader: ByteReader) -> Result<Arc<Item>> {
    let decoded: Option<Item> =
        serde_json::from_reader(reader).context("failed to deserialize item")?;

    match decoded {
        None => Ok(Arc::new(Item {
            id,
            kind: ItemKind::NullBody,
            ..Item::default()
        })),
        Some(item) if item.id != id => Err(CoreError::IdMismatch {
            requested: id,
            body: item.id,
        }
        .into()),
        Some(item) => Ok(Arc::new(item)),
    }
}
