//! Retrieval pipeline leaves: fetch, worker pool, caches, coalescing.
//!
//! Layering for a bulk item fetch, outermost first: single-flight →
//! TTL map cache → persistent-cache wrapper → bulk remote getter →
//! worker pool → fetcher. Results flow back through every layer with
//! cache writes happening on the way out.

pub mod bulk;
pub mod bulk_file_cache;
pub mod cancel;
pub mod clock;
pub mod error;
pub mod fetch;
pub mod file_cache;
pub mod map_cache;
pub mod resource;
pub mod single_flight;
pub mod util;
pub mod worker_pool;

/// Out-of-band channel for infrastructure failures (panics, overruns).
/// Sends are non-blocking; a full channel drops the report.
pub type ErrorSender = crossbeam_channel::Sender<anyhow::Error>;

pub use bulk::{BulkGetter, BulkTransformGetter, BulkWorkerPoolGetter, DoFn, SharedError};
pub use bulk_file_cache::BulkFileCacheGetter;
pub use cancel::CancelToken;
pub use clock::{unix_seconds, Clock, SystemClock};
pub use error::CoreError;
pub use fetch::{item_path, user_path, ByteReader, Getter, HttpGetter, RekeyGetter};
pub use file_cache::{ItemFileCache, DEFAULT_STALE_IF};
pub use map_cache::MapCache;
pub use resource::ResourceGetter;
pub use single_flight::BulkSingleFlightGetter;
pub use util::{greedy_recv, try_send, try_send_from, BufPool, PooledBuf, WaitGroup};
pub use worker_pool::{do_work, WorkerPool};
