//! Cached typed decode of singleton endpoints (id lists, max id, users).

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::any::{type_name, Any};
use std::sync::Arc;
use std::time::Duration;

use super::cancel::CancelToken;
use super::clock::Clock;
use super::error::CoreError;
use super::fetch::{ByteReader, Getter};
use super::map_cache::MapCache;

pub struct ResourceGetter {
    getter: Arc<dyn Getter<String, ByteReader>>,
    cache: MapCache<String, Arc<dyn Any + Send + Sync>>,
}

impl ResourceGetter {
    pub fn new(
        getter: Arc<dyn Getter<String, ByteReader>>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            getter,
            cache: MapCache::new(clock, ttl),
        }
    }

    /// Fetch `path` and decode it as `T`, serving from the cache when the
    /// path was decoded recently. Asking for a cached path as a different
    /// type is a hard error.
    pub fn get<T>(&self, token: &CancelToken, path: &str) -> Result<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let (found, _) = self.cache.get(std::slice::from_ref(&path.to_string()));
        if let Some((_, cached)) = found.into_iter().next() {
            return cached.downcast_ref::<T>().cloned().ok_or_else(|| {
                CoreError::DecodeMismatch {
                    path: path.to_string(),
                    expected: type_name::<T>(),
                }
                .into()
            });
        }

        let reader = self
            .getter
            .get(token, path.to_string())
            .with_context(|| format!("failed to get {path}"))?;

        let value: T =
            serde_json::from_reader(reader).with_context(|| format!("failed to decode {path}"))?;

        self.cache
            .put(path.to_string(), Arc::new(value.clone()) as Arc<dyn Any + Send + Sync>);

        Ok(value)
    }
}
