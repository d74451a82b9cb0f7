//! Single-key fetch abstraction and the HTTP implementation.

use anyhow::{Context, Result};
use std::io::Read;

use super::cancel::CancelToken;
use super::error::CoreError;
use crate::Id;

/// Opaque byte stream returned by a fetch. Dropping it releases the
/// underlying resource.
pub type ByteReader = Box<dyn Read + Send>;

/// Synchronous single-key retrieval. Implementations are invoked
/// concurrently from worker threads.
pub trait Getter<K, V>: Send + Sync {
    fn get(&self, token: &CancelToken, key: K) -> Result<V>;
}

impl<K, V, G: Getter<K, V> + ?Sized> Getter<K, V> for std::sync::Arc<G> {
    fn get(&self, token: &CancelToken, key: K) -> Result<V> {
        (**self).get(token, key)
    }
}

/// Path of the item endpoint for `id`.
pub fn item_path(id: Id) -> String {
    format!("item/{id}.json")
}

/// Path of the user endpoint for `name`.
pub fn user_path(name: &str) -> String {
    format!("user/{name}.json")
}

/// HTTP GET against `base_url + path`. Non-success status maps to
/// [`CoreError::FetchFailed`]; the body streams out untouched.
pub struct HttpGetter {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpGetter {
    pub fn new(client: reqwest::blocking::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

impl Getter<String, ByteReader> for HttpGetter {
    fn get(&self, token: &CancelToken, path: String) -> Result<ByteReader> {
        token.check()?;

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("request failed: {path}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::FetchFailed {
                path,
                status: status.as_u16(),
            }
            .into());
        }

        Ok(Box::new(response))
    }
}

/// Adapts a getter keyed by `KI` to one keyed by `KO` via a key mapping.
pub struct RekeyGetter<G, F> {
    inner: G,
    rekey: F,
}

impl<G, F> RekeyGetter<G, F> {
    pub fn new(inner: G, rekey: F) -> Self {
        Self { inner, rekey }
    }
}

impl<KO, KI, V, G, F> Getter<KO, V> for RekeyGetter<G, F>
where
    G: Getter<KI, V>,
    F: Fn(KO) -> KI + Send + Sync,
{
    fn get(&self, token: &CancelToken, key: KO) -> Result<V> {
        self.inner.get(token, (self.rekey)(key))
    }
}
