//! Shared test fixtures: a virtual clock and a canned in-memory remote.

#![allow(dead_code)]

use anyhow::Result;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use simmer::core::{ByteReader, CancelToken, Clock, CoreError, Getter};
use simmer::{Id, Item};

/// Clock advancing only on demand.
pub struct TestClock(Mutex<SystemTime>);

impl TestClock {
    pub fn at_epoch() -> Arc<Self> {
        Arc::new(Self(Mutex::new(SystemTime::UNIX_EPOCH)))
    }

    pub fn at_unix(seconds: u64) -> Arc<Self> {
        Arc::new(Self(Mutex::new(
            SystemTime::UNIX_EPOCH + Duration::from_secs(seconds),
        )))
    }

    pub fn advance(&self, d: Duration) {
        let mut t = self.0.lock().unwrap();
        *t += d;
    }
}

impl Clock for TestClock {
    fn now(&self) -> SystemTime {
        *self.0.lock().unwrap()
    }
}

/// Canned remote: path → body, recording every fetch. Unknown paths get a
/// 404-shaped error.
#[derive(Default)]
pub struct MockRemote {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, path: &str, body: impl Into<Vec<u8>>) {
        self.bodies
            .lock()
            .unwrap()
            .insert(path.to_string(), body.into());
    }

    pub fn insert_item(&self, item: &Item) {
        let body = serde_json::to_vec(item).unwrap();
        self.insert(&format!("item/{}.json", item.id), body);
    }

    /// Ids with no body respond with the JSON `null` literal.
    pub fn insert_null(&self, id: Id) {
        self.insert(&format!("item/{id}.json"), b"null".to_vec());
    }

    pub fn calls_for(&self, path: &str) -> usize {
        self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn item_calls_for(&self, id: Id) -> usize {
        self.calls_for(&format!("item/{id}.json"))
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Every item id fetched at least once.
    pub fn fetched_item_ids(&self) -> Vec<Id> {
        self.calls
            .lock()
            .unwrap()
            .keys()
            .filter_map(|path| {
                path.strip_prefix("item/")?
                    .strip_suffix(".json")?
                    .parse()
                    .ok()
            })
            .collect()
    }
}

impl Getter<String, ByteReader> for MockRemote {
    fn get(&self, token: &CancelToken, path: String) -> Result<ByteReader> {
        token.check()?;

        *self.calls.lock().unwrap().entry(path.clone()).or_insert(0) += 1;

        match self.bodies.lock().unwrap().get(&path) {
            Some(body) => Ok(Box::new(Cursor::new(body.clone()))),
            None => Err(CoreError::FetchFailed { path, status: 404 }.into()),
        }
    }
}

/// A story item with no parent.
pub fn story(id: Id, by: &str, time: i64) -> Item {
    Item {
        id,
        kind: simmer::ItemKind::Story,
        by: by.to_string(),
        time,
        title: format!("story {id}"),
        ..Item::default()
    }
}

/// A comment under `parent`.
pub fn comment(id: Id, by: &str, time: i64, parent: Id) -> Item {
    Item {
        id,
        kind: simmer::ItemKind::Comment,
        by: by.to_string(),
        time,
        parent: Some(parent),
        text: format!("comment {id}"),
        ..Item::default()
    }
}

/// Install `items` on the remote and set `maxitem.json` to the largest id.
pub fn install_corpus(remote: &MockRemote, items: &[Item]) {
    let mut max_id = 0;
    for item in items {
        remote.insert_item(item);
        max_id = max_id.max(item.id);
    }
    remote.insert("maxitem.json", max_id.to_string().into_bytes());
}
