//! TTL map cache and persistent item cache tests.

use std::sync::Arc;
use std::time::Duration;

use simmer::core::{CancelToken, ItemFileCache, MapCache};

mod support;
use support::TestClock;

#[test]
fn map_cache_put_get() {
    let clock = TestClock::at_epoch();
    let cache = MapCache::new(clock, Duration::from_secs(1));

    cache.put("one", 1);
    cache.put("two", 2);

    let (found, missing) = cache.get(&["one", "two"]);
    assert_eq!(found, vec![("one", 1), ("two", 2)]);
    assert!(missing.is_empty());
}

#[test]
fn map_cache_preserves_key_order() {
    let clock = TestClock::at_epoch();
    let cache = MapCache::new(clock, Duration::from_secs(1));

    cache.put("b", 2);
    cache.put("d", 4);

    let (found, missing) = cache.get(&["a", "b", "c", "d"]);
    assert_eq!(found, vec![("b", 2), ("d", 4)]);
    assert_eq!(missing, vec!["a", "c"]);
}

#[test]
fn map_cache_expires_entries() {
    let clock = TestClock::at_epoch();
    let ttl = Duration::from_secs(1);
    let cache = MapCache::new(Arc::clone(&clock) as Arc<dyn simmer::core::Clock>, ttl);

    cache.put("one", 1);

    let (found, missing) = cache.get(&["one"]);
    assert_eq!(found.len(), 1);
    assert!(missing.is_empty());

    clock.advance(2 * ttl);

    let (found, missing) = cache.get(&["one"]);
    assert!(found.is_empty());
    assert_eq!(missing, vec!["one"]);
}

fn entry(id: u64, time: i64) -> Vec<u8> {
    format!(r#"{{"id":{id},"time":{time}}}"#).into_bytes()
}

#[test]
fn file_cache_put_and_get_with_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let clock = TestClock::at_epoch();
    let token = CancelToken::new();

    let cache = ItemFileCache::open(clock, &dir.path().join("simmer.db"), Some("0")).unwrap();

    cache
        .put(
            &token,
            &[
                entry(1, 1).as_slice(),
                entry(2, 2).as_slice(),
                entry(3, 3).as_slice(),
            ],
        )
        .unwrap();

    let mut seen = Vec::new();
    let remaining = cache
        .get(&token, &[1, 4], |id, blob| {
            assert!(!blob.is_empty());
            seen.push(id);
        })
        .unwrap();

    assert_eq!(seen, vec![1]);
    assert_eq!(remaining, vec![4]);

    // Duplicates in the request get duplicate callbacks.
    let mut seen = Vec::new();
    let remaining = cache
        .get(&token, &[1, 2, 2, 3, 1], |id, _| seen.push(id))
        .unwrap();

    assert!(remaining.is_empty());
    seen.sort_unstable();
    assert_eq!(seen, vec![1, 1, 2, 2, 3]);

    cache.close().unwrap();
}

#[test]
fn file_cache_respects_staleness_predicate() {
    let dir = tempfile::tempdir().unwrap();
    let clock = TestClock::at_epoch();
    let token = CancelToken::new();

    let cache = ItemFileCache::open(
        Arc::clone(&clock) as Arc<dyn simmer::core::Clock>,
        &dir.path().join("simmer.db"),
        Some("refreshed < (:now - 150)"),
    )
    .unwrap();

    clock.advance(Duration::from_secs(60));
    cache.put(&token, &[entry(1, 0).as_slice()]).unwrap();

    clock.advance(Duration::from_secs(60));
    cache.put(&token, &[entry(2, 0).as_slice()]).unwrap();

    clock.advance(Duration::from_secs(60));
    cache.put(&token, &[entry(3, 0).as_slice()]).unwrap();

    let mut seen = Vec::new();
    cache
        .get(&token, &[1, 2, 3], |id, _| seen.push(id))
        .unwrap();
    seen.sort_unstable();
    assert_eq!(seen, vec![1, 2, 3], "nothing is stale yet");

    // At t=240 the row refreshed at t=60 is stale.
    clock.advance(Duration::from_secs(60));

    let mut seen = Vec::new();
    let remaining = cache
        .get(&token, &[1, 2, 3], |id, _| seen.push(id))
        .unwrap();
    seen.sort_unstable();
    assert_eq!(seen, vec![2, 3]);
    assert_eq!(remaining, vec![1]);

    cache.close().unwrap();
}

#[test]
fn file_cache_default_staleness_backs_off_with_age() {
    let dir = tempfile::tempdir().unwrap();
    let clock = TestClock::at_epoch();
    let token = CancelToken::new();

    // Default predicate; item created at t=0, refreshed at t=0.
    let cache = ItemFileCache::open(
        Arc::clone(&clock) as Arc<dyn simmer::core::Clock>,
        &dir.path().join("simmer.db"),
        None,
    )
    .unwrap();
    cache.put(&token, &[entry(1, 0).as_slice()]).unwrap();

    // Young and just refreshed: fresh.
    clock.advance(Duration::from_secs(30));
    let remaining = cache.get(&token, &[1], |_, _| {}).unwrap();
    assert!(remaining.is_empty(), "30s-old row should be fresh");

    // Two minutes later the one-minute revalidation window has passed.
    clock.advance(Duration::from_secs(90));
    let remaining = cache.get(&token, &[1], |_, _| {}).unwrap();
    assert_eq!(remaining, vec![1], "2m-old row should be stale");

    // Re-refresh now; the item is older, so the next window is longer.
    cache.put(&token, &[entry(1, 0).as_slice()]).unwrap();
    clock.advance(Duration::from_secs(60));
    let remaining = cache.get(&token, &[1], |_, _| {}).unwrap();
    assert!(
        remaining.is_empty(),
        "one minute after refresh of a 2m-old item should be fresh"
    );

    cache.close().unwrap();
}

#[test]
fn file_cache_never_stores_null_bodies() {
    let dir = tempfile::tempdir().unwrap();
    let clock = TestClock::at_epoch();
    let token = CancelToken::new();

    let cache = ItemFileCache::open(clock, &dir.path().join("simmer.db"), Some("0")).unwrap();

    cache
        .put(&token, &[b"null".as_slice(), entry(7, 7).as_slice()])
        .unwrap();

    let mut seen = Vec::new();
    let remaining = cache.get(&token, &[7, 8], |id, _| seen.push(id)).unwrap();

    assert_eq!(seen, vec![7]);
    assert_eq!(remaining, vec![8]);

    cache.close().unwrap();
}

#[test]
fn file_cache_rejects_bad_predicate_at_open() {
    let dir = tempfile::tempdir().unwrap();
    let clock = TestClock::at_epoch();

    let result = ItemFileCache::open(
        clock,
        &dir.path().join("simmer.db"),
        Some("this is not sql"),
    );

    assert!(result.is_err(), "syntax error should fail open");
}
