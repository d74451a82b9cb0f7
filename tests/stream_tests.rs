//! Item stream tests: ordering, expansion, refusal, exactly-once delivery.

use std::collections::HashMap;
use std::sync::Arc;

use simmer::core::{BulkGetter, CancelToken, DoFn, ErrorSender};
use simmer::pipeline::{ItemStream, StreamValue};
use simmer::Id;

/// Completes every key immediately, in reverse batch order, with value
/// `id * 2`. Out-of-order enough to exercise the ordered search staging.
struct ReverseEcho;

impl BulkGetter<Id, StreamValue<u64>> for ReverseEcho {
    fn get(
        &self,
        _token: &CancelToken,
        _err_tx: &ErrorSender,
        keys: Vec<Id>,
        do_fn: DoFn<Id, StreamValue<u64>>,
    ) -> Vec<Id> {
        for &key in keys.iter().rev() {
            do_fn(key, StreamValue::ok(key, key * 2));
        }
        Vec::new()
    }
}

/// Refuses every key.
struct RejectAll;

impl BulkGetter<Id, StreamValue<u64>> for RejectAll {
    fn get(
        &self,
        _token: &CancelToken,
        _err_tx: &ErrorSender,
        keys: Vec<Id>,
        _do_fn: DoFn<Id, StreamValue<u64>>,
    ) -> Vec<Id> {
        keys
    }
}

fn reverse_echo_stream(max_in_flight: usize) -> ItemStream<u64> {
    ItemStream::new(&CancelToken::new(), Arc::new(ReverseEcho), max_in_flight)
}

#[test]
fn get_returns_every_requested_id() {
    let stream = reverse_echo_stream(4);

    let ids: Vec<Id> = (1..=20).collect();
    let results = stream.get(&ids).unwrap();

    assert_eq!(results.len(), 20);
    for id in ids {
        assert_eq!(results[&id], id * 2);
    }
}

#[test]
fn ordered_search_preserves_input_order() {
    let stream = reverse_echo_stream(4);

    let m: Id = 100;
    let ids: Vec<Id> = (0..=10).map(|i| m - i).collect();

    let mut delivered = Vec::new();
    stream
        .search_ordered(ids.clone(), |id, _| {
            delivered.push(id);
            Ok((true, Vec::new()))
        })
        .unwrap();

    assert_eq!(delivered, ids);
}

#[test]
fn ordered_search_delivers_appended_ids_after_the_frontier() {
    let stream = reverse_echo_stream(4);

    let mut delivered = Vec::new();
    stream
        .search_ordered(vec![5, 6], |id, _| {
            delivered.push(id);
            let more = if id == 5 { vec![7] } else { Vec::new() };
            Ok((true, more))
        })
        .unwrap();

    assert_eq!(delivered, vec![5, 6, 7]);
}

#[test]
fn unordered_search_expands_and_delivers_exactly_once() {
    let stream = reverse_echo_stream(3);

    let mut counts: HashMap<Id, usize> = HashMap::new();
    stream
        .search_unordered(vec![1], |id, _| {
            *counts.entry(id).or_insert(0) += 1;
            let more = match id {
                1 => vec![2, 3],
                2 => vec![4],
                _ => Vec::new(),
            };
            Ok((true, more))
        })
        .unwrap();

    let mut ids: Vec<Id> = counts.keys().copied().collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert!(counts.values().all(|&n| n == 1), "duplicate delivery: {counts:?}");
}

#[test]
fn unordered_search_stops_when_told() {
    let stream = reverse_echo_stream(2);

    let mut delivered = 0;
    stream
        .search_unordered(vec![1, 2, 3, 4, 5, 6], |_, _| {
            delivered += 1;
            Ok((delivered < 2, Vec::new()))
        })
        .unwrap();

    assert!(delivered >= 2, "accumulator should have run");
    assert!(delivered < 6, "keep_going=false should stop the search");
}

#[test]
fn accumulator_errors_surface() {
    let stream = reverse_echo_stream(2);

    let result = stream.search_unordered(vec![1, 2, 3], |id, _| {
        if id == 2 {
            anyhow::bail!("acc exploded");
        }
        Ok((true, Vec::new()))
    });

    let err = result.expect_err("accumulator error should propagate");
    assert!(format!("{err:#}").contains("acc exploded"), "{err:#}");
}

#[test]
fn rejected_ids_become_in_band_errors() {
    let stream = ItemStream::new(&CancelToken::new(), Arc::new(RejectAll), 2);

    let err = stream.get(&[1, 2, 3]).expect_err("refusals should fail the get");
    assert!(format!("{err:#}").contains("work queue full"), "{err:#}");
}

#[test]
fn large_traversals_respect_a_small_in_flight_budget() {
    let stream = reverse_echo_stream(2);

    let ids: Vec<Id> = (1..=500).collect();
    let mut delivered = 0usize;
    stream
        .search_ordered(ids, |_, _| {
            delivered += 1;
            Ok((true, Vec::new()))
        })
        .unwrap();

    assert_eq!(delivered, 500);
}
