mod common;

use common::{get_request, harness, origin_response};
use std::collections::HashMap;
use twice::core::storage::backend::CacheBackend;
use twice::core::storage::element::{
    Element, FragmentValue, PageEntry, now_secs,
};

fn stale_page(body: &str, expires_on: u64, cache_control: u64) -> Element {
    Element::Page(PageEntry {
        status: 200,
        headers: Vec::new(),
        set_cookies: Vec::new(),
        body: body.as_bytes().to_vec(),
        expires_on,
        cache_control,
        dependencies: Vec::new(),
    })
}

fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[tokio::test]
async fn test_misses_fan_out_to_fetchers_and_merge() {
    let h = harness();
    h.kv.insert("top", "5");

    let request = get_request("/a");
    let found = h
        .store
        .get(&keys(&["memcache_top", "memcache_other"]), &request)
        .await;

    // Both fetches ran; an empty upstream result is a stored negative, not
    // a missing key.
    assert_eq!(
        found.get("memcache_top"),
        Some(&Element::Fragment(FragmentValue::Scalar("5".to_string())))
    );
    assert_eq!(
        found.get("memcache_other"),
        Some(&Element::Fragment(FragmentValue::Absent))
    );
    assert_eq!(h.kv.get_count(), 2);

    // The fetch completions populated the cache: a second get is all hits.
    let found = h
        .store
        .get(&keys(&["memcache_top", "memcache_other"]), &request)
        .await;
    assert_eq!(found.len(), 2);
    assert_eq!(h.kv.get_count(), 2);
}

#[tokio::test]
async fn test_failed_fetch_leaves_key_out_without_failing_the_batch() {
    let h = harness();
    h.kv.insert("top", "5");

    // The origin queue is empty, so the page fetch fails; the kv fetch
    // still lands.
    let request = get_request("/a");
    let found = h
        .store
        .get(&keys(&["page_localhost/a", "memcache_top"]), &request)
        .await;

    assert!(!found.contains_key("page_localhost/a"));
    assert_eq!(
        found.get("memcache_top"),
        Some(&Element::Fragment(FragmentValue::Scalar("5".to_string())))
    );
}

#[tokio::test]
async fn test_soft_stale_serves_from_cache_and_queues_a_refresh() {
    let mut h = harness();
    let now = now_secs();

    // Expired five seconds ago, well inside the 3x grace window.
    let entries = HashMap::from([(
        "page_localhost/a".to_string(),
        stale_page("OLD", now - 5, 10),
    )]);
    h.cache.set(entries, 600).await.unwrap();
    h.origin.push(origin_response("NEW", Some(60), ""));

    let request = get_request("/a");
    let found = h.store.get(&keys(&["page_localhost/a"]), &request).await;

    // Served stale, without blocking on the origin.
    let entry = found["page_localhost/a"].as_page().unwrap();
    assert_eq!(entry.body, b"OLD");
    assert_eq!(h.origin.fetch_count(), 0);

    // A refresh job was queued; driving it re-fetches and overwrites.
    let job = h.refresh_rx.try_recv().expect("refresh job queued");
    assert_eq!(job.key, "page_localhost/a");
    h.store.refresh(job).await;
    assert_eq!(h.origin.fetch_count(), 1);

    let found = h.cache.get(&keys(&["page_localhost/a"])).await.unwrap();
    let entry = found["page_localhost/a"].as_page().unwrap();
    assert_eq!(entry.body, b"NEW");
    assert!(entry.expires_on > now);
    assert_eq!(entry.cache_control, 60);
}

#[tokio::test]
async fn test_hard_stale_blocks_for_a_refetch() {
    let mut h = harness();
    let now = now_secs();

    // Far past the grace window: expired 1000s ago with a 10s TTL.
    let entries = HashMap::from([(
        "page_localhost/a".to_string(),
        stale_page("OLD", now - 1_000, 10),
    )]);
    h.cache.set(entries, 600).await.unwrap();
    h.origin.push(origin_response("NEW", Some(60), ""));

    let request = get_request("/a");
    let found = h.store.get(&keys(&["page_localhost/a"]), &request).await;

    let entry = found["page_localhost/a"].as_page().unwrap();
    assert_eq!(entry.body, b"NEW");
    assert_eq!(h.origin.fetch_count(), 1);
    // Hard-stale is a miss, not a background refresh.
    assert!(h.refresh_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_failed_refresh_leaves_prior_entry_in_place() {
    let mut h = harness();
    let now = now_secs();

    let entries = HashMap::from([(
        "page_localhost/a".to_string(),
        stale_page("OLD", now - 5, 10),
    )]);
    h.cache.set(entries, 600).await.unwrap();
    // No scripted origin response: the refresh fetch will fail.

    let request = get_request("/a");
    let _ = h.store.get(&keys(&["page_localhost/a"]), &request).await;
    let job = h.refresh_rx.try_recv().expect("refresh job queued");
    h.store.refresh(job).await;

    let found = h.cache.get(&keys(&["page_localhost/a"])).await.unwrap();
    let entry = found["page_localhost/a"].as_page().unwrap();
    assert_eq!(entry.body, b"OLD");
}
