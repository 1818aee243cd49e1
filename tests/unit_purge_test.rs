mod common;

use common::{PURGE_HEADER, get_request, harness};
use std::collections::HashMap;
use twice::core::purge::VariantIndex;
use twice::core::storage::backend::CacheBackend;
use twice::core::storage::element::{Element, FragmentValue};

fn fragment(value: &str) -> Element {
    Element::Fragment(FragmentValue::Scalar(value.to_string()))
}

fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[test]
fn test_variant_index_tracks_distinct_keys_per_uri() {
    let index = VariantIndex::new();
    assert!(index.insert("/a", "page_localhost/a"));
    assert!(index.insert("/a", "page_localhost/a//u=1"));
    // Re-inserting an existing variant is not news.
    assert!(!index.insert("/a", "page_localhost/a"));

    let mut variants = index.variants("/a").unwrap();
    variants.sort();
    assert_eq!(
        variants,
        vec![
            "page_localhost/a".to_string(),
            "page_localhost/a//u=1".to_string()
        ]
    );

    let taken = index.take("/a").unwrap();
    assert_eq!(taken.len(), 2);
    assert!(index.variants("/a").is_none());
    assert!(index.is_empty());
}

#[tokio::test]
async fn test_full_flush_purge() {
    let h = harness();
    h.cache
        .set(
            HashMap::from([
                ("memcache_a".to_string(), fragment("1")),
                ("session_abc".to_string(), fragment("x")),
            ]),
            600,
        )
        .await
        .unwrap();

    let mut purge = get_request("/anything");
    purge.headers.set(PURGE_HEADER, "*");
    let ack = h.pipeline.handle(purge).await;

    assert_eq!(ack.status, 200);
    assert_eq!(&ack.body[..], b"Expired *_/anything");
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn test_session_purge_removes_the_session_kind_family() {
    let h = harness();
    h.cache
        .set(
            HashMap::from([
                ("session_abc".to_string(), fragment("s")),
                ("favorite_abc".to_string(), fragment("f")),
                ("subscription_abc".to_string(), fragment("sub")),
                ("session_other".to_string(), fragment("keep")),
            ]),
            600,
        )
        .await
        .unwrap();

    let mut purge = get_request("/abc");
    purge.headers.set(PURGE_HEADER, "session");
    let ack = h.pipeline.handle(purge).await;

    assert_eq!(&ack.body[..], b"Expired session_/abc");
    let found = h
        .cache
        .get(&keys(&[
            "session_abc",
            "favorite_abc",
            "subscription_abc",
            "session_other",
        ]))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert!(found.contains_key("session_other"));
}

#[tokio::test]
async fn test_any_other_purge_kind_deletes_one_key() {
    let h = harness();
    h.cache
        .set(
            HashMap::from([
                ("memcache_top".to_string(), fragment("5")),
                ("memcache_bottom".to_string(), fragment("6")),
            ]),
            600,
        )
        .await
        .unwrap();

    let mut purge = get_request("/top");
    purge.headers.set(PURGE_HEADER, "memcache");
    let ack = h.pipeline.handle(purge).await;

    assert_eq!(&ack.body[..], b"Expired memcache_/top");
    let found = h
        .cache
        .get(&keys(&["memcache_top", "memcache_bottom"]))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert!(found.contains_key("memcache_bottom"));
}

#[tokio::test]
async fn test_purge_for_unknown_url_still_acks() {
    let h = harness();
    let mut purge = get_request("/never-seen");
    purge.headers.set(PURGE_HEADER, "url");
    let ack = h.pipeline.handle(purge).await;
    assert_eq!(ack.status, 200);
    assert_eq!(&ack.body[..], b"Expired url_/never-seen");
}
