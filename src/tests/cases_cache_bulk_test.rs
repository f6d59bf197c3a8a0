use serde_json::json;
use tokio_test::assert_ok;

use crate::cache::CacheError;
use crate::support::cache::*;

#[tokio::test]
async fn test_set_multiple_reports_per_key() {
    let fx = new_cache();
    let c = &fx.cache;

    let res = c
        .set_multiple(vec![
            ("printer:model:1", json!({"vendor": "hp"})),
            ("bad key", json!({"vendor": "?"})),
            ("printer:model:2", json!({"vendor": "xerox"})),
        ])
        .await;

    assert_eq!(res.len(), 3);
    assert_ok!(&res["printer:model:1"]);
    assert_ok!(&res["printer:model:2"]);
    assert!(matches!(res["bad key"], Err(CacheError::InvalidKey(_))));
    assert!(fx.backend.inner().contains("printer:model:2"));
}

#[tokio::test]
async fn test_get_multiple_maps_missing_keys_to_none() {
    let fx = new_cache();
    let c = &fx.cache;
    c.set("catalog:a", &1u32).await.unwrap();
    c.set("catalog:b", &2u32).await.unwrap();

    let got = c
        .get_multiple::<u32, _>(["catalog:a", "catalog:b", "catalog:missing", "bad key"])
        .await;
    assert_eq!(got.len(), 4);
    assert_eq!(got["catalog:a"], Some(1));
    assert_eq!(got["catalog:b"], Some(2));
    assert_eq!(got["catalog:missing"], None);
    assert_eq!(got["bad key"], None);
}

#[tokio::test]
async fn test_clear_by_pattern_counts_distinct_keys() {
    let fx = new_cache();
    let c = &fx.cache;
    c.set("printer:status:1", &1).await.unwrap();
    c.set("printer:status:2", &2).await.unwrap();
    c.set("printer:model:1", &"hp").await.unwrap();

    // Local-only entry.
    fx.backend.set_down(true);
    c.set("printer:status:3", &3).await.unwrap();
    fx.backend.set_down(false);

    assert_eq!(c.clear_by_pattern("printer:status:*").await.unwrap(), 3);
    for i in 1..=3 {
        assert_eq!(c.get::<i32>(&format!("printer:status:{i}")).await.unwrap(), None);
    }
    assert_eq!(c.get::<String>("printer:model:1").await.unwrap().as_deref(), Some("hp"));
    assert_eq!(c.clear_by_pattern("printer:status:*").await.unwrap(), 0);
}

#[tokio::test]
async fn test_invalid_pattern_is_rejected() {
    let fx = new_cache();
    assert!(matches!(
        fx.cache.clear_by_pattern("").await,
        Err(CacheError::InvalidPattern(_))
    ));
    assert!(matches!(
        fx.cache.clear_by_pattern("printer: *").await,
        Err(CacheError::InvalidPattern(_))
    ));
}

#[tokio::test]
async fn test_local_tier_stays_within_capacity() {
    let fx = new_cache_with(|cfg| cfg.local.capacity_bytes = 256);
    let c = &fx.cache;

    let payload = "x".repeat(40);
    for i in 0..20 {
        c.set(&format!("report:{i}"), &payload).await.unwrap();
    }
    let local = c.local();
    assert!(local.mem() <= local.capacity());
    assert!(local.evictions() > 0);

    // Evicted entries are still served by the distributed tier.
    for i in 0..20 {
        assert_eq!(c.get::<String>(&format!("report:{i}")).await.unwrap().as_deref(), Some(payload.as_str()));
    }

    // Too large for the local tier at all.
    let big = "y".repeat(1024);
    c.set("report:big", &big).await.unwrap();
    assert!(!local.contains("report:big"));
    assert_eq!(c.get::<String>("report:big").await.unwrap(), Some(big));

    c.publish_gauges();
    assert_eq!(c.statistics().local_evictions, local.evictions());
}
