//! Tests for the write-once result cache.

use lumiere_cache::{ResultCache, ResultCacheConfig};
use lumiere_core::{AssetKind, AssetRef, Fingerprint, ProviderParams};
use tempfile::TempDir;

fn fingerprint(prompt: &str) -> Fingerprint {
    Fingerprint::compute(prompt, "sim", &ProviderParams::default(), None)
}

fn asset(tag: &str) -> AssetRef {
    AssetRef {
        content_hash: format!("{:0<64}", tag),
        backend: "memory".to_string(),
        location: tag.to_string(),
        size_bytes: 42,
        kind: AssetKind::Clip,
        mime_type: "video/mp4".to_string(),
    }
}

fn disk_config(dir: &TempDir) -> ResultCacheConfig {
    ResultCacheConfig::default().with_directory(Some(dir.path().to_path_buf()))
}

#[tokio::test]
async fn test_put_then_get() {
    let cache = ResultCache::in_memory();
    let key = fingerprint("harbor at dawn");

    assert!(cache.put(key.clone(), asset("a")).await);
    assert_eq!(cache.get(&key).await, Some(asset("a")));
}

#[tokio::test]
async fn test_cache_miss() {
    let cache = ResultCache::in_memory();
    assert!(cache.get(&fingerprint("never stored")).await.is_none());
}

#[tokio::test]
async fn test_first_write_wins() {
    let cache = ResultCache::in_memory();
    let key = fingerprint("harbor at dawn");

    assert!(cache.put(key.clone(), asset("first")).await);
    assert!(!cache.put(key.clone(), asset("second")).await, "second put must be a no-op");
    assert_eq!(cache.get(&key).await, Some(asset("first")));
}

#[tokio::test]
async fn test_purge_allows_rewrite() {
    let cache = ResultCache::in_memory();
    let key = fingerprint("harbor at dawn");

    cache.put(key.clone(), asset("first")).await;
    assert!(cache.purge(&key).await);
    assert!(cache.get(&key).await.is_none());
    assert!(!cache.purge(&key).await);

    assert!(cache.put(key.clone(), asset("second")).await);
    assert_eq!(cache.get(&key).await, Some(asset("second")));
}

#[tokio::test]
async fn test_disabled_cache_never_hits() {
    let cache = ResultCache::new(ResultCacheConfig::default().with_enabled(false));
    let key = fingerprint("harbor at dawn");

    assert!(!cache.put(key.clone(), asset("a")).await);
    assert!(cache.get(&key).await.is_none());
}

#[tokio::test]
async fn test_entries_survive_restart() {
    let dir = TempDir::new().unwrap();
    let key = fingerprint("harbor at dawn");

    {
        let cache = ResultCache::new(disk_config(&dir));
        cache.put(key.clone(), asset("persisted")).await;
    }

    let reopened = ResultCache::new(disk_config(&dir));
    assert!(reopened.is_empty().await);
    assert_eq!(reopened.get(&key).await, Some(asset("persisted")));
    assert!(!reopened.put(key.clone(), asset("other")).await);
}

#[tokio::test]
async fn test_corrupt_entry_is_a_miss() {
    let dir = TempDir::new().unwrap();
    let key = fingerprint("harbor at dawn");
    let shard = dir.path().join(&key.as_str()[0..2]);
    std::fs::create_dir_all(&shard).unwrap();
    std::fs::write(shard.join(format!("{}.json", key)), b"{ not json").unwrap();

    let cache = ResultCache::new(disk_config(&dir));
    assert!(cache.get(&key).await.is_none());

    // A corrupt entry does not block a fresh write
    assert!(cache.put(key.clone(), asset("fresh")).await);
    let reopened = ResultCache::new(disk_config(&dir));
    assert_eq!(reopened.get(&key).await, Some(asset("fresh")));
}

#[tokio::test]
async fn test_mismatched_record_is_a_miss() {
    let dir = TempDir::new().unwrap();
    let stored = fingerprint("harbor at dawn");
    let other = fingerprint("desert at dusk");

    let cache = ResultCache::new(disk_config(&dir));
    cache.put(stored.clone(), asset("a")).await;

    // Copy the record under a different fingerprint's path
    let src = dir.path().join(&stored.as_str()[0..2]).join(format!("{}.json", stored));
    let dst_dir = dir.path().join(&other.as_str()[0..2]);
    std::fs::create_dir_all(&dst_dir).unwrap();
    std::fs::copy(src, dst_dir.join(format!("{}.json", other))).unwrap();

    let reopened = ResultCache::new(disk_config(&dir));
    assert!(reopened.get(&other).await.is_none());
}
