//! Tests for the asset store backends.

use lumiere_core::{AssetKind, AssetMetadata};
use lumiere_error::{LumiereErrorKind, StorageErrorKind};
use lumiere_storage::{AssetStore, FileSystemAssetStore, MemoryAssetStore, content_hash};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_store_and_retrieve() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileSystemAssetStore::new(temp_dir.path()).unwrap();

    let data = b"fake mp4 payload";
    let reference = store.put(data, &AssetMetadata::clip()).await.unwrap();

    assert_eq!(reference.backend, "filesystem");
    assert_eq!(reference.kind, AssetKind::Clip);
    assert_eq!(reference.mime_type, "video/mp4");
    assert_eq!(reference.size_bytes, data.len() as u64);
    assert_eq!(reference.content_hash, content_hash(data));
    assert!(reference.location.contains("clip"));

    let retrieved = store.get(&reference).await.unwrap();
    assert_eq!(retrieved, data);
}

#[tokio::test]
async fn test_deduplication() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileSystemAssetStore::new(temp_dir.path()).unwrap();

    let ref1 = store.put(b"same frame", &AssetMetadata::frame()).await.unwrap();
    let ref2 = store.put(b"same frame", &AssetMetadata::frame()).await.unwrap();

    assert_eq!(ref1, ref2);
    assert!(std::path::Path::new(&ref1.location).exists());
}

#[tokio::test]
async fn test_hash_verification_detects_tampering() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileSystemAssetStore::new(temp_dir.path()).unwrap();

    let reference = store.put(b"original", &AssetMetadata::clip()).await.unwrap();
    std::fs::write(&reference.location, b"tampered").unwrap();

    let err = store.get(&reference).await.unwrap_err();
    match err.kind() {
        LumiereErrorKind::Storage(e) => {
            assert!(matches!(e.kind, StorageErrorKind::HashMismatch { .. }))
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_delete_and_exists() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileSystemAssetStore::new(temp_dir.path()).unwrap();

    let reference = store.put(b"short lived", &AssetMetadata::clip()).await.unwrap();
    assert!(store.exists(&reference).await.unwrap());

    store.delete(&reference).await.unwrap();
    assert!(!store.exists(&reference).await.unwrap());
    assert!(store.get(&reference).await.is_err());
}

#[tokio::test]
async fn test_memory_store_round_trip() {
    let store = MemoryAssetStore::new();
    let reference = store.put(b"frame", &AssetMetadata::frame()).await.unwrap();
    assert_eq!(reference.backend, "memory");
    assert_eq!(store.get(&reference).await.unwrap(), b"frame");
    assert_eq!(store.len().await, 1);

    store.delete(&reference).await.unwrap();
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_filesystem_rejects_foreign_reference() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileSystemAssetStore::new(temp_dir.path()).unwrap();
    let memory = MemoryAssetStore::new();
    let reference = memory.put(b"elsewhere", &AssetMetadata::clip()).await.unwrap();

    assert!(store.get(&reference).await.is_err());
    assert!(!store.exists(&reference).await.unwrap());
}

fn leftover_temp_files(dir: &std::path::Path) -> usize {
    let mut count = 0;
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            count += leftover_temp_files(&path);
        } else if path.extension().is_some_and(|ext| ext == "tmp") {
            count += 1;
        }
    }
    count
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_puts_of_same_content() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(FileSystemAssetStore::new(temp_dir.path()).unwrap());

    for round in 0..50 {
        let data = format!("identical clip bytes, round {}", round).into_bytes();
        let writers = (0..4).map(|_| {
            let store = store.clone();
            let data = data.clone();
            tokio::spawn(async move { store.put(&data, &AssetMetadata::clip()).await })
        });

        let results = futures::future::join_all(writers).await;
        let references: Vec<_> = results
            .into_iter()
            .map(|joined| joined.unwrap().expect("Every concurrent put should succeed"))
            .collect();

        assert!(references.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(store.get(&references[0]).await.unwrap(), data);
    }

    assert_eq!(leftover_temp_files(temp_dir.path()), 0);
}
