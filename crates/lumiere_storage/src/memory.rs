//! In-memory asset storage.

use crate::{AssetStore, content_hash, verify_hash};
use lumiere_core::{AssetMetadata, AssetRef};
use lumiere_error::{LumiereResult, StorageError, StorageErrorKind};
use std::collections::HashMap;
use tokio::sync::RwLock;

const BACKEND: &str = "memory";

/// Asset store keeping bytes in a map keyed by content hash.
#[derive(Debug, Default)]
pub struct MemoryAssetStore {
    assets: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryAssetStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct assets held.
    pub async fn len(&self) -> usize {
        self.assets.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.assets.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl AssetStore for MemoryAssetStore {
    async fn put(&self, data: &[u8], metadata: &AssetMetadata) -> LumiereResult<AssetRef> {
        let hash = content_hash(data);
        self.assets
            .write()
            .await
            .entry(hash.clone())
            .or_insert_with(|| data.to_vec());
        tracing::debug!(hash = %hash, size = data.len(), "Stored asset in memory");
        Ok(AssetRef {
            content_hash: hash.clone(),
            backend: BACKEND.to_string(),
            location: hash,
            size_bytes: data.len() as u64,
            kind: metadata.kind,
            mime_type: metadata.mime_type.clone(),
        })
    }

    async fn get(&self, reference: &AssetRef) -> LumiereResult<Vec<u8>> {
        let data = self
            .assets
            .read()
            .await
            .get(&reference.location)
            .cloned()
            .ok_or_else(|| StorageError::new(StorageErrorKind::NotFound(reference.location.clone())))?;
        verify_hash(&data, &reference.content_hash)?;
        Ok(data)
    }

    async fn delete(&self, reference: &AssetRef) -> LumiereResult<()> {
        self.assets
            .write()
            .await
            .remove(&reference.location)
            .map(|_| ())
            .ok_or_else(|| StorageError::new(StorageErrorKind::NotFound(reference.location.clone())).into())
    }

    async fn exists(&self, reference: &AssetRef) -> LumiereResult<bool> {
        Ok(self.assets.read().await.contains_key(&reference.location))
    }
}
