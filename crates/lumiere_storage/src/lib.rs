//! Content-addressable asset storage for Lumiere.
//!
//! Generated clips and continuity frames are persisted through the
//! [`AssetStore`] trait. The pipeline only carries [`AssetRef`]s between
//! states and loads bytes when a stage needs them.
//!
//! # Features
//!
//! - **Content-addressable storage**: Assets stored by SHA-256 hash for automatic deduplication
//! - **Pluggable backends**: filesystem for real runs, memory for tests and dry runs
//! - **Atomic writes**: temp file + rename on the filesystem backend
//!
//! # Example
//!
//! ```rust
//! use lumiere_core::AssetMetadata;
//! use lumiere_storage::{AssetStore, MemoryAssetStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryAssetStore::new();
//! let reference = store.put(b"clip bytes", &AssetMetadata::clip()).await?;
//! assert_eq!(store.get(&reference).await?, b"clip bytes");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod filesystem;
mod memory;

use async_trait::async_trait;
use lumiere_core::{AssetMetadata, AssetRef};
use lumiere_error::LumiereResult;
use sha2::{Digest, Sha256};

pub use filesystem::FileSystemAssetStore;
pub use lumiere_error::{StorageError, StorageErrorKind};
pub use memory::MemoryAssetStore;

/// Trait for pluggable asset storage backends.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Store bytes and return a reference.
    ///
    /// Identical content yields references with the same content hash.
    async fn put(&self, data: &[u8], metadata: &AssetMetadata) -> LumiereResult<AssetRef>;

    /// Retrieve bytes by reference, verifying the content hash.
    async fn get(&self, reference: &AssetRef) -> LumiereResult<Vec<u8>>;

    /// Delete an asset.
    async fn delete(&self, reference: &AssetRef) -> LumiereResult<()>;

    /// Check whether an asset exists.
    async fn exists(&self, reference: &AssetRef) -> LumiereResult<bool>;
}

/// Compute the SHA-256 hex digest of `data`.
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Verify content hash matches expected hash.
pub(crate) fn verify_hash(data: &[u8], expected_hash: &str) -> LumiereResult<()> {
    let actual_hash = content_hash(data);
    if actual_hash != expected_hash {
        return Err(StorageError::new(StorageErrorKind::HashMismatch {
            expected: expected_hash.to_string(),
            actual: actual_hash,
        })
        .into());
    }
    Ok(())
}
