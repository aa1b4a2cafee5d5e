//! Filesystem-based asset storage implementation.

use crate::{AssetStore, content_hash, verify_hash};
use lumiere_core::{AssetKind, AssetMetadata, AssetRef};
use lumiere_error::{LumiereResult, StorageError, StorageErrorKind};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const BACKEND: &str = "filesystem";

/// Filesystem storage backend.
///
/// Stores assets in a content-addressable structure:
/// `{base_path}/{kind}/{hash[0:2]}/{hash[2:4]}/{hash}`
///
/// ```text
/// /var/lumiere/assets/
/// ├── clip/
/// │   └── ab/
/// │       └── cd/
/// │           └── abcdef123456...  (MP4)
/// └── frame/
///     └── 12/
///         └── 34/
///             └── 123456abcdef...  (PNG)
/// ```
#[derive(Debug, Clone)]
pub struct FileSystemAssetStore {
    base_path: PathBuf,
}

impl FileSystemAssetStore {
    /// Create a new filesystem store, creating the base directory if needed.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created.
    #[tracing::instrument(skip(base_path))]
    pub fn new(base_path: impl Into<PathBuf>) -> LumiereResult<Self> {
        let base_path = base_path.into();

        std::fs::create_dir_all(&base_path).map_err(|e| {
            StorageError::new(StorageErrorKind::DirectoryCreation(format!(
                "{}: {}",
                base_path.display(),
                e
            )))
        })?;

        tracing::info!(path = %base_path.display(), "Created filesystem asset store");
        Ok(Self { base_path })
    }

    /// Root directory of the store.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn path_for(&self, hash: &str, kind: AssetKind) -> PathBuf {
        self.base_path
            .join(kind.as_str())
            .join(&hash[0..2])
            .join(&hash[2..4])
            .join(hash)
    }

    fn reference(&self, hash: String, path: &Path, size: usize, metadata: &AssetMetadata) -> AssetRef {
        AssetRef {
            content_hash: hash,
            backend: BACKEND.to_string(),
            location: path.to_string_lossy().to_string(),
            size_bytes: size as u64,
            kind: metadata.kind,
            mime_type: metadata.mime_type.clone(),
        }
    }

    /// Whether `path` already holds bytes hashing to `hash`.
    async fn holds_content(path: &Path, hash: &str) -> bool {
        match tokio::fs::read(path).await {
            Ok(existing) => content_hash(&existing) == hash,
            Err(_) => false,
        }
    }

    fn check_backend(reference: &AssetRef) -> LumiereResult<()> {
        if reference.backend != BACKEND {
            return Err(StorageError::new(StorageErrorKind::ForeignReference(
                reference.backend.clone(),
            ))
            .into());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AssetStore for FileSystemAssetStore {
    #[tracing::instrument(skip(self, data, metadata), fields(size = data.len(), kind = %metadata.kind))]
    async fn put(&self, data: &[u8], metadata: &AssetMetadata) -> LumiereResult<AssetRef> {
        let hash = content_hash(data);
        let path = self.path_for(&hash, metadata.kind);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::debug!(hash = %hash, path = %path.display(), "Asset already stored");
            return Ok(self.reference(hash, &path, data.len(), metadata));
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::new(StorageErrorKind::DirectoryCreation(format!(
                    "{}: {}",
                    parent.display(),
                    e
                )))
            })?;
        }

        // Temp file then rename so readers never see a partial asset.
        // Each writer gets its own temp name; identical content may race here.
        let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&temp_path, data).await.map_err(|e| {
            StorageError::new(StorageErrorKind::FileWrite(format!(
                "{}: {}",
                temp_path.display(),
                e
            )))
        })?;

        if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            if Self::holds_content(&path, &hash).await {
                tracing::debug!(hash = %hash, "Concurrent writer stored the asset first");
                return Ok(self.reference(hash, &path, data.len(), metadata));
            }
            return Err(StorageError::new(StorageErrorKind::FileWrite(format!(
                "rename {} to {}: {}",
                temp_path.display(),
                path.display(),
                e
            )))
            .into());
        }

        tracing::info!(
            hash = %hash,
            path = %path.display(),
            size = data.len(),
            kind = %metadata.kind,
            "Stored asset"
        );

        Ok(self.reference(hash, &path, data.len(), metadata))
    }

    #[tracing::instrument(skip(self, reference), fields(hash = %reference.content_hash))]
    async fn get(&self, reference: &AssetRef) -> LumiereResult<Vec<u8>> {
        Self::check_backend(reference)?;
        let path = Path::new(&reference.location);

        let data = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::new(StorageErrorKind::NotFound(reference.location.clone()))
            } else {
                StorageError::new(StorageErrorKind::FileRead(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
            }
        })?;

        verify_hash(&data, &reference.content_hash)?;

        tracing::debug!(size = data.len(), "Retrieved asset");
        Ok(data)
    }

    #[tracing::instrument(skip(self, reference), fields(hash = %reference.content_hash))]
    async fn delete(&self, reference: &AssetRef) -> LumiereResult<()> {
        Self::check_backend(reference)?;
        let path = Path::new(&reference.location);

        tokio::fs::remove_file(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::new(StorageErrorKind::NotFound(reference.location.clone()))
            } else {
                StorageError::new(StorageErrorKind::FileWrite(format!(
                    "delete {}: {}",
                    path.display(),
                    e
                )))
            }
        })?;

        tracing::info!(path = %path.display(), "Deleted asset");
        Ok(())
    }

    async fn exists(&self, reference: &AssetRef) -> LumiereResult<bool> {
        if reference.backend != BACKEND {
            return Ok(false);
        }
        Ok(tokio::fs::try_exists(Path::new(&reference.location))
            .await
            .unwrap_or(false))
    }
}
