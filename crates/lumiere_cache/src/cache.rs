//! Result cache implementation.

use chrono::{DateTime, Utc};
use derive_getters::Getters;
use lumiere_core::{AssetRef, Fingerprint};
use lumiere_error::{CacheError, CacheErrorKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Persisted cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct CacheRecord {
    fingerprint: Fingerprint,
    asset: AssetRef,
    written_at: DateTime<Utc>,
}

/// Configuration for the result cache.
#[derive(
    Debug, Clone, PartialEq, Serialize, Deserialize, Getters, derive_setters::Setters, derive_builder::Builder,
)]
#[setters(prefix = "with_")]
#[builder(default)]
pub struct ResultCacheConfig {
    /// Whether lookups and writes are performed at all
    #[serde(default = "default_enabled")]
    enabled: bool,

    /// Directory for persisted entries; memory only when unset
    #[serde(default)]
    directory: Option<PathBuf>,
}

fn default_enabled() -> bool {
    true
}

impl Default for ResultCacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            directory: None,
        }
    }
}

/// Write-once cache of generation results.
///
/// The first `put` for a fingerprint wins; later puts are no-ops, so
/// `put(f, x); get(f) == x` holds for the life of the entry. Entries are
/// only removed through [`ResultCache::purge`]. A persisted entry that cannot
/// be read or does not match its fingerprint is reported as a miss.
///
/// # Example
///
/// ```
/// use lumiere_cache::ResultCache;
/// use lumiere_core::{AssetKind, AssetRef, Fingerprint, ProviderParams};
///
/// # async fn example() {
/// let cache = ResultCache::in_memory();
/// let fingerprint = Fingerprint::compute("a kite", "sim", &ProviderParams::default(), None);
/// let asset = AssetRef {
///     content_hash: "ab".repeat(32),
///     backend: "memory".to_string(),
///     location: "ab".repeat(32),
///     size_bytes: 10,
///     kind: AssetKind::Clip,
///     mime_type: "video/mp4".to_string(),
/// };
///
/// assert!(cache.put(fingerprint.clone(), asset.clone()).await);
/// assert_eq!(cache.get(&fingerprint).await, Some(asset));
/// # }
/// ```
#[derive(Debug)]
pub struct ResultCache {
    config: ResultCacheConfig,
    entries: RwLock<HashMap<Fingerprint, CacheRecord>>,
}

impl ResultCache {
    /// Create a cache with configuration.
    pub fn new(config: ResultCacheConfig) -> Self {
        tracing::debug!(
            enabled = config.enabled,
            directory = ?config.directory,
            "Creating new ResultCache"
        );
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Create an enabled, memory-only cache.
    pub fn in_memory() -> Self {
        Self::new(ResultCacheConfig::default())
    }

    /// Active configuration.
    pub fn config(&self) -> &ResultCacheConfig {
        &self.config
    }

    /// Look up the asset stored for `fingerprint`.
    #[tracing::instrument(skip(self), fields(fingerprint = %fingerprint))]
    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<AssetRef> {
        if !self.config.enabled {
            tracing::debug!("Cache disabled, returning None");
            return None;
        }

        if let Some(record) = self.entries.read().await.get(fingerprint) {
            tracing::debug!("Cache hit");
            return Some(record.asset.clone());
        }

        let record = self.load_persisted(fingerprint).await?;
        let asset = record.asset.clone();
        self.entries
            .write()
            .await
            .entry(fingerprint.clone())
            .or_insert(record);
        tracing::debug!("Cache hit from disk");
        Some(asset)
    }

    /// Store `asset` under `fingerprint` unless an entry already exists.
    ///
    /// Returns `true` when this call wrote the entry.
    #[tracing::instrument(skip(self, asset), fields(fingerprint = %fingerprint, hash = %asset.content_hash))]
    pub async fn put(&self, fingerprint: Fingerprint, asset: AssetRef) -> bool {
        if !self.config.enabled {
            tracing::debug!("Cache disabled, skipping put");
            return false;
        }

        // Held across the disk check so concurrent writers cannot both win
        let mut entries = self.entries.write().await;
        if entries.contains_key(&fingerprint) {
            tracing::debug!("Entry exists, first write wins");
            return false;
        }
        if let Some(record) = self.load_persisted(&fingerprint).await {
            tracing::debug!("Persisted entry exists, first write wins");
            entries.insert(fingerprint, record);
            return false;
        }

        let record = CacheRecord {
            fingerprint: fingerprint.clone(),
            asset,
            written_at: Utc::now(),
        };
        if let Err(e) = self.persist(&record).await {
            tracing::warn!(error = %e, "Failed to persist cache entry, keeping it in memory");
        }
        entries.insert(fingerprint, record);
        tracing::debug!(cache_size = entries.len(), "Inserted cache entry");
        true
    }

    /// Remove the entry for `fingerprint`. Returns `true` if one existed.
    #[tracing::instrument(skip(self), fields(fingerprint = %fingerprint))]
    pub async fn purge(&self, fingerprint: &Fingerprint) -> bool {
        let mut entries = self.entries.write().await;
        let in_memory = entries.remove(fingerprint).is_some();

        let on_disk = match self.entry_path(fingerprint) {
            Some(path) => match tokio::fs::remove_file(&path).await {
                Ok(()) => true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove cache file");
                    false
                }
            },
            None => false,
        };

        let removed = in_memory || on_disk;
        tracing::info!(removed, "Purged cache entry");
        removed
    }

    /// Number of entries loaded in memory.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if no entries are loaded in memory.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn entry_path(&self, fingerprint: &Fingerprint) -> Option<PathBuf> {
        let dir = self.config.directory.as_ref()?;
        let hex = fingerprint.as_str();
        let shard = hex.get(0..2).unwrap_or("00");
        Some(dir.join(shard).join(format!("{}.json", hex)))
    }

    async fn load_persisted(&self, fingerprint: &Fingerprint) -> Option<CacheRecord> {
        let path = self.entry_path(fingerprint)?;
        match read_record(&path, fingerprint).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable cache entry");
                None
            }
        }
    }

    async fn persist(&self, record: &CacheRecord) -> Result<(), CacheError> {
        let Some(path) = self.entry_path(&record.fingerprint) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::new(CacheErrorKind::Io(format!("{}: {}", parent.display(), e))))?;
        }
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| CacheError::new(CacheErrorKind::Serialization(e.to_string())))?;
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, json)
            .await
            .map_err(|e| CacheError::new(CacheErrorKind::Io(format!("{}: {}", temp_path.display(), e))))?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|e| CacheError::new(CacheErrorKind::Io(format!("{}: {}", path.display(), e))))?;
        Ok(())
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Read a persisted record. `Ok(None)` means no file.
async fn read_record(path: &Path, fingerprint: &Fingerprint) -> Result<Option<CacheRecord>, CacheError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::new(CacheErrorKind::Io(e.to_string()))),
    };
    let record: CacheRecord = serde_json::from_slice(&bytes).map_err(|e| {
        CacheError::new(CacheErrorKind::Corrupt {
            fingerprint: fingerprint.to_string(),
            reason: e.to_string(),
        })
    })?;
    if &record.fingerprint != fingerprint {
        return Err(CacheError::new(CacheErrorKind::Corrupt {
            fingerprint: fingerprint.to_string(),
            reason: format!("record belongs to {}", record.fingerprint),
        }));
    }
    Ok(Some(record))
}
