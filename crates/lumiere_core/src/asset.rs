//! Asset references and continuity anchors.

use crate::TakeId;
use serde::{Deserialize, Serialize};

/// Kind of stored asset.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// Generated video clip
    Clip,
    /// Still frame (continuity anchors)
    Frame,
}

impl AssetKind {
    /// Convert to string representation for storage paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Clip => "clip",
            AssetKind::Frame => "frame",
        }
    }
}

impl std::str::FromStr for AssetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clip" => Ok(AssetKind::Clip),
            "frame" => Ok(AssetKind::Frame),
            _ => Err(format!("Unknown asset kind: {}", s)),
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata about bytes being stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_new::new)]
pub struct AssetMetadata {
    /// Kind of asset
    pub kind: AssetKind,
    /// MIME type (e.g., "video/mp4", "image/png")
    pub mime_type: String,
}

impl AssetMetadata {
    /// Metadata for an MP4 clip.
    pub fn clip() -> Self {
        Self::new(AssetKind::Clip, "video/mp4".to_string())
    }

    /// Metadata for a PNG frame.
    pub fn frame() -> Self {
        Self::new(AssetKind::Frame, "image/png".to_string())
    }
}

/// Reference to bytes held by an asset store.
///
/// The pipeline passes references between states; raw bytes are only
/// loaded at the moment they are needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetRef {
    /// SHA-256 of the content
    pub content_hash: String,
    /// Store backend name (e.g., "filesystem", "memory")
    pub backend: String,
    /// Backend-specific location of the bytes
    pub location: String,
    /// Size of the content in bytes
    pub size_bytes: u64,
    /// Kind of asset
    pub kind: AssetKind,
    /// MIME type
    pub mime_type: String,
}

/// Final frame of a committed take, used to seed its dependent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_getters::Getters)]
pub struct ContinuityAnchor {
    /// Take the frame was extracted from
    take_id: TakeId,
    /// Stored frame
    image_ref: AssetRef,
}

impl ContinuityAnchor {
    /// Create an anchor for `take_id`.
    pub fn new(take_id: TakeId, image_ref: AssetRef) -> Self {
        Self { take_id, image_ref }
    }
}
