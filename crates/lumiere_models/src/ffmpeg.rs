//! Frame extraction with ffmpeg.

use async_trait::async_trait;
use lumiere_core::AssetRef;
use lumiere_error::{FrameError, FrameErrorKind, LumiereResult};
use lumiere_interface::FrameExtractor;
use lumiere_storage::AssetStore;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Keep the seek this far before the end so a frame always exists.
const END_MARGIN_SECS: f64 = 0.05;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    duration: Option<String>,
}

/// Extracts continuity frames by shelling out to ffprobe and ffmpeg.
///
/// The clip is copied from the asset store into a scratch directory, its
/// duration probed, and a single PNG frame taken at `duration * fraction`.
pub struct FfmpegFrameExtractor {
    store: Arc<dyn AssetStore>,
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
}

impl std::fmt::Debug for FfmpegFrameExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegFrameExtractor")
            .field("ffmpeg_path", &self.ffmpeg_path)
            .field("ffprobe_path", &self.ffprobe_path)
            .finish_non_exhaustive()
    }
}

impl FfmpegFrameExtractor {
    /// Use `ffmpeg` and `ffprobe` from `PATH`.
    pub fn new(store: Arc<dyn AssetStore>) -> Self {
        Self {
            store,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }

    /// Use explicit tool locations.
    pub fn with_tools(mut self, ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = ffmpeg.into();
        self.ffprobe_path = ffprobe.into();
        self
    }

    /// Seek position for `fraction` of a clip lasting `duration` seconds.
    fn seek_secs(duration: f64, fraction: f64) -> f64 {
        (duration * fraction).min((duration - END_MARGIN_SECS).max(0.0))
    }

    fn parse_duration(probe_json: &[u8]) -> Result<f64, FrameError> {
        let probe: ProbeOutput = serde_json::from_slice(probe_json).map_err(|e| {
            FrameError::new(FrameErrorKind::Probe(format!("bad ffprobe output: {}", e)))
        })?;
        probe
            .format
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0)
            .ok_or_else(|| {
                FrameError::new(FrameErrorKind::Probe("clip has no duration".to_string()))
            })
    }

    async fn probe_duration(&self, input: &Path) -> Result<f64, FrameError> {
        let output = tokio::process::Command::new(&self.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(input)
            .output()
            .await
            .map_err(|e| {
                FrameError::new(FrameErrorKind::Spawn {
                    tool: self.ffprobe_path.display().to_string(),
                    message: e.to_string(),
                })
            })?;

        if !output.status.success() {
            return Err(FrameError::new(FrameErrorKind::Probe(
                String::from_utf8_lossy(&output.stderr).to_string(),
            )));
        }
        Self::parse_duration(&output.stdout)
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    #[tracing::instrument(skip(self, asset), fields(asset = %asset.content_hash))]
    async fn extract(&self, asset: &AssetRef, time_fraction: f64) -> LumiereResult<Vec<u8>> {
        if !(0.0..=1.0).contains(&time_fraction) {
            return Err(
                FrameError::new(FrameErrorKind::InvalidFraction(time_fraction.to_string())).into(),
            );
        }

        let clip = self.store.get(asset).await?;
        let scratch = tempfile::tempdir()
            .map_err(|e| FrameError::new(FrameErrorKind::Scratch(e.to_string())))?;
        let input = scratch.path().join("clip.mp4");
        let frame_path = scratch.path().join("frame.png");
        tokio::fs::write(&input, &clip)
            .await
            .map_err(|e| FrameError::new(FrameErrorKind::Scratch(e.to_string())))?;

        let duration = self.probe_duration(&input).await?;
        let seek = Self::seek_secs(duration, time_fraction);
        tracing::debug!(duration, seek, "Extracting frame");

        let seek_arg = format!("{:.3}", seek);
        let output = tokio::process::Command::new(&self.ffmpeg_path)
            .args(["-ss", seek_arg.as_str(), "-i"])
            .arg(&input)
            .args(["-frames:v", "1", "-q:v", "2", "-y"])
            .arg(&frame_path)
            .output()
            .await
            .map_err(|e| {
                FrameError::new(FrameErrorKind::Spawn {
                    tool: self.ffmpeg_path.display().to_string(),
                    message: e.to_string(),
                })
            })?;

        if !output.status.success() {
            return Err(FrameError::new(FrameErrorKind::Extraction(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ))
            .into());
        }

        let frame = tokio::fs::read(&frame_path).await.map_err(|e| {
            FrameError::new(FrameErrorKind::Extraction(format!(
                "no frame written: {}",
                e
            )))
        })?;
        tracing::debug!(bytes = frame.len(), "Frame extracted");
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_duration() {
        let json = br#"{"format": {"duration": "5.042000"}, "streams": []}"#;
        let duration = FfmpegFrameExtractor::parse_duration(json).unwrap();
        assert!((duration - 5.042).abs() < 1e-9);

        let missing = br#"{"format": {}}"#;
        assert!(FfmpegFrameExtractor::parse_duration(missing).is_err());
    }

    #[test]
    fn test_seek_stays_inside_clip() {
        assert_eq!(FfmpegFrameExtractor::seek_secs(10.0, 0.5), 5.0);
        assert!((FfmpegFrameExtractor::seek_secs(10.0, 1.0) - 9.95).abs() < 1e-9);
        assert_eq!(FfmpegFrameExtractor::seek_secs(0.0, 0.9), 0.0);
    }
}
