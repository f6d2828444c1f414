//! The toolchain seam between the job pipeline and the external tools.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::command::locate_tool;
use crate::diagnostics::collect_decode_log;
use crate::error::MediaResult;
use crate::inspect::inspect_media;

/// The two analysis stages a job runs against its staged input.
///
/// Implementations must honour the cancellation receiver: once it reads
/// `true`, an in-flight tool run is abandoned with [`crate::MediaError::Cancelled`].
#[async_trait]
pub trait MediaToolchain: Send + Sync {
    /// Cheap metadata inspection; returns the tool's structured text output.
    async fn inspect(&self, input: &Path, cancel_rx: watch::Receiver<bool>) -> MediaResult<String>;

    /// Full decode pass; returns the complete combined output stream.
    async fn deep_analyze(&self, input: &Path, cancel_rx: watch::Receiver<bool>) -> MediaResult<String>;
}

/// Toolchain backed by the `ffprobe` and `ffmpeg` binaries.
#[derive(Debug, Clone)]
pub struct FfmpegToolchain {
    ffprobe: String,
    ffmpeg: String,
}

impl Default for FfmpegToolchain {
    fn default() -> Self {
        Self::new("ffprobe", "ffmpeg")
    }
}

impl FfmpegToolchain {
    /// Create a toolchain using the given binary names or paths.
    pub fn new(ffprobe: impl Into<String>, ffmpeg: impl Into<String>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
            ffmpeg: ffmpeg.into(),
        }
    }

    /// Report where (and whether) each binary resolves.
    pub fn availability(&self) -> ToolAvailability {
        ToolAvailability {
            ffprobe: locate_tool(&self.ffprobe),
            ffmpeg: locate_tool(&self.ffmpeg),
        }
    }
}

#[async_trait]
impl MediaToolchain for FfmpegToolchain {
    async fn inspect(&self, input: &Path, cancel_rx: watch::Receiver<bool>) -> MediaResult<String> {
        inspect_media(&self.ffprobe, input, Some(cancel_rx)).await
    }

    async fn deep_analyze(&self, input: &Path, cancel_rx: watch::Receiver<bool>) -> MediaResult<String> {
        collect_decode_log(&self.ffmpeg, input, Some(cancel_rx)).await
    }
}

/// Resolved locations of the analysis binaries.
#[derive(Debug, Clone, Default)]
pub struct ToolAvailability {
    pub ffprobe: Option<PathBuf>,
    pub ffmpeg: Option<PathBuf>,
}

impl ToolAvailability {
    pub fn all_present(&self) -> bool {
        self.ffprobe.is_some() && self.ffmpeg.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MediaError;

    #[tokio::test]
    async fn test_missing_input_fails_inspection() {
        let toolchain = FfmpegToolchain::default();
        let (_tx, rx) = watch::channel(false);
        let result = toolchain.inspect(Path::new("/nonexistent/in.mp4"), rx).await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }

    #[test]
    fn test_unresolvable_binaries_reported() {
        let toolchain = FfmpegToolchain::new("vprobe-no-ffprobe", "vprobe-no-ffmpeg");
        let availability = toolchain.availability();
        assert!(availability.ffprobe.is_none());
        assert!(!availability.all_present());
    }
}
