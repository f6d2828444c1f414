//! FFprobe media inspection.

use std::path::Path;

use tokio::sync::watch;
use tracing::debug;

use crate::command::{locate_tool, OutputCapture, ToolCommand, ToolRunner};
use crate::error::{MediaError, MediaResult};

/// Build the ffprobe invocation that dumps container and stream metadata as JSON.
pub fn probe_command(ffprobe: &str, path: &Path) -> ToolCommand {
    ToolCommand::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .path_arg(path)
}

/// Inspect a media file and return ffprobe's JSON report verbatim.
pub async fn inspect_media(
    ffprobe: &str,
    path: impl AsRef<Path>,
    cancel_rx: Option<watch::Receiver<bool>>,
) -> MediaResult<String> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    locate_tool(ffprobe).ok_or_else(|| MediaError::FfprobeNotFound(ffprobe.to_string()))?;

    let mut runner = ToolRunner::new();
    if let Some(cancel_rx) = cancel_rx {
        runner = runner.with_cancel(cancel_rx);
    }

    let output = runner
        .run(&probe_command(ffprobe, path), OutputCapture::Stdout)
        .await?;

    if !output.success {
        return Err(MediaError::ffprobe_failed(
            "FFprobe exited with non-zero status",
            Some(output.stderr),
            output.exit_code,
        ));
    }

    debug!(path = %path.display(), bytes = output.text.len(), "ffprobe finished");
    Ok(output.text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_command_args() {
        let cmd = probe_command("ffprobe", Path::new("uploads/upload-1.mp4"));
        assert_eq!(
            cmd.build_args(),
            vec![
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "uploads/upload-1.mp4"
            ]
        );
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let result = inspect_media("ffprobe", "/nonexistent/upload-404.mp4", None).await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_probe_missing_binary() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let result = inspect_media("vprobe-no-such-ffprobe", file.path(), None).await;
        assert!(matches!(result, Err(MediaError::FfprobeNotFound(_))));
    }
}
