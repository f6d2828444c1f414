//! Full decode pass and diagnostic line extraction.
//!
//! The decode pass runs `ffmpeg -i <input> -vf showinfo -f null -`, which
//! decodes every frame without writing output and reports per-frame info plus
//! any decoder complaints on stderr.

use std::path::Path;

use tokio::sync::watch;
use tracing::debug;

use crate::command::{locate_tool, OutputCapture, ToolCommand, ToolRunner};
use crate::error::{MediaError, MediaResult};

/// Substrings that mark a decode log line as diagnostic.
///
/// Matching is a case-sensitive substring test, so unrelated lines that merely
/// contain one of these (a file name with "error" in it, say) are kept too.
pub const DIAGNOSTIC_KEYWORDS: [&str; 4] = ["error", "warning", "NAL unit", "decode"];

/// Build the ffmpeg decode-only invocation.
pub fn decode_command(ffmpeg: &str, path: &Path) -> ToolCommand {
    ToolCommand::new(ffmpeg)
        .arg("-i")
        .path_arg(path)
        .args(["-vf", "showinfo", "-f", "null", "-"])
}

/// Decode the whole input and return ffmpeg's combined stdout/stderr output.
pub async fn collect_decode_log(
    ffmpeg: &str,
    path: impl AsRef<Path>,
    cancel_rx: Option<watch::Receiver<bool>>,
) -> MediaResult<String> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    locate_tool(ffmpeg).ok_or_else(|| MediaError::FfmpegNotFound(ffmpeg.to_string()))?;

    let mut runner = ToolRunner::new();
    if let Some(cancel_rx) = cancel_rx {
        runner = runner.with_cancel(cancel_rx);
    }

    let output = runner
        .run(&decode_command(ffmpeg, path), OutputCapture::Combined)
        .await?;

    if !output.success {
        return Err(MediaError::ffmpeg_failed(
            "FFmpeg exited with non-zero status",
            Some(output.stderr),
            output.exit_code,
        ));
    }

    debug!(path = %path.display(), bytes = output.text.len(), "ffmpeg decode pass finished");
    Ok(output.text)
}

/// Check whether a single log line carries a diagnostic keyword.
pub fn is_diagnostic_line(line: &str) -> bool {
    DIAGNOSTIC_KEYWORDS.iter().any(|keyword| line.contains(keyword))
}

/// Keep only diagnostic lines, in their original order, joined with `\n`.
pub fn extract_diagnostics(log: &str) -> String {
    log.lines()
        .filter(|line| is_diagnostic_line(line))
        .collect::<Vec<_>>()
        .join("\n")
}
