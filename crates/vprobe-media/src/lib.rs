#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for media analysis.
//!
//! This crate provides:
//! - A small command builder and runner for external tools, with stream capture
//!   and cancellation via a tokio `watch` channel
//! - Metadata inspection through `ffprobe`
//! - Full decode passes through `ffmpeg` and keyword-based diagnostic extraction
//! - The [`MediaToolchain`] seam the job pipeline drives

pub mod command;
pub mod diagnostics;
pub mod error;
pub mod inspect;
pub mod toolchain;

pub use command::{cancelled, locate_tool, OutputCapture, ToolCommand, ToolOutput, ToolRunner};
pub use diagnostics::{collect_decode_log, extract_diagnostics, is_diagnostic_line, DIAGNOSTIC_KEYWORDS};
pub use error::{MediaError, MediaResult};
pub use inspect::inspect_media;
pub use toolchain::{FfmpegToolchain, MediaToolchain, ToolAvailability};
