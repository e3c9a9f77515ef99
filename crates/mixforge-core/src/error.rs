//! Mixforge Error Definitions
//!
//! Defines the aggregate error type used at module boundaries.

use thiserror::Error;

use crate::ffmpeg::FFmpegError;
use crate::render::BuildError;

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Tooling Errors
    // =========================================================================
    #[error(transparent)]
    FFmpeg(#[from] FFmpegError),

    // =========================================================================
    // Render Errors
    // =========================================================================
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("Render worker stopped unexpectedly: {0}")]
    WorkerLost(String),

    // =========================================================================
    // Playlist Errors
    // =========================================================================
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Track index out of range: {0}")]
    TrackIndexOutOfRange(usize),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("Settings error: {0}")]
    Settings(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;
