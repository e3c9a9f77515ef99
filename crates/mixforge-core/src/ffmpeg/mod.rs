//! FFmpeg Integration Module
//!
//! Everything that talks to the external `ffmpeg`/`ffprobe` binaries apart
//! from the render itself:
//! - Locating and validating the binaries
//! - Querying which encoders the installed build ships
//! - Probing media durations and video stream parameters
//! - Parsing the machine-readable `-progress` stream

mod capabilities;
mod detection;
mod probe;
mod progress;

pub use capabilities::{parse_encoder_listing, query_encoders, EncoderSet};
pub use detection::{detect_ffmpeg, validate_ffmpeg, FFmpegInfo, ToolOverrides};
pub use probe::{
    parse_duration_output, parse_video_info_output, FrameRate, MediaDuration, MediaProber,
    Resolution, VideoInfo,
};
pub use progress::{format_eta, ProgressLine, ProgressSample, ProgressTracker};

/// FFmpeg-related error types
#[derive(Debug, thiserror::Error)]
pub enum FFmpegError {
    #[error("{0} not found. Install FFmpeg or place the binaries next to the executable.")]
    NotFound(&'static str),

    #[error("FFmpeg execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Could not list encoders: {0}")]
    CapabilityQuery(String),

    #[error("FFprobe error: {0}")]
    ProbeError(String),

    #[error("Process error: {0}")]
    ProcessError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),
}

pub type FFmpegResult<T> = Result<T, FFmpegError>;
