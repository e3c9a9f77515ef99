//! Render Module
//!
//! Builds ffmpeg commands for audio mixes and looped-video renders, runs them
//! on a worker task and reports typed progress and outcome events.

mod builder;
mod config;
mod encoder;
mod events;
mod filter_graph;
mod journal;
mod monitor;
mod resolver;
mod runner;
mod session;

pub use builder::{BuiltCommand, CommandBuilder};
pub use config::{
    AacBitrate, Acceleration, AudioFormat, CodecFamily, FrameRateChoice, JobKind, Mp3Bitrate,
    ParseChoiceError, Quality, RenderConfig, RenderRequest, ResolutionChoice,
};
pub use encoder::{
    constant_quality, select_encoder, software_encoder, software_preset, videotoolbox_bitrate,
    EncoderRequest, FramePath, HardwareFamily, ResolvedEncoder,
};
pub use events::{CancelToken, EventReceiver, EventSender, RenderEvent, RenderOutcome};
pub use filter_graph::{escape_filter_value, Filter, FilterChain, FilterGraph, StreamLabel};
pub use journal::{JournalEntry, RenderJournal};
pub use monitor::monitor_progress;
pub use resolver::resolve_outcome;
pub use runner::{progress_args, AttemptOutcome, AttemptRunner, FfmpegRunner, ProgressStream};
pub use session::{RenderHandle, RenderSession};

/// Reasons a render cannot be turned into a command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("No audio tracks selected")]
    NoAudioTracks,

    #[error("Total audio duration is zero; check that the audio files are readable")]
    ZeroDuration,

    #[error("Encoder '{encoder}' is not available in this FFmpeg build")]
    CodecUnavailable { encoder: String },
}
