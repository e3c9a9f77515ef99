//! Mixforge Core Library
//!
//! Builds and runs FFmpeg renders for two jobs: concatenating audio tracks
//! into one mix, and looping a video for the length of a set of tracks.
//! Hardware encoders are used when the installed FFmpeg ships them, with a
//! single software retry when a hardware attempt fails.

pub mod error;
pub mod ffmpeg;
pub mod logging;
pub mod playlist;
pub mod process;
pub mod render;
pub mod settings;
pub mod timestamps;

pub use error::{CoreError, CoreResult};
