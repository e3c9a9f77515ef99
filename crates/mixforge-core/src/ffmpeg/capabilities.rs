//! Encoder capability query.
//!
//! `ffmpeg -encoders` prints one line per encoder:
//!
//! ```text
//!  V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
//!  A....D aac                  AAC (Advanced Audio Coding)
//! ```
//!
//! Only video encoders matter for codec selection, so lines whose flag column
//! starts with `V` contribute their second token.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::debug;

use super::{FFmpegError, FFmpegResult};
use crate::process::tool_command;

/// Set of video encoder identifiers reported by the installed ffmpeg.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncoderSet {
    names: BTreeSet<String>,
}

impl EncoderSet {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, encoder: &str) -> bool {
        self.names.contains(encoder)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Run `ffmpeg -hide_banner -encoders` and collect the video encoders.
pub fn query_encoders(ffmpeg_path: &Path) -> FFmpegResult<EncoderSet> {
    let output = tool_command(ffmpeg_path)
        .args(["-hide_banner", "-encoders"])
        .output()
        .map_err(|e| FFmpegError::CapabilityQuery(e.to_string()))?;

    if !output.status.success() {
        return Err(FFmpegError::CapabilityQuery(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let set = parse_encoder_listing(&String::from_utf8_lossy(&output.stdout));
    debug!("ffmpeg reports {} video encoders", set.len());
    Ok(set)
}

/// Parse the text of `ffmpeg -encoders`.
pub fn parse_encoder_listing(listing: &str) -> EncoderSet {
    let names = listing.lines().filter_map(|line| {
        let mut tokens = line.split_whitespace();
        let flags = tokens.next()?;
        let name = tokens.next()?;
        // The legend (" V..... = Video") uses the same flag column.
        (flags.starts_with('V') && name != "=").then(|| name.to_string())
    });
    EncoderSet {
        names: names.collect(),
    }
}
