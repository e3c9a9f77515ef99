//! Render configuration.
//!
//! A [`RenderRequest`] mirrors what the user picked and may still contain
//! "keep original" placeholders. [`RenderRequest::resolve`] probes the inputs
//! and produces an immutable [`RenderConfig`] that the command builder
//! consumes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ffmpeg::{FrameRate, MediaDuration, MediaProber, Resolution, VideoInfo};

// =============================================================================
// Choice enums
// =============================================================================

/// A string that does not name any variant of a choice enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind} '{value}' (expected one of: {expected})")]
pub struct ParseChoiceError {
    kind: &'static str,
    value: String,
    expected: &'static str,
}

impl ParseChoiceError {
    fn new(kind: &'static str, value: &str, expected: &'static str) -> Self {
        Self {
            kind,
            value: value.to_string(),
            expected,
        }
    }
}

/// Video codec family. The concrete encoder is picked by the builder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecFamily {
    #[default]
    H264,
    Hevc,
    Prores,
}

impl CodecFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodecFamily::H264 => "h264",
            CodecFamily::Hevc => "hevc",
            CodecFamily::Prores => "prores",
        }
    }
}

impl fmt::Display for CodecFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodecFamily {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h264" | "h.264" | "avc" => Ok(CodecFamily::H264),
            "hevc" | "h265" | "h.265" => Ok(CodecFamily::Hevc),
            "prores" => Ok(CodecFamily::Prores),
            _ => Err(ParseChoiceError::new("codec", s, "h264, hevc, prores")),
        }
    }
}

/// Quality tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Fast,
    #[default]
    Standard,
    High,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Fast => "fast",
            Quality::Standard => "standard",
            Quality::High => "high",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(Quality::Fast),
            "standard" => Ok(Quality::Standard),
            "high" => Ok(Quality::High),
            _ => Err(ParseChoiceError::new("quality", s, "fast, standard, high")),
        }
    }
}

/// Which encoder family to prefer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Acceleration {
    /// First hardware family the installed ffmpeg supports, else software.
    #[default]
    Auto,
    Software,
    Nvenc,
    Amf,
    Qsv,
    VideoToolbox,
}

impl Acceleration {
    pub fn as_str(&self) -> &'static str {
        match self {
            Acceleration::Auto => "auto",
            Acceleration::Software => "software",
            Acceleration::Nvenc => "nvenc",
            Acceleration::Amf => "amf",
            Acceleration::Qsv => "qsv",
            Acceleration::VideoToolbox => "videotoolbox",
        }
    }
}

impl fmt::Display for Acceleration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Acceleration {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Acceleration::Auto),
            "software" | "cpu" => Ok(Acceleration::Software),
            "nvenc" | "nvidia" => Ok(Acceleration::Nvenc),
            "amf" | "amd" => Ok(Acceleration::Amf),
            "qsv" | "intel" => Ok(Acceleration::Qsv),
            "videotoolbox" | "vt" => Ok(Acceleration::VideoToolbox),
            _ => Err(ParseChoiceError::new(
                "acceleration",
                s,
                "auto, software, nvenc, amf, qsv, videotoolbox",
            )),
        }
    }
}

/// Container/codec of an audio-only mix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    #[default]
    Mp3,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        }
    }

    pub fn encoder(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "pcm_s16le",
            AudioFormat::Mp3 => "libmp3lame",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for AudioFormat {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wav" => Ok(AudioFormat::Wav),
            "mp3" => Ok(AudioFormat::Mp3),
            _ => Err(ParseChoiceError::new("audio format", s, "wav, mp3")),
        }
    }
}

/// MP3 bitrate in kbit/s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Mp3Bitrate {
    K128,
    #[default]
    K192,
    K256,
    K320,
}

impl Mp3Bitrate {
    pub fn kbps(&self) -> u32 {
        match self {
            Mp3Bitrate::K128 => 128,
            Mp3Bitrate::K192 => 192,
            Mp3Bitrate::K256 => 256,
            Mp3Bitrate::K320 => 320,
        }
    }
}

impl TryFrom<u32> for Mp3Bitrate {
    type Error = ParseChoiceError;

    fn try_from(kbps: u32) -> Result<Self, Self::Error> {
        match kbps {
            128 => Ok(Mp3Bitrate::K128),
            192 => Ok(Mp3Bitrate::K192),
            256 => Ok(Mp3Bitrate::K256),
            320 => Ok(Mp3Bitrate::K320),
            _ => Err(ParseChoiceError::new(
                "mp3 bitrate",
                &kbps.to_string(),
                "128, 192, 256, 320",
            )),
        }
    }
}

impl From<Mp3Bitrate> for u32 {
    fn from(bitrate: Mp3Bitrate) -> Self {
        bitrate.kbps()
    }
}

impl FromStr for Mp3Bitrate {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches(['k', 'K']);
        trimmed
            .parse::<u32>()
            .map_err(|_| ParseChoiceError::new("mp3 bitrate", s, "128, 192, 256, 320"))
            .and_then(Mp3Bitrate::try_from)
    }
}

/// AAC bitrate of the audio track in a video render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum AacBitrate {
    K192,
    #[default]
    K320,
}

impl AacBitrate {
    pub fn kbps(&self) -> u32 {
        match self {
            AacBitrate::K192 => 192,
            AacBitrate::K320 => 320,
        }
    }
}

impl TryFrom<u32> for AacBitrate {
    type Error = ParseChoiceError;

    fn try_from(kbps: u32) -> Result<Self, Self::Error> {
        match kbps {
            192 => Ok(AacBitrate::K192),
            320 => Ok(AacBitrate::K320),
            _ => Err(ParseChoiceError::new(
                "aac bitrate",
                &kbps.to_string(),
                "192, 320",
            )),
        }
    }
}

impl From<AacBitrate> for u32 {
    fn from(bitrate: AacBitrate) -> Self {
        bitrate.kbps()
    }
}

impl FromStr for AacBitrate {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches(['k', 'K']);
        trimmed
            .parse::<u32>()
            .map_err(|_| ParseChoiceError::new("aac bitrate", s, "192, 320"))
            .and_then(AacBitrate::try_from)
    }
}

/// Target resolution, possibly taken from the source video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "mode", content = "value")]
pub enum ResolutionChoice {
    #[default]
    Original,
    Explicit(Resolution),
}

impl FromStr for ResolutionChoice {
    type Err = crate::ffmpeg::FFmpegError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("original") {
            return Ok(ResolutionChoice::Original);
        }
        s.parse().map(ResolutionChoice::Explicit)
    }
}

/// Target frame rate, possibly taken from the source video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "mode", content = "value")]
pub enum FrameRateChoice {
    #[default]
    Original,
    Explicit(FrameRate),
}

impl FromStr for FrameRateChoice {
    type Err = crate::ffmpeg::FFmpegError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("original") {
            return Ok(FrameRateChoice::Original);
        }
        s.parse().map(FrameRateChoice::Explicit)
    }
}

// =============================================================================
// Request / Config
// =============================================================================

/// What is being rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "kind")]
pub enum JobKind {
    /// Concatenate audio tracks into one audio file.
    AudioMix {
        tracks: Vec<PathBuf>,
        format: AudioFormat,
        mp3_bitrate: Mp3Bitrate,
    },
    /// Loop a video for the length of the concatenated audio tracks.
    VideoExtend { video: PathBuf, tracks: Vec<PathBuf> },
}

impl JobKind {
    pub fn tracks(&self) -> &[PathBuf] {
        match self {
            JobKind::AudioMix { tracks, .. } | JobKind::VideoExtend { tracks, .. } => tracks,
        }
    }

    pub fn is_audio_mix(&self) -> bool {
        matches!(self, JobKind::AudioMix { .. })
    }
}

/// Render options as picked by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub output: PathBuf,
    pub job: JobKind,
    #[serde(default)]
    pub codec: CodecFamily,
    #[serde(default)]
    pub resolution: ResolutionChoice,
    #[serde(default)]
    pub frame_rate: FrameRateChoice,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default)]
    pub fade: bool,
    #[serde(default)]
    pub acceleration: Acceleration,
    #[serde(default)]
    pub aac_bitrate: AacBitrate,
    #[serde(default)]
    pub write_timestamps: bool,
}

impl RenderRequest {
    /// Whether resolving needs the source video's parameters.
    pub fn needs_video_probe(&self) -> bool {
        matches!(self.job, JobKind::VideoExtend { .. })
            && (self.resolution == ResolutionChoice::Original
                || self.frame_rate == FrameRateChoice::Original)
    }

    /// Probe the inputs and resolve every placeholder.
    pub async fn resolve(self, prober: &MediaProber) -> RenderConfig {
        let video_info = match &self.job {
            JobKind::VideoExtend { video, .. } if self.needs_video_probe() => {
                Some(prober.video_info(video).await)
            }
            _ => None,
        };
        let durations = prober.durations(self.job.tracks()).await;
        self.resolve_with(video_info, durations)
    }

    /// Resolve with already-probed values. Missing video info falls back to
    /// 1920x1080 @ 30.
    pub fn resolve_with(
        self,
        video_info: Option<VideoInfo>,
        track_durations: Vec<MediaDuration>,
    ) -> RenderConfig {
        let source = video_info.unwrap_or_default();
        let resolution = match self.resolution {
            ResolutionChoice::Explicit(resolution) => resolution,
            ResolutionChoice::Original => source.resolution,
        };
        let frame_rate = match self.frame_rate {
            FrameRateChoice::Explicit(rate) => rate,
            FrameRateChoice::Original => source.frame_rate,
        };

        RenderConfig {
            output: self.output,
            job: self.job,
            codec: self.codec,
            resolution,
            frame_rate,
            quality: self.quality,
            fade: self.fade,
            acceleration: self.acceleration,
            force_software: false,
            aac_bitrate: self.aac_bitrate,
            write_timestamps: self.write_timestamps,
            track_durations,
        }
    }
}

/// Fully resolved, immutable render configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderConfig {
    pub output: PathBuf,
    pub job: JobKind,
    pub codec: CodecFamily,
    pub resolution: Resolution,
    pub frame_rate: FrameRate,
    pub quality: Quality,
    pub fade: bool,
    pub acceleration: Acceleration,
    /// Set on the fallback attempt after a hardware failure.
    pub force_software: bool,
    pub aac_bitrate: AacBitrate,
    pub write_timestamps: bool,
    /// Probed duration of each entry of `job.tracks()`, in order.
    pub track_durations: Vec<MediaDuration>,
}

impl RenderConfig {
    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn tracks(&self) -> &[PathBuf] {
        self.job.tracks()
    }

    /// Sum of all audio track durations; unknown durations count as zero.
    pub fn total_audio_secs(&self) -> f64 {
        self.track_durations
            .iter()
            .map(|d| d.unwrap_or(0.0))
            .sum()
    }

    /// Copy of this config with software encoding forced.
    pub fn with_forced_software(&self) -> Self {
        Self {
            force_software: true,
            ..self.clone()
        }
    }
}
