//! Media probing through `ffprobe`.
//!
//! Probes never abort a render on their own: an unreadable file yields an
//! unknown duration or the default video parameters, and the caller decides
//! whether that is fatal.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{FFmpegError, FFmpegResult};
use crate::process::async_tool_command;

/// Duration in seconds, `None` when the probe failed or printed garbage.
pub type MediaDuration = Option<f64>;

/// Frame size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(1920, 1080)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = FFmpegError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| FFmpegError::ParseError(format!("Invalid resolution: {s}")))?;
        let width: u32 = w
            .parse()
            .map_err(|_| FFmpegError::ParseError(format!("Invalid width in {s}")))?;
        let height: u32 = h
            .parse()
            .map_err(|_| FFmpegError::ParseError(format!("Invalid height in {s}")))?;
        if width == 0 || height == 0 {
            return Err(FFmpegError::ParseError(format!(
                "Resolution must be non-zero: {s}"
            )));
        }
        Ok(Self::new(width, height))
    }
}

/// Frame rate kept as a reduced fraction so NTSC rates survive unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FrameRate {
    num: u32,
    den: u32,
}

impl FrameRate {
    /// Build a reduced fraction. Returns `None` for a zero numerator or denominator.
    pub fn new(num: u32, den: u32) -> Option<Self> {
        if num == 0 || den == 0 {
            return None;
        }
        let divisor = gcd(num, den);
        Some(Self {
            num: num / divisor,
            den: den / divisor,
        })
    }

    pub const fn whole(fps: u32) -> Self {
        Self { num: fps, den: 1 }
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn den(&self) -> u32 {
        self.den
    }

    pub fn as_f64(&self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::whole(30)
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl FromStr for FrameRate {
    type Err = FFmpegError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || FFmpegError::ParseError(format!("Invalid frame rate: {s}"));
        let (num, den) = match s.split_once('/') {
            Some((n, d)) => (
                n.trim().parse::<u32>().map_err(|_| invalid())?,
                d.trim().parse::<u32>().map_err(|_| invalid())?,
            ),
            None => (s.parse::<u32>().map_err(|_| invalid())?, 1),
        };
        Self::new(num, den).ok_or_else(invalid)
    }
}

impl TryFrom<String> for FrameRate {
    type Error = FFmpegError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FrameRate> for String {
    fn from(rate: FrameRate) -> Self {
        rate.to_string()
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// First video stream parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub resolution: Resolution,
    pub frame_rate: FrameRate,
}

/// Parse `format=duration` printed with `nokey=1`.
pub fn parse_duration_output(stdout: &str) -> MediaDuration {
    stdout
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
}

fn resolution_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+)x(\d+)").expect("static regex"))
}

fn rate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+)/(\d+)").expect("static regex"))
}

/// Parse `stream=width,height,r_frame_rate` printed as `csv=s=x:p=0`,
/// e.g. `1920x1080x30000/1001`. Missing parts keep their defaults.
pub fn parse_video_info_output(stdout: &str) -> VideoInfo {
    let mut info = VideoInfo::default();
    let stdout = stdout.trim();

    if let Some(caps) = resolution_pattern().captures(stdout) {
        if let (Ok(width), Ok(height)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) {
            if width > 0 && height > 0 {
                info.resolution = Resolution::new(width, height);
            }
        }
    }

    if let Some(caps) = rate_pattern().captures(stdout) {
        if let (Ok(num), Ok(den)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) {
            if let Some(rate) = FrameRate::new(num, den) {
                info.frame_rate = rate;
            }
        }
    }

    info
}

/// Thin async wrapper around the ffprobe binary.
#[derive(Debug, Clone)]
pub struct MediaProber {
    ffprobe_path: PathBuf,
}

impl MediaProber {
    pub fn new(ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }

    async fn run(&self, args: &[&str], input: &Path) -> FFmpegResult<String> {
        let output = async_tool_command(&self.ffprobe_path)
            .args(args)
            .arg(input)
            .output()
            .await?;

        if !output.status.success() {
            return Err(FFmpegError::ProbeError(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Container duration of `input` in seconds.
    pub async fn duration(&self, input: &Path) -> MediaDuration {
        let args = [
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ];
        match self.run(&args, input).await {
            Ok(stdout) => {
                let duration = parse_duration_output(&stdout);
                if duration.is_none() {
                    warn!("Unparseable duration for {}: {:?}", input.display(), stdout);
                }
                duration
            }
            Err(e) => {
                warn!("Could not probe duration of {}: {}", input.display(), e);
                None
            }
        }
    }

    /// Durations of every input, in order.
    pub async fn durations(&self, inputs: &[PathBuf]) -> Vec<MediaDuration> {
        let mut durations = Vec::with_capacity(inputs.len());
        for input in inputs {
            durations.push(self.duration(input).await);
        }
        durations
    }

    /// Resolution and frame rate of the first video stream.
    pub async fn video_info(&self, input: &Path) -> VideoInfo {
        let args = [
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate",
            "-of",
            "csv=s=x:p=0",
        ];
        match self.run(&args, input).await {
            Ok(stdout) => parse_video_info_output(&stdout),
            Err(e) => {
                warn!(
                    "Could not probe video info of {}, assuming 1920x1080 @ 30: {}",
                    input.display(),
                    e
                );
                VideoInfo::default()
            }
        }
    }
}
