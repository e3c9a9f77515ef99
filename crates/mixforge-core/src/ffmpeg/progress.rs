//! Parsing of the machine-readable `-progress` stream.
//!
//! With `-progress pipe:N` ffmpeg writes blocks of `key=value` lines:
//!
//! ```text
//! frame=100
//! out_time_ms=3333333
//! speed=2.5x
//! progress=continue
//! ```
//!
//! `out_time_ms` is in microseconds despite the name.

use std::time::Duration;

/// One classified line of the progress stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressLine {
    /// Encoded media time so far.
    OutTime(Duration),
    /// `out_time_ms=N/A`, printed before the first frame is muxed.
    OutTimeUnavailable,
    /// Encoding speed as a multiple of real time.
    Speed(f64),
    /// `progress=end`
    End,
    /// Any other key, blank line or malformed value.
    Other,
}

impl ProgressLine {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();

        if let Some(value) = line.strip_prefix("out_time_ms=") {
            let value = value.trim();
            if value.eq_ignore_ascii_case("N/A") {
                return ProgressLine::OutTimeUnavailable;
            }
            // Early blocks can report a negative timestamp.
            return match value.parse::<i64>() {
                Ok(us) => ProgressLine::OutTime(Duration::from_micros(us.max(0) as u64)),
                Err(_) => ProgressLine::Other,
            };
        }

        if let Some(value) = line.strip_prefix("speed=") {
            // Format: "2.5x", " 2.5x" or "N/A"
            return value
                .trim()
                .strip_suffix('x')
                .and_then(|num| num.trim().parse::<f64>().ok())
                .filter(|speed| speed.is_finite())
                .map_or(ProgressLine::Other, ProgressLine::Speed);
        }

        if line == "progress=end" {
            return ProgressLine::End;
        }

        ProgressLine::Other
    }
}

/// Progress of one render attempt at a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    /// Completed share of the output, in `[0, 1]`.
    pub fraction: f64,
    /// Media time encoded so far.
    pub elapsed: Duration,
    /// Last reported speed multiplier.
    pub speed: Option<f64>,
    /// Wall-clock time left; `None` while the speed is unknown or zero.
    pub eta: Option<Duration>,
}

impl ProgressSample {
    pub fn percent(&self) -> f64 {
        self.fraction * 100.0
    }
}

/// Turns progress lines into samples for a render of known length.
///
/// The reported fraction never decreases within one tracker, so a new
/// tracker is needed for every attempt.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total_secs: f64,
    speed: Option<f64>,
    fraction: f64,
}

impl ProgressTracker {
    pub fn new(total_secs: f64) -> Self {
        Self {
            total_secs: if total_secs.is_finite() {
                total_secs.max(0.0)
            } else {
                0.0
            },
            speed: None,
            fraction: 0.0,
        }
    }

    pub fn total_secs(&self) -> f64 {
        self.total_secs
    }

    /// Feed one raw line. Returns a sample for every valid `out_time_ms`.
    pub fn feed(&mut self, line: &str) -> Option<ProgressSample> {
        match ProgressLine::parse(line) {
            ProgressLine::OutTime(elapsed) => Some(self.sample(elapsed)),
            ProgressLine::Speed(speed) => {
                self.speed = Some(speed);
                None
            }
            ProgressLine::OutTimeUnavailable | ProgressLine::End | ProgressLine::Other => None,
        }
    }

    fn sample(&mut self, elapsed: Duration) -> ProgressSample {
        let elapsed_secs = elapsed.as_secs_f64();

        if self.total_secs > 0.0 {
            let fraction = (elapsed_secs / self.total_secs).clamp(0.0, 1.0);
            self.fraction = self.fraction.max(fraction);
        }

        let eta = match self.speed {
            Some(speed) if speed > 0.0 && self.total_secs > 0.0 => {
                let remaining = (self.total_secs - elapsed_secs).max(0.0);
                Duration::try_from_secs_f64(remaining / speed).ok()
            }
            _ => None,
        };

        ProgressSample {
            fraction: self.fraction,
            elapsed,
            speed: self.speed,
            eta,
        }
    }
}

/// Render an ETA as `HH:MM:SS`, or `...` when it is not known.
pub fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(eta) => {
            let secs = eta.as_secs();
            format!(
                "{:02}:{:02}:{:02}",
                secs / 3600,
                (secs % 3600) / 60,
                secs % 60
            )
        }
        None => "...".to_string(),
    }
}
