use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::time::{Duration, Instant};

use mixforge_core::ffmpeg::{format_eta, ProgressSample};
use mixforge_core::render::{RenderEvent, RenderOutcome};

const BAR_LENGTH: u64 = 1000;
const PLAIN_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lower")]
pub enum ProgressMode {
    Auto,
    Rich,
    Plain,
    Quiet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedProgressMode {
    Rich,
    Plain,
    Quiet,
}

impl ProgressMode {
    pub fn resolve(self, stderr_is_tty: bool) -> ResolvedProgressMode {
        match self {
            ProgressMode::Auto => {
                if stderr_is_tty {
                    ResolvedProgressMode::Rich
                } else {
                    ResolvedProgressMode::Plain
                }
            }
            ProgressMode::Rich => ResolvedProgressMode::Rich,
            ProgressMode::Plain => ResolvedProgressMode::Plain,
            ProgressMode::Quiet => ResolvedProgressMode::Quiet,
        }
    }
}

/// Draws render events on stderr.
pub struct RenderProgress {
    label: String,
    mode: ResolvedProgressMode,
    bar: Option<ProgressBar>,
    last_plain_emit: Option<Instant>,
}

impl RenderProgress {
    pub fn new(label: impl Into<String>, mode: ProgressMode) -> Self {
        let label = label.into();
        let mode = mode.resolve(std::io::stderr().is_terminal());

        let bar = (mode == ResolvedProgressMode::Rich).then(|| {
            let bar = ProgressBar::new(BAR_LENGTH);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {wide_bar:.cyan/blue} {percent:>3}% | {msg}",
            ) {
                bar.set_style(style);
            }
            bar.enable_steady_tick(Duration::from_millis(120));
            bar.set_message(format!("{} starting", label));
            bar
        });

        Self {
            label,
            mode,
            bar,
            last_plain_emit: None,
        }
    }

    pub fn handle(&mut self, event: &RenderEvent) {
        match event {
            RenderEvent::Started {
                attempt,
                encoder,
                is_hardware,
            } => {
                let kind = if *is_hardware { "hardware" } else { "software" };
                if let Some(bar) = &self.bar {
                    bar.set_position(0);
                }
                self.message(&format!("attempt {} with {} ({})", attempt, encoder, kind));
            }
            RenderEvent::Progress(sample) => self.progress(sample),
            RenderEvent::Retrying {
                failed_encoder,
                diagnostics,
            } => {
                self.message(&format!(
                    "{} failed ({}), retrying with software encoding",
                    failed_encoder,
                    last_line(diagnostics)
                ));
            }
            RenderEvent::Finished(_) => {}
        }
    }

    fn progress(&mut self, sample: &ProgressSample) {
        match self.mode {
            ResolvedProgressMode::Rich => {
                if let Some(bar) = &self.bar {
                    bar.set_position((sample.fraction * BAR_LENGTH as f64).round() as u64);
                    bar.set_message(describe_sample(sample));
                }
            }
            ResolvedProgressMode::Plain => {
                let now = Instant::now();
                let due = self
                    .last_plain_emit
                    .map(|last| now.duration_since(last) >= PLAIN_INTERVAL)
                    .unwrap_or(true);
                if due {
                    self.last_plain_emit = Some(now);
                    eprintln!(
                        "[PROGRESS] {} {:.1}% {}",
                        self.label,
                        sample.percent(),
                        describe_sample(sample)
                    );
                }
            }
            ResolvedProgressMode::Quiet => {}
        }
    }

    fn message(&self, message: &str) {
        match self.mode {
            ResolvedProgressMode::Rich => {
                if let Some(bar) = &self.bar {
                    bar.println(format!("[INFO] {}: {}", self.label, message));
                }
            }
            ResolvedProgressMode::Plain => eprintln!("[INFO] {}: {}", self.label, message),
            ResolvedProgressMode::Quiet => {}
        }
    }

    pub fn finish(self, outcome: &RenderOutcome) {
        let summary = summarize(outcome);
        match self.mode {
            ResolvedProgressMode::Rich => {
                if let Some(bar) = self.bar {
                    if outcome.is_success() {
                        bar.set_position(BAR_LENGTH);
                        bar.finish_with_message(summary);
                    } else {
                        bar.abandon_with_message(summary);
                    }
                }
            }
            ResolvedProgressMode::Plain => eprintln!("[DONE] {}: {}", self.label, summary),
            ResolvedProgressMode::Quiet => {}
        }
    }
}

/// `speed=1.50x ETA 00:01:05`
pub fn describe_sample(sample: &ProgressSample) -> String {
    let speed = sample
        .speed
        .map(|s| format!("{:.2}x", s))
        .unwrap_or_else(|| "-".to_string());
    format!("speed={} ETA {}", speed, format_eta(sample.eta))
}

fn summarize(outcome: &RenderOutcome) -> String {
    match outcome {
        RenderOutcome::Success { elapsed, .. } => {
            format!("finished in {:.1}s", elapsed.as_secs_f64())
        }
        RenderOutcome::Cancelled => "cancelled".to_string(),
        RenderOutcome::Failed { diagnostics } => format!("failed: {}", last_line(diagnostics)),
    }
}

/// Last non-empty line of ffmpeg output, which usually names the error.
pub fn last_line(text: &str) -> &str {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("no output")
}
