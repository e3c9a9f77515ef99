//! Runs one ffmpeg attempt as a child process.

use std::path::PathBuf;
use std::process::ExitStatus;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::BufReader;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::builder::BuiltCommand;
use super::events::{CancelToken, EventSender};
use super::monitor::{drain, monitor_progress};
use crate::ffmpeg::ProgressTracker;
use crate::process::async_tool_command;

/// Which pipe ffmpeg writes its `-progress` output to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStream {
    #[default]
    Stdout,
    Stderr,
}

impl ProgressStream {
    pub fn pipe_arg(&self) -> &'static str {
        match self {
            ProgressStream::Stdout => "pipe:1",
            ProgressStream::Stderr => "pipe:2",
        }
    }
}

/// Full argument list including the progress flags.
pub fn progress_args(command: &BuiltCommand, stream: ProgressStream) -> Vec<String> {
    let mut args = Vec::with_capacity(command.args.len() + 3);
    args.push("-progress".to_string());
    args.push(stream.pipe_arg().to_string());
    args.push("-nostats".to_string());
    args.extend(command.args.iter().cloned());
    args
}

/// How a single attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Cancelled,
    Failed { diagnostics: String },
}

/// Executes a built command, reporting progress and honoring cancellation.
#[async_trait]
pub trait AttemptRunner: Send + Sync {
    async fn run(
        &self,
        command: &BuiltCommand,
        events: &EventSender,
        cancel: &CancelToken,
    ) -> AttemptOutcome;
}

/// Runs attempts with the real ffmpeg binary.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    ffmpeg_path: PathBuf,
    progress_stream: ProgressStream,
}

impl FfmpegRunner {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, progress_stream: ProgressStream) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            progress_stream,
        }
    }
}

#[async_trait]
impl AttemptRunner for FfmpegRunner {
    async fn run(
        &self,
        command: &BuiltCommand,
        events: &EventSender,
        cancel: &CancelToken,
    ) -> AttemptOutcome {
        let args = progress_args(command, self.progress_stream);
        debug!(
            "Spawning {} {}",
            self.ffmpeg_path.display(),
            command.command_line()
        );

        let mut child = match async_tool_command(&self.ffmpeg_path).args(&args).spawn() {
            Ok(child) => child,
            Err(e) => {
                return AttemptOutcome::Failed {
                    diagnostics: format!("Failed to spawn FFmpeg: {}", e),
                }
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let tracker = ProgressTracker::new(command.total_duration);

        // Both pipes are read concurrently so a full buffer on either side
        // cannot stall ffmpeg.
        let (progress_task, other_task) = match self.progress_stream {
            ProgressStream::Stdout => (
                stdout.map(|out| {
                    tokio::spawn(monitor_progress(BufReader::new(out), tracker, events.clone()))
                }),
                stderr.map(|err| tokio::spawn(drain(err))),
            ),
            ProgressStream::Stderr => (
                stderr.map(|err| {
                    tokio::spawn(monitor_progress(BufReader::new(err), tracker, events.clone()))
                }),
                stdout.map(|out| tokio::spawn(drain(out))),
            ),
        };

        let status = tokio::select! {
            status = child.wait() => status,
            _ = cancel.cancelled() => {
                info!("Cancellation requested, stopping ffmpeg");
                if let Err(e) = child.start_kill() {
                    warn!("Failed to terminate ffmpeg: {}", e);
                }
                child.wait().await
            }
        };

        let progress_text = join_text(progress_task, "progress").await;
        let other_text = join_text(other_task, "output").await;
        let log_text = match self.progress_stream {
            ProgressStream::Stdout => other_text,
            ProgressStream::Stderr => progress_text,
        };

        // A cancel that races a clean exit still reports cancellation.
        if cancel.is_cancelled() {
            return AttemptOutcome::Cancelled;
        }

        match status {
            Ok(status) if status.success() => AttemptOutcome::Succeeded,
            Ok(status) => AttemptOutcome::Failed {
                diagnostics: failure_text(log_text, status),
            },
            Err(e) => AttemptOutcome::Failed {
                diagnostics: format!("Failed to wait for FFmpeg: {}", e),
            },
        }
    }
}

/// Collect the text gathered by a pipe reader task.
async fn join_text(task: Option<JoinHandle<String>>, stream: &str) -> String {
    match task {
        Some(task) => match task.await {
            Ok(text) => text,
            Err(e) => {
                warn!("FFmpeg {} reader stopped: {}", stream, e);
                String::new()
            }
        },
        None => String::new(),
    }
}

fn failure_text(log_text: String, status: ExitStatus) -> String {
    let trimmed = log_text.trim();
    if trimmed.is_empty() {
        format!("FFmpeg exited with status: {}", status)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> BuiltCommand {
        BuiltCommand {
            args: vec!["-y".into(), "-i".into(), "in.mp3".into(), "out.mp3".into()],
            encoder: "libmp3lame".into(),
            is_hardware: false,
            total_duration: 10.0,
            output: PathBuf::from("out.mp3"),
        }
    }

    #[test]
    fn test_progress_stream_pipe_args() {
        assert_eq!(ProgressStream::default(), ProgressStream::Stdout);
        assert_eq!(ProgressStream::Stdout.pipe_arg(), "pipe:1");
        assert_eq!(ProgressStream::Stderr.pipe_arg(), "pipe:2");
    }

    #[test]
    fn test_progress_args_are_prepended() {
        let args = progress_args(&command(), ProgressStream::Stderr);
        assert_eq!(
            args,
            vec!["-progress", "pipe:2", "-nostats", "-y", "-i", "in.mp3", "out.mp3"]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_fails_attempt() {
        let runner = FfmpegRunner::new("/definitely/not/ffmpeg", ProgressStream::Stdout);
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let outcome = runner.run(&command(), &tx, &CancelToken::new()).await;
        match outcome {
            AttemptOutcome::Failed { diagnostics } => {
                assert!(diagnostics.starts_with("Failed to spawn FFmpeg"))
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_exit_codes() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("fake-ffmpeg");
        std::fs::write(
            &script,
            "#!/bin/sh\necho 'out_time_ms=5000000'\necho 'Conversion failed!' >&2\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let runner = FfmpegRunner::new(&script, ProgressStream::Stdout);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let outcome = runner.run(&command(), &tx, &CancelToken::new()).await;

        assert_eq!(
            outcome,
            AttemptOutcome::Failed {
                diagnostics: "Conversion failed!".to_string()
            }
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            super::super::events::RenderEvent::Progress(_)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stderr_progress_keeps_diagnostics_on_extreme_speed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("fake-ffmpeg");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             echo 'speed=1e-300x' >&2\n\
             echo 'out_time_ms=1000000' >&2\n\
             echo 'Invalid encoder settings' >&2\n\
             exit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let runner = FfmpegRunner::new(&script, ProgressStream::Stderr);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let outcome = runner.run(&command(), &tx, &CancelToken::new()).await;

        match outcome {
            AttemptOutcome::Failed { diagnostics } => {
                assert!(diagnostics.contains("Invalid encoder settings"), "{}", diagnostics)
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        match rx.try_recv().unwrap() {
            super::super::events::RenderEvent::Progress(sample) => assert_eq!(sample.eta, None),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_terminates_process() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("slow-ffmpeg");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let runner = FfmpegRunner::new(&script, ProgressStream::Stdout);
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let cancel = CancelToken::new();
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                cancel.cancel();
            })
        };

        let outcome = runner.run(&command(), &tx, &cancel).await;
        canceller.await.unwrap();
        assert_eq!(outcome, AttemptOutcome::Cancelled);
    }
}
