//! Messages from the render worker to its caller, and the cancel signal
//! going the other way.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, Notify};

use crate::ffmpeg::ProgressSample;

/// Final result of a render, after any fallback retry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum RenderOutcome {
    Success {
        /// Wall-clock time from start to exit, retries included.
        elapsed: Duration,
        output: PathBuf,
        /// Timestamp listing written next to an audio mix.
        companion: Option<PathBuf>,
    },
    Cancelled,
    Failed {
        /// Text ffmpeg logged, or the reason it never ran.
        diagnostics: String,
    },
}

impl RenderOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RenderOutcome::Success { .. })
    }

    pub fn failed(diagnostics: impl Into<String>) -> Self {
        RenderOutcome::Failed {
            diagnostics: diagnostics.into(),
        }
    }
}

/// Progress and lifecycle updates, in the order they happen.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    /// An ffmpeg attempt was launched.
    Started {
        attempt: u32,
        encoder: String,
        is_hardware: bool,
    },
    Progress(ProgressSample),
    /// The hardware attempt failed; a software attempt follows.
    Retrying {
        failed_encoder: String,
        diagnostics: String,
    },
    /// Always the last event of a render, including one whose worker panicked.
    Finished(RenderOutcome),
}

pub type EventSender = mpsc::UnboundedSender<RenderEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<RenderEvent>;

#[derive(Debug, Default)]
struct CancelState {
    requested: AtomicBool,
    notify: Notify,
}

/// Shared, clonable cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.state.requested.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.requested.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
