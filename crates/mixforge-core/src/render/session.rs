//! Render session: owns the worker task for one render at a time.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, warn};

use super::builder::CommandBuilder;
use super::config::RenderConfig;
use super::events::{CancelToken, EventReceiver, RenderEvent, RenderOutcome};
use super::journal::{JournalEntry, RenderJournal};
use super::resolver::resolve_outcome;
use super::runner::{AttemptRunner, FfmpegRunner, ProgressStream};
use super::BuildError;
use crate::ffmpeg::EncoderSet;
use crate::CoreError;

/// Starts renders against one ffmpeg installation.
#[derive(Clone)]
pub struct RenderSession {
    runner: Arc<dyn AttemptRunner>,
    encoders: Arc<EncoderSet>,
    journal: Option<RenderJournal>,
}

impl std::fmt::Debug for RenderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSession")
            .field("encoders", &self.encoders.len())
            .field("journal", &self.journal)
            .finish()
    }
}

impl RenderSession {
    pub fn new(
        ffmpeg_path: impl Into<PathBuf>,
        encoders: EncoderSet,
        progress_stream: ProgressStream,
    ) -> Self {
        Self::with_runner(
            Arc::new(FfmpegRunner::new(ffmpeg_path, progress_stream)),
            encoders,
        )
    }

    pub fn with_runner(runner: Arc<dyn AttemptRunner>, encoders: EncoderSet) -> Self {
        Self {
            runner,
            encoders: Arc::new(encoders),
            journal: None,
        }
    }

    /// Record every started audio mix in `journal`.
    pub fn with_journal(mut self, journal: RenderJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Validate and build the first command, then run it on a background task.
    ///
    /// Must be called inside a tokio runtime. Build errors are returned
    /// directly and nothing is spawned.
    pub fn start(&self, config: RenderConfig) -> Result<RenderHandle, BuildError> {
        let first = CommandBuilder::new(&self.encoders).build(&config)?;

        if let (Some(journal), Some(entry)) = (&self.journal, JournalEntry::for_config(&config)) {
            if let Err(e) = journal.append(&entry) {
                warn!("Could not write render journal {}: {}", journal.path().display(), e);
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancelToken::new();
        let runner = Arc::clone(&self.runner);
        let encoders = Arc::clone(&self.encoders);
        let worker_cancel = cancel.clone();

        let worker_tx = tx.clone();
        let worker = tokio::spawn(async move {
            let builder = CommandBuilder::new(&encoders);
            resolve_outcome(
                runner.as_ref(),
                &builder,
                &config,
                first,
                &worker_tx,
                &worker_cancel,
            )
            .await
        });

        // The supervisor owns the Finished event so a panicking worker
        // still ends the stream with one.
        let join = tokio::spawn(async move {
            let outcome = match worker.await {
                Ok(outcome) => outcome,
                Err(e) => worker_lost(e),
            };
            let _ = tx.send(RenderEvent::Finished(outcome.clone()));
            outcome
        });

        Ok(RenderHandle {
            events: rx,
            cancel,
            join,
        })
    }
}

/// Caller side of a running render.
#[derive(Debug)]
pub struct RenderHandle {
    events: EventReceiver,
    cancel: CancelToken,
    join: JoinHandle<RenderOutcome>,
}

impl RenderHandle {
    /// Next event, or `None` once the worker is gone.
    pub async fn next_event(&mut self) -> Option<RenderEvent> {
        self.events.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that can cancel this render from elsewhere, e.g. a signal handler.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the worker and return the final outcome.
    ///
    /// A worker that panicked is reported as `Failed`, both here and in
    /// the final `Finished` event.
    pub async fn wait(self) -> RenderOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => worker_lost(e),
        }
    }
}

fn worker_lost(e: JoinError) -> RenderOutcome {
    let err = CoreError::WorkerLost(e.to_string());
    error!("{}", err);
    RenderOutcome::failed(err.to_string())
}
