//! Turns attempts into one final outcome, with a single software fallback
//! after a failed hardware attempt.

use std::time::Instant;

use tracing::{error, info, warn};

use super::builder::{BuiltCommand, CommandBuilder};
use super::config::{JobKind, RenderConfig};
use super::events::{CancelToken, EventSender, RenderEvent, RenderOutcome};
use super::runner::{AttemptOutcome, AttemptRunner};
use crate::timestamps;

/// Run `first` (built from `config`) to completion.
///
/// `Success`, `Cancelled` and non-hardware failures are final. A failed
/// hardware attempt is rebuilt with software encoding forced and run once
/// more; that attempt's result is final whatever it is.
pub async fn resolve_outcome(
    runner: &dyn AttemptRunner,
    builder: &CommandBuilder<'_>,
    config: &RenderConfig,
    first: BuiltCommand,
    events: &EventSender,
    cancel: &CancelToken,
) -> RenderOutcome {
    let started = Instant::now();

    let mut command = first;
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return RenderOutcome::Cancelled;
        }

        info!(
            "Render attempt {} with {} -> {}",
            attempt,
            command.encoder,
            command.output.display()
        );
        let _ = events.send(RenderEvent::Started {
            attempt,
            encoder: command.encoder.clone(),
            is_hardware: command.is_hardware,
        });

        match runner.run(&command, events, cancel).await {
            AttemptOutcome::Succeeded => return finish_success(config, started),
            AttemptOutcome::Cancelled => {
                info!("Render cancelled");
                return RenderOutcome::Cancelled;
            }
            AttemptOutcome::Failed { diagnostics } if command.is_hardware && attempt == 1 => {
                warn!(
                    "Hardware encoder {} failed, retrying with software encoding",
                    command.encoder
                );
                let _ = events.send(RenderEvent::Retrying {
                    failed_encoder: command.encoder.clone(),
                    diagnostics,
                });
                command = match builder.build(&config.with_forced_software()) {
                    Ok(command) => command,
                    Err(e) => return RenderOutcome::failed(e.to_string()),
                };
                attempt += 1;
            }
            AttemptOutcome::Failed { diagnostics } => {
                error!("Render failed with {}", command.encoder);
                return RenderOutcome::Failed { diagnostics };
            }
        }
    }
}

fn finish_success(config: &RenderConfig, started: Instant) -> RenderOutcome {
    let elapsed = started.elapsed();
    info!(
        "Render finished in {:.2}s: {}",
        elapsed.as_secs_f64(),
        config.output.display()
    );

    let companion = match &config.job {
        JobKind::AudioMix { tracks, .. } if config.write_timestamps => {
            match timestamps::write_companion(&config.output, tracks, &config.track_durations) {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Could not save timestamps: {}", e);
                    None
                }
            }
        }
        _ => None,
    };

    RenderOutcome::Success {
        elapsed,
        output: config.output.clone(),
        companion,
    }
}
