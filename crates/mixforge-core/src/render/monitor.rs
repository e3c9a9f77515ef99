//! Progress stream reader.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt};
use tracing::debug;

use super::events::{EventSender, RenderEvent};
use crate::ffmpeg::ProgressTracker;

/// Read `reader` to the end, forwarding a progress sample for every valid
/// `out_time_ms` line. Returns all text read.
///
/// Read errors end the loop quietly. No completion sample is synthesized;
/// the outcome decides what the caller shows at the end.
pub async fn monitor_progress<R>(
    mut reader: R,
    mut tracker: ProgressTracker,
    events: EventSender,
) -> String
where
    R: AsyncBufRead + Unpin,
{
    let mut text = String::new();
    let mut buf = Vec::new();
    let mut receiver_open = true;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                text.push_str(&line);
                if !line.ends_with('\n') {
                    text.push('\n');
                }
                if let Some(sample) = tracker.feed(&line) {
                    // Keep reading after the receiver is gone so the pipe never fills.
                    if receiver_open && events.send(RenderEvent::Progress(sample)).is_err() {
                        receiver_open = false;
                    }
                }
            }
            Err(e) => {
                debug!("Progress stream read failed: {}", e);
                break;
            }
        }
    }

    text
}

/// Read a stream to the end as lossy UTF-8.
pub async fn drain<R>(mut reader: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        debug!("Output stream read failed: {}", e);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    const STREAM: &str = "frame=1
out_time_ms=N/A
speed=N/A
progress=continue
frame=50
out_time_ms=2500000
speed=2.0x
progress=continue
out_time_ms=5000000
progress=continue
garbage line without equals
out_time_ms=9000000
progress=end
";

    #[tokio::test]
    async fn test_monitor_emits_samples() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let text = monitor_progress(STREAM.as_bytes(), ProgressTracker::new(10.0), tx).await;

        let mut fractions = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                RenderEvent::Progress(sample) => fractions.push(sample.fraction),
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(fractions.len(), 3);
        assert!((fractions[0] - 0.25).abs() < 1e-9);
        assert!((fractions[1] - 0.5).abs() < 1e-9);
        assert!((fractions[2] - 0.9).abs() < 1e-9);
        assert_eq!(text, STREAM);
    }

    #[tokio::test]
    async fn test_monitor_second_sample_has_eta() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        monitor_progress(STREAM.as_bytes(), ProgressTracker::new(10.0), tx).await;

        let _first = rx.try_recv().unwrap();
        let RenderEvent::Progress(second) = rx.try_recv().unwrap() else {
            panic!("expected progress");
        };
        // 5s of 10s at 2x leaves 2.5s.
        assert_eq!(second.eta, Some(std::time::Duration::from_millis(2500)));
    }

    #[tokio::test]
    async fn test_monitor_survives_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let text = monitor_progress(STREAM.as_bytes(), ProgressTracker::new(10.0), tx).await;
        assert!(text.contains("progress=end"));
    }

    #[tokio::test]
    async fn test_monitor_lossy_and_unterminated() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let input: &[u8] = b"bad \xff byte\nout_time_ms=1000000";
        let text = monitor_progress(input, ProgressTracker::new(2.0), tx).await;
        assert!(text.starts_with("bad "));
        assert!(text.ends_with("out_time_ms=1000000\n"));
    }

    #[tokio::test]
    async fn test_drain() {
        assert_eq!(drain(&b"Error opening input"[..]).await, "Error opening input");
    }
}
