//! YouTube-style chapter listings.
//!
//! Each track gets a line `<start> <name>` where `<start>` is the sum of the
//! durations of the tracks before it, printed as `mm:ss` or, from the first
//! hour on, `hh:mm:ss`.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::ffmpeg::MediaDuration;
use crate::CoreResult;

fn disallowed_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^a-zA-Zа-яА-Я0-9\s-]").expect("static regex"))
}

/// File stem stripped of everything but ASCII/Cyrillic letters, digits,
/// whitespace and `-`.
pub fn sanitize_track_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    disallowed_chars()
        .replace_all(&stem, "")
        .trim()
        .to_string()
}

/// `mm:ss` below one hour, `hh:mm:ss` from there on.
pub fn format_timestamp(total_secs: f64) -> String {
    let secs = if total_secs.is_finite() && total_secs > 0.0 {
        total_secs as u64
    } else {
        0
    };
    let (hours, rest) = (secs / 3600, secs % 3600);
    let (minutes, seconds) = (rest / 60, rest % 60);
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// One listing line per track. Unknown durations count as zero.
pub fn generate(tracks: &[PathBuf], durations: &[MediaDuration]) -> Vec<String> {
    let mut offset = 0.0;
    tracks
        .iter()
        .enumerate()
        .map(|(i, track)| {
            let line = format!("{} {}", format_timestamp(offset), sanitize_track_name(track));
            offset += durations.get(i).copied().flatten().unwrap_or(0.0);
            line
        })
        .collect()
}

/// The listing as file contents.
pub fn render_listing(tracks: &[PathBuf], durations: &[MediaDuration]) -> String {
    let mut text = generate(tracks, durations).join("\n");
    text.push('\n');
    text
}

/// `<dir>/<stem>_timestamps.txt` for an output file.
pub fn companion_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!("{stem}_timestamps.txt"))
}

/// Write the listing to `path`.
pub fn export(path: &Path, tracks: &[PathBuf], durations: &[MediaDuration]) -> CoreResult<()> {
    std::fs::write(path, render_listing(tracks, durations))?;
    Ok(())
}

/// Write the companion listing next to `output` and return its path.
pub fn write_companion(
    output: &Path,
    tracks: &[PathBuf],
    durations: &[MediaDuration],
) -> CoreResult<PathBuf> {
    let path = companion_path(output);
    export(&path, tracks, durations)?;
    Ok(path)
}
