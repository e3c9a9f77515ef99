//! Append-only, human-readable log of started mixes.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use ulid::Ulid;

use super::config::{AudioFormat, JobKind, RenderConfig};
use crate::CoreResult;

/// One journal record.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub id: Ulid,
    pub started_at: DateTime<Local>,
    pub output: PathBuf,
    pub format: AudioFormat,
    /// Only recorded for MP3 output.
    pub bitrate_kbps: Option<u32>,
    pub tracks: Vec<PathBuf>,
}

impl JournalEntry {
    /// Entry for an audio mix; `None` for other jobs.
    pub fn for_config(config: &RenderConfig) -> Option<Self> {
        let JobKind::AudioMix {
            tracks,
            format,
            mp3_bitrate,
        } = &config.job
        else {
            return None;
        };
        Some(Self {
            id: Ulid::new(),
            started_at: Local::now(),
            output: config.output.clone(),
            format: *format,
            bitrate_kbps: (*format == AudioFormat::Mp3).then(|| mp3_bitrate.kbps()),
            tracks: tracks.clone(),
        })
    }

    pub fn to_text(&self) -> String {
        let mut text = format!(
            "--- New Mix --- {} --- {}\n",
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            self.id
        );
        text.push_str(&format!("Output File: {}\n", self.output.display()));
        text.push_str(&format!("Format: {}\n", self.format));
        if let Some(kbps) = self.bitrate_kbps {
            text.push_str(&format!("Bitrate: {kbps} kbps\n"));
        }
        text.push_str("Track Order:\n");
        for (i, track) in self.tracks.iter().enumerate() {
            let name = track
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| track.display().to_string());
            text.push_str(&format!("  {}. {}\n", i + 1, name));
        }
        text.push_str(&"-".repeat(50));
        text.push_str("\n\n");
        text
    }
}

/// Journal file handle.
#[derive(Debug, Clone)]
pub struct RenderJournal {
    path: PathBuf,
}

impl RenderJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &JournalEntry) -> CoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(entry.to_text().as_bytes())?;
        Ok(())
    }
}
