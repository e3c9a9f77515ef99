//! Ordered track list for mixes and timestamp listings.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;
use walkdir::WalkDir;

use crate::ffmpeg::{MediaDuration, MediaProber};
use crate::{CoreError, CoreResult};

/// Extensions accepted as audio tracks.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aac"];

/// Extensions accepted as the looped video.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi"];

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

pub fn is_audio_file(path: &Path) -> bool {
    has_extension(path, AUDIO_EXTENSIONS)
}

pub fn is_video_file(path: &Path) -> bool {
    has_extension(path, VIDEO_EXTENSIONS)
}

/// `mm:ss` for a known duration, `N/A` otherwise.
pub fn format_duration(duration: MediaDuration) -> String {
    match duration {
        Some(secs) if secs.is_finite() && secs >= 0.0 => {
            let secs = secs as u64;
            format!("{:02}:{:02}", secs / 60, secs % 60)
        }
        _ => "N/A".to_string(),
    }
}

/// Audio files directly inside `dir`, sorted by path.
pub fn scan_folder(dir: &Path) -> CoreResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(CoreError::NotADirectory(dir.display().to_string()));
    }
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            CoreError::IoError(
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
            )
        })?;
        if entry.file_type().is_file() && is_audio_file(entry.path()) {
            found.push(entry.into_path());
        }
    }
    debug!("Found {} audio files in {}", found.len(), dir.display());
    Ok(found)
}

/// One playlist entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub path: PathBuf,
    pub duration: MediaDuration,
}

impl Track {
    /// `name.mp3 (mm:ss)`
    pub fn label(&self) -> String {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string());
        format!("{} ({})", name, format_duration(self.duration))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Playlist {
    tracks: Vec<Track>,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.tracks.iter().any(|t| t.path == path)
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.tracks.iter().map(|t| t.path.clone()).collect()
    }

    pub fn durations(&self) -> Vec<MediaDuration> {
        self.tracks.iter().map(|t| t.duration).collect()
    }

    /// Append a track. Returns `false` for non-audio files and duplicates.
    pub fn add(&mut self, path: impl Into<PathBuf>, duration: MediaDuration) -> bool {
        let path = path.into();
        if !is_audio_file(&path) || self.contains(&path) {
            return false;
        }
        self.tracks.push(Track { path, duration });
        true
    }

    /// Probe and append every acceptable path. Returns how many were added.
    pub async fn add_paths(&mut self, paths: &[PathBuf], prober: &MediaProber) -> usize {
        let mut added = 0;
        for path in paths {
            if !is_audio_file(path) || self.contains(path) {
                debug!("Skipping {}", path.display());
                continue;
            }
            let duration = prober.duration(path).await;
            if self.add(path.clone(), duration) {
                added += 1;
            }
        }
        added
    }

    /// Remove the tracks at `indices`.
    pub fn remove(&mut self, indices: &[usize]) -> CoreResult<()> {
        let unique: BTreeSet<usize> = indices.iter().copied().collect();
        if let Some(&bad) = unique.iter().find(|&&i| i >= self.tracks.len()) {
            return Err(CoreError::TrackIndexOutOfRange(bad));
        }
        for i in unique.into_iter().rev() {
            self.tracks.remove(i);
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    /// Move each selected track one slot up. Returns the new selection.
    pub fn move_up(&mut self, indices: &[usize]) -> Vec<usize> {
        let unique: BTreeSet<usize> = indices
            .iter()
            .copied()
            .filter(|&i| i < self.tracks.len())
            .collect();
        unique
            .into_iter()
            .map(|i| {
                if i > 0 {
                    self.tracks.swap(i, i - 1);
                    i - 1
                } else {
                    i
                }
            })
            .collect()
    }

    /// Move each selected track one slot down. Returns the new selection.
    pub fn move_down(&mut self, indices: &[usize]) -> Vec<usize> {
        let len = self.tracks.len();
        let unique: BTreeSet<usize> = indices.iter().copied().filter(|&i| i < len).collect();
        let mut moved: Vec<usize> = unique
            .into_iter()
            .rev()
            .map(|i| {
                if i + 1 < len {
                    self.tracks.swap(i, i + 1);
                    i + 1
                } else {
                    i
                }
            })
            .collect();
        moved.reverse();
        moved
    }

    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.tracks.shuffle(rng);
    }

    /// Sort by file name, ignoring case.
    pub fn sort_by_name(&mut self) {
        self.tracks.sort_by_key(|t| {
            t.path
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default()
        });
    }

    /// Sum of known durations in seconds.
    pub fn total_duration(&self) -> f64 {
        self.tracks.iter().filter_map(|t| t.duration).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    fn playlist(names: &[&str]) -> Playlist {
        let mut list = Playlist::new();
        for (i, name) in names.iter().enumerate() {
            assert!(list.add(*name, Some(10.0 * (i + 1) as f64)));
        }
        list
    }

    fn names(list: &Playlist) -> Vec<String> {
        list.tracks()
            .iter()
            .map(|t| t.path.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_extension_filter() {
        assert!(is_audio_file(Path::new("a.MP3")));
        assert!(is_audio_file(Path::new("b.flac")));
        assert!(!is_audio_file(Path::new("c.ogg")));
        assert!(!is_audio_file(Path::new("noext")));
        assert!(is_video_file(Path::new("clip.MOV")));
        assert!(!is_video_file(Path::new("clip.mkv")));
    }

    #[test]
    fn test_add_rejects_duplicates_and_non_audio() {
        let mut list = Playlist::new();
        assert!(list.add("a.mp3", Some(1.0)));
        assert!(!list.add("a.mp3", Some(1.0)));
        assert!(!list.add("notes.txt", None));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut list = playlist(&["a.mp3", "b.mp3", "c.mp3", "d.mp3"]);
        list.remove(&[3, 1, 1]).unwrap();
        assert_eq!(names(&list), vec!["a.mp3", "c.mp3"]);

        let err = list.remove(&[0, 5]).unwrap_err();
        assert!(matches!(err, CoreError::TrackIndexOutOfRange(5)));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_move_up_and_down() {
        let mut list = playlist(&["a.mp3", "b.mp3", "c.mp3", "d.mp3"]);
        assert_eq!(list.move_up(&[0, 2]), vec![0, 1]);
        assert_eq!(names(&list), vec!["a.mp3", "c.mp3", "b.mp3", "d.mp3"]);

        assert_eq!(list.move_down(&[2, 3]), vec![3, 3]);
        assert_eq!(names(&list), vec!["a.mp3", "c.mp3", "d.mp3", "b.mp3"]);
    }

    #[test]
    fn test_move_adjacent_selection_moves_as_block() {
        let mut list = playlist(&["a.mp3", "b.mp3", "c.mp3"]);
        assert_eq!(list.move_up(&[1, 2]), vec![0, 1]);
        assert_eq!(names(&list), vec!["b.mp3", "c.mp3", "a.mp3"]);

        assert_eq!(list.move_down(&[0, 1]), vec![1, 2]);
        assert_eq!(names(&list), vec!["a.mp3", "b.mp3", "c.mp3"]);
    }

    #[test]
    fn test_sort_by_name_ignores_case() {
        let mut list = playlist(&["/x/beta.mp3", "/y/Alpha.wav", "/z/gamma.flac"]);
        list.sort_by_name();
        assert_eq!(
            names(&list),
            vec!["/y/Alpha.wav", "/x/beta.mp3", "/z/gamma.flac"]
        );
    }

    #[test]
    fn test_shuffle_keeps_tracks() {
        let mut list = playlist(&["a.mp3", "b.mp3", "c.mp3", "d.mp3", "e.mp3"]);
        let before = list.clone();
        list.shuffle(&mut StdRng::seed_from_u64(7));
        assert_eq!(list.len(), before.len());
        for track in before.tracks() {
            assert!(list.contains(&track.path));
        }
    }

    #[test]
    fn test_total_and_format_duration() {
        let mut list = playlist(&["a.mp3", "b.mp3"]);
        list.add("c.mp3", None);
        assert_eq!(list.total_duration(), 30.0);
        assert_eq!(format_duration(Some(125.9)), "02:05");
        assert_eq!(format_duration(None), "N/A");
        assert_eq!(list.tracks()[2].label(), "c.mp3 (N/A)");
        assert_eq!(list.tracks()[0].label(), "a.mp3 (00:10)");
    }

    #[test]
    fn test_scan_folder_is_flat_and_filtered() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.mp3"), b"").unwrap();
        std::fs::write(dir.path().join("A.WAV"), b"").unwrap();
        std::fs::write(dir.path().join("cover.jpg"), b"").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("deep.mp3"), b"").unwrap();

        let found = scan_folder(dir.path()).unwrap();
        assert_eq!(
            found,
            vec![dir.path().join("A.WAV"), dir.path().join("b.mp3")]
        );
    }

    #[test]
    fn test_scan_folder_rejects_files() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("x.mp3");
        std::fs::write(&file, b"").unwrap();
        assert!(matches!(
            scan_folder(&file),
            Err(CoreError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_add_paths_with_failing_probe() {
        let prober = MediaProber::new("/definitely/not/ffprobe");
        let mut list = Playlist::new();
        let added = list
            .add_paths(
                &[
                    PathBuf::from("a.mp3"),
                    PathBuf::from("a.mp3"),
                    PathBuf::from("b.txt"),
                ],
                &prober,
            )
            .await;
        assert_eq!(added, 1);
        assert_eq!(list.tracks()[0].duration, None);
    }
}
