//! Settings Persistence System
//!
//! Provides persistent settings with:
//! - Atomic file writes (temp file + rename)
//! - Defaults for every missing field
//! - Normalization of out-of-range values on load and save
//!
//! Storage location: {config_dir}/mixforge/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::ffmpeg::ToolOverrides;
use crate::render::{
    AacBitrate, Acceleration, AudioFormat, CodecFamily, FrameRateChoice, JobKind, Mp3Bitrate,
    ProgressStream, Quality, RenderRequest, ResolutionChoice,
};
use crate::{CoreError, CoreResult};

/// Settings schema version for migration support
pub const SETTINGS_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE: &str = "settings.json";

/// Lock file name (advisory lock to prevent concurrent writers)
pub const SETTINGS_LOCK_FILE: &str = "settings.json.lock";

/// Application directory name under the platform config/data dirs
pub const APP_DIR: &str = "mixforge";

/// Default journal file name
pub const JOURNAL_FILE: &str = "mix_log.txt";

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    /// Schema version for migrations
    #[serde(default = "default_version")]
    pub version: u32,

    /// Explicit ffmpeg/ffprobe locations
    #[serde(default)]
    pub tools: ToolOverrides,

    /// Defaults applied to every render
    #[serde(default)]
    pub render: RenderDefaults,

    /// Mix journal
    #[serde(default)]
    pub journal: JournalSettings,

    /// Log output
    #[serde(default)]
    pub logging: LoggingSettings,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            tools: ToolOverrides::default(),
            render: RenderDefaults::default(),
            journal: JournalSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl AppSettings {
    /// Repairs values so persisted state is always usable.
    pub fn normalize(&mut self) {
        self.version = SETTINGS_VERSION;

        self.tools.ffmpeg = non_empty_path(self.tools.ffmpeg.take());
        self.tools.ffprobe = non_empty_path(self.tools.ffprobe.take());

        self.journal.path = non_empty_path(self.journal.path.take());

        self.logging.level = normalize_enum(&self.logging.level, LOG_LEVELS, default_log_level());
        self.logging.directory = non_empty_path(self.logging.directory.take());
    }
}

fn non_empty_path(path: Option<PathBuf>) -> Option<PathBuf> {
    path.filter(|p| !p.as_os_str().is_empty())
}

fn normalize_enum(value: &str, allowed: &[&str], fallback: String) -> String {
    let value = value.trim();
    if allowed.iter().any(|v| v.eq_ignore_ascii_case(value)) {
        value.to_ascii_lowercase()
    } else {
        fallback
    }
}

/// Render defaults. CLI flags override these per invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenderDefaults {
    /// Pipe ffmpeg writes `-progress` output to
    #[serde(default)]
    pub progress_stream: ProgressStream,

    #[serde(default)]
    pub codec: CodecFamily,

    #[serde(default)]
    pub quality: Quality,

    #[serde(default)]
    pub resolution: ResolutionChoice,

    #[serde(default)]
    pub frame_rate: FrameRateChoice,

    #[serde(default)]
    pub fade: bool,

    #[serde(default)]
    pub acceleration: Acceleration,

    #[serde(default)]
    pub aac_bitrate: AacBitrate,

    #[serde(default)]
    pub mp3_bitrate: Mp3Bitrate,

    #[serde(default)]
    pub audio_format: AudioFormat,

    /// Write `<output>_timestamps.txt` after a successful mix
    #[serde(default = "default_true")]
    pub write_timestamps: bool,
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            progress_stream: ProgressStream::default(),
            codec: CodecFamily::default(),
            quality: Quality::default(),
            resolution: ResolutionChoice::default(),
            frame_rate: FrameRateChoice::default(),
            fade: false,
            acceleration: Acceleration::default(),
            aac_bitrate: AacBitrate::default(),
            mp3_bitrate: Mp3Bitrate::default(),
            audio_format: AudioFormat::default(),
            write_timestamps: true,
        }
    }
}

impl RenderDefaults {
    /// A request for `job` carrying these defaults.
    pub fn request(&self, output: PathBuf, job: JobKind) -> RenderRequest {
        RenderRequest {
            output,
            job,
            codec: self.codec,
            resolution: self.resolution,
            frame_rate: self.frame_rate,
            quality: self.quality,
            fade: self.fade,
            acceleration: self.acceleration,
            aac_bitrate: self.aac_bitrate,
            write_timestamps: self.write_timestamps,
        }
    }
}

/// Append-only log of started mixes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JournalSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Journal file. Defaults to `mix_log.txt` in the data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl JournalSettings {
    /// Journal location, or `None` when disabled.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        if !self.enabled {
            return None;
        }
        self.path.clone().or_else(|| {
            Some(
                dirs::data_local_dir()
                    .map(|d| d.join(APP_DIR).join(JOURNAL_FILE))
                    .unwrap_or_else(|| PathBuf::from(JOURNAL_FILE)),
            )
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for rolling log files. Defaults to `{data_dir}/mixforge/logs`.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

impl LoggingSettings {
    pub fn resolved_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .map(|d| d.join(APP_DIR).join("logs"))
                .unwrap_or_else(|| PathBuf::from("logs"))
        })
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

// =============================================================================
// Manager
// =============================================================================

/// Loads and saves [`AppSettings`] under a directory.
#[derive(Debug, Clone)]
pub struct SettingsManager {
    settings_path: PathBuf,
}

impl SettingsManager {
    /// Create a settings manager storing its file in `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            settings_path: dir.into().join(SETTINGS_FILE),
        }
    }

    /// Manager for `{config_dir}/mixforge`
    pub fn default_location() -> CoreResult<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| CoreError::Settings("No configuration directory available".into()))?;
        Ok(Self::new(dir.join(APP_DIR)))
    }

    fn lock_path(&self) -> PathBuf {
        self.settings_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(SETTINGS_LOCK_FILE)
    }

    fn with_lock<T>(&self, exclusive: bool, op: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CoreError::Settings(format!("Failed to create settings directory: {}", e))
            })?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(|e| CoreError::Settings(format!("Failed to open settings lock file: {}", e)))?;

        if exclusive {
            fs2::FileExt::lock_exclusive(&lock_file).map_err(|e| {
                CoreError::Settings(format!("Failed to lock settings file (exclusive): {}", e))
            })?;
        } else {
            fs2::FileExt::lock_shared(&lock_file).map_err(|e| {
                CoreError::Settings(format!("Failed to lock settings file (shared): {}", e))
            })?;
        }

        let result = op();

        if let Err(e) = fs2::FileExt::unlock(&lock_file) {
            warn!("Failed to unlock settings lock file: {}", e);
        }

        result
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Load settings from disk, returning defaults if the file is missing or unreadable
    pub fn load(&self) -> AppSettings {
        match self.try_load() {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load settings, using defaults: {}", e);
                AppSettings::default()
            }
        }
    }

    /// Load settings, reporting a corrupt file instead of falling back.
    pub fn try_load(&self) -> CoreResult<AppSettings> {
        self.with_lock(false, || {
            if !self.settings_path.exists() {
                info!("Settings file not found, using defaults");
                return Ok(AppSettings::default());
            }

            let content = fs::read_to_string(&self.settings_path)?;
            let mut settings = serde_json::from_str::<AppSettings>(&content)?;

            if settings.version < SETTINGS_VERSION {
                info!(
                    "Migrating settings from version {} to {}",
                    settings.version, SETTINGS_VERSION
                );
            }

            settings.normalize();
            Ok(settings)
        })
    }

    /// Save settings using an atomic write (temp file + rename)
    pub fn save(&self, settings: &AppSettings) -> CoreResult<AppSettings> {
        self.with_lock(true, || {
            let mut normalized = settings.clone();
            normalized.normalize();

            let content = serde_json::to_string_pretty(&normalized)?;

            let temp_path = self.settings_path.with_extension("json.tmp");
            if temp_path.exists() {
                let _ = fs::remove_file(&temp_path);
            }

            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;

            if cfg!(windows) {
                // rename does not overwrite on Windows
                let backup_path = self.settings_path.with_extension("json.bak");
                if backup_path.exists() {
                    let _ = fs::remove_file(&backup_path);
                }

                if self.settings_path.exists() {
                    fs::rename(&self.settings_path, &backup_path)?;
                }

                match fs::rename(&temp_path, &self.settings_path) {
                    Ok(()) => {
                        if backup_path.exists() {
                            let _ = fs::remove_file(&backup_path);
                        }
                    }
                    Err(e) => {
                        if backup_path.exists() {
                            let _ = fs::rename(&backup_path, &self.settings_path);
                        }
                        return Err(CoreError::Settings(format!(
                            "Failed to finalize settings file: {}",
                            e
                        )));
                    }
                }
            } else {
                fs::rename(&temp_path, &self.settings_path)?;
            }

            info!("Settings saved to {}", self.settings_path.display());
            Ok(normalized)
        })
    }

    /// Delete the settings file and return defaults
    pub fn reset(&self) -> CoreResult<AppSettings> {
        self.with_lock(true, || {
            if self.settings_path.exists() {
                fs::remove_file(&self.settings_path)?;
                info!("Settings file deleted");
            }
            Ok(AppSettings::default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = AppSettings::default();
        assert_eq!(settings.version, SETTINGS_VERSION);
        assert_eq!(settings.render.progress_stream, ProgressStream::Stdout);
        assert_eq!(settings.render.audio_format, AudioFormat::Mp3);
        assert_eq!(settings.render.mp3_bitrate, Mp3Bitrate::K192);
        assert_eq!(settings.render.aac_bitrate, AacBitrate::K320);
        assert!(settings.render.write_timestamps);
        assert!(settings.journal.enabled);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "render": { "codec": "hevc", "fade": true } }"#;
        let settings: AppSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.render.codec, CodecFamily::Hevc);
        assert!(settings.render.fade);
        assert_eq!(settings.render.quality, Quality::Standard);
        assert!(settings.render.write_timestamps);
        assert_eq!(settings.tools, ToolOverrides::default());
    }

    #[test]
    fn test_serialization_is_camel_case() {
        let json = serde_json::to_string(&AppSettings::default()).unwrap();
        assert!(json.contains("\"progressStream\":\"stdout\""));
        assert!(json.contains("\"writeTimestamps\":true"));
        assert!(json.contains("\"mp3Bitrate\":192"));
    }

    #[test]
    fn test_normalize_repairs_values() {
        let mut settings = AppSettings {
            version: 0,
            ..Default::default()
        };
        settings.logging.level = " DEBUG ".to_string();
        settings.tools.ffmpeg = Some(PathBuf::new());
        settings.journal.path = Some(PathBuf::new());
        settings.normalize();

        assert_eq!(settings.version, SETTINGS_VERSION);
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.tools.ffmpeg.is_none());
        assert!(settings.journal.path.is_none());

        settings.logging.level = "loud".to_string();
        settings.normalize();
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_request_carries_defaults() {
        let defaults = RenderDefaults {
            codec: CodecFamily::Prores,
            fade: true,
            acceleration: Acceleration::Software,
            ..Default::default()
        };
        let request = defaults.request(
            PathBuf::from("out.mov"),
            JobKind::VideoExtend {
                video: PathBuf::from("loop.mp4"),
                tracks: vec![PathBuf::from("a.mp3")],
            },
        );
        assert_eq!(request.codec, CodecFamily::Prores);
        assert!(request.fade);
        assert_eq!(request.acceleration, Acceleration::Software);
        assert_eq!(request.output, PathBuf::from("out.mov"));
    }

    #[test]
    fn test_journal_path_resolution() {
        let disabled = JournalSettings {
            enabled: false,
            path: Some(PathBuf::from("x.txt")),
        };
        assert!(disabled.resolved_path().is_none());

        let explicit = JournalSettings {
            enabled: true,
            path: Some(PathBuf::from("x.txt")),
        };
        assert_eq!(explicit.resolved_path(), Some(PathBuf::from("x.txt")));

        let default = JournalSettings::default().resolved_path().unwrap();
        assert!(default.ends_with(JOURNAL_FILE));
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(dir.path());
        assert_eq!(manager.load(), AppSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(dir.path());

        let mut settings = AppSettings::default();
        settings.tools.ffmpeg = Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        settings.render.quality = Quality::High;
        settings.render.progress_stream = ProgressStream::Stderr;

        let saved = manager.save(&settings).unwrap();
        assert_eq!(saved, settings);
        assert!(manager.settings_path().exists());
        assert!(!manager.settings_path().with_extension("json.tmp").exists());

        let loaded = manager.load();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(dir.path());
        fs::write(manager.settings_path(), "{ not json").unwrap();

        assert!(matches!(manager.try_load(), Err(CoreError::JsonError(_))));
        assert_eq!(manager.load(), AppSettings::default());
    }

    #[test]
    fn test_reset_deletes_file() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(dir.path());
        manager.save(&AppSettings::default()).unwrap();
        assert!(manager.settings_path().exists());

        let reset = manager.reset().unwrap();
        assert_eq!(reset, AppSettings::default());
        assert!(!manager.settings_path().exists());
    }
}
