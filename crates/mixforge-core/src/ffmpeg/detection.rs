//! FFmpeg Detection Module
//!
//! Locates the `ffmpeg` and `ffprobe` binaries and checks that they run.
//!
//! Lookup order for each binary:
//! 1. An explicit path from settings or the command line
//! 2. A copy shipped next to the running executable
//! 3. Well-known install directories for the platform
//! 4. The system `PATH`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{FFmpegError, FFmpegResult};
use crate::process::tool_command;

/// Information about the detected FFmpeg installation
#[derive(Debug, Clone)]
pub struct FFmpegInfo {
    /// Path to ffmpeg binary
    pub ffmpeg_path: PathBuf,
    /// Path to ffprobe binary
    pub ffprobe_path: PathBuf,
    /// FFmpeg version string
    pub version: String,
    /// Whether ffmpeg was found next to the executable
    pub is_bundled: bool,
}

/// User-supplied binary locations that take precedence over discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOverrides {
    #[serde(default)]
    pub ffmpeg: Option<PathBuf>,
    #[serde(default)]
    pub ffprobe: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
enum Tool {
    Ffmpeg,
    Ffprobe,
}

impl Tool {
    fn name(self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
        }
    }

    fn binary_name(self) -> String {
        format!("{}{}", self.name(), std::env::consts::EXE_SUFFIX)
    }
}

/// Detect ffmpeg and ffprobe and read the ffmpeg version.
pub fn detect_ffmpeg(overrides: &ToolOverrides) -> FFmpegResult<FFmpegInfo> {
    let bundled_dir = bundled_dir();

    let (ffmpeg_path, is_bundled) =
        locate(Tool::Ffmpeg, overrides.ffmpeg.as_deref(), bundled_dir.as_deref())?;
    let (ffprobe_path, _) =
        locate(Tool::Ffprobe, overrides.ffprobe.as_deref(), bundled_dir.as_deref())?;

    let version = get_ffmpeg_version(&ffmpeg_path)?;
    info!(
        "Using ffmpeg {} at {} (ffprobe at {})",
        version,
        ffmpeg_path.display(),
        ffprobe_path.display()
    );

    Ok(FFmpegInfo {
        ffmpeg_path,
        ffprobe_path,
        version,
        is_bundled,
    })
}

/// Directory of the running executable, where packaged builds keep binaries.
fn bundled_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

fn locate(
    tool: Tool,
    explicit: Option<&Path>,
    bundled_dir: Option<&Path>,
) -> FFmpegResult<(PathBuf, bool)> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok((path.to_path_buf(), false));
        }
        // A bare name like "ffmpeg-7" is resolved through PATH.
        if let Ok(resolved) = which::which(path) {
            return Ok((resolved, false));
        }
        debug!(
            "Configured {} path {} does not exist, falling back to discovery",
            tool.name(),
            path.display()
        );
    }

    let binary_name = tool.binary_name();

    if let Some(dir) = bundled_dir {
        let candidate = dir.join(&binary_name);
        if candidate.is_file() {
            return Ok((candidate, true));
        }
    }

    for dir in get_common_ffmpeg_paths() {
        let candidate = dir.join(&binary_name);
        if candidate.is_file() {
            return Ok((candidate, false));
        }
    }

    which::which(tool.name())
        .map(|path| (path, false))
        .map_err(|_| FFmpegError::NotFound(tool.name()))
}

/// Get common FFmpeg installation paths for the current platform
fn get_common_ffmpeg_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    #[cfg(target_os = "windows")]
    {
        paths.push(PathBuf::from(r"C:\ffmpeg\bin"));
        paths.push(PathBuf::from(r"C:\Program Files\ffmpeg\bin"));

        if let Ok(programdata) = std::env::var("ProgramData") {
            paths.push(PathBuf::from(programdata).join("chocolatey").join("bin"));
        }
        if let Ok(userprofile) = std::env::var("USERPROFILE") {
            paths.push(PathBuf::from(userprofile).join("scoop").join("shims"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        paths.push(PathBuf::from("/opt/homebrew/bin"));
        paths.push(PathBuf::from("/usr/local/bin"));
        paths.push(PathBuf::from("/opt/local/bin"));
    }

    #[cfg(target_os = "linux")]
    {
        paths.push(PathBuf::from("/usr/bin"));
        paths.push(PathBuf::from("/usr/local/bin"));
        paths.push(PathBuf::from("/snap/bin"));
    }

    paths
}

fn get_ffmpeg_version(ffmpeg_path: &Path) -> FFmpegResult<String> {
    let output = tool_command(ffmpeg_path)
        .arg("-version")
        .output()
        .map_err(FFmpegError::ProcessError)?;

    if !output.status.success() {
        return Err(FFmpegError::ExecutionFailed(format!(
            "{} -version exited with {}",
            ffmpeg_path.display(),
            output.status
        )));
    }

    parse_version_banner(&String::from_utf8_lossy(&output.stdout))
}

/// Extract the version from the first line: "ffmpeg version X.Y.Z ..."
fn parse_version_banner(banner: &str) -> FFmpegResult<String> {
    let first_line = banner
        .lines()
        .next()
        .ok_or_else(|| FFmpegError::ParseError("Empty ffmpeg -version output".to_string()))?;

    Ok(first_line
        .strip_prefix("ffmpeg version ")
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or(first_line)
        .to_string())
}

/// Validate that both binaries are functional
pub fn validate_ffmpeg(info: &FFmpegInfo) -> FFmpegResult<()> {
    for path in [&info.ffmpeg_path, &info.ffprobe_path] {
        let status = tool_command(path)
            .arg("-version")
            .output()
            .map_err(FFmpegError::ProcessError)?
            .status;
        if !status.success() {
            return Err(FFmpegError::ExecutionFailed(format!(
                "{} is not functional ({})",
                path.display(),
                status
            )));
        }
    }
    Ok(())
}
