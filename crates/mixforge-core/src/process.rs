//! Child process construction for the external tools.
//!
//! Every `ffmpeg`/`ffprobe` invocation goes through these helpers so that a
//! GUI front-end never flashes a console window on Windows.

use std::ffi::OsStr;
use std::process::Stdio;

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Build a blocking command for short-lived queries (`-version`, `-encoders`).
pub fn tool_command(program: impl AsRef<OsStr>) -> std::process::Command {
    let mut cmd = std::process::Command::new(program);
    cmd.stdin(Stdio::null());
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

/// Build an async command for probes and renders.
///
/// Both output streams are piped; the child is killed if its handle is
/// dropped before it exits.
pub fn async_tool_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(target_os = "windows")]
    {
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}
