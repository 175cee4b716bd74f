//! External encoder invocation.
//!
//! The final video is produced by an `ffmpeg` binary resolved from the
//! `FFMPEG_PATH` environment variable or the system PATH. Callers get the
//! captured output back and decide what a nonzero exit means for them.

use tokio::process::Command;

use crate::error::{LoadcastError, LoadcastResult};

/// Captured result of one external command run.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Resolve the ffmpeg executable: `FFMPEG_PATH` if set, else `ffmpeg`.
pub fn resolve_ffmpeg() -> String {
    std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string())
}

/// Run ffmpeg with the given arguments, capturing stdout and stderr.
///
/// Spawn failures (missing binary) are errors; a nonzero exit is reported
/// through [`CommandOutput::exit_code`] and left to the caller.
pub async fn run_ffmpeg(args: &[String]) -> LoadcastResult<CommandOutput> {
    let ffmpeg = resolve_ffmpeg();
    tracing::debug!(command = %ffmpeg, ?args, "Running ffmpeg");

    let output = Command::new(&ffmpeg)
        .args(args)
        .output()
        .await
        .map_err(|e| {
            LoadcastError::render(format!(
                "Failed to start {ffmpeg}: {e}. Is ffmpeg installed and on PATH?"
            ))
        })?;

    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Join arguments into a single inspectable line, quoting arguments that
/// contain spaces.
pub fn format_args_line(args: &[String]) -> String {
    args.iter()
        .map(|a| {
            if a.contains(' ') {
                format!("'{a}'")
            } else {
                a.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
