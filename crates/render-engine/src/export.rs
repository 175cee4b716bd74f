//! Video assembly through ffmpeg's concat demuxer.
//!
//! Composited frames arrive at irregular capture times, so the timeline
//! hands ffmpeg explicit per-frame durations instead of a frame rate.
//! Both the timeline and the exact ffmpeg invocation are written into the
//! artifacts directory before the process runs, so a failed render can be
//! replayed by hand.

use std::path::Path;

use loadcast_common::{format_args_line, run_ffmpeg, LoadcastError, LoadcastResult};
use loadcast_spec_model::{CompositedFrame, RenderingSpec};

/// Assemble `frames` into a video at `output`.
///
/// `artifacts_dir` receives `timeline.txt` and `ffmpeg.args.txt`; the
/// timeline references frames relative to that directory.
pub async fn render_video(
    frames: &[CompositedFrame],
    spec: &RenderingSpec,
    artifacts_dir: &Path,
    output: &Path,
) -> LoadcastResult<()> {
    if frames.is_empty() {
        return Err(LoadcastError::render("No frames to render"));
    }

    let timeline = build_timeline(frames, spec.outro_ms, artifacts_dir);
    let timeline_path = artifacts_dir.join("timeline.txt");
    tokio::fs::write(&timeline_path, &timeline).await?;

    let args = build_ffmpeg_args(&timeline_path, &spec.ffmpeg_args, output);
    tokio::fs::write(artifacts_dir.join("ffmpeg.args.txt"), format_args_line(&args)).await?;

    tracing::info!(
        output = %output.display(),
        frames = frames.len(),
        outro_ms = spec.outro_ms,
        "Rendering video"
    );
    tracing::debug!(args = ?args, "Running ffmpeg");

    let result = run_ffmpeg(&args).await?;
    if !result.success() {
        return Err(LoadcastError::render(format!(
            "ffmpeg render failed (status {}): {}",
            result.exit_code,
            result.stderr.trim()
        )));
    }

    tracing::info!(output = %output.display(), "Video rendered");
    Ok(())
}

/// Build the concat demuxer timeline.
///
/// Every frame shows from its own capture time until the next frame's;
/// the first entry also covers the lead-in from zero. The last frame is
/// repeated for the outro and once more as the demuxer's trailing
/// reference, which carries no duration.
pub fn build_timeline(frames: &[CompositedFrame], outro_ms: i64, base_dir: &Path) -> String {
    let mut lines = Vec::with_capacity(frames.len() * 2 + 3);
    let mut cursor = 0i64;
    for frame in frames {
        lines.push(format!("file '{}'", relative_entry(&frame.path, base_dir)));
        lines.push(format!(
            "duration {}",
            format_seconds(frame.time_offset_ms - cursor)
        ));
        cursor = frame.time_offset_ms;
    }
    if let Some(last) = frames.last() {
        let entry = relative_entry(&last.path, base_dir);
        if outro_ms > 0 {
            lines.push(format!("file '{entry}'"));
            lines.push(format!("duration {}", format_seconds(outro_ms)));
        }
        lines.push(format!("file '{entry}'"));
    }
    lines.join("\n")
}

/// Arguments for the concat render; caller-provided args slot in right
/// before the output path so they can override codec settings.
pub fn build_ffmpeg_args(timeline: &Path, extra: &[String], output: &Path) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        timeline.display().to_string(),
        "-vsync".to_string(),
        "vfr".to_string(),
    ];
    args.extend(extra.iter().cloned());
    args.push(output.display().to_string());
    args
}

fn relative_entry(path: &Path, base_dir: &Path) -> String {
    path.strip_prefix(base_dir)
        .unwrap_or(path)
        .display()
        .to_string()
}

/// Milliseconds as seconds, trailing zeros dropped ("1", "2.5", "0.033").
fn format_seconds(ms: i64) -> String {
    format!("{}", ms as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn frame(path: &str, time_offset_ms: i64) -> CompositedFrame {
        CompositedFrame {
            path: PathBuf::from(path),
            time_offset_ms,
        }
    }

    #[test]
    fn test_build_timeline_matches_concat_format() {
        let frames = vec![
            frame("/art/frame1.png", 1000),
            frame("/art/frame2.png", 3000),
        ];
        let timeline = build_timeline(&frames, 3000, Path::new("/art"));
        assert_eq!(
            timeline,
            "file 'frame1.png'\n\
             duration 1\n\
             file 'frame2.png'\n\
             duration 2\n\
             file 'frame2.png'\n\
             duration 3\n\
             file 'frame2.png'"
        );
    }

    #[test]
    fn test_build_timeline_without_outro() {
        let frames = vec![frame("/art/a.png", 500)];
        let timeline = build_timeline(&frames, 0, Path::new("/art"));
        assert_eq!(timeline, "file 'a.png'\nduration 0.5\nfile 'a.png'");
    }

    #[test]
    fn test_build_timeline_empty_frames() {
        assert_eq!(build_timeline(&[], 1000, Path::new("/art")), "");
    }

    #[test]
    fn test_durations_print_like_plain_decimals() {
        let frames = vec![
            frame("/art/a.png", 33),
            frame("/art/b.png", 1500),
        ];
        let timeline = build_timeline(&frames, 0, Path::new("/art"));
        assert!(timeline.contains("duration 0.033"));
        assert!(timeline.contains("duration 1.467"));
    }

    #[test]
    fn test_entries_are_relative_to_base_dir() {
        let frames = vec![frame("/art/frames/frame-0000000100.png", 100)];
        let timeline = build_timeline(&frames, 0, Path::new("/art"));
        assert!(timeline.starts_with("file 'frames/frame-0000000100.png'"));
    }

    #[test]
    fn test_entries_outside_base_dir_stay_absolute() {
        let frames = vec![frame("/elsewhere/a.png", 100)];
        let timeline = build_timeline(&frames, 0, Path::new("/art"));
        assert!(timeline.starts_with("file '/elsewhere/a.png'"));
    }

    #[test]
    fn test_ffmpeg_args_embed_extras_before_output() {
        let extra = vec!["-c:v".to_string(), "libx264".to_string()];
        let args = build_ffmpeg_args(
            Path::new("/art/timeline.txt"),
            &extra,
            Path::new("/out/show.mp4"),
        );
        assert_eq!(
            args,
            vec![
                "-y",
                "-f",
                "concat",
                "-safe",
                "0",
                "-i",
                "/art/timeline.txt",
                "-vsync",
                "vfr",
                "-c:v",
                "libx264",
                "/out/show.mp4",
            ]
        );
    }
}
