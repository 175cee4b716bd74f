//! Side-by-side comparison of rendered shows.

use std::path::{Path, PathBuf};

use loadcast_common::{run_ffmpeg, LoadcastError, LoadcastResult};

/// Stack `inputs` horizontally into one comparison video.
pub async fn juxtapose_videos(inputs: &[PathBuf], output: &Path) -> LoadcastResult<()> {
    if inputs.len() < 2 {
        return Err(LoadcastError::render(
            "Juxtaposing needs at least two input videos",
        ));
    }

    let args = build_juxtapose_args(inputs, output);
    tracing::info!(
        inputs = inputs.len(),
        output = %output.display(),
        "Juxtaposing videos"
    );
    tracing::debug!(args = ?args, "Running ffmpeg");

    let result = run_ffmpeg(&args).await?;
    if !result.success() {
        return Err(LoadcastError::render(format!(
            "ffmpeg juxtapose failed (status {}): {}",
            result.exit_code,
            result.stderr.trim()
        )));
    }
    Ok(())
}

/// hstack filter graph: every input's video stream side by side.
pub fn build_juxtapose_args(inputs: &[PathBuf], output: &Path) -> Vec<String> {
    let mut args = Vec::new();
    for input in inputs {
        args.push("-i".to_string());
        args.push(input.display().to_string());
    }

    let streams: String = (0..inputs.len()).map(|i| format!("[{i}:v]")).collect();
    args.push("-filter_complex".to_string());
    args.push(format!("{streams}hstack=inputs={}[v]", inputs.len()));
    args.push("-map".to_string());
    args.push("[v]".to_string());
    args.push("-vcodec".to_string());
    args.push("libx264".to_string());
    args.push("-crf".to_string());
    args.push("23".to_string());
    args.push(output.display().to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_juxtapose_args_stack_all_inputs() {
        let inputs = vec![
            PathBuf::from("/v/left.mp4"),
            PathBuf::from("/v/mid.mp4"),
            PathBuf::from("/v/right.mp4"),
        ];
        let args = build_juxtapose_args(&inputs, Path::new("/v/out.mp4"));
        assert_eq!(
            args,
            vec![
                "-i",
                "/v/left.mp4",
                "-i",
                "/v/mid.mp4",
                "-i",
                "/v/right.mp4",
                "-filter_complex",
                "[0:v][1:v][2:v]hstack=inputs=3[v]",
                "-map",
                "[v]",
                "-vcodec",
                "libx264",
                "-crf",
                "23",
                "/v/out.mp4",
            ]
        );
    }
}
