//! Record the loading of a URL into a video.

use std::path::PathBuf;

use loadcast_pipeline::{run_show, ShowInput};
use loadcast_spec_model::OverrideSet;

pub async fn run(
    merge: Option<PathBuf>,
    updates: Vec<String>,
    artifacts: Option<PathBuf>,
    url: String,
    video_file: PathBuf,
) -> anyhow::Result<()> {
    let mut overrides = OverrideSet::new()?;

    if let Some(merge_path) = &merge {
        let text = tokio::fs::read_to_string(merge_path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", merge_path.display()))?;
        overrides
            .apply_yaml(&text)
            .map_err(|e| anyhow::anyhow!("Failed to apply {}: {e}", merge_path.display()))?;
    }

    // A broken -u phrase is skipped with a warning rather than killing
    // the run, so a long recording is not lost to one typo.
    for phrase in &updates {
        if let Err(e) = overrides.apply_phrase(phrase) {
            tracing::warn!("{e}");
        }
    }

    let spec = overrides.into_spec()?;

    // Explicit artifact directories are recreated and survive the run;
    // otherwise artifacts live in a temp dir removed at the end.
    let mut temp_guard: Option<tempfile::TempDir> = None;
    let artifacts_dir = match artifacts {
        Some(dir) => {
            if dir.exists() {
                tokio::fs::remove_dir_all(&dir).await?;
            }
            tokio::fs::create_dir_all(&dir).await?;
            dir
        }
        None => {
            let temp = tempfile::TempDir::new()?;
            let path = temp.path().to_path_buf();
            temp_guard = Some(temp);
            path
        }
    };

    if let Some(parent) = video_file.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let input = ShowInput {
        url,
        video_file_path: video_file,
        artifacts_dir,
        spec,
    };
    let result = run_show(&input).await;

    if let Some(temp) = temp_guard.take() {
        if let Err(e) = temp.close() {
            tracing::debug!(error = %e, "Failed to remove temp artifacts directory");
        }
    }

    let report = result?;
    println!("Video: {}", report.video_file_path.display());
    if let Some(title) = &report.title {
        println!("Title: {title}");
    }
    if let Some(on_load_ms) = report.timing.on_load_ms {
        println!("OnLoad: {:.2} sec.", on_load_ms as f64 / 1000.0);
    }
    println!(
        "Resources: {:.2} MB",
        report.resources.all as f64 / 1024.0 / 1024.0
    );
    Ok(())
}
