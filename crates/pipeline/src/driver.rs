//! The show driver.
//!
//! Stage order and artifact names are fixed: `timing.json`, `banner.*`,
//! `frames/`, `timeline.txt`, and `ffmpeg.args.txt` always mean the same
//! thing inside an artifacts directory. The browser is launched twice,
//! once sized for the capture viewport and once for the banner, so the
//! recording page never inherits banner emulation state.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use loadcast_capture_engine::{
    create_banner, record_page_load, BannerContext, BrowserSession, CaptureViewport,
};
use loadcast_common::LoadcastResult;
use loadcast_render_engine::{compose_frames, render_video};
use loadcast_spec_model::{
    compute_layout, BannerImage, CompositedFrame, Layout, Recording, ResourceSnapshot, ShowSpec,
    Timing,
};

/// Everything needed to produce one show.
#[derive(Debug, Clone)]
pub struct ShowInput {
    pub url: String,
    pub video_file_path: PathBuf,
    pub artifacts_dir: PathBuf,
    pub spec: ShowSpec,
}

/// Summary of a finished show.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowReport {
    pub url: String,
    pub video_file_path: PathBuf,
    pub title: Option<String>,
    pub timing: Timing,
    pub resources: ResourceSnapshot,
}

/// Stage hooks for embedders; every method defaults to a no-op.
pub trait ProgressObserver: Send {
    fn after_layout(&mut self, _layout: &Layout) {}
    fn after_recording(&mut self, _recording: &Recording) {}
    fn after_banner(&mut self, _banner: &BannerImage) {}
    fn after_composition(&mut self, _frames: &[CompositedFrame]) {}
    fn after_render(&mut self, _video: &Path) {}
}

struct NoopObserver;

impl ProgressObserver for NoopObserver {}

/// Run the whole pipeline for `input`.
pub async fn run_show(input: &ShowInput) -> LoadcastResult<ShowReport> {
    run_show_with(input, &mut NoopObserver).await
}

/// Like [`run_show`], reporting each finished stage to `observer`.
pub async fn run_show_with(
    input: &ShowInput,
    observer: &mut dyn ProgressObserver,
) -> LoadcastResult<ShowReport> {
    let timestamp_ms = Utc::now().timestamp_millis();
    let spec = &input.spec;
    tracing::info!(url = %input.url, "Starting show");
    tokio::fs::create_dir_all(&input.artifacts_dir).await?;

    tracing::info!("Calculating layout");
    let layout = compute_layout(&spec.layout);
    tracing::debug!(?layout, "Layout computed");
    observer.after_layout(&layout);

    tracing::info!("Recording web page loading");
    let recording = {
        let viewport = CaptureViewport::from_scroll(spec.recording.viewport_width, layout.scroll);
        let session = BrowserSession::launch(
            &spec.recording.browser,
            viewport.width.max(1) as u32,
            viewport.height.max(1) as u32,
        )
        .await?;
        let recording = record_page_load(
            &session,
            &input.url,
            &spec.recording,
            spec.frame_quality,
            layout.scroll,
        )
        .await;
        if let Err(e) = session.close().await {
            tracing::warn!(error = %e, "Failed to close recording browser");
        }
        recording?
    };
    let timing_json = serde_json::to_string_pretty(&recording.timing)?;
    tokio::fs::write(input.artifacts_dir.join("timing.json"), timing_json).await?;
    observer.after_recording(&recording);

    let banner = if spec.has_banner {
        tracing::info!("Creating information banner");
        let context = banner_context(input, timestamp_ms, &recording);
        let session = BrowserSession::launch(
            &spec.recording.browser,
            context.width.max(1) as u32,
            400,
        )
        .await?;
        let banner = create_banner(&session, &spec.banner, &context, &input.artifacts_dir).await;
        if let Err(e) = session.close().await {
            tracing::warn!(error = %e, "Failed to close banner browser");
        }
        let banner = banner?;
        observer.after_banner(&banner);
        Some(banner)
    } else {
        None
    };

    tracing::info!("Composing frames");
    let frames_dir = input.artifacts_dir.join("frames");
    let frames = compose_frames(spec, &layout, &recording, banner.as_ref(), &frames_dir)?;
    observer.after_composition(&frames);

    tracing::info!("Rendering video file");
    let video_path = &input.video_file_path;
    render_video(&frames, &spec.rendering, &input.artifacts_dir, video_path).await?;
    observer.after_render(video_path);

    tracing::info!(
        url = %input.url,
        title = recording.title.as_deref().unwrap_or(""),
        video = %video_path.display(),
        resource_bytes = recording.total_resources.all,
        on_load_ms = recording.timing.on_load_ms,
        "Finished show"
    );

    Ok(ShowReport {
        url: input.url.clone(),
        video_file_path: input.video_file_path.clone(),
        title: recording.title,
        timing: recording.timing,
        resources: recording.total_resources,
    })
}

/// Variables the banner stage inherits from the rest of the run.
fn banner_context(input: &ShowInput, timestamp_ms: i64, recording: &Recording) -> BannerContext {
    BannerContext {
        timestamp_ms,
        width: input.spec.layout.canvas_width,
        resource_size_bytes: recording.total_resources.all,
        on_load_time_ms: recording.timing.on_load_ms.unwrap_or(0),
        url: input.url.clone(),
        html_title: recording
            .title
            .clone()
            .unwrap_or_else(|| input.url.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn show_input() -> ShowInput {
        ShowInput {
            url: "https://example.com/".to_string(),
            video_file_path: PathBuf::from("/out/show.mp4"),
            artifacts_dir: PathBuf::from("/art"),
            spec: ShowSpec::default(),
        }
    }

    fn empty_recording() -> Recording {
        Recording {
            frames: Vec::new(),
            title: None,
            timing: Timing::default(),
            total_resources: ResourceSnapshot::default(),
        }
    }

    #[test]
    fn banner_context_falls_back_to_url_for_title() {
        let context = banner_context(&show_input(), 123, &empty_recording());
        assert_eq!(context.html_title, "https://example.com/");
        assert_eq!(context.on_load_time_ms, 0);
        assert_eq!(context.width, 512);
        assert_eq!(context.timestamp_ms, 123);
    }

    #[test]
    fn banner_context_prefers_recorded_title() {
        let mut recording = empty_recording();
        recording.title = Some("Example Domain".to_string());
        recording.timing.on_load_ms = Some(2500);
        recording.total_resources.all = 4096;

        let context = banner_context(&show_input(), 123, &recording);
        assert_eq!(context.html_title, "Example Domain");
        assert_eq!(context.on_load_time_ms, 2500);
        assert_eq!(context.resource_size_bytes, 4096);
    }
}
