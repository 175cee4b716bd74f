//! The show spec: every knob of a run, with defaults that produce a
//! reasonable video out of the box.
//!
//! Each section has a mirror `*Overrides` struct in which every field is
//! optional. Overrides come from a YAML file or `key=value` phrases (see
//! [`crate::merge`]), get deserialized into the typed mirror, and are then
//! folded over the defaults. Scalars replace, maps merge per key, and
//! argument lists concatenate so user flags extend rather than clobber
//! the defaults.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::layout::{LayoutOverrides, LayoutSpec};

/// Encoding used for captured and composited frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    Png,
    Jpeg,
}

impl FrameFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            FrameFormat::Png => "png",
            FrameFormat::Jpeg => "jpg",
        }
    }
}

/// Network shaping applied to the browser session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkSpec {
    pub latency_ms: f64,
    pub download_throughput_mbps: f64,
    pub upload_throughput_mbps: f64,
}

impl Default for NetworkSpec {
    fn default() -> Self {
        Self {
            latency_ms: 20.0,
            download_throughput_mbps: 10.0,
            upload_throughput_mbps: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkOverrides {
    pub latency_ms: Option<f64>,
    pub download_throughput_mbps: Option<f64>,
    pub upload_throughput_mbps: Option<f64>,
}

impl NetworkSpec {
    pub fn merge(self, overrides: NetworkOverrides) -> Self {
        Self {
            latency_ms: overrides.latency_ms.unwrap_or(self.latency_ms),
            download_throughput_mbps: overrides
                .download_throughput_mbps
                .unwrap_or(self.download_throughput_mbps),
            upload_throughput_mbps: overrides
                .upload_throughput_mbps
                .unwrap_or(self.upload_throughput_mbps),
        }
    }

    /// Throughput converted to the bytes-per-second the devtools protocol
    /// expects.
    pub fn download_throughput_bps(&self) -> f64 {
        (self.download_throughput_mbps * 1024.0 * 1024.0 / 8.0).floor()
    }

    pub fn upload_throughput_bps(&self) -> f64 {
        (self.upload_throughput_mbps * 1024.0 * 1024.0 / 8.0).floor()
    }
}

/// Which browser binary to run and how to launch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrowserSpec {
    /// Explicit executable path. Empty means resolve via the `CHROME_PATH`
    /// environment variable, then well-known binary names.
    pub executable: String,
    pub headless: bool,
    /// Extra command line arguments, appended to the built-in set.
    pub args: Vec<String>,
}

impl Default for BrowserSpec {
    fn default() -> Self {
        Self {
            executable: String::new(),
            headless: true,
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrowserOverrides {
    pub executable: Option<String>,
    pub headless: Option<bool>,
    pub args: Option<Vec<String>>,
}

impl BrowserSpec {
    pub fn merge(mut self, overrides: BrowserOverrides) -> Self {
        if let Some(executable) = overrides.executable {
            self.executable = executable;
        }
        if let Some(headless) = overrides.headless {
            self.headless = headless;
        }
        if let Some(args) = overrides.args {
            self.args.extend(args);
        }
        self
    }
}

/// How the page load itself is captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordingSpec {
    pub network: NetworkSpec,
    /// CPU slowdown factor, 1.0 disables throttling.
    pub cpu_throttling: f64,
    /// Extra request headers. Keys are treated case-insensitively.
    pub headers: BTreeMap<String, String>,
    /// Page viewport width in CSS pixels. The capture is scaled from this.
    pub viewport_width: i64,
    /// Navigation deadline. The recording fails when the load event has not
    /// fired by then.
    pub timeout_ms: u64,
    pub browser: BrowserSpec,
}

impl Default for RecordingSpec {
    fn default() -> Self {
        Self {
            network: NetworkSpec::default(),
            cpu_throttling: 4.0,
            headers: BTreeMap::new(),
            viewport_width: 375,
            timeout_ms: 30_000,
            browser: BrowserSpec::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordingOverrides {
    pub network: NetworkOverrides,
    pub cpu_throttling: Option<f64>,
    pub headers: Option<BTreeMap<String, String>>,
    pub viewport_width: Option<i64>,
    pub timeout_ms: Option<u64>,
    pub browser: BrowserOverrides,
}

impl RecordingSpec {
    pub fn merge(mut self, overrides: RecordingOverrides) -> Self {
        self.network = self.network.merge(overrides.network);
        if let Some(cpu_throttling) = overrides.cpu_throttling {
            self.cpu_throttling = cpu_throttling;
        }
        if let Some(headers) = overrides.headers {
            let mut merged: BTreeMap<String, String> = self
                .headers
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect();
            for (k, v) in headers {
                merged.insert(k.to_lowercase(), v);
            }
            self.headers = merged;
        }
        if let Some(viewport_width) = overrides.viewport_width {
            self.viewport_width = viewport_width;
        }
        if let Some(timeout_ms) = overrides.timeout_ms {
            self.timeout_ms = timeout_ms;
        }
        self.browser = self.browser.merge(overrides.browser);
        self
    }
}

/// Information banner drawn above the canvas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BannerSpec {
    /// Load the banner template from this file. Empty means use
    /// `htmlTemplate`, or the built-in template when that is empty too.
    pub template_file_path: String,
    pub html_template: String,
    /// Template variables. Values may reference context variables, other
    /// vars, and helpers with `{{...}}`.
    pub vars: BTreeMap<String, String>,
}

impl Default for BannerSpec {
    fn default() -> Self {
        let vars = [
            ("bodyWidth", "{{adjustWidth width}}"),
            ("mainTitle", "{{htmlTitle}}"),
            ("subTitle", "{{url}}"),
            ("credit", "loadcast"),
            ("createdAt", "{{datetime timestampMs}}"),
            ("resourceSizeLabel", "Resource Size"),
            ("resourceSizeValue", "{{mb resourceSizeBytes}}"),
            ("onLoadTimeLabel", "OnLoad Time"),
            ("onLoadTimeValue", "{{msToSec onLoadTimeMs}}"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            template_file_path: String::new(),
            html_template: String::new(),
            vars,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BannerOverrides {
    pub template_file_path: Option<String>,
    pub html_template: Option<String>,
    pub vars: Option<BTreeMap<String, String>>,
}

impl BannerSpec {
    pub fn merge(mut self, overrides: BannerOverrides) -> Self {
        if let Some(template_file_path) = overrides.template_file_path {
            self.template_file_path = template_file_path;
        }
        if let Some(html_template) = overrides.html_template {
            self.html_template = html_template;
        }
        if let Some(vars) = overrides.vars {
            self.vars.extend(vars);
        }
        self
    }
}

/// Colors used by the compositor, as `#rgb` or `#rrggbb` strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColorTheme {
    pub background: String,
    pub border: String,
    pub progress_background: String,
    pub progress_foreground: String,
    pub progress_text: String,
    pub progress_time_text: String,
}

impl Default for ColorTheme {
    fn default() -> Self {
        Self {
            background: "#eee".to_string(),
            border: "#ccc".to_string(),
            progress_background: "#fff".to_string(),
            progress_foreground: "#0a0".to_string(),
            progress_text: "#fff".to_string(),
            progress_time_text: "#333".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColorThemeOverrides {
    pub background: Option<String>,
    pub border: Option<String>,
    pub progress_background: Option<String>,
    pub progress_foreground: Option<String>,
    pub progress_text: Option<String>,
    pub progress_time_text: Option<String>,
}

impl ColorTheme {
    pub fn merge(mut self, overrides: ColorThemeOverrides) -> Self {
        if let Some(background) = overrides.background {
            self.background = background;
        }
        if let Some(border) = overrides.border {
            self.border = border;
        }
        if let Some(progress_background) = overrides.progress_background {
            self.progress_background = progress_background;
        }
        if let Some(progress_foreground) = overrides.progress_foreground {
            self.progress_foreground = progress_foreground;
        }
        if let Some(progress_text) = overrides.progress_text {
            self.progress_text = progress_text;
        }
        if let Some(progress_time_text) = overrides.progress_time_text {
            self.progress_time_text = progress_time_text;
        }
        self
    }
}

/// Frame composition settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompositionSpec {
    pub color_theme: ColorTheme,
    /// TrueType font for progress bar text. Empty means probe well-known
    /// system font locations.
    pub font_file: String,
}

impl Default for CompositionSpec {
    fn default() -> Self {
        Self {
            color_theme: ColorTheme::default(),
            font_file: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompositionOverrides {
    pub color_theme: ColorThemeOverrides,
    pub font_file: Option<String>,
}

impl CompositionSpec {
    pub fn merge(mut self, overrides: CompositionOverrides) -> Self {
        self.color_theme = self.color_theme.merge(overrides.color_theme);
        if let Some(font_file) = overrides.font_file {
            self.font_file = font_file;
        }
        self
    }
}

/// Video assembly settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderingSpec {
    /// How long the final frame holds before the video ends.
    pub outro_ms: i64,
    /// Extra encoder arguments, appended before the output path.
    pub ffmpeg_args: Vec<String>,
}

impl Default for RenderingSpec {
    fn default() -> Self {
        Self {
            outro_ms: 1000,
            ffmpeg_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderingOverrides {
    pub outro_ms: Option<i64>,
    pub ffmpeg_args: Option<Vec<String>>,
}

impl RenderingSpec {
    pub fn merge(mut self, overrides: RenderingOverrides) -> Self {
        if let Some(outro_ms) = overrides.outro_ms {
            self.outro_ms = outro_ms;
        }
        if let Some(ffmpeg_args) = overrides.ffmpeg_args {
            self.ffmpeg_args.extend(ffmpeg_args);
        }
        self
    }
}

/// The full configuration of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShowSpec {
    pub frame_format: FrameFormat,
    /// Encoding quality for jpeg frames and the screencast, 0 to 100.
    pub frame_quality: u8,
    pub has_banner: bool,
    pub has_progress_bar: bool,
    pub layout: LayoutSpec,
    pub recording: RecordingSpec,
    pub banner: BannerSpec,
    pub composition: CompositionSpec,
    pub rendering: RenderingSpec,
}

impl Default for ShowSpec {
    fn default() -> Self {
        Self {
            frame_format: FrameFormat::Png,
            frame_quality: 85,
            has_banner: true,
            has_progress_bar: true,
            layout: LayoutSpec::default(),
            recording: RecordingSpec::default(),
            banner: BannerSpec::default(),
            composition: CompositionSpec::default(),
            rendering: RenderingSpec::default(),
        }
    }
}

/// Partial [`ShowSpec`] as parsed from user input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShowOverrides {
    pub frame_format: Option<FrameFormat>,
    pub frame_quality: Option<u8>,
    pub has_banner: Option<bool>,
    pub has_progress_bar: Option<bool>,
    pub layout: LayoutOverrides,
    pub recording: RecordingOverrides,
    pub banner: BannerOverrides,
    pub composition: CompositionOverrides,
    pub rendering: RenderingOverrides,
}

impl ShowSpec {
    /// Fold overrides over this spec, section by section.
    pub fn merge(mut self, overrides: ShowOverrides) -> Self {
        if let Some(frame_format) = overrides.frame_format {
            self.frame_format = frame_format;
        }
        if let Some(frame_quality) = overrides.frame_quality {
            self.frame_quality = frame_quality;
        }
        if let Some(has_banner) = overrides.has_banner {
            self.has_banner = has_banner;
        }
        if let Some(has_progress_bar) = overrides.has_progress_bar {
            self.has_progress_bar = has_progress_bar;
        }
        self.layout = self.layout.merge(overrides.layout);
        self.recording = self.recording.merge(overrides.recording);
        self.banner = self.banner.merge(overrides.banner);
        self.composition = self.composition.merge(overrides.composition);
        self.rendering = self.rendering.merge(overrides.rendering);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let spec = ShowSpec::default();
        assert_eq!(spec.frame_format, FrameFormat::Png);
        assert_eq!(spec.frame_quality, 85);
        assert!(spec.has_banner);
        assert!(spec.has_progress_bar);
        assert_eq!(spec.recording.viewport_width, 375);
        assert_eq!(spec.recording.timeout_ms, 30_000);
        assert_eq!(spec.recording.cpu_throttling, 4.0);
        assert_eq!(spec.recording.network.latency_ms, 20.0);
        assert_eq!(spec.rendering.outro_ms, 1000);
        assert!(spec.rendering.ffmpeg_args.is_empty());
        assert_eq!(spec.banner.vars["credit"], "loadcast");
    }

    #[test]
    fn test_frame_format_serde_and_extension() {
        assert_eq!(FrameFormat::Png.extension(), "png");
        assert_eq!(FrameFormat::Jpeg.extension(), "jpg");

        let parsed: FrameFormat = serde_json::from_str("\"jpeg\"").unwrap();
        assert_eq!(parsed, FrameFormat::Jpeg);
        assert_eq!(serde_json::to_string(&FrameFormat::Png).unwrap(), "\"png\"");
    }

    #[test]
    fn test_merge_replaces_scalars_only_when_set() {
        let merged = ShowSpec::default().merge(ShowOverrides {
            frame_format: Some(FrameFormat::Jpeg),
            frame_quality: Some(60),
            ..ShowOverrides::default()
        });
        assert_eq!(merged.frame_format, FrameFormat::Jpeg);
        assert_eq!(merged.frame_quality, 60);
        assert!(merged.has_banner);
        assert_eq!(merged.layout.canvas_width, 512);
    }

    #[test]
    fn test_merge_concatenates_ffmpeg_args() {
        let base = ShowSpec {
            rendering: RenderingSpec {
                outro_ms: 1000,
                ffmpeg_args: vec!["-c:v".to_string(), "libx264".to_string()],
            },
            ..ShowSpec::default()
        };
        let merged = base.merge(ShowOverrides {
            rendering: RenderingOverrides {
                outro_ms: None,
                ffmpeg_args: Some(vec!["-crf".to_string(), "30".to_string()]),
            },
            ..ShowOverrides::default()
        });
        assert_eq!(merged.rendering.ffmpeg_args, ["-c:v", "libx264", "-crf", "30"]);
        assert_eq!(merged.rendering.outro_ms, 1000);
    }

    #[test]
    fn test_merge_onto_empty_args_keeps_only_overrides() {
        let merged = ShowSpec::default().merge(ShowOverrides {
            rendering: RenderingOverrides {
                outro_ms: None,
                ffmpeg_args: Some(vec!["-custom".to_string()]),
            },
            ..ShowOverrides::default()
        });
        assert_eq!(merged.rendering.ffmpeg_args, ["-custom"]);
    }

    #[test]
    fn test_merge_headers_case_insensitive() {
        let mut base_headers = BTreeMap::new();
        base_headers.insert("X-Test".to_string(), "base".to_string());
        base_headers.insert("Accept-Language".to_string(), "en".to_string());
        let base = ShowSpec {
            recording: RecordingSpec {
                headers: base_headers,
                ..RecordingSpec::default()
            },
            ..ShowSpec::default()
        };

        let mut override_headers = BTreeMap::new();
        override_headers.insert("x-test".to_string(), "override".to_string());
        let merged = base.merge(ShowOverrides {
            recording: RecordingOverrides {
                headers: Some(override_headers),
                ..RecordingOverrides::default()
            },
            ..ShowOverrides::default()
        });

        assert_eq!(merged.recording.headers["x-test"], "override");
        assert_eq!(merged.recording.headers["accept-language"], "en");
        assert_eq!(merged.recording.headers.len(), 2);
    }

    #[test]
    fn test_merge_banner_vars_overrides_defaults() {
        let mut vars = BTreeMap::new();
        vars.insert("credit".to_string(), "me".to_string());
        vars.insert("extra".to_string(), "value".to_string());
        let merged = ShowSpec::default().merge(ShowOverrides {
            banner: BannerOverrides {
                vars: Some(vars),
                ..BannerOverrides::default()
            },
            ..ShowOverrides::default()
        });

        assert_eq!(merged.banner.vars["credit"], "me");
        assert_eq!(merged.banner.vars["extra"], "value");
        // Untouched defaults survive.
        assert_eq!(merged.banner.vars["mainTitle"], "{{htmlTitle}}");
    }

    #[test]
    fn test_throughput_bps_conversion() {
        let network = NetworkSpec::default();
        assert_eq!(network.download_throughput_bps(), 1_310_720.0);
        assert_eq!(network.upload_throughput_bps(), 1_310_720.0);
    }

    #[test]
    fn test_spec_yaml_round_trip() {
        let yaml = "layout:\n  canvasWidth: 720\nrecording:\n  viewportWidth: 412\n";
        let overrides: ShowOverrides = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(overrides.layout.canvas_width, Some(720));
        assert_eq!(overrides.recording.viewport_width, Some(412));
        assert_eq!(overrides.frame_format, None);
    }
}
