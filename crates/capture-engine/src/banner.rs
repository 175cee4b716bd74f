//! Information banner rasterization.
//!
//! The banner is an HTML snippet rendered in a throwaway page and
//! screenshotted at its measured body size. Templates use a small
//! `{{variable}}` / `{{helper variable}}` expression syntax; variables come
//! from the run context first, then from the show spec, where later values
//! may reference earlier ones.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams, Viewport,
};
use chromiumoxide::error::CdpError;
use chrono::{Local, TimeZone};
use serde::Deserialize;

use loadcast_common::{LoadcastError, LoadcastResult};
use loadcast_spec_model::{BannerImage, BannerSpec};

use crate::session::BrowserSession;

const DEFAULT_TEMPLATE: &str = include_str!("../assets/banner.html");

const BANNER_NAV_TIMEOUT: Duration = Duration::from_secs(10);

/// Viewport height while measuring; the screenshot clips to the body.
const BANNER_VIEWPORT_HEIGHT: i64 = 400;

const BODY_SIZE_SCRIPT: &str = "(() => { const rect = document.body.getBoundingClientRect(); \
     return { width: Math.ceil(rect.width), height: Math.ceil(rect.height) }; })()";

/// Facts about the run that banner templates can reference.
#[derive(Debug, Clone)]
pub struct BannerContext {
    /// Wall-clock run start, milliseconds since the epoch.
    pub timestamp_ms: i64,
    /// Canvas width the banner spans.
    pub width: i64,
    pub resource_size_bytes: u64,
    pub on_load_time_ms: i64,
    pub url: String,
    pub html_title: String,
}

#[derive(Debug, Deserialize)]
struct MeasuredSize {
    width: u32,
    height: u32,
}

/// Render the banner template and screenshot it into `artifacts_dir`.
///
/// Writes `banner.vars.json` and `banner.html` next to the image so a
/// failed or surprising banner can be debugged offline.
pub async fn create_banner(
    session: &BrowserSession,
    spec: &BannerSpec,
    context: &BannerContext,
    artifacts_dir: &Path,
) -> LoadcastResult<BannerImage> {
    let template = resolve_template(spec).await?;
    let vars = build_vars(spec, context);
    let html = render_expressions(&template, &vars, true);

    let vars_json = serde_json::to_string_pretty(&vars)?;
    tokio::fs::write(artifacts_dir.join("banner.vars.json"), vars_json).await?;
    tokio::fs::write(artifacts_dir.join("banner.html"), &html).await?;

    let page = session.new_page().await?;
    let metrics = SetDeviceMetricsOverrideParams::builder()
        .width(context.width)
        .height(BANNER_VIEWPORT_HEIGHT)
        .device_scale_factor(1.0)
        .mobile(false)
        .build()
        .map_err(|e| LoadcastError::browser(format!("Invalid banner viewport: {e}")))?;
    page.execute(metrics)
        .await
        .map_err(|e| LoadcastError::browser(format!("Failed to size banner page: {e}")))?;

    let data_url = format!("data:text/html;base64,{}", BASE64_STANDARD.encode(&html));
    let navigation = async {
        page.goto(data_url.as_str()).await?;
        page.wait_for_navigation().await?;
        Ok::<_, CdpError>(())
    };
    match tokio::time::timeout(BANNER_NAV_TIMEOUT, navigation).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            return Err(LoadcastError::browser(format!(
                "Failed to render banner: {e}"
            )));
        }
        Err(_) => return Err(LoadcastError::browser("Banner rendering timed out")),
    }

    let size: MeasuredSize = page
        .evaluate(BODY_SIZE_SCRIPT)
        .await
        .map_err(|e| LoadcastError::browser(format!("Failed to measure banner: {e}")))?
        .into_value()
        .map_err(|e| LoadcastError::browser(format!("Unexpected banner measurement: {e}")))?;
    if size.width == 0 || size.height == 0 {
        return Err(LoadcastError::browser("Banner rendered with zero size"));
    }

    let screenshot = CaptureScreenshotParams::builder()
        .format(CaptureScreenshotFormat::Png)
        .from_surface(true)
        .clip(Viewport {
            x: 0.0,
            y: 0.0,
            width: f64::from(size.width),
            height: f64::from(size.height),
            scale: 1.0,
        })
        .build();
    let response = page
        .execute(screenshot)
        .await
        .map_err(|e| LoadcastError::browser(format!("Failed to capture banner: {e}")))?;
    let data: &str = response.data.as_ref();
    let image = BASE64_STANDARD.decode(data).map_err(|e| {
        LoadcastError::browser(format!("Banner screenshot is not valid base64: {e}"))
    })?;

    let path = artifacts_dir.join("banner.png");
    tokio::fs::write(&path, &image).await?;
    if let Err(e) = page.close().await {
        tracing::debug!(error = %e, "Failed to close banner page");
    }

    tracing::info!(
        width = size.width,
        height = size.height,
        path = %path.display(),
        "Banner rendered"
    );
    Ok(BannerImage {
        path,
        width: size.width,
        height: size.height,
    })
}

async fn resolve_template(spec: &BannerSpec) -> LoadcastResult<String> {
    if !spec.template_file_path.is_empty() {
        return tokio::fs::read_to_string(&spec.template_file_path)
            .await
            .map_err(|e| {
                LoadcastError::config(format!(
                    "Failed to read banner template {}: {e}",
                    spec.template_file_path
                ))
            });
    }
    if !spec.html_template.is_empty() {
        return Ok(spec.html_template.clone());
    }
    Ok(DEFAULT_TEMPLATE.to_string())
}

/// Seed the variable map from the context, then layer the spec's vars on
/// top, rendering each value that itself contains expressions against the
/// variables accumulated so far.
fn build_vars(spec: &BannerSpec, context: &BannerContext) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    let seed = [
        ("timestampMs", context.timestamp_ms.to_string()),
        ("width", context.width.to_string()),
        ("resourceSizeBytes", context.resource_size_bytes.to_string()),
        ("onLoadTimeMs", context.on_load_time_ms.to_string()),
        ("url", context.url.clone()),
        ("htmlTitle", context.html_title.clone()),
    ];
    for (key, value) in seed {
        vars.insert(key.to_string(), value);
    }
    for (key, value) in &spec.vars {
        let rendered = if value.contains("{{") {
            render_expressions(value, &vars, false)
        } else {
            value.clone()
        };
        vars.insert(key.clone(), rendered);
    }
    vars
}

/// Substitute every `{{...}}` expression in `input`. With `escape` set the
/// substituted values are HTML-escaped; the surrounding text never is.
fn render_expressions(input: &str, vars: &BTreeMap<String, String>, escape: bool) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            // Unterminated expression, keep the remainder untouched.
            output.push_str(&rest[start..]);
            return output;
        };
        let value = evaluate_expression(after[..end].trim(), vars);
        if escape {
            output.push_str(&escape_html(&value));
        } else {
            output.push_str(&value);
        }
        rest = &after[end + 2..];
    }
    output.push_str(rest);
    output
}

fn evaluate_expression(expression: &str, vars: &BTreeMap<String, String>) -> String {
    let mut tokens = expression.split_whitespace();
    let Some(first) = tokens.next() else {
        return String::new();
    };
    match tokens.next() {
        None => vars.get(first).cloned().unwrap_or_default(),
        Some(arg) if tokens.next().is_none() => {
            let value = vars.get(arg).cloned().unwrap_or_default();
            apply_helper(first, &value).unwrap_or_else(|| {
                tracing::warn!(helper = first, "Banner helper failed, rendering empty");
                String::new()
            })
        }
        Some(_) => {
            tracing::warn!(expression, "Unsupported banner expression, rendering empty");
            String::new()
        }
    }
}

fn apply_helper(name: &str, value: &str) -> Option<String> {
    match name {
        "adjustWidth" => {
            let width: i64 = value.trim().parse().ok()?;
            Some((width - 8).to_string())
        }
        "datetime" => {
            let ms: i64 = value.trim().parse().ok()?;
            let local = Local.timestamp_millis_opt(ms).single()?;
            Some(local.format("%Y-%m-%d %H:%M:%S").to_string())
        }
        "mb" => {
            let bytes: f64 = value.trim().parse().ok()?;
            Some(format!("{:.2} MB", bytes / 1024.0 / 1024.0))
        }
        "msToSec" => {
            let ms: f64 = value.trim().parse().ok()?;
            Some(format!("{:.2} sec.", ms / 1000.0))
        }
        _ => None,
    }
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            '`' => escaped.push_str("&#x60;"),
            '=' => escaped.push_str("&#x3D;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_context() -> BannerContext {
        BannerContext {
            timestamp_ms: 1_725_408_000_000,
            width: 512,
            resource_size_bytes: 10 * 1024 * 1024,
            on_load_time_ms: 10_000,
            url: "https://github.com/".to_string(),
            html_title: "GitHub".to_string(),
        }
    }

    #[test]
    fn default_vars_render_against_context() {
        let vars = build_vars(&BannerSpec::default(), &test_context());
        assert_eq!(vars["bodyWidth"], "504");
        assert_eq!(vars["mainTitle"], "GitHub");
        assert_eq!(vars["subTitle"], "https://github.com/");
        assert_eq!(vars["credit"], "loadcast");
        assert_eq!(vars["resourceSizeValue"], "10.00 MB");
        assert_eq!(vars["onLoadTimeValue"], "10.00 sec.");
        // The local timezone shifts the hour, not the month.
        assert!(vars["createdAt"].starts_with("2024-09-0"));
    }

    #[test]
    fn custom_vars_see_earlier_values() {
        let mut spec = BannerSpec::default();
        spec.vars
            .insert("a".to_string(), "the custom value".to_string());
        spec.vars.insert("b".to_string(), "a={{a}}".to_string());
        let vars = build_vars(&spec, &test_context());
        assert_eq!(vars["a"], "the custom value");
        assert_eq!(vars["b"], "a=the custom value");
    }

    #[test]
    fn document_pass_escapes_substituted_values() {
        let mut vars = BTreeMap::new();
        vars.insert("b".to_string(), "a=the custom value".to_string());
        let html = render_expressions("<html>{{b}}</html>", &vars, true);
        assert_eq!(html, "<html>a&#x3D;the custom value</html>");
    }

    #[test]
    fn variable_pass_keeps_values_raw() {
        let mut vars = BTreeMap::new();
        vars.insert("b".to_string(), "a=1 & b<2".to_string());
        assert_eq!(render_expressions("{{b}}", &vars, false), "a=1 & b<2");
    }

    #[test]
    fn missing_variables_render_empty() {
        let vars = BTreeMap::new();
        assert_eq!(render_expressions("[{{nothing}}]", &vars, false), "[]");
    }

    #[test]
    fn unknown_helpers_render_empty() {
        let vars = BTreeMap::new();
        assert_eq!(render_expressions("x{{bogus arg}}y", &vars, false), "xy");
    }

    #[test]
    fn unterminated_expression_is_left_alone() {
        let vars = BTreeMap::new();
        assert_eq!(render_expressions("a{{b", &vars, false), "a{{b");
    }

    #[test]
    fn helpers_format_like_the_banner_expects() {
        assert_eq!(apply_helper("adjustWidth", "512"), Some("504".to_string()));
        assert_eq!(apply_helper("mb", "1048576"), Some("1.00 MB".to_string()));
        assert_eq!(apply_helper("msToSec", "1234"), Some("1.23 sec.".to_string()));
        assert_eq!(apply_helper("adjustWidth", "nope"), None);
        assert_eq!(apply_helper("bogus", "1"), None);
    }
}
