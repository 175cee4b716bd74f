//! Frame compositor: turns raw screencast captures into canvas stills.
//!
//! Each output frame is the same picture the viewer sees in the final
//! video: background, banner, progress bar, and the page screenshot
//! sliced into the layout's column windows. Frames are independent, so
//! composition fans out across a rayon pool and keeps capture order.

use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{imageops, DynamicImage, ExtendedColorType, ImageEncoder, Rgba, RgbaImage};
use imageproc::drawing;
use imageproc::rect::Rect as PixelRect;
use rayon::prelude::*;
use rusttype::{point, Font, PositionedGlyph, Scale};

use loadcast_common::{LoadcastError, LoadcastResult};
use loadcast_spec_model::{
    BannerImage, ColorTheme, CompositedFrame, FrameFormat, Layout, RawFrame, Recording, ShowSpec,
};

/// Fonts probed when the show spec does not name one.
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Compose every frame of `recording` into `frames_dir`.
///
/// Returns the written frames in capture order. The banner, when given,
/// is drawn at the top; the progress bar sits between banner and canvas.
pub fn compose_frames(
    spec: &ShowSpec,
    layout: &Layout,
    recording: &Recording,
    banner: Option<&BannerImage>,
    frames_dir: &Path,
) -> LoadcastResult<Vec<CompositedFrame>> {
    if spec.layout.canvas_width <= 0 || spec.layout.canvas_height <= 0 {
        return Err(LoadcastError::compositing("Canvas has zero area"));
    }

    let colors = ThemeColors::parse(&spec.composition.color_theme)?;
    let font = resolve_font(&spec.composition.font_file)?;

    let banner_image = match banner {
        Some(banner) => Some(load_banner(&banner.path)?),
        None => None,
    };
    let banner_height = banner_image.as_ref().map_or(0, |b| i64::from(b.height()));
    let progress_height = if spec.has_progress_bar {
        spec.layout.progress_height.max(0)
    } else {
        0
    };

    let painter = FramePainter {
        layout,
        colors,
        font,
        banner: banner_image,
        width: spec.layout.canvas_width as u32,
        height: even_ceiling(banner_height + progress_height + spec.layout.canvas_height),
        progress_top: banner_height,
        progress_height,
        canvas_top: banner_height + progress_height,
        border_width: spec.layout.border_width,
        total_bytes: recording.total_resources.all,
        format: spec.frame_format,
        quality: spec.frame_quality,
    };

    std::fs::create_dir_all(frames_dir)?;
    let extension = spec.frame_format.extension();

    let composited = recording
        .frames
        .par_iter()
        .map(|frame| {
            let canvas = painter.paint(frame)?;
            let encoded = painter.encode(&canvas)?;
            let path = frames_dir.join(format!(
                "frame-{:010}.{}",
                frame.time_offset_ms, extension
            ));
            std::fs::write(&path, &encoded)?;
            Ok(CompositedFrame {
                path,
                time_offset_ms: frame.time_offset_ms,
            })
        })
        .collect::<LoadcastResult<Vec<_>>>()?;

    tracing::info!(
        frames = composited.len(),
        width = painter.width,
        height = painter.height,
        dir = %frames_dir.display(),
        "Frames composited"
    );
    Ok(composited)
}

/// Parse a `#rgb` or `#rrggbb` color.
pub fn parse_hex_color(input: &str) -> LoadcastResult<Rgba<u8>> {
    let trimmed = input.trim();
    let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
    let expanded = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect::<String>(),
        6 => hex.to_string(),
        _ => {
            return Err(LoadcastError::compositing(format!(
                "Invalid color value: {input}"
            )))
        }
    };
    let value = u32::from_str_radix(&expanded, 16)
        .map_err(|_| LoadcastError::compositing(format!("Invalid color value: {input}")))?;
    Ok(Rgba([
        (value >> 16) as u8,
        (value >> 8) as u8,
        value as u8,
        255,
    ]))
}

struct ThemeColors {
    background: Rgba<u8>,
    border: Rgba<u8>,
    progress_background: Rgba<u8>,
    progress_foreground: Rgba<u8>,
    progress_text: Rgba<u8>,
    progress_time_text: Rgba<u8>,
}

impl ThemeColors {
    fn parse(theme: &ColorTheme) -> LoadcastResult<Self> {
        Ok(Self {
            background: parse_hex_color(&theme.background)?,
            border: parse_hex_color(&theme.border)?,
            progress_background: parse_hex_color(&theme.progress_background)?,
            progress_foreground: parse_hex_color(&theme.progress_foreground)?,
            progress_text: parse_hex_color(&theme.progress_text)?,
            progress_time_text: parse_hex_color(&theme.progress_time_text)?,
        })
    }
}

/// Round up to the next even pixel count; encoders reject odd heights
/// for yuv420 output.
fn even_ceiling(total: i64) -> u32 {
    ((total.max(0) + 1) / 2 * 2) as u32
}

fn load_banner(path: &Path) -> LoadcastResult<RgbaImage> {
    let banner = image::open(path).map_err(|e| {
        LoadcastError::compositing(format!("Failed to read banner image {}: {e}", path.display()))
    })?;
    Ok(banner.to_rgba8())
}

/// Load the configured font, or probe well-known system locations.
///
/// A named font that cannot be loaded is an error; an empty probe just
/// drops the progress labels.
fn resolve_font(font_file: &str) -> LoadcastResult<Option<Font<'static>>> {
    if !font_file.is_empty() {
        let bytes = std::fs::read(font_file).map_err(|e| {
            LoadcastError::config(format!("Failed to read font file {font_file}: {e}"))
        })?;
        let font = Font::try_from_vec(bytes)
            .ok_or_else(|| LoadcastError::config(format!("Unsupported font file: {font_file}")))?;
        return Ok(Some(font));
    }
    for candidate in FONT_CANDIDATES {
        let path = PathBuf::from(candidate);
        if !path.exists() {
            continue;
        }
        if let Ok(bytes) = std::fs::read(&path) {
            if let Some(font) = Font::try_from_vec(bytes) {
                tracing::debug!(path = candidate, "Using system font for progress labels");
                return Ok(Some(font));
            }
        }
    }
    tracing::warn!("No usable font found, progress labels will be omitted");
    Ok(None)
}

/// Everything needed to paint one frame, shared read-only across the pool.
struct FramePainter<'a> {
    layout: &'a Layout,
    colors: ThemeColors,
    font: Option<Font<'static>>,
    banner: Option<RgbaImage>,
    width: u32,
    height: u32,
    progress_top: i64,
    progress_height: i64,
    canvas_top: i64,
    border_width: i64,
    total_bytes: u64,
    format: FrameFormat,
    quality: u8,
}

impl FramePainter<'_> {
    fn paint(&self, frame: &RawFrame) -> LoadcastResult<RgbaImage> {
        let screen = image::load_from_memory(&frame.image).map_err(|e| {
            LoadcastError::compositing(format!(
                "Failed to decode screencast frame at {} ms: {e}",
                frame.time_offset_ms
            ))
        })?;
        let screen = normalize_screen(screen, self.layout.scroll.width);

        let mut canvas = RgbaImage::from_pixel(self.width, self.height, self.colors.background);
        if let Some(banner) = &self.banner {
            imageops::overlay(&mut canvas, banner, 0, 0);
        }
        if self.progress_height > 0 && self.total_bytes > 0 {
            self.paint_progress(&mut canvas, frame);
        }
        self.paint_column_borders(&mut canvas);
        self.paint_windows(&mut canvas, &screen);
        Ok(canvas)
    }

    fn paint_progress(&self, canvas: &mut RgbaImage, frame: &RawFrame) {
        let top = self.progress_top as i32;
        let height = self.progress_height as u32;
        drawing::draw_filled_rect_mut(
            canvas,
            PixelRect::at(0, top).of_size(self.width, height),
            self.colors.progress_background,
        );

        let font_size = self.progress_height as f32 * 0.8;
        let text_margin = (self.progress_height / 2) as i32;
        let text_top = (self.progress_top as f32 + self.progress_height as f32 * 0.1) as i32;

        if let Some(font) = &self.font {
            let time_text = format!("{:.2} sec.", frame.time_offset_ms as f64 / 1000.0);
            // Half the font size approximates the glyph advance closely
            // enough for right alignment of a short numeric label.
            let estimated_width = (time_text.len() as f32 * font_size / 2.0).floor() as i32;
            let left = self.width as i32 - text_margin - estimated_width;
            draw_label(
                canvas,
                font,
                &time_text,
                left,
                text_top,
                font_size,
                self.colors.progress_time_text,
            );
        }

        let fraction = (frame.resources.all as f64 / self.total_bytes as f64).min(1.0);
        let bar_width = (f64::from(self.width) * fraction).floor() as u32;
        if bar_width > 0 {
            drawing::draw_filled_rect_mut(
                canvas,
                PixelRect::at(0, top).of_size(bar_width, height),
                self.colors.progress_foreground,
            );
        }

        if let Some(font) = &self.font {
            let percent_text = format!("{} % Loaded", (fraction * 100.0).round() as i64);
            draw_label(
                canvas,
                font,
                &percent_text,
                text_margin,
                text_top,
                font_size,
                self.colors.progress_text,
            );
        }
    }

    /// Filled rects the size of each column; the windows drawn on top
    /// leave only the border fringe visible.
    fn paint_column_borders(&self, canvas: &mut RgbaImage) {
        if self.border_width <= 0 {
            return;
        }
        for column in &self.layout.columns {
            if column.width <= 0 || column.height <= 0 {
                continue;
            }
            drawing::draw_filled_rect_mut(
                canvas,
                PixelRect::at(column.x as i32, (column.y + self.canvas_top) as i32)
                    .of_size(column.width as u32, column.height as u32),
                self.colors.border,
            );
        }
    }

    fn paint_windows(&self, canvas: &mut RgbaImage, screen: &RgbaImage) {
        let screen_width = i64::from(screen.width());
        let screen_height = i64::from(screen.height());
        for window in &self.layout.windows {
            let width = window.width.min(screen_width);
            let height = window.height.min(screen_height - window.scroll_top);
            if width <= 0 || height <= 0 {
                break;
            }
            let slice = imageops::crop_imm(
                screen,
                0,
                window.scroll_top as u32,
                width as u32,
                height as u32,
            )
            .to_image();
            imageops::overlay(canvas, &slice, window.x, self.canvas_top + window.y);
            if height < window.height {
                // The page ran out inside this column.
                break;
            }
        }
    }

    fn encode(&self, canvas: &RgbaImage) -> LoadcastResult<Vec<u8>> {
        let mut buffer = Vec::new();
        match self.format {
            FrameFormat::Png => {
                PngEncoder::new(&mut buffer)
                    .write_image(
                        canvas.as_raw(),
                        canvas.width(),
                        canvas.height(),
                        ExtendedColorType::Rgba8,
                    )
                    .map_err(encode_error)?;
            }
            FrameFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgba8(canvas.clone()).to_rgb8();
                JpegEncoder::new_with_quality(&mut buffer, self.quality)
                    .write_image(
                        rgb.as_raw(),
                        rgb.width(),
                        rgb.height(),
                        ExtendedColorType::Rgb8,
                    )
                    .map_err(encode_error)?;
            }
        }
        Ok(buffer)
    }
}

fn encode_error(e: image::ImageError) -> LoadcastError {
    LoadcastError::compositing(format!("Failed to encode frame: {e}"))
}

/// Scale the captured screen to the layout's scroll width, keeping aspect.
fn normalize_screen(screen: DynamicImage, target_width: i64) -> RgbaImage {
    let target_width = target_width.max(1) as u32;
    if screen.width() == target_width {
        return screen.to_rgba8();
    }
    let scale = f64::from(target_width) / f64::from(screen.width());
    let target_height = (f64::from(screen.height()) * scale).round().max(1.0) as u32;
    screen
        .resize_exact(target_width, target_height, imageops::FilterType::Triangle)
        .to_rgba8()
}

/// Alpha-blend `text` onto the canvas; `top` is the visual top of the line.
fn draw_label(
    canvas: &mut RgbaImage,
    font: &Font<'_>,
    text: &str,
    left: i32,
    top: i32,
    size: f32,
    color: Rgba<u8>,
) {
    let scale = Scale::uniform(size);
    let ascent = font.v_metrics(scale).ascent;
    let glyphs: Vec<PositionedGlyph<'_>> = font
        .layout(text, scale, point(left as f32, top as f32 + ascent))
        .collect();
    let (width, height) = (canvas.width() as i32, canvas.height() as i32);
    for glyph in glyphs {
        if let Some(bounds) = glyph.pixel_bounding_box() {
            glyph.draw(|gx, gy, coverage| {
                let px = bounds.min.x + gx as i32;
                let py = bounds.min.y + gy as i32;
                if px < 0 || py < 0 || px >= width || py >= height {
                    return;
                }
                let pixel = canvas.get_pixel_mut(px as u32, py as u32);
                for channel in 0..3 {
                    let base = f32::from(pixel[channel]);
                    let ink = f32::from(color[channel]);
                    pixel[channel] = (base + (ink - base) * coverage).round() as u8;
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadcast_spec_model::{
        compute_layout, LayoutSpec, ResourceSnapshot, Timing, WindowRect,
    };
    use std::io::Cursor;

    fn small_spec() -> LayoutSpec {
        LayoutSpec {
            canvas_width: 64,
            canvas_height: 48,
            columns: 1,
            gap: 0,
            padding: 4,
            border_width: 1,
            indent: 0,
            outdent: 0,
            progress_height: 8,
        }
    }

    fn painter_for(layout: &Layout, border_width: i64) -> FramePainter<'_> {
        FramePainter {
            layout,
            colors: ThemeColors {
                background: Rgba([10, 10, 10, 255]),
                border: Rgba([200, 200, 200, 255]),
                progress_background: Rgba([255, 255, 255, 255]),
                progress_foreground: Rgba([0, 170, 0, 255]),
                progress_text: Rgba([255, 255, 255, 255]),
                progress_time_text: Rgba([51, 51, 51, 255]),
            },
            font: None,
            banner: None,
            width: 64,
            height: 48,
            progress_top: 0,
            progress_height: 0,
            canvas_top: 0,
            border_width,
            total_bytes: 0,
            format: FrameFormat::Png,
            quality: 85,
        }
    }

    fn png_bytes(image: &RgbaImage) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(image.clone())
            .write_to(&mut buffer, image::ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_parse_hex_color_expands_short_form() {
        assert_eq!(
            parse_hex_color("#eee").unwrap(),
            Rgba([238, 238, 238, 255])
        );
        assert_eq!(parse_hex_color("#0a0").unwrap(), Rgba([0, 170, 0, 255]));
        assert_eq!(
            parse_hex_color("#123456").unwrap(),
            Rgba([18, 52, 86, 255])
        );
        assert_eq!(parse_hex_color("fff").unwrap(), Rgba([255, 255, 255, 255]));
        assert!(parse_hex_color("#12345").is_err());
        assert!(parse_hex_color("red").is_err());
    }

    #[test]
    fn test_even_ceiling_rounds_up() {
        assert_eq!(even_ceiling(5), 6);
        assert_eq!(even_ceiling(6), 6);
        assert_eq!(even_ceiling(7), 8);
        assert_eq!(even_ceiling(0), 0);
    }

    #[test]
    fn test_normalize_screen_scales_to_target_width() {
        let source = RgbaImage::from_pixel(10, 20, Rgba([1, 2, 3, 255]));
        let scaled = normalize_screen(DynamicImage::ImageRgba8(source), 5);
        assert_eq!(scaled.width(), 5);
        assert_eq!(scaled.height(), 10);
    }

    #[test]
    fn test_paint_places_page_inside_column_border() {
        let layout = compute_layout(&small_spec());
        let painter = painter_for(&layout, 1);
        let page = RgbaImage::from_pixel(
            layout.scroll.width as u32,
            layout.scroll.height as u32,
            Rgba([250, 0, 0, 255]),
        );
        let frame = RawFrame {
            time_offset_ms: 0,
            image: png_bytes(&page),
            resources: ResourceSnapshot::default(),
        };

        let canvas = painter.paint(&frame).unwrap();

        // Outside the column: background.
        assert_eq!(canvas.get_pixel(0, 0), &Rgba([10, 10, 10, 255]));
        // Column top-left corner: border fill.
        assert_eq!(canvas.get_pixel(4, 4), &Rgba([200, 200, 200, 255]));
        // Window interior: the page.
        assert_eq!(canvas.get_pixel(10, 10), &Rgba([250, 0, 0, 255]));
    }

    #[test]
    fn test_progress_bar_scales_with_loaded_bytes() {
        let layout = compute_layout(&small_spec());
        let mut painter = painter_for(&layout, 0);
        painter.progress_height = 8;
        painter.canvas_top = 8;
        painter.total_bytes = 1000;

        let page = RgbaImage::from_pixel(
            layout.scroll.width as u32,
            layout.scroll.height as u32,
            Rgba([250, 0, 0, 255]),
        );
        let frame = RawFrame {
            time_offset_ms: 1000,
            image: png_bytes(&page),
            resources: ResourceSnapshot {
                all: 500,
                images: 0,
            },
        };

        let canvas = painter.paint(&frame).unwrap();

        // Left half of the bar: foreground. Right half: background.
        assert_eq!(canvas.get_pixel(10, 4), &Rgba([0, 170, 0, 255]));
        assert_eq!(canvas.get_pixel(60, 4), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_windows_stop_when_page_runs_out() {
        let layout = Layout {
            scroll: loadcast_spec_model::ScrollSize {
                width: 10,
                height: 10,
            },
            columns: Vec::new(),
            windows: vec![
                WindowRect {
                    x: 0,
                    y: 0,
                    width: 10,
                    height: 10,
                    scroll_top: 0,
                },
                WindowRect {
                    x: 12,
                    y: 0,
                    width: 10,
                    height: 10,
                    scroll_top: 10,
                },
            ],
        };
        let painter = painter_for(&layout, 0);
        let mut canvas = RgbaImage::from_pixel(64, 48, Rgba([10, 10, 10, 255]));
        let screen = RgbaImage::from_pixel(10, 10, Rgba([250, 0, 0, 255]));

        painter.paint_windows(&mut canvas, &screen);

        assert_eq!(canvas.get_pixel(5, 5), &Rgba([250, 0, 0, 255]));
        // The second window has no page left to show.
        assert_eq!(canvas.get_pixel(13, 5), &Rgba([10, 10, 10, 255]));
    }

    #[test]
    fn test_jpeg_encoding_produces_decodable_frames() {
        let layout = compute_layout(&small_spec());
        let mut painter = painter_for(&layout, 1);
        painter.format = FrameFormat::Jpeg;
        let canvas = RgbaImage::from_pixel(64, 48, Rgba([10, 10, 10, 255]));

        let encoded = painter.encode(&canvas).unwrap();
        let decoded = image::load_from_memory(&encoded).unwrap();
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 48);
    }

    #[test]
    fn test_compose_rejects_degenerate_canvas() {
        let mut spec = ShowSpec::default();
        spec.layout.canvas_width = 0;
        let layout = compute_layout(&spec.layout);
        let recording = Recording {
            frames: Vec::new(),
            title: None,
            timing: Timing::default(),
            total_resources: ResourceSnapshot::default(),
        };
        let result = compose_frames(
            &spec,
            &layout,
            &recording,
            None,
            Path::new("/tmp/loadcast-test-frames"),
        );
        assert!(result.is_err());
    }
}
