//! Column layout geometry for the composited canvas.
//!
//! A tall screenshot of the loading page is sliced into vertical strips
//! and laid out side by side, newspaper style. The layout engine turns a
//! [`LayoutSpec`] into the capture viewport size plus the border and
//! window rectangles each strip is drawn into.

use serde::{Deserialize, Serialize};

/// Column layout configuration. All values are canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutSpec {
    /// Canvas width, which is also the final video width.
    pub canvas_width: i64,
    /// Canvas height, excluding the banner and progress bar strips.
    pub canvas_height: i64,
    /// Number of page columns.
    pub columns: i64,
    /// Horizontal gap between adjacent columns.
    pub gap: i64,
    /// Padding around the whole column block.
    pub padding: i64,
    /// Border line width drawn around each column.
    pub border_width: i64,
    /// Top offset for every column after the first, also trimmed from
    /// their height.
    pub indent: i64,
    /// Height trimmed from the first column only.
    pub outdent: i64,
    /// Height of the progress bar strip above the canvas.
    pub progress_height: i64,
}

impl Default for LayoutSpec {
    fn default() -> Self {
        Self {
            canvas_width: 512,
            canvas_height: 640,
            columns: 3,
            gap: 20,
            padding: 20,
            border_width: 1,
            indent: 20,
            outdent: 20,
            progress_height: 16,
        }
    }
}

/// Partial [`LayoutSpec`], merged over defaults field by field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutOverrides {
    pub canvas_width: Option<i64>,
    pub canvas_height: Option<i64>,
    pub columns: Option<i64>,
    pub gap: Option<i64>,
    pub padding: Option<i64>,
    pub border_width: Option<i64>,
    pub indent: Option<i64>,
    pub outdent: Option<i64>,
    pub progress_height: Option<i64>,
}

impl LayoutSpec {
    /// Apply overrides, keeping the base value wherever a field is unset.
    pub fn merge(self, overrides: LayoutOverrides) -> Self {
        Self {
            canvas_width: overrides.canvas_width.unwrap_or(self.canvas_width),
            canvas_height: overrides.canvas_height.unwrap_or(self.canvas_height),
            columns: overrides.columns.unwrap_or(self.columns),
            gap: overrides.gap.unwrap_or(self.gap),
            padding: overrides.padding.unwrap_or(self.padding),
            border_width: overrides.border_width.unwrap_or(self.border_width),
            indent: overrides.indent.unwrap_or(self.indent),
            outdent: overrides.outdent.unwrap_or(self.outdent),
            progress_height: overrides.progress_height.unwrap_or(self.progress_height),
        }
    }
}

/// An axis-aligned rectangle in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// Where one slice of the page screenshot lands on the canvas, and how
/// far down the captured page that slice starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowRect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    /// Offset into the captured page where this window's content begins.
    pub scroll_top: i64,
}

/// Capture viewport size covering every column window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollSize {
    pub width: i64,
    pub height: i64,
}

/// Computed canvas geometry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    /// Size the page must be captured at to fill every window.
    pub scroll: ScrollSize,
    /// Border rectangle of each column.
    pub columns: Vec<Rect>,
    /// Inner window of each column.
    pub windows: Vec<WindowRect>,
}

/// Compute capture and canvas geometry for a column layout.
///
/// Pure arithmetic with no failure modes. Degenerate specs (zero columns,
/// padding wider than the canvas) yield degenerate rectangles, not errors;
/// downstream consumers clip against them.
pub fn compute_layout(spec: &LayoutSpec) -> Layout {
    if spec.columns <= 0 {
        return Layout {
            scroll: ScrollSize {
                width: 0,
                height: 0,
            },
            columns: Vec::new(),
            windows: Vec::new(),
        };
    }

    let column_width =
        (spec.canvas_width - spec.padding * 2 - spec.gap * (spec.columns - 1)) / spec.columns;
    let inner_height = spec.canvas_height - spec.padding * 2;
    let last = spec.columns - 1;

    let mut columns = Vec::with_capacity(spec.columns as usize);
    let mut windows = Vec::with_capacity(spec.columns as usize);
    let mut scroll_top = 0;

    for i in 0..spec.columns {
        let first = i == 0;
        let column = Rect {
            x: spec.padding + i * (column_width + spec.gap),
            y: spec.padding + if first { 0 } else { spec.indent },
            width: column_width,
            height: inner_height - if first { spec.outdent } else { spec.indent },
        };
        let window = WindowRect {
            x: column.x + spec.border_width,
            // Only the first window sits below its own top border; the rest
            // start flush so the page appears to flow between columns.
            y: column.y + if first { spec.border_width } else { 0 },
            width: column.width - spec.border_width * 2,
            // Only the last window gives up room for a bottom border.
            height: column.height - if i == last { spec.border_width } else { 0 },
            scroll_top,
        };
        scroll_top += window.height;
        columns.push(column);
        windows.push(window);
    }

    Layout {
        scroll: ScrollSize {
            width: column_width,
            height: scroll_top,
        },
        columns,
        windows,
    }
}
