//! Runtime data handed between pipeline stages.
//!
//! Everything here lives for a single run and ends up either consumed by
//! the next stage or written into the artifacts directory.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Cumulative byte counters for resources received so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Bytes across all resource types.
    pub all: u64,
    /// Bytes of `image/*` responses only.
    pub images: u64,
}

/// One entry of the resource history: the cumulative totals observed at a
/// point in time relative to navigation start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSample {
    pub timestamp_ms: i64,
    pub all: u64,
    pub images: u64,
}

impl ResourceSample {
    pub fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            all: self.all,
            images: self.images,
        }
    }
}

/// A screencast frame as captured: encoded image bytes plus the resource
/// totals assigned to it after the run.
#[derive(Clone)]
pub struct RawFrame {
    /// Capture time relative to navigation start.
    pub time_offset_ms: i64,
    /// Encoded image data straight from the browser.
    pub image: Vec<u8>,
    pub resources: ResourceSnapshot,
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("time_offset_ms", &self.time_offset_ms)
            .field("image_bytes", &self.image.len())
            .field("resources", &self.resources)
            .finish()
    }
}

/// Page-load milestones in milliseconds since navigation start. A field
/// stays `None` when its event never fired before the recording ended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    /// Time to first response.
    pub ttfr_ms: Option<i64>,
    /// URL of the first response.
    pub ttfr_url: Option<String>,
    pub on_dcl_ms: Option<i64>,
    pub on_load_ms: Option<i64>,
    /// Time of the last screencast frame, when the screen stopped changing.
    pub screen_fix_ms: Option<i64>,
}

/// Everything the recorder hands downstream.
#[derive(Debug, Clone)]
pub struct Recording {
    /// Captured frames in time order, resource snapshots already assigned.
    pub frames: Vec<RawFrame>,
    /// Page title, if the document got far enough to expose one.
    pub title: Option<String>,
    pub timing: Timing,
    /// Grand totals over the whole recording.
    pub total_resources: ResourceSnapshot,
}

/// Banner image rendered ahead of frame composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BannerImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// One composited frame written to disk, in time order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositedFrame {
    pub path: PathBuf,
    pub time_offset_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_serde_camel_case() {
        let timing = Timing {
            ttfr_ms: Some(120),
            ttfr_url: Some("https://example.com/".to_string()),
            on_dcl_ms: Some(900),
            on_load_ms: None,
            screen_fix_ms: Some(2500),
        };
        let json = serde_json::to_string(&timing).unwrap();
        assert!(json.contains("\"ttfrMs\":120"));
        assert!(json.contains("\"onDclMs\":900"));
        assert!(json.contains("\"screenFixMs\":2500"));

        let parsed: Timing = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, timing);
    }

    #[test]
    fn test_sample_snapshot_drops_timestamp() {
        let sample = ResourceSample {
            timestamp_ms: 1500,
            all: 4096,
            images: 1024,
        };
        assert_eq!(
            sample.snapshot(),
            ResourceSnapshot { all: 4096, images: 1024 }
        );
    }
}
