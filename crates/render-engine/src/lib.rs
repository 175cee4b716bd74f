//! Loadcast Render Engine
//!
//! Offline rendering pipeline that composites captured screencast frames
//! with the banner, progress bar, and column windows, then assembles the
//! stills into a video through ffmpeg's concat demuxer.
//!
//! # Pipeline Architecture
//!
//! ```text
//! screencast frames ──┐
//!                     ├── Compose (banner + progress + columns)
//! banner.png ─────────┘         │
//!                               ▼
//!                     frame-*.png / frame-*.jpg
//!                               │
//!                               ├── Timeline (concat demuxer durations)
//!                               ▼
//!                        ffmpeg -f concat
//!                               │
//!                               ▼
//!                           output.mp4
//! ```

pub mod compositor;
pub mod export;
pub mod juxtapose;

pub use compositor::compose_frames;
pub use export::*;
pub use juxtapose::juxtapose_videos;
