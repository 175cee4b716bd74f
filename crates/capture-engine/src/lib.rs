//! Loadcast Capture Engine
//!
//! Drives a headless Chrome instance over the devtools protocol to record
//! a page loading. The recorder streams screencast frames and network
//! telemetry through a single collector task; the banner module renders
//! the run's summary card in a throwaway page.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               BrowserSession                 │
//! │  ┌───────────────────┐  ┌─────────────────┐  │
//! │  │  record_page_load │  │  create_banner  │  │
//! │  │  screencast +     │  │  template page  │  │
//! │  │  network events   │  │  + screenshot   │  │
//! │  └─────────┬─────────┘  └────────┬────────┘  │
//! │            ▼                     ▼           │
//! │  ┌────────────────────────────────────────┐  │
//! │  │         Artifacts (Disk/Memory)        │  │
//! │  │  frames  banner.png  banner.vars.json  │  │
//! │  └────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────┘
//! ```

pub mod banner;
pub mod recorder;
pub mod session;

pub use banner::{create_banner, BannerContext};
pub use recorder::{record_page_load, CaptureViewport};
pub use session::*;
