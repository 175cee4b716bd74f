//! Loadcast Pipeline
//!
//! Runs a complete show end to end: compute the canvas layout, record the
//! page loading, render the banner, compose frames, and assemble the
//! video. Each stage feeds the next; artifacts land in one directory so a
//! run can be inspected or replayed afterwards.

pub mod driver;

pub use driver::*;
