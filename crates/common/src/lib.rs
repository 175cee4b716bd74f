//! Loadcast Common Utilities
//!
//! Shared infrastructure for all loadcast crates:
//! - Error types and result aliases
//! - Recording clock utilities
//! - Tracing/logging initialization
//! - External encoder invocation

pub mod clock;
pub mod command;
pub mod error;
pub mod logging;

pub use clock::*;
pub use command::*;
pub use error::*;
