//! Loadcast Data Model
//!
//! Defines the data contracts shared by every pipeline stage:
//! - **Spec:** The full configuration of a run, with defaults, typed
//!   overrides, and merge rules
//! - **Merge:** Untyped override input (YAML, `key=value` phrases)
//!   validated and coerced against the defaults
//! - **Layout:** Column geometry computed from a [`LayoutSpec`]
//! - **Model:** Runtime artifacts handed between stages (frames, resource
//!   history, timings)

pub mod layout;
pub mod merge;
pub mod model;
pub mod spec;

pub use layout::*;
pub use merge::*;
pub use model::*;
pub use spec::*;
