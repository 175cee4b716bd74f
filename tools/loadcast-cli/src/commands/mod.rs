//! Subcommand implementations.

pub mod juxtapose;
pub mod record;
