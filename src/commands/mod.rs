//! CLI subcommand implementations

pub mod sweep;
pub mod train;
