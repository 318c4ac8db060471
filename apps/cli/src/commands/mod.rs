//! Command implementations for the Lumen CLI.

pub mod archs;
pub mod train;
pub mod types;
pub mod watch;
