//! CLI command implementations.

pub mod config;
pub mod login;
pub mod paths;
pub mod providers;
pub mod usage;
pub mod watch;
